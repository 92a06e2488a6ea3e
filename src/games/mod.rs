//! Game-specific parameterizations of the engine. Each module supplies a
//! phase enum, payload schemas, and a resolver; everything else is generic.

pub mod atlas;
pub mod grid_battle;
pub mod quiz_grid;
