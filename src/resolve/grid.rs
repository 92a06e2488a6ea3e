//! Sparse grid board and win detection.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The four axis directions a winning run can lie on; each is scanned in both
/// signed directions from the placed cell.
const AXES: [(i32, i32); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Sparse N×N board: occupied cells keyed `"row,col"`, value is the owning
/// symbol. String keys keep the wire representation a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBoard {
    /// Occupied cells.
    #[serde(default)]
    pub cells: IndexMap<String, String>,
}

/// Wire key for a cell.
pub fn cell_key(row: u32, col: u32) -> String {
    format!("{row},{col}")
}

impl GridBoard {
    /// Symbol at the given cell, if occupied. Out-of-range coordinates are
    /// simply unoccupied.
    pub fn symbol_at(&self, row: i32, col: i32) -> Option<&str> {
        if row < 0 || col < 0 {
            return None;
        }
        self.cells
            .get(&cell_key(row as u32, col as u32))
            .map(String::as_str)
    }

    /// Whether the cell is occupied.
    pub fn is_occupied(&self, row: u32, col: u32) -> bool {
        self.cells.contains_key(&cell_key(row, col))
    }

    /// Place `symbol` at the cell, replacing any previous occupant.
    pub fn place(&mut self, row: u32, col: u32, symbol: impl Into<String>) {
        self.cells.insert(cell_key(row, col), symbol.into());
    }

    /// Whether every cell of a `size`×`size` board is occupied.
    pub fn is_full(&self, size: u32) -> bool {
        self.cells.len() as u64 >= u64::from(size) * u64::from(size)
    }
}

/// True iff an axis-aligned run of at least `target_run` cells of `symbol`
/// passes through the cell at `(row, col)`.
///
/// Scans outward from the placed cell along the four axes, summing the
/// contiguous same-symbol runs in both signed directions plus the placed cell
/// itself. Runs never extend outside the `size`×`size` board. The placed
/// cell is counted whether or not it is already present on `board`, so this
/// can be evaluated immediately after (or atomically with) the placement.
pub fn wins_through(
    board: &GridBoard,
    size: u32,
    row: u32,
    col: u32,
    symbol: &str,
    target_run: u32,
) -> bool {
    let bound = size as i32;
    for (dr, dc) in AXES {
        let mut run = 1;
        for sign in [1, -1] {
            let (mut r, mut c) = (row as i32 + dr * sign, col as i32 + dc * sign);
            while (0..bound).contains(&r)
                && (0..bound).contains(&c)
                && board.symbol_at(r, c) == Some(symbol)
            {
                run += 1;
                r += dr * sign;
                c += dc * sign;
            }
        }
        if run >= target_run {
            return true;
        }
    }
    false
}
