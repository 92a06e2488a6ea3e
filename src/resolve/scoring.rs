//! Closeness scoring for distance/error style guessing rounds.

/// Score one sub-objective: `max(0, ceil(max_score * (1 - normalized)))`
/// where `normalized = min(1, error / threshold)`.
///
/// An exact guess earns `max_score`; any error at or beyond `threshold`
/// earns zero. Negative errors are treated as their magnitude.
pub fn closeness_score(max_score: u32, error: f64, threshold: f64) -> u32 {
    if threshold <= 0.0 || !error.is_finite() {
        return 0;
    }
    let normalized = (error.abs() / threshold).clamp(0.0, 1.0);
    (f64::from(max_score) * (1.0 - normalized)).ceil().max(0.0) as u32
}
