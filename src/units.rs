//! Conversions between persisted units and solver units.
//!
//! Persisted records keep milliseconds, separate longitude/latitude fields
//! and decimal money. The solver wants integer seconds, `[lon, lat]` pairs
//! and integer costs.

use thiserror::Error;

/// Milliseconds per solver second.
const MS_PER_SECOND: i64 = 1000;

/// A cost that cannot be sent to the solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidCostError {
    #[error("cost {value} rounds to a negative amount")]
    Negative { value: f64 },

    #[error("cost is not a finite number")]
    NotFinite,

    #[error("cost {value} does not fit an integer")]
    Overflow { value: f64 },
}

/// Persisted milliseconds to solver seconds, rounding down.
///
/// Sub-second precision is dropped, so this is not invertible.
pub fn to_solver_time(ms: i64) -> i64 {
    ms.div_euclid(MS_PER_SECOND)
}

/// Solver seconds back to persisted milliseconds.
///
/// `None` when the result does not fit an `i64`.
pub fn from_solver_time(seconds: i64) -> Option<i64> {
    seconds.checked_mul(MS_PER_SECOND)
}

/// Combine persisted coordinates into the solver's `[lon, lat]` order.
pub fn to_solver_coordinate(lon: f64, lat: f64) -> [f64; 2] {
    [lon, lat]
}

/// Split a solver `[lon, lat]` pair back into `(lon, lat)`.
pub fn from_solver_coordinate(coordinate: [f64; 2]) -> (f64, f64) {
    (coordinate[0], coordinate[1])
}

/// Round a persisted cost to the solver's integer cost, falling back to
/// `default` when the field is unset.
pub fn to_solver_cost(value: Option<f64>, default: i64) -> Result<i64, InvalidCostError> {
    let value = match value {
        Some(value) => value,
        None => default as f64,
    };

    if !value.is_finite() {
        return Err(InvalidCostError::NotFinite);
    }

    let rounded = value.round();
    if rounded < 0.0 {
        return Err(InvalidCostError::Negative { value });
    }
    if rounded >= i64::MAX as f64 {
        return Err(InvalidCostError::Overflow { value });
    }

    Ok(rounded as i64)
}
