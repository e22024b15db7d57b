//! Crate wide constants.

/// Default tolerance used when locating points among breakpoints.
pub const LOCATE_TOLERANCE: f64 = 1e-15;

/// Convergence threshold for the Newton iteration computing Gauss-Legendre nodes.
pub const GAUSS_NEWTON_TOLERANCE: f64 = 1e-15;

/// Upper bound on Newton iterations for a single Gauss-Legendre node.
pub const GAUSS_NEWTON_MAX_ITER: usize = 100;

/// Base value of the message tags used by the ghost exchange.
///
/// The tag of a message is `EXCHANGE_TAG + 2 * dimension + (direction > 0)`.
pub const EXCHANGE_TAG: i32 = 1000;

/// Base value of the message tags used when accumulating ghost contributions.
pub const ACCUMULATE_TAG: i32 = 2000;
