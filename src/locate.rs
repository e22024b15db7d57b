//! Locating points among sorted breakpoints.
//!
//! Breakpoints `b_0 < b_1 < ... < b_N` define the `N` cells `[b_i, b_{i+1})`. A query point
//! within `tol` of an interior breakpoint is assigned to the cell on its right, a point within
//! `tol` of `b_0` to the first cell and a point within `tol` of `b_N` to the last cell.
//! Points further than `tol` outside of `[b_0, b_N]` are out of bounds.

use itertools::Itertools;

/// Outcome of a batched point location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateStatus {
    /// All points were located.
    Ok,
    /// A point lies more than the tolerance outside of the breakpoint range.
    OutOfBounds,
}

/// Locate the cell containing `x`.
///
/// Returns `None` if `x` is not a number or lies more than `tol` outside of
/// `[breaks[0], breaks[N]]`. The search is a single bisection over the interior
/// breakpoints, so it always terminates after `O(log N)` comparisons.
pub fn locate_cell(breaks: &[f64], x: f64, tol: f64) -> Option<usize> {
    assert!(breaks.len() >= 2, "at least two breakpoints are required");
    debug_assert!(tol >= 0.0, "tolerance must be non-negative");
    debug_assert!(
        breaks.iter().tuple_windows().all(|(a, b)| a <= b),
        "breakpoints must be sorted"
    );

    let ncells = breaks.len() - 1;
    let first = breaks[0];
    let last = breaks[ncells];

    if x.is_nan() || x < first - tol || x > last + tol {
        return None;
    }

    if x >= last - tol {
        return Some(ncells - 1);
    }

    // Count the interior breakpoints at or below `x + tol`. A point just below an
    // interior breakpoint is thereby moved into the cell on the right.
    Some(breaks[1..ncells].partition_point(|&b| b <= x + tol))
}

/// Locate the cells of a sequence of points.
///
/// On success the status is [LocateStatus::Ok] and the returned vector holds one cell index per
/// point. As soon as a point is out of bounds the routine stops and returns
/// [LocateStatus::OutOfBounds] together with the cells of the points preceding it.
pub fn locate(breaks: &[f64], points: &[f64], tol: f64) -> (LocateStatus, Vec<usize>) {
    let mut cells = Vec::with_capacity(points.len());

    for &x in points {
        match locate_cell(breaks, x, tol) {
            Some(cell) => cells.push(cell),
            None => return (LocateStatus::OutOfBounds, cells),
        }
    }

    (LocateStatus::Ok, cells)
}
