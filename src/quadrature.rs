//! Gauss-Legendre quadrature on the owned cells of a decomposition.

use std::{f64::consts::PI, ops::Range};

use itertools::izip;

use crate::{
    cart::CartDecomposition,
    constants::{GAUSS_NEWTON_MAX_ITER, GAUSS_NEWTON_TOLERANCE},
    error::{Error, Result},
    space::SplineSpace,
};

/// Gauss-Legendre rule with `n` points on `[-1, 1]`.
///
/// The nodes are returned in ascending order. The rule integrates polynomials up to degree
/// `2n - 1` exactly.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n > 0, "a quadrature rule needs at least one point");

    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    // Roots are symmetric, only the non-negative half is computed.
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();

        for _ in 0..GAUSS_NEWTON_MAX_ITER {
            let (value, derivative) = legendre(n, x);
            let step = value / derivative;
            x -= step;
            if step.abs() <= GAUSS_NEWTON_TOLERANCE {
                break;
            }
        }
        let (_, derivative) = legendre(n, x);

        let weight = 2.0 / ((1.0 - x * x) * derivative * derivative);
        points[n - 1 - i] = x;
        points[i] = -x;
        weights[n - 1 - i] = weight;
        weights[i] = weight;
    }

    (points, weights)
}

// Value and derivative of the Legendre polynomial of degree `n` at `x`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let derivative = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, derivative)
}

/// Quadrature points and weights on a contiguous range of cells along one dimension.
#[derive(Debug, Clone)]
pub struct QuadratureGrid {
    cells: Range<usize>,
    nquad: usize,
    points: Vec<f64>,
    weights: Vec<f64>,
}

impl QuadratureGrid {
    /// Map an `nquad` point Gauss-Legendre rule onto the cells `cells` of `breaks`.
    pub fn new(breaks: &[f64], cells: Range<usize>, nquad: usize) -> Self {
        assert!(cells.end < breaks.len(), "cell range exceeds the breakpoints");

        let (reference_points, reference_weights) = gauss_legendre(nquad);
        let mut points = Vec::with_capacity(cells.len() * nquad);
        let mut weights = Vec::with_capacity(cells.len() * nquad);

        for cell in cells.clone() {
            let a = breaks[cell];
            let b = breaks[cell + 1];
            let half = 0.5 * (b - a);
            let mid = 0.5 * (a + b);
            for (x, w) in izip!(&reference_points, &reference_weights) {
                points.push(mid + half * x);
                weights.push(half * w);
            }
        }

        Self {
            cells,
            nquad,
            points,
            weights,
        }
    }

    /// Quadrature grids on the cells owned by the calling process of `cart`, one per dimension.
    ///
    /// Cell ownership follows [SplineSpace::owned_cells].
    pub fn build(
        cart: &CartDecomposition,
        spaces: &[SplineSpace],
        quad_orders: &[usize],
    ) -> Result<Vec<Self>> {
        if spaces.len() != cart.ndim() {
            return Err(Error::configuration(
                "spaces",
                format!("expected {} spaces, got {}", cart.ndim(), spaces.len()),
            ));
        }
        if quad_orders.len() != cart.ndim() {
            return Err(Error::configuration(
                "quad_orders",
                format!(
                    "expected {} quadrature orders, got {}",
                    cart.ndim(),
                    quad_orders.len()
                ),
            ));
        }
        if quad_orders.contains(&0) {
            return Err(Error::configuration(
                "quad_orders",
                "every dimension needs at least one quadrature point",
            ));
        }

        Ok(izip!(spaces, quad_orders, cart.starts(), cart.ends())
            .map(|(space, &nquad, &start, &end)| {
                Self::new(space.breaks(), space.owned_cells(start, end), nquad)
            })
            .collect())
    }

    /// Global indices of the cells covered by the grid.
    pub fn cells(&self) -> Range<usize> {
        self.cells.clone()
    }

    /// Number of cells.
    pub fn ncells(&self) -> usize {
        self.cells.len()
    }

    /// Number of quadrature points per cell.
    pub fn nquad(&self) -> usize {
        self.nquad
    }

    /// Points of the cell with local index `cell`.
    pub fn points(&self, cell: usize) -> &[f64] {
        &self.points[cell * self.nquad..(cell + 1) * self.nquad]
    }

    /// Weights of the cell with local index `cell`.
    pub fn weights(&self, cell: usize) -> &[f64] {
        &self.weights[cell * self.nquad..(cell + 1) * self.nquad]
    }
}
