//! Univariate spline spaces and their tensor products on a decomposition.

use std::{ops::Range, sync::Arc};

use itertools::{izip, Itertools};

use crate::{
    bsplines::{basis_funs_all_ders, KnotVector},
    cart::CartDecomposition,
    error::{Error, Result},
    quadrature::QuadratureGrid,
};

/// A univariate B-spline space.
///
/// In a periodic space the first `degree` basis functions of the knot vector are identified with
/// the last `degree` ones, leaving `nbasis - degree` degrees of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineSpace {
    knots: KnotVector,
    periodic: bool,
}

impl SplineSpace {
    /// Create a space from a knot vector.
    pub fn new(knots: KnotVector, periodic: bool) -> Result<Self> {
        if periodic && knots.ncells() < knots.degree() {
            return Err(Error::configuration(
                "knots",
                format!(
                    "a periodic space of degree {} needs at least {} cells, got {}",
                    knots.degree(),
                    knots.degree(),
                    knots.ncells()
                ),
            ));
        }
        Ok(Self { knots, periodic })
    }

    /// Space on `ncells` uniform cells of `domain` with an open knot vector.
    pub fn open(degree: usize, ncells: usize, domain: [f64; 2]) -> Result<Self> {
        Self::new(KnotVector::open_uniform(degree, ncells, domain)?, false)
    }

    /// Periodic space on `ncells` uniform cells of `domain`.
    pub fn periodic(degree: usize, ncells: usize, domain: [f64; 2]) -> Result<Self> {
        Self::new(KnotVector::periodic_uniform(degree, ncells, domain)?, true)
    }

    /// The knot vector.
    pub fn knots(&self) -> &KnotVector {
        &self.knots
    }

    /// Polynomial degree.
    pub fn degree(&self) -> usize {
        self.knots.degree()
    }

    /// Whether the space is periodic.
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Number of degrees of freedom.
    pub fn ndofs(&self) -> usize {
        if self.periodic {
            self.knots.nbasis() - self.degree()
        } else {
            self.knots.nbasis()
        }
    }

    /// Breakpoints of the parametric domain.
    pub fn breaks(&self) -> &[f64] {
        self.knots.breakpoints()
    }

    /// Number of cells.
    pub fn ncells(&self) -> usize {
        self.knots.ncells()
    }

    /// Cells assigned to a process owning the degrees of freedom `start..=end`.
    ///
    /// A cell belongs to the owner of its first non-vanishing basis function `span - degree`.
    /// Since spans increase with the cell index the result is a contiguous range, and the ranges
    /// of all processes along a dimension partition the cells.
    pub fn owned_cells(&self, start: usize, end: usize) -> Range<usize> {
        let p = self.degree();
        let spans = self.knots.spans();
        let first = spans.partition_point(|&span| span - p < start);
        let last = spans.partition_point(|&span| span - p <= end);
        first..last
    }

    /// Tabulate the basis functions and `nderiv` derivatives at all points of `grid`.
    pub fn basis_table(&self, grid: &QuadratureGrid, nderiv: usize) -> BasisTable {
        let p = self.degree();
        let nquad = grid.nquad();
        let knots = self.knots.as_slice();

        let mut spans = Vec::with_capacity(grid.ncells());
        let mut values = Vec::with_capacity(grid.ncells() * nquad * (p + 1) * (nderiv + 1));

        for (local, cell) in grid.cells().enumerate() {
            let span = self.knots.spans()[cell];
            spans.push(span);
            for &x in grid.points(local) {
                let ders = basis_funs_all_ders(knots, p, x, span, nderiv);
                for r in 0..=p {
                    values.extend((0..=nderiv).map(|k| ders[(k, r)]));
                }
            }
        }

        BasisTable {
            degree: p,
            nderiv,
            nquad,
            spans,
            values,
        }
    }
}

/// Basis function values and derivatives at the quadrature points of a [QuadratureGrid].
#[derive(Debug, Clone)]
pub struct BasisTable {
    degree: usize,
    nderiv: usize,
    nquad: usize,
    spans: Vec<usize>,
    // Indexed by (cell, point, basis function, derivative order).
    values: Vec<f64>,
}

impl BasisTable {
    /// Polynomial degree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Highest tabulated derivative order.
    pub fn nderiv(&self) -> usize {
        self.nderiv
    }

    /// Knot span of the cell with local index `cell`.
    pub fn span(&self, cell: usize) -> usize {
        self.spans[cell]
    }

    /// Derivatives of orders `0..=nderiv` of the local basis function `basis` at point `point`
    /// of the cell `cell`.
    pub fn ders(&self, cell: usize, point: usize, basis: usize) -> &[f64] {
        let stride = self.nderiv + 1;
        let index = ((cell * self.nquad + point) * (self.degree + 1) + basis) * stride;
        &self.values[index..index + stride]
    }
}

/// Tensor product of spline spaces distributed over a [CartDecomposition].
///
/// Holds the quadrature grids on the owned cells together with the tabulated basis functions,
/// so assembly routines can iterate over cells without re-evaluating splines.
#[derive(Debug, Clone)]
pub struct TensorSpace {
    cart: Arc<CartDecomposition>,
    spaces: Vec<SplineSpace>,
    grids: Vec<QuadratureGrid>,
    tables: Vec<BasisTable>,
}

impl TensorSpace {
    /// Create the tensor space of `spaces` on `cart`.
    ///
    /// `quad_orders` gives the number of Gauss points per cell and dimension, `nderiv` the
    /// highest derivative order available to assembly kernels. Kernels using first derivatives,
    /// such as [Laplace](crate::assembly::Laplace), need `nderiv >= 1`.
    pub fn new(
        cart: Arc<CartDecomposition>,
        spaces: Vec<SplineSpace>,
        quad_orders: &[usize],
        nderiv: usize,
    ) -> Result<Self> {
        if spaces.len() != cart.ndim() {
            return Err(Error::configuration(
                "spaces",
                format!("expected {} spaces, got {}", cart.ndim(), spaces.len()),
            ));
        }

        for (d, space) in spaces.iter().enumerate() {
            if space.ndofs() != cart.npts()[d] {
                return Err(Error::configuration(
                    "spaces",
                    format!(
                        "space {d} has {} degrees of freedom but the decomposition has {} points",
                        space.ndofs(),
                        cart.npts()[d]
                    ),
                ));
            }
            if space.is_periodic() != cart.periods()[d] {
                return Err(Error::configuration(
                    "spaces",
                    format!("periodicity of space {d} does not match the decomposition"),
                ));
            }
            if cart.pads()[d] < space.degree() {
                return Err(Error::configuration(
                    "pads",
                    format!(
                        "ghost width {} is smaller than the degree {} of space {d}",
                        cart.pads()[d],
                        space.degree()
                    ),
                ));
            }
        }

        let grids = QuadratureGrid::build(&cart, &spaces, quad_orders)?;
        let tables = izip!(&spaces, &grids)
            .map(|(space, grid)| space.basis_table(grid, nderiv))
            .collect_vec();

        log::debug!(
            "rank {}: tensor space with owned cells {:?}",
            cart.rank(),
            grids.iter().map(QuadratureGrid::cells).collect_vec()
        );

        Ok(Self {
            cart,
            spaces,
            grids,
            tables,
        })
    }

    /// Tensor space with `degree + 1` Gauss points per cell and first derivatives.
    pub fn with_default_quadrature(
        cart: Arc<CartDecomposition>,
        spaces: Vec<SplineSpace>,
    ) -> Result<Self> {
        let quad_orders = spaces.iter().map(|s| s.degree() + 1).collect_vec();
        Self::new(cart, spaces, &quad_orders, 1)
    }

    /// The decomposition.
    pub fn cart(&self) -> &Arc<CartDecomposition> {
        &self.cart
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.spaces.len()
    }

    /// The univariate spaces.
    pub fn spaces(&self) -> &[SplineSpace] {
        &self.spaces
    }

    /// Quadrature grids on the owned cells.
    pub fn grids(&self) -> &[QuadratureGrid] {
        &self.grids
    }

    /// Tabulated basis functions on the owned cells.
    pub fn tables(&self) -> &[BasisTable] {
        &self.tables
    }

    /// Polynomial degrees.
    pub fn degrees(&self) -> Vec<usize> {
        self.spaces.iter().map(SplineSpace::degree).collect()
    }
}
