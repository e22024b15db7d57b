//! Assembly of stencil matrices and vectors from integrand kernels.
//!
//! Integrals are evaluated cell by cell over the cells owned by the calling process, using
//! the quadrature grids and basis tables of a [TensorSpace]. Contributions are added to the
//! rows of the non-vanishing test functions, which may lie in the upper ghost layer. A
//! subsequent [accumulate_ghost_regions](crate::exchange::accumulate_ghost_regions) moves them
//! to their owners.

use std::sync::Arc;

use itertools::{izip, Itertools};

use crate::{
    space::TensorSpace,
    stencil::{StencilMatrix, StencilVector},
};

/// Values and derivatives of one tensor-product basis function at a quadrature point.
#[derive(Debug, Clone, Copy)]
pub struct TensorBasis<'a> {
    ders: &'a [&'a [f64]],
}

impl<'a> TensorBasis<'a> {
    fn new(ders: &'a [&'a [f64]]) -> Self {
        Self { ders }
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.ders.len()
    }

    /// Value of the basis function.
    pub fn value(&self) -> f64 {
        self.ders.iter().map(|d| d[0]).product()
    }

    /// Mixed partial derivative with `orders[d]` derivatives along dimension `d`.
    ///
    /// # Panics
    /// If an order exceeds the number of tabulated derivatives.
    pub fn partial(&self, orders: &[usize]) -> f64 {
        izip!(self.ders, orders).map(|(d, &k)| d[k]).product()
    }

    /// First derivative along `dim`.
    ///
    /// # Panics
    /// If the space was tabulated with `nderiv = 0`.
    pub fn derivative(&self, dim: usize) -> f64 {
        self.ders
            .iter()
            .enumerate()
            .map(|(d, ders)| ders[usize::from(d == dim)])
            .product()
    }

    /// Gradient.
    ///
    /// # Panics
    /// If the space was tabulated with `nderiv = 0`.
    pub fn gradient(&self) -> Vec<f64> {
        (0..self.ndim()).map(|d| self.derivative(d)).collect()
    }
}

/// Value and derivatives of a discrete field at a quadrature point.
#[derive(Debug, Clone, Copy)]
pub struct FieldValue<'a> {
    coeffs: &'a [f64],
    bases: &'a [Vec<&'a [f64]>],
}

impl FieldValue<'_> {
    fn combine<F: Fn(&TensorBasis) -> f64>(&self, f: F) -> f64 {
        izip!(self.coeffs, self.bases)
            .map(|(c, ders)| c * f(&TensorBasis::new(ders)))
            .sum()
    }

    /// Value of the field.
    pub fn value(&self) -> f64 {
        self.combine(|basis| basis.value())
    }

    /// Mixed partial derivative of the field.
    pub fn partial(&self, orders: &[usize]) -> f64 {
        self.combine(|basis| basis.partial(orders))
    }

    /// First derivative along `dim`.
    ///
    /// # Panics
    /// If the space was tabulated with `nderiv = 0`.
    pub fn derivative(&self, dim: usize) -> f64 {
        self.combine(|basis| basis.derivative(dim))
    }

    /// Gradient of the field.
    ///
    /// # Panics
    /// If the space was tabulated with `nderiv = 0`.
    pub fn gradient(&self) -> Vec<f64> {
        let ndim = self.bases.first().map_or(0, Vec::len);
        (0..ndim).map(|d| self.derivative(d)).collect()
    }
}

/// Integrand of a bilinear form.
pub trait BilinearKernel {
    /// Integrand for the test function `test` and the trial function `trial` at `point`.
    fn evaluate(&self, test: &TensorBasis, trial: &TensorBasis, point: &[f64]) -> f64;
}

impl<F> BilinearKernel for F
where
    F: Fn(&TensorBasis, &TensorBasis, &[f64]) -> f64,
{
    fn evaluate(&self, test: &TensorBasis, trial: &TensorBasis, point: &[f64]) -> f64 {
        self(test, trial, point)
    }
}

/// Integrand of a linear form.
pub trait LinearKernel {
    /// Integrand for the test function `test` at `point`.
    fn evaluate(&self, test: &TensorBasis, point: &[f64]) -> f64;
}

impl<F> LinearKernel for F
where
    F: Fn(&TensorBasis, &[f64]) -> f64,
{
    fn evaluate(&self, test: &TensorBasis, point: &[f64]) -> f64 {
        self(test, point)
    }
}

/// The `L2` inner product `u v`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mass;

impl BilinearKernel for Mass {
    fn evaluate(&self, test: &TensorBasis, trial: &TensorBasis, _point: &[f64]) -> f64 {
        test.value() * trial.value()
    }
}

/// The stiffness form `grad u . grad v` of the Laplace operator.
///
/// Needs a space with `nderiv >= 1`. Assembly panics otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Laplace;

impl BilinearKernel for Laplace {
    fn evaluate(&self, test: &TensorBasis, trial: &TensorBasis, _point: &[f64]) -> f64 {
        (0..test.ndim())
            .map(|d| test.derivative(d) * trial.derivative(d))
            .sum()
    }
}

/// The load `f v` of a source function `f`.
#[derive(Debug, Clone, Copy)]
pub struct Load<F>(pub F);

impl<F: Fn(&[f64]) -> f64> LinearKernel for Load<F> {
    fn evaluate(&self, test: &TensorBasis, point: &[f64]) -> f64 {
        test.value() * (self.0)(point)
    }
}

// Iteration over the owned cells and quadrature points of a space.
struct CellLoop<'a> {
    space: &'a TensorSpace,
    local_basis: Vec<Vec<usize>>,
    local_points: Vec<Vec<usize>>,
}

impl<'a> CellLoop<'a> {
    fn new(space: &'a TensorSpace) -> Self {
        let local_basis = space
            .degrees()
            .into_iter()
            .map(|p| 0..=p)
            .multi_cartesian_product()
            .collect_vec();
        let local_points = space
            .grids()
            .iter()
            .map(|grid| 0..grid.nquad())
            .multi_cartesian_product()
            .collect_vec();
        Self {
            space,
            local_basis,
            local_points,
        }
    }

    fn cells(&self) -> impl Iterator<Item = Vec<usize>> + 'a {
        self.space
            .grids()
            .iter()
            .map(|grid| 0..grid.ncells())
            .multi_cartesian_product()
    }

    // Local row of the first non-vanishing basis function on `cell`.
    fn first_row(&self, cell: &[usize]) -> Vec<usize> {
        let cart = self.space.cart();
        izip!(
            cell,
            self.space.tables(),
            cart.starts(),
            cart.pads()
        )
        .map(|(&c, table, &s, &p)| table.span(c) - table.degree() - s + p)
        .collect()
    }

    fn point(&self, cell: &[usize], q: &[usize]) -> (Vec<f64>, f64) {
        let mut weight = 1.0;
        let point = izip!(self.space.grids(), cell, q)
            .map(|(grid, &c, &q)| {
                weight *= grid.weights(c)[q];
                grid.points(c)[q]
            })
            .collect();
        (point, weight)
    }

    fn bases(&self, cell: &[usize], q: &[usize]) -> Vec<Vec<&'a [f64]>> {
        let tables = self.space.tables();
        self.local_basis
            .iter()
            .map(|basis| {
                izip!(tables, cell, q, basis)
                    .map(|(table, &c, &q, &b)| table.ders(c, q, b))
                    .collect()
            })
            .collect()
    }

    fn rows<'b>(&'b self, cell: &[usize]) -> impl Iterator<Item = Vec<usize>> + 'b {
        let first = self.first_row(cell);
        self.local_basis
            .iter()
            .map(move |basis| izip!(&first, basis).map(|(f, b)| f + b).collect())
    }
}

/// Add the matrix of the bilinear form `kernel` on `space` to `matrix`.
pub fn assemble_matrix_into<K: BilinearKernel>(
    matrix: &mut StencilMatrix,
    space: &TensorSpace,
    kernel: &K,
) {
    assert_eq!(
        matrix.cart().shape(),
        space.cart().shape(),
        "matrix and space live on different layouts"
    );

    let cells = CellLoop::new(space);
    let nlocal = cells.local_basis.len();
    let mut element = vec![0.0; nlocal * nlocal];
    let mut ncells = 0;

    for cell in cells.cells() {
        element.fill(0.0);

        for q in &cells.local_points {
            let (point, weight) = cells.point(&cell, q);
            let bases = cells.bases(&cell, q);
            for (i, test) in bases.iter().enumerate() {
                let test = TensorBasis::new(test);
                for (j, trial) in bases.iter().enumerate() {
                    element[i * nlocal + j] +=
                        weight * kernel.evaluate(&test, &TensorBasis::new(trial), &point);
                }
            }
        }

        for (i, (row, test)) in izip!(cells.rows(&cell), &cells.local_basis).enumerate() {
            for (j, trial) in cells.local_basis.iter().enumerate() {
                let offsets = izip!(trial, test)
                    .map(|(&t, &s)| t as isize - s as isize)
                    .collect_vec();
                matrix.add_local(&row, &offsets, element[i * nlocal + j]);
            }
        }
        ncells += 1;
    }

    log::debug!(
        "rank {}: assembled matrix contributions of {} cells",
        space.cart().rank(),
        ncells
    );
}

/// Assemble the matrix of the bilinear form `kernel` on `space`.
///
/// Rows in the ghost layer hold contributions for other processes until the ghost regions
/// are accumulated.
pub fn assemble_matrix<K: BilinearKernel>(space: &TensorSpace, kernel: &K) -> StencilMatrix {
    let mut matrix = StencilMatrix::new(Arc::clone(space.cart()));
    assemble_matrix_into(&mut matrix, space, kernel);
    matrix
}

/// Add the vector of the linear form `kernel` on `space` to `vector`.
pub fn assemble_vector_into<K: LinearKernel>(
    vector: &mut StencilVector,
    space: &TensorSpace,
    kernel: &K,
) {
    assert_eq!(
        vector.cart().shape(),
        space.cart().shape(),
        "vector and space live on different layouts"
    );

    let cells = CellLoop::new(space);
    let mut element = vec![0.0; cells.local_basis.len()];

    for cell in cells.cells() {
        element.fill(0.0);

        for q in &cells.local_points {
            let (point, weight) = cells.point(&cell, q);
            for (value, test) in izip!(element.iter_mut(), &cells.bases(&cell, q)) {
                *value += weight * kernel.evaluate(&TensorBasis::new(test), &point);
            }
        }

        for (row, value) in izip!(cells.rows(&cell), &element) {
            vector.add_local(&row, *value);
        }
    }
}

/// Assemble the vector of the linear form `kernel` on `space`.
pub fn assemble_vector<K: LinearKernel>(space: &TensorSpace, kernel: &K) -> StencilVector {
    let mut vector = StencilVector::new(Arc::clone(space.cart()));
    assemble_vector_into(&mut vector, space, kernel);
    vector
}

/// Integrate `integrand` of a discrete field over the cells owned by this process.
///
/// The ghost layers of `field` have to be up to date. Summing the result over all processes
/// gives the integral over the whole domain.
pub fn assemble_functional<F>(space: &TensorSpace, field: &StencilVector, integrand: F) -> f64
where
    F: Fn(&FieldValue, &[f64]) -> f64,
{
    assert_eq!(
        field.cart().shape(),
        space.cart().shape(),
        "field and space live on different layouts"
    );

    let cells = CellLoop::new(space);
    let mut total = 0.0;

    for cell in cells.cells() {
        let coeffs = cells
            .rows(&cell)
            .map(|row| field.get_local(&row))
            .collect_vec();

        for q in &cells.local_points {
            let (point, weight) = cells.point(&cell, q);
            let bases = cells.bases(&cell, q);
            let value = FieldValue {
                coeffs: &coeffs,
                bases: &bases,
            };
            total += weight * integrand(&value, &point);
        }
    }

    total
}

/// Contribution of this process to the squared `L2` error of `field` against `exact`.
pub fn l2_error_squared<E: Fn(&[f64]) -> f64>(
    space: &TensorSpace,
    field: &StencilVector,
    exact: E,
) -> f64 {
    assemble_functional(space, field, |u: &FieldValue, x: &[f64]| {
        (u.value() - exact(x)).powi(2)
    })
}

/// Contribution of this process to the squared `H1` seminorm error of `field`.
///
/// Needs a space with `nderiv >= 1`.
pub fn h1_seminorm_error_squared<G: Fn(&[f64]) -> Vec<f64>>(
    space: &TensorSpace,
    field: &StencilVector,
    exact_gradient: G,
) -> f64 {
    assemble_functional(space, field, |u: &FieldValue, x: &[f64]| {
        izip!(u.gradient(), exact_gradient(x))
            .map(|(a, b)| (a - b).powi(2))
            .sum()
    })
}
