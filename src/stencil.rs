//! Distributed vectors and banded matrices on a Cartesian decomposition.
//!
//! Both containers store their local data over the ghost-extended box of a
//! [CartDecomposition] in row-major order. A [StencilMatrix] stores, for every local row, the
//! coefficients of the `2 * pads[d] + 1` diagonal offsets per dimension.

use std::sync::Arc;

use itertools::{izip, Itertools};
use mpi::traits::CommunicatorCollectives;
use nalgebra_sparse::CooMatrix;

use crate::{cart::CartDecomposition, exchange::GhostedArray, tools::global_sum};

fn ravel(index: &[usize], shape: &[usize]) -> usize {
    izip!(index, shape).fold(0, |acc, (&i, &n)| acc * n + i)
}

// Local multi-indices of the owned points in row-major order.
fn owned_local_indices(cart: &CartDecomposition) -> impl Iterator<Item = Vec<usize>> + '_ {
    izip!(cart.pads(), cart.local_npts())
        .map(|(&p, n)| p..p + n)
        .multi_cartesian_product()
}

fn local_index(cart: &CartDecomposition, global: &[usize]) -> Vec<usize> {
    cart.global_to_local(global).unwrap_or_else(|| {
        panic!(
            "global index {global:?} is not stored on rank {}",
            cart.rank()
        )
    })
}

/// A vector distributed over a [CartDecomposition].
#[derive(Debug, Clone)]
pub struct StencilVector {
    cart: Arc<CartDecomposition>,
    data: Vec<f64>,
}

impl StencilVector {
    /// A zero vector.
    pub fn new(cart: Arc<CartDecomposition>) -> Self {
        let len = cart.shape().iter().product();
        Self {
            cart,
            data: vec![0.0; len],
        }
    }

    /// A vector whose owned entries are `f(global index)`. Ghost entries are zero.
    pub fn from_fn<F: Fn(&[usize]) -> f64>(cart: Arc<CartDecomposition>, f: F) -> Self {
        let mut vector = Self::new(cart);
        let cart = Arc::clone(&vector.cart);
        for local in owned_local_indices(&cart) {
            let global = izip!(&local, cart.starts(), cart.pads())
                .map(|(l, s, p)| l + s - p)
                .collect_vec();
            let index = ravel(&local, cart.shape());
            vector.data[index] = f(&global);
        }
        vector
    }

    /// The decomposition.
    pub fn cart(&self) -> &Arc<CartDecomposition> {
        &self.cart
    }

    /// Local values including ghost layers.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Set all entries to zero.
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Value at a global index stored on this process, owned or ghost.
    ///
    /// # Panics
    /// If the index is neither owned nor part of the ghost layer.
    pub fn get(&self, global: &[usize]) -> f64 {
        self.data[ravel(&local_index(&self.cart, global), self.cart.shape())]
    }

    /// Set the value at a global index stored on this process.
    ///
    /// # Panics
    /// If the index is neither owned nor part of the ghost layer.
    pub fn set(&mut self, global: &[usize], value: f64) {
        let index = ravel(&local_index(&self.cart, global), self.cart.shape());
        self.data[index] = value;
    }

    pub(crate) fn get_local(&self, local: &[usize]) -> f64 {
        self.data[ravel(local, self.cart.shape())]
    }

    pub(crate) fn add_local(&mut self, local: &[usize], value: f64) {
        let index = ravel(local, self.cart.shape());
        self.data[index] += value;
    }

    /// Multiply all entries by `a`.
    pub fn scale(&mut self, a: f64) {
        for v in self.data.iter_mut() {
            *v *= a;
        }
    }

    /// `self += a * x`.
    pub fn axpy(&mut self, a: f64, x: &StencilVector) {
        assert_eq!(self.cart.shape(), x.cart.shape(), "vectors live on different layouts");
        for (y, x) in izip!(self.data.iter_mut(), &x.data) {
            *y += a * x;
        }
    }

    /// Inner product of the entries owned by this process.
    pub fn dot_local(&self, other: &StencilVector) -> f64 {
        assert_eq!(self.cart.shape(), other.cart.shape(), "vectors live on different layouts");
        owned_local_indices(&self.cart)
            .map(|local| {
                let index = ravel(&local, self.cart.shape());
                self.data[index] * other.data[index]
            })
            .sum()
    }

    /// Global inner product over all processes of `comm`.
    pub fn dot<C: CommunicatorCollectives>(&self, other: &StencilVector, comm: &C) -> f64 {
        global_sum(self.dot_local(other), comm)
    }

    /// Owned entries as `(row-major global index, value)` pairs.
    pub fn to_global_triplets(&self) -> Vec<(usize, f64)> {
        let cart = &self.cart;
        owned_local_indices(cart)
            .map(|local| {
                let global = izip!(&local, cart.starts(), cart.pads())
                    .map(|(l, s, p)| l + s - p)
                    .collect_vec();
                (cart.flat_index(&global), self.get_local(&local))
            })
            .collect()
    }
}

impl GhostedArray for StencilVector {
    fn cart(&self) -> &Arc<CartDecomposition> {
        &self.cart
    }

    fn block_size(&self) -> usize {
        1
    }

    fn data(&self) -> &[f64] {
        &self.data
    }

    fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// A banded matrix distributed by rows over a [CartDecomposition].
///
/// Entry `(i, k)` couples row `i` to column `i + k` for offsets `-pads[d] <= k[d] <= pads[d]`.
/// Columns of periodic dimensions wrap around.
#[derive(Debug, Clone)]
pub struct StencilMatrix {
    cart: Arc<CartDecomposition>,
    band: Vec<usize>,
    block_size: usize,
    data: Vec<f64>,
}

impl StencilMatrix {
    /// A zero matrix.
    pub fn new(cart: Arc<CartDecomposition>) -> Self {
        let band = cart.pads().iter().map(|p| 2 * p + 1).collect_vec();
        let block_size = band.iter().product::<usize>();
        let len = cart.shape().iter().product::<usize>() * block_size;
        Self {
            cart,
            band,
            block_size,
            data: vec![0.0; len],
        }
    }

    /// The decomposition.
    pub fn cart(&self) -> &Arc<CartDecomposition> {
        &self.cart
    }

    /// Local coefficients including ghost rows.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Set all entries to zero.
    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// All admissible offsets in storage order.
    pub fn offsets(&self) -> Vec<Vec<isize>> {
        self.cart
            .pads()
            .iter()
            .map(|&p| -(p as isize)..=p as isize)
            .multi_cartesian_product()
            .collect()
    }

    fn entry_index(&self, local_row: &[usize], offsets: &[isize]) -> usize {
        let offset = izip!(offsets, self.cart.pads(), &self.band).fold(0, |acc, (&k, &p, &n)| {
            assert!(k.unsigned_abs() <= p, "offset {k} exceeds the band width {p}");
            acc * n + (k + p as isize) as usize
        });
        ravel(local_row, self.cart.shape()) * self.block_size + offset
    }

    /// Coefficient of a row stored on this process at the given offsets.
    ///
    /// # Panics
    /// If the row is neither owned nor a ghost row, or an offset exceeds the band width.
    pub fn get(&self, row: &[usize], offsets: &[isize]) -> f64 {
        self.data[self.entry_index(&local_index(&self.cart, row), offsets)]
    }

    /// Set the coefficient of a row stored on this process at the given offsets.
    pub fn set(&mut self, row: &[usize], offsets: &[isize], value: f64) {
        let index = self.entry_index(&local_index(&self.cart, row), offsets);
        self.data[index] = value;
    }

    pub(crate) fn add_local(&mut self, local_row: &[usize], offsets: &[isize], value: f64) {
        let index = self.entry_index(local_row, offsets);
        self.data[index] += value;
    }

    /// Multiply all entries by `a`.
    pub fn scale(&mut self, a: f64) {
        for v in self.data.iter_mut() {
            *v *= a;
        }
    }

    /// Matrix-vector product `y = A x` on the owned rows.
    ///
    /// The ghost layers of `x` have to be up to date. The ghost layers of `y` are left untouched.
    pub fn dot(&self, x: &StencilVector, y: &mut StencilVector) {
        let shape = self.cart.shape();
        assert_eq!(shape, x.cart.shape(), "matrix and vector live on different layouts");
        assert_eq!(shape, y.cart.shape(), "matrix and vector live on different layouts");

        let offsets = self.offsets();
        for row in owned_local_indices(&self.cart) {
            let base = ravel(&row, shape) * self.block_size;
            let sum = offsets
                .iter()
                .enumerate()
                .map(|(k, offset)| {
                    let column = izip!(&row, offset)
                        .map(|(&r, &o)| (r as isize + o) as usize)
                        .collect_vec();
                    self.data[base + k] * x.get_local(&column)
                })
                .sum::<f64>();
            let index = ravel(&row, shape);
            y.data[index] = sum;
        }
    }

    /// Owned rows as a sparse matrix over the row-major global numbering.
    ///
    /// Zero coefficients are skipped. Periodic columns are wrapped, so several offsets may hit
    /// the same column; their values add up on conversion to a compressed format.
    pub fn to_coo(&self) -> CooMatrix<f64> {
        let cart = &self.cart;
        let n = cart.npts().iter().product::<usize>();
        let mut coo = CooMatrix::new(n, n);
        let offsets = self.offsets();

        for local in owned_local_indices(cart) {
            let global = izip!(&local, cart.starts(), cart.pads())
                .map(|(l, s, p)| l + s - p)
                .collect_vec();
            let row = cart.flat_index(&global);
            let base = ravel(&local, cart.shape()) * self.block_size;

            for (k, offset) in offsets.iter().enumerate() {
                let value = self.data[base + k];
                if value == 0.0 {
                    continue;
                }
                let column = izip!(&global, offset, cart.npts(), cart.periods())
                    .map(|(&g, &o, &npts, &periodic)| {
                        let c = g as isize + o;
                        if periodic {
                            Some(c.rem_euclid(npts as isize) as usize)
                        } else if (0..npts as isize).contains(&c) {
                            Some(c as usize)
                        } else {
                            None
                        }
                    })
                    .collect::<Option<Vec<_>>>();
                if let Some(column) = column {
                    coo.push(row, cart.flat_index(&column), value);
                }
            }
        }

        coo
    }
}

impl GhostedArray for StencilMatrix {
    fn cart(&self) -> &Arc<CartDecomposition> {
        &self.cart
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn data(&self) -> &[f64] {
        &self.data
    }

    fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}
