//! Helpers shared by the test harnesses.
#![allow(dead_code)]

use std::sync::Arc;

use itertools::{izip, Itertools};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use spline_ddm::{
    cart::CartDecomposition,
    exchange::update_ghost_regions_local,
    space::{SplineSpace, TensorSpace},
    stencil::{StencilMatrix, StencilVector},
};

/// One tensor space per rank of the process grid `dims`, with ghost widths equal to the degrees.
pub fn distributed_spaces(spaces: &[SplineSpace], dims: &[usize]) -> Vec<TensorSpace> {
    let npts = spaces.iter().map(SplineSpace::ndofs).collect_vec();
    let pads = spaces.iter().map(SplineSpace::degree).collect_vec();
    let periods = spaces.iter().map(SplineSpace::is_periodic).collect_vec();
    let nprocs = dims.iter().product::<usize>();

    (0..nprocs)
        .map(|rank| {
            let cart =
                Arc::new(CartDecomposition::new(&npts, &pads, &periods, dims, rank).unwrap());
            TensorSpace::with_default_quadrature(cart, spaces.to_vec()).unwrap()
        })
        .collect()
}

/// The tensor space on a single process.
pub fn serial_space(spaces: &[SplineSpace]) -> TensorSpace {
    let dims = vec![1; spaces.len()];
    distributed_spaces(spaces, &dims).pop().unwrap()
}

/// Owned global multi-indices of a decomposition.
pub fn owned_indices(cart: &CartDecomposition) -> Vec<Vec<usize>> {
    izip!(cart.starts(), cart.ends())
        .map(|(&s, &e)| s..=e)
        .multi_cartesian_product()
        .collect()
}

/// Sum the owned rows of distributed matrices into one global matrix.
pub fn global_csr(matrices: &[StencilMatrix]) -> CsrMatrix<f64> {
    let n = matrices[0].cart().npts().iter().product::<usize>();
    let mut coo = CooMatrix::new(n, n);
    for matrix in matrices {
        for (i, j, v) in matrix.to_coo().triplet_iter() {
            coo.push(i, j, *v);
        }
    }
    CsrMatrix::from(&coo)
}

/// Collect the owned entries of distributed vectors into one global vector.
pub fn global_vector(vectors: &[StencilVector]) -> Vec<f64> {
    let n = vectors[0].cart().npts().iter().product::<usize>();
    let mut result = vec![0.0; n];
    for vector in vectors {
        for (i, v) in vector.to_global_triplets() {
            result[i] = v;
        }
    }
    result
}

/// Replace the rows and columns of non-periodic boundary degrees of freedom by the identity.
pub fn apply_homogeneous_dirichlet(matrix: &mut StencilMatrix, rhs: &mut StencilVector) {
    let cart = Arc::clone(matrix.cart());
    let offsets = matrix.offsets();
    let zero_offset = vec![0; cart.ndim()];

    let on_boundary = |index: &[usize]| {
        izip!(index, cart.npts(), cart.periods())
            .any(|(&i, &n, &periodic)| !periodic && (i == 0 || i == n - 1))
    };

    for row in owned_indices(&cart) {
        if on_boundary(&row) {
            for offset in &offsets {
                matrix.set(&row, offset, 0.0);
            }
            matrix.set(&row, &zero_offset, 1.0);
            rhs.set(&row, 0.0);
            continue;
        }

        for offset in &offsets {
            let column = izip!(&row, offset, cart.npts(), cart.periods())
                .map(|(&r, &o, &n, &periodic)| {
                    let c = r as isize + o;
                    if periodic {
                        Some(c.rem_euclid(n as isize) as usize)
                    } else if (0..n as isize).contains(&c) {
                        Some(c as usize)
                    } else {
                        None
                    }
                })
                .collect::<Option<Vec<_>>>();
            if column.is_some_and(|column| on_boundary(&column)) {
                matrix.set(&row, offset, 0.0);
            }
        }
    }
}

/// Outcome of a conjugate gradient solve.
pub struct CgResult {
    pub solution: StencilVector,
    pub niter: usize,
    pub residual: f64,
}

impl CgResult {
    pub fn converged(&self, tol: f64) -> bool {
        self.residual < tol
    }
}

/// Conjugate gradient iteration for a matrix on a single process.
///
/// Stops once the Euclidean norm of the residual drops below `tol`.
pub fn conjugate_gradient(
    a: &StencilMatrix,
    b: &StencilVector,
    tol: f64,
    maxiter: usize,
) -> CgResult {
    let cart = Arc::clone(b.cart());
    let mut x = StencilVector::new(Arc::clone(&cart));
    let mut v = StencilVector::new(cart);
    let mut r = b.clone();
    let mut p = r.clone();
    let mut rr = r.dot_local(&r);
    let mut niter = 0;

    while rr.sqrt() >= tol && niter < maxiter {
        update_ghost_regions_local(std::slice::from_mut(&mut p));
        a.dot(&p, &mut v);
        let alpha = rr / p.dot_local(&v);
        x.axpy(alpha, &p);
        r.axpy(-alpha, &v);
        let rr_new = r.dot_local(&r);
        p.scale(rr_new / rr);
        p.axpy(1.0, &r);
        rr = rr_new;
        niter += 1;
    }

    update_ghost_regions_local(std::slice::from_mut(&mut x));
    CgResult {
        solution: x,
        niter,
        residual: rr.sqrt(),
    }
}
