//! Solve `-u'' = pi^2 sin(pi x)` on the unit interval for a sequence of refinements.
//!
//! Runs on a single process. Set `RUST_LOG=debug` to see the assembly log.

use std::{f64::consts::PI, sync::Arc};

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use spline_ddm::{
    assembly::{assemble_matrix, assemble_vector, l2_error_squared, Laplace, Load},
    cart::CartDecomposition,
    exchange::{accumulate_ghost_regions_local, update_ghost_regions_local},
    space::{SplineSpace, TensorSpace},
    stencil::StencilVector,
};

fn exact(x: &[f64]) -> f64 {
    (PI * x[0]).sin()
}

fn solve(degree: usize, ncells: usize) -> f64 {
    let spline = SplineSpace::open(degree, ncells, [0.0, 1.0]).unwrap();
    let n = spline.ndofs();
    let cart = Arc::new(CartDecomposition::new(&[n], &[degree], &[false], &[1], 0).unwrap());
    let space = TensorSpace::with_default_quadrature(cart.clone(), vec![spline]).unwrap();

    let mut stiffness = [assemble_matrix(&space, &Laplace)];
    accumulate_ghost_regions_local(&mut stiffness);
    let mut rhs = [assemble_vector(&space, &Load(|x: &[f64]| PI * PI * exact(x)))];
    accumulate_ghost_regions_local(&mut rhs);

    let mut a = DMatrix::from(&CsrMatrix::from(&stiffness[0].to_coo()));
    let mut b = DVector::from_vec(
        rhs[0]
            .to_global_triplets()
            .into_iter()
            .map(|(_, v)| v)
            .collect_vec(),
    );

    // Homogeneous Dirichlet conditions at both ends.
    for i in [0, n - 1] {
        a.row_mut(i).fill(0.0);
        a.column_mut(i).fill(0.0);
        a[(i, i)] = 1.0;
        b[i] = 0.0;
    }

    let coeffs = a.cholesky().unwrap().solve(&b);
    let mut u = [StencilVector::from_fn(cart, |i| coeffs[i[0]])];
    update_ghost_regions_local(&mut u);

    l2_error_squared(&space, &u[0], exact).sqrt()
}

pub fn main() {
    env_logger::init();

    for degree in 1..=3 {
        println!("degree {degree}");
        let mut previous: Option<f64> = None;
        for ncells in [4, 8, 16, 32] {
            let error = solve(degree, ncells);
            match previous {
                Some(e) => println!(
                    "  {ncells:>3} cells: L2 error {error:.3e}, order {:.2}",
                    (e / error).log2()
                ),
                None => println!("  {ncells:>3} cells: L2 error {error:.3e}"),
            }
            previous = Some(error);
        }
    }
}
