use matrixcompare::assert_scalar_eq;
use spline_ddm::{
    assembly::{
        assemble_matrix, assemble_vector, h1_seminorm_error_squared, l2_error_squared, Laplace,
        Load, Mass,
    },
    exchange::accumulate_ghost_regions_local,
    space::{SplineSpace, TensorSpace},
};

use crate::common::{apply_homogeneous_dirichlet, conjugate_gradient, serial_space};

fn cubic_space() -> TensorSpace {
    serial_space(&[SplineSpace::open(3, 8, [0.0, 1.0]).unwrap()])
}

fn parabola(x: &[f64]) -> f64 {
    x[0] * (1.0 - x[0])
}

#[test]
fn l2_projection_reproduces_a_parabola() {
    let space = cubic_space();
    let mut mass = [assemble_matrix(&space, &Mass)];
    accumulate_ghost_regions_local(&mut mass);
    let mut rhs = [assemble_vector(&space, &Load(parabola))];
    accumulate_ghost_regions_local(&mut rhs);

    let result = conjugate_gradient(&mass[0], &rhs[0], 1e-13, 200);
    assert!(result.converged(1e-13), "residual {}", result.residual);

    let error = l2_error_squared(&space, &result.solution, parabola).sqrt();
    assert!(error < 1e-10, "L2 error {error}");
}

#[test]
fn dirichlet_problem_is_solved_exactly() {
    let space = cubic_space();
    let mut stiffness = [assemble_matrix(&space, &Laplace)];
    accumulate_ghost_regions_local(&mut stiffness);
    let mut rhs = [assemble_vector(&space, &Load(|_: &[f64]| 2.0))];
    accumulate_ghost_regions_local(&mut rhs);

    let [mut stiffness] = stiffness;
    let [mut rhs] = rhs;
    apply_homogeneous_dirichlet(&mut stiffness, &mut rhs);

    let result = conjugate_gradient(&stiffness, &rhs, 1e-12, 200);
    assert!(result.converged(1e-12), "residual {}", result.residual);

    let u = &result.solution;
    assert_scalar_eq!(u.get(&[0]), 0.0);
    assert_scalar_eq!(u.get(&[10]), 0.0);

    let l2 = l2_error_squared(&space, u, parabola).sqrt();
    let h1 = h1_seminorm_error_squared(&space, u, |x: &[f64]| vec![1.0 - 2.0 * x[0]]).sqrt();
    assert!(l2 < 1e-10, "L2 error {l2}");
    assert!(h1 < 1e-9, "H1 error {h1}");
}
