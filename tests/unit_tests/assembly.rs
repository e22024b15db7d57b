use itertools::{izip, Itertools};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spline_ddm::{
    assembly::{
        assemble_matrix, assemble_matrix_into, assemble_vector, BilinearKernel, Laplace, Load,
        Mass, TensorBasis,
    },
    exchange::{accumulate_ghost_regions_local, update_ghost_regions_local},
    space::{SplineSpace, TensorSpace},
    stencil::{StencilMatrix, StencilVector},
};

use crate::common::{distributed_spaces, global_csr, global_vector, serial_space};

fn mixed_spaces() -> Vec<SplineSpace> {
    vec![
        SplineSpace::open(2, 6, [0.0, 2.0]).unwrap(),
        SplineSpace::periodic(2, 6, [0.0, 1.0]).unwrap(),
    ]
}

fn assembled_csr<K: BilinearKernel>(spaces: &[TensorSpace], kernel: &K) -> CsrMatrix<f64> {
    let mut matrices = spaces.iter().map(|space| assemble_matrix(space, kernel)).collect_vec();
    accumulate_ghost_regions_local(&mut matrices);
    global_csr(&matrices)
}

#[test]
fn distributed_matrices_match_the_serial_ones() {
    let spaces = mixed_spaces();
    let serial = [serial_space(&spaces)];
    let distributed = distributed_spaces(&spaces, &[2, 2]);

    let expected = DMatrix::from(&assembled_csr(&serial, &Mass));
    let actual = DMatrix::from(&assembled_csr(&distributed, &Mass));
    assert_eq!(expected.nrows(), 8 * 6);
    assert_matrix_eq!(actual, expected, comp = abs, tol = 1e-13);

    let expected = DMatrix::from(&assembled_csr(&serial, &Laplace));
    let actual = DMatrix::from(&assembled_csr(&distributed, &Laplace));
    assert_matrix_eq!(actual, expected, comp = abs, tol = 1e-12);
}

#[test]
fn distributed_load_vector_matches_the_serial_one() {
    let spaces = mixed_spaces();
    let load = Load(|x: &[f64]| x[0] + x[1] * x[1]);

    let mut serial = vec![assemble_vector(&serial_space(&spaces), &load)];
    accumulate_ghost_regions_local(&mut serial);

    let mut distributed = distributed_spaces(&spaces, &[2, 2])
        .iter()
        .map(|space| assemble_vector(space, &load))
        .collect_vec();
    accumulate_ghost_regions_local(&mut distributed);

    for (a, b) in izip!(global_vector(&distributed), global_vector(&serial)) {
        assert_scalar_eq!(a, b, comp = abs, tol = 1e-14);
    }
}

#[test]
fn assembly_adds_to_existing_entries() {
    let space = serial_space(&mixed_spaces());
    let once = assemble_matrix(&space, &Mass);
    let mut twice = once.clone();
    assemble_matrix_into(&mut twice, &space, &Mass);

    // Mass entries are non-negative, so the cell sums only differ by rounding.
    for (a, b) in izip!(once.data(), twice.data()) {
        assert_scalar_eq!(*b, 2.0 * a, comp = abs, tol = 1e-13 * a.abs());
    }
}

#[test]
fn reassembly_after_zeroing_reproduces_the_matrix() {
    let space = serial_space(&mixed_spaces());
    let once = assemble_matrix(&space, &Mass);
    let mut again = once.clone();
    assemble_matrix_into(&mut again, &space, &Laplace);

    again.zero();
    assemble_matrix_into(&mut again, &space, &Mass);
    assert_eq!(again.data(), once.data());
}

#[test]
fn closures_act_as_kernels() {
    let space = serial_space(&mixed_spaces());
    let scaled_mass = |v: &TensorBasis, u: &TensorBasis, _x: &[f64]| 3.0 * v.value() * u.value();

    let mut expected = assemble_matrix(&space, &Mass);
    expected.scale(3.0);
    let actual = assemble_matrix(&space, &scaled_mass);

    for (a, b) in izip!(actual.data(), expected.data()) {
        assert_scalar_eq!(*a, *b, comp = abs, tol = 1e-15);
    }
}

#[test]
fn mass_entries_sum_to_the_measure_of_the_domain() {
    let open = [
        SplineSpace::open(3, 5, [-1.0, 2.0]).unwrap(),
        SplineSpace::open(1, 4, [0.0, 0.5]).unwrap(),
    ];
    let periodic = [
        SplineSpace::periodic(3, 5, [-1.0, 2.0]).unwrap(),
        SplineSpace::periodic(1, 4, [0.0, 0.5]).unwrap(),
    ];

    for spaces in [open, periodic] {
        let csr = assembled_csr(&distributed_spaces(&spaces, &[1, 2]), &Mass);
        assert_scalar_eq!(csr.values().iter().sum::<f64>(), 1.5, comp = abs, tol = 1e-13);
    }
}

#[test]
fn stencil_product_matches_the_sparse_product() {
    let spaces = mixed_spaces();
    let distributed = distributed_spaces(&spaces, &[2, 2]);
    let mut matrices = distributed
        .iter()
        .map(|space| assemble_matrix(space, &Laplace))
        .collect_vec();
    accumulate_ghost_regions_local(&mut matrices);

    let n = 8 * 6;
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let x = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect_vec();

    let mut xs = matrices
        .iter()
        .map(|matrix| {
            let cart = matrix.cart().clone();
            StencilVector::from_fn(cart.clone(), |index| x[cart.flat_index(index)])
        })
        .collect_vec();
    update_ghost_regions_local(&mut xs);

    let ys = izip!(&matrices, &xs)
        .map(|(matrix, x): (&StencilMatrix, &StencilVector)| {
            let mut y = StencilVector::new(matrix.cart().clone());
            matrix.dot(x, &mut y);
            y
        })
        .collect_vec();

    let expected = DMatrix::from(&global_csr(&matrices)) * DVector::from_vec(x);
    for (a, b) in izip!(global_vector(&ys), expected.iter()) {
        assert_scalar_eq!(a, *b, comp = abs, tol = 1e-12);
    }
}
