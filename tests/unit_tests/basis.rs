use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spline_ddm::{
    bsplines::{basis_funs, basis_funs_all_ders, KnotVector},
    locate::{locate, locate_cell, LocateStatus},
};

proptest! {
    #[test]
    fn open_basis_is_a_partition_of_unity(degree in 0usize..6, ncells in 1usize..12, t in 0.0..=1.0f64) {
        let knots = KnotVector::open_uniform(degree, ncells, [-1.0, 3.0]).unwrap();
        let x = -1.0 + 4.0 * t;
        let span = knots.find_span(x, 1e-15).unwrap();

        let values = basis_funs(knots.as_slice(), degree, x, span);
        prop_assert!((values.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        prop_assert!(values.iter().all(|&v| v >= -1e-14));

        let ders = basis_funs_all_ders(knots.as_slice(), degree, x, span, 2);
        for k in 1..=2 {
            let sum = (0..=degree).map(|r| ders[(k, r)]).sum::<f64>();
            prop_assert!(sum.abs() < 1e-8, "derivative {} sums to {}", k, sum);
        }
    }

    #[test]
    fn periodic_basis_is_a_partition_of_unity(degree in 1usize..5, extra in 0usize..8, t in 0.0..1.0f64) {
        let ncells = degree + extra;
        let knots = KnotVector::periodic_uniform(degree, ncells, [0.0, 1.0]).unwrap();
        let (span, ders) = knots.evaluate(t, 0).unwrap();

        prop_assert!(span >= degree && span < knots.nbasis());
        let sum = ders.row(0).iter().sum::<f64>();
        prop_assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn located_cell_contains_the_point(ncells in 1usize..20, t in 0.0..=1.0f64) {
        let breaks = (0..=ncells).map(|i| (i as f64 / ncells as f64).powi(2)).collect::<Vec<_>>();
        let tol = 1e-12;
        let cell = locate_cell(&breaks, t, tol).unwrap();

        prop_assert!(cell < ncells);
        prop_assert!(breaks[cell] - tol <= t);
        prop_assert!(t < breaks[cell + 1] + tol || cell == ncells - 1);
    }
}

#[test]
fn derivatives_agree_with_finite_differences() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let knots = KnotVector::open_uniform(3, 6, [0.0, 2.0]).unwrap();
    let h = 1e-6;

    let mut nchecked = 0;
    for _ in 0..200 {
        let x: f64 = rng.gen_range(0.0..2.0);
        let span = knots.find_span(x, 1e-15).unwrap();
        // Stay within the span so the polynomial pieces do not change.
        if knots.find_span(x - h, 1e-15) != Some(span) || knots.find_span(x + h, 1e-15) != Some(span)
        {
            continue;
        }

        let ders = basis_funs_all_ders(knots.as_slice(), 3, x, span, 2);
        let left = basis_funs_all_ders(knots.as_slice(), 3, x - h, span, 1);
        let right = basis_funs_all_ders(knots.as_slice(), 3, x + h, span, 1);

        for r in 0..=3 {
            let first = (right[(0, r)] - left[(0, r)]) / (2.0 * h);
            let second = (right[(1, r)] - left[(1, r)]) / (2.0 * h);
            assert_scalar_eq!(ders[(1, r)], first, comp = abs, tol = 1e-6);
            assert_scalar_eq!(ders[(2, r)], second, comp = abs, tol = 1e-5);
        }
        nchecked += 1;
    }
    assert!(nchecked > 150);
}

#[test]
fn derivatives_above_the_degree_vanish() {
    let knots = KnotVector::open_uniform(2, 3, [0.0, 1.0]).unwrap();
    let (span, ders) = knots.evaluate(0.4, 4).unwrap();

    assert_eq!(span, 3);
    assert_eq!(ders.nrows(), 5);
    assert!(ders.row(3).iter().all(|&v| v == 0.0));
    assert!(ders.row(4).iter().all(|&v| v == 0.0));
    // Second derivatives of a quadratic are piecewise constant and sum to zero.
    assert_scalar_eq!(ders.row(2).iter().sum::<f64>(), 0.0, comp = abs, tol = 1e-10);
}

#[test]
fn batched_location_reports_the_first_failure() {
    let breaks = [0.0, 0.25, 0.5, 1.0];
    let (status, cells) = locate(&breaks, &[0.0, 0.25, 0.5, 0.99, 1.0], 1e-15);
    assert_eq!(status, LocateStatus::Ok);
    assert_eq!(cells, vec![0, 1, 2, 2, 2]);

    let (status, cells) = locate(&breaks, &[0.3, -0.1, 0.7], 1e-15);
    assert_eq!(status, LocateStatus::OutOfBounds);
    assert_eq!(cells, vec![1]);
}
