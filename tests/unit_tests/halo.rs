use std::{collections::HashMap, sync::Arc};

use itertools::{izip, Itertools};
use spline_ddm::{
    cart::CartDecomposition,
    exchange::{
        accumulate_ghost_regions_local, accumulate_ghost_regions_local_along,
        update_ghost_regions_local, update_ghost_regions_local_along, GhostedArray,
    },
    stencil::{StencilMatrix, StencilVector},
};

fn carts(
    npts: &[usize],
    pads: &[usize],
    periods: &[bool],
    dims: &[usize],
) -> Vec<Arc<CartDecomposition>> {
    let nprocs = dims.iter().product::<usize>();
    (0..nprocs)
        .map(|rank| Arc::new(CartDecomposition::new(npts, pads, periods, dims, rank).unwrap()))
        .collect()
}

// All local (ghost-extended) multi-indices of a decomposition.
fn local_box(cart: &CartDecomposition) -> Vec<Vec<usize>> {
    cart.shape().iter().map(|&n| 0..n).multi_cartesian_product().collect()
}

fn check_forward_exchange(npts: &[usize], pads: &[usize], periods: &[bool], dims: &[usize]) {
    let carts = carts(npts, pads, periods, dims);
    let mut vectors = carts
        .iter()
        .map(|cart| StencilVector::from_fn(cart.clone(), |g| 1.0 + cart.flat_index(g) as f64))
        .collect_vec();

    update_ghost_regions_local(&mut vectors);

    for (cart, vector) in izip!(&carts, &vectors) {
        for (local, value) in izip!(local_box(cart), vector.data()) {
            let expected = cart
                .local_to_global(&local)
                .map_or(0.0, |g| 1.0 + cart.flat_index(&g) as f64);
            assert_eq!(
                *value, expected,
                "rank {} local index {:?}",
                cart.rank(),
                local
            );
        }
    }
}

#[test]
fn ghost_update_on_a_periodic_process_grid() {
    check_forward_exchange(&[8, 6], &[2, 1], &[true, true], &[2, 2]);
}

#[test]
fn ghost_update_on_an_open_process_grid() {
    check_forward_exchange(&[8, 6], &[2, 1], &[false, false], &[2, 2]);
}

#[test]
fn ghost_update_on_mixed_grids() {
    check_forward_exchange(&[9, 7], &[3, 2], &[false, true], &[3, 2]);
    check_forward_exchange(&[5, 4, 6], &[1, 2, 1], &[true, false, true], &[1, 2, 3]);
    // A single periodic process exchanges with itself.
    check_forward_exchange(&[7], &[3], &[true], &[1]);
}

#[test]
fn matrix_ghost_rows_are_updated_blockwise() {
    let carts = carts(&[6, 6], &[1, 1], &[true, false], &[2, 2]);
    let mut matrices = carts.iter().map(|cart| StencilMatrix::new(cart.clone())).collect_vec();

    for (cart, matrix) in izip!(&carts, &mut matrices) {
        for row in izip!(cart.starts(), cart.ends())
            .map(|(&s, &e)| s..=e)
            .multi_cartesian_product()
        {
            for offset in matrix.offsets() {
                let value = (cart.flat_index(&row) * 10) as f64
                    + offset[0] as f64
                    + 0.1 * offset[1] as f64;
                matrix.set(&row, &offset, value);
            }
        }
    }

    update_ghost_regions_local(&mut matrices);

    // Row 0 of the periodic dimension is a ghost row on the processes owning 3..=5.
    let cart = &carts[3];
    let matrix = &matrices[3];
    assert_eq!(cart.starts(), &[3, 3]);
    for offset in matrix.offsets() {
        let row = [0, 4];
        let expected =
            (cart.flat_index(&row) * 10) as f64 + offset[0] as f64 + 0.1 * offset[1] as f64;
        assert_eq!(matrix.get(&row, &offset), expected);
    }
}

#[test]
fn accumulation_sums_all_copies_into_the_owner() {
    let carts = carts(&[8, 6], &[2, 1], &[true, false], &[2, 2]);

    // Write a one into every stored copy of every grid point, owned or ghost.
    let mut copies = HashMap::<Vec<usize>, f64>::new();
    let mut vectors = carts
        .iter()
        .map(|cart| {
            let mut vector = StencilVector::new(cart.clone());
            for (local, value) in izip!(local_box(cart), vector.data_mut()) {
                if let Some(global) = cart.local_to_global(&local) {
                    *copies.entry(global).or_default() += 1.0;
                    *value = 1.0;
                }
            }
            vector
        })
        .collect_vec();

    accumulate_ghost_regions_local(&mut vectors);

    for (cart, vector) in izip!(&carts, &vectors) {
        for global in izip!(cart.starts(), cart.ends())
            .map(|(&s, &e)| s..=e)
            .multi_cartesian_product()
        {
            assert_eq!(vector.get(&global), copies[&global], "point {global:?}");
        }
    }

    // Every point is covered by two boxes along the periodic dimension, and points next to
    // the process boundary by two boxes along the other one.
    assert_eq!(copies[&vec![0, 1]], 2.0);
    assert_eq!(copies[&vec![0, 3]], 4.0);
}

#[test]
fn ghost_update_along_one_dimension_leaves_the_others_alone() {
    let carts = carts(&[8, 6], &[2, 1], &[true, true], &[2, 2]);
    let mut vectors = carts
        .iter()
        .map(|cart| StencilVector::from_fn(cart.clone(), |g| 1.0 + cart.flat_index(g) as f64))
        .collect_vec();

    update_ghost_regions_local_along(&mut vectors, &[1]);

    for (cart, vector) in izip!(&carts, &vectors) {
        let owned_rows = cart.pads()[0]..cart.pads()[0] + cart.local_npts()[0];
        for (local, value) in izip!(local_box(cart), vector.data()) {
            let expected = if owned_rows.contains(&local[0]) {
                cart.local_to_global(&local)
                    .map_or(0.0, |g| 1.0 + cart.flat_index(&g) as f64)
            } else {
                0.0
            };
            assert_eq!(
                *value, expected,
                "rank {} local index {:?}",
                cart.rank(),
                local
            );
        }
    }
}

#[test]
fn accumulation_one_dimension_at_a_time_matches_the_full_accumulation() {
    let carts = carts(&[8, 6], &[2, 1], &[true, false], &[2, 2]);
    let filled = carts
        .iter()
        .map(|cart| {
            let mut vector = StencilVector::new(cart.clone());
            for (index, value) in vector.data_mut().iter_mut().enumerate() {
                *value = 1.0 + (index % 7) as f64;
            }
            vector
        })
        .collect_vec();

    let mut full = filled.clone();
    accumulate_ghost_regions_local(&mut full);

    let mut split = filled;
    accumulate_ghost_regions_local_along(&mut split, &[1]);
    accumulate_ghost_regions_local_along(&mut split, &[0]);

    for (a, b) in izip!(&full, &split) {
        assert_eq!(a.data(), b.data());
    }
}

#[test]
#[should_panic(expected = "out of range")]
fn ghost_update_rejects_unknown_dimensions() {
    let carts = carts(&[8, 6], &[2, 1], &[true, true], &[2, 2]);
    let mut vectors = carts.iter().map(|cart| StencilVector::new(cart.clone())).collect_vec();
    update_ghost_regions_local_along(&mut vectors, &[2]);
}
