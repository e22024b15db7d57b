//! Check the ghost exchange of a distributed vector on all ranks.
//!
//! Run with `mpirun -n 4 cargo run --example mpi_halo`.

use std::sync::Arc;

use itertools::Itertools;
use mpi::traits::Communicator;
use spline_ddm::{
    cart::{compute_dims, CartDecomposition},
    exchange::{accumulate_ghost_regions, update_ghost_regions, GhostedArray},
    stencil::StencilVector,
    tools::{global_all, global_sum},
};

pub fn main() {
    env_logger::init();

    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let rank = world.rank();

    let npts = [40, 30, 20];
    let pads = [3, 2, 1];
    let periods = [true, false, true];

    let dims = compute_dims(world.size() as usize, &npts).unwrap();
    if rank == 0 {
        println!("Process grid {dims:?} for {npts:?} points.");
    }

    let cart =
        Arc::new(CartDecomposition::with_comm(&npts, &pads, &periods, &dims, &world).unwrap());

    // Fill the owned points with their global flat index and fetch the ghost values.
    let mut vector = StencilVector::from_fn(cart.clone(), |g| cart.flat_index(g) as f64);
    update_ghost_regions(&mut vector, &world);

    let local_box = cart
        .shape()
        .iter()
        .map(|&n| 0..n)
        .multi_cartesian_product()
        .collect_vec();
    let updated = local_box
        .iter()
        .zip(vector.data())
        .all(|(local, &value)| match cart.local_to_global(local) {
            Some(global) => value == cart.flat_index(&global) as f64,
            None => value == 0.0,
        });

    let updated = global_all(updated, &world);
    assert!(updated, "ghost regions differ from the owners' values");
    if rank == 0 {
        println!("Ghost regions updated on all ranks.");
    }

    // Every stored copy contributes a one to its owner.
    let mut counts = StencilVector::new(cart.clone());
    for (local, value) in local_box.iter().zip(counts.data_mut()) {
        if cart.local_to_global(local).is_some() {
            *value = 1.0;
        }
    }
    let stored = global_sum(counts.data().iter().sum(), &world);
    accumulate_ghost_regions(&mut counts, &world);

    let owned = counts.to_global_triplets();
    let total = global_sum(owned.iter().map(|(_, v)| v).sum(), &world);
    let covered = owned.iter().all(|&(_, v)| v >= 1.0);

    let covered = global_all(covered, &world);
    assert!(covered, "an owned point received no contribution");
    assert_eq!(total, stored);
    if rank == 0 {
        println!("Accumulated {total} of {stored} stored copies onto their owners.");
    }
}
