//! Collective helpers.

use mpi::{
    collective::SystemOperation,
    datatype::PartitionMut,
    traits::{CommunicatorCollectives, Equivalence, Root},
};

/// Sum a value over all ranks.
pub fn global_sum<C: CommunicatorCollectives>(value: f64, comm: &C) -> f64 {
    let mut sum = 0.0;
    comm.all_reduce_into(&value, &mut sum, SystemOperation::sum());
    sum
}

/// Check that a condition holds on all ranks.
pub fn global_all<C: CommunicatorCollectives>(condition: bool, comm: &C) -> bool {
    let mut all = false;
    comm.all_reduce_into(&condition, &mut all, SystemOperation::logical_and());
    all
}

/// Gather distributed array to the root rank.
///
/// The result is a `Vec<T>` on root and `None` on all other ranks.
pub fn gather_to_root<T: Equivalence + Default + Clone, C: CommunicatorCollectives>(
    arr: &[T],
    comm: &C,
) -> Option<Vec<T>> {
    let n = arr.len() as i32;
    let root_process = comm.process_at_rank(0);

    if comm.rank() == 0 {
        let mut counts = vec![0_i32; comm.size() as usize];
        root_process.gather_into_root(&n, &mut counts);

        let nelements = counts.iter().sum::<i32>() as usize;
        let mut gathered = vec![T::default(); nelements];
        let displs = displacements(&counts);

        let mut partition = PartitionMut::new(&mut gathered[..], counts, &displs[..]);
        root_process.gather_varcount_into_root(arr, &mut partition);

        Some(gathered)
    } else {
        root_process.gather_into(&n);
        root_process.gather_varcount_into(arr);
        None
    }
}

/// Compute displacements from a vector of counts.
///
/// For the counts `[3, 4, 5]` the displacements are `[0, 3, 7]`.
pub fn displacements(counts: &[i32]) -> Vec<i32> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect()
}
