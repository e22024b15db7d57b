//! Ghost region exchange between neighbouring processes.
//!
//! Local arrays live on the ghost-extended box of a [CartDecomposition] and store
//! `block_size` consecutive values per grid point in row-major order. The forward exchange
//! ([update_ghost_regions]) copies the owned border layers of every process into the ghost
//! layers of its neighbours. The reverse exchange ([accumulate_ghost_regions]) adds the ghost
//! layers back onto the owned entries of the neighbours and clears them.
//!
//! Dimensions are processed one after the other and every message spans the full
//! ghost-extended shape in the other dimensions. Corner and edge ghosts are thereby filled
//! by chaining, without diagonal messages.
//!
//! The `_along` variants restrict an exchange to a subset of the dimensions and leave the
//! ghost layers of the others untouched.
//!
//! The `_local` variants route the same messages between the arrays of all ranks held by one
//! process. They are used for testing and for serial runs.

use std::sync::Arc;

use itertools::{izip, Itertools};
use mpi::{
    traits::{Communicator, Destination, Equivalence, Source},
    Rank, Tag,
};

use crate::{
    cart::CartDecomposition,
    constants::{ACCUMULATE_TAG, EXCHANGE_TAG},
};

/// Send and receive regions for a shift along one dimension in one direction.
///
/// Data moves from `source` into this process and from this process to `dest`. Regions are
/// given as start corners in local (ghost-extended) indices; both have the shape `buf_shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftInfo {
    /// Rank sending to this process, `None` at a non-periodic boundary.
    pub source: Option<usize>,
    /// Rank this process sends to, `None` at a non-periodic boundary.
    pub dest: Option<usize>,
    /// Shape of the exchanged region.
    pub buf_shape: Vec<usize>,
    /// Start corner of the region sent to `dest`.
    pub send_starts: Vec<usize>,
    /// Start corner of the region received from `source`.
    pub recv_starts: Vec<usize>,
}

/// Compute the regions exchanged by `cart` when shifting along `dim` by `disp`.
///
/// For a positive shift the last `pads[dim]` owned layers go to the upper neighbour and the
/// lower ghost layers are received. A negative shift is the mirror image.
pub fn compute_shift_info(cart: &CartDecomposition, dim: usize, disp: isize) -> ShiftInfo {
    let ndim = cart.ndim();
    let s = cart.starts()[dim];
    let e = cart.ends()[dim];
    let p = cart.pads()[dim];

    let mut buf_shape = cart.shape().to_vec();
    buf_shape[dim] = p;

    let mut send_starts = vec![0; ndim];
    let mut recv_starts = vec![0; ndim];
    if disp > 0 {
        recv_starts[dim] = 0;
        send_starts[dim] = e - s + 1;
    } else {
        recv_starts[dim] = e - s + 1 + p;
        send_starts[dim] = p;
    }

    ShiftInfo {
        source: cart.neighbour(dim, -disp),
        dest: cart.neighbour(dim, disp),
        buf_shape,
        send_starts,
        recv_starts,
    }
}

/// An array distributed over a [CartDecomposition] with ghost layers.
pub trait GhostedArray {
    /// The decomposition the array lives on.
    fn cart(&self) -> &Arc<CartDecomposition>;

    /// Number of values stored per grid point.
    fn block_size(&self) -> usize;

    /// Local values including ghost layers.
    fn data(&self) -> &[f64];

    /// Mutable local values including ghost layers.
    fn data_mut(&mut self) -> &mut [f64];
}

/// Whether unpacked values replace or add to the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackMode {
    /// Overwrite the region.
    Assign,
    /// Add to the region.
    Add,
}

// Flat point offsets of the box `starts + [0, region)` inside an array of shape `shape`.
fn region_points(shape: &[usize], starts: &[usize], region: &[usize]) -> Vec<usize> {
    if region.iter().any(|&n| n == 0) {
        return Vec::new();
    }
    izip!(starts, region)
        .map(|(&s, &n)| s..s + n)
        .multi_cartesian_product()
        .map(|index| izip!(&index, shape).fold(0, |acc, (&i, &n)| acc * n + i))
        .collect()
}

/// Copy the values of a box out of a local array.
pub fn pack(
    data: &[f64],
    shape: &[usize],
    block_size: usize,
    starts: &[usize],
    region: &[usize],
) -> Vec<f64> {
    let points = region_points(shape, starts, region);
    let mut buffer = Vec::with_capacity(points.len() * block_size);
    for point in points {
        buffer.extend_from_slice(&data[point * block_size..(point + 1) * block_size]);
    }
    buffer
}

/// Write the values of `buffer` into a box of a local array.
pub fn unpack(
    data: &mut [f64],
    shape: &[usize],
    block_size: usize,
    starts: &[usize],
    region: &[usize],
    buffer: &[f64],
    mode: UnpackMode,
) {
    let points = region_points(shape, starts, region);
    assert_eq!(
        buffer.len(),
        points.len() * block_size,
        "buffer does not match the region"
    );

    for (point, values) in izip!(points, buffer.chunks_exact(block_size.max(1))) {
        let target = &mut data[point * block_size..(point + 1) * block_size];
        match mode {
            UnpackMode::Assign => target.copy_from_slice(values),
            UnpackMode::Add => {
                for (t, v) in izip!(target, values) {
                    *t += v;
                }
            }
        }
    }
}

fn fill_region(
    data: &mut [f64],
    shape: &[usize],
    block_size: usize,
    starts: &[usize],
    region: &[usize],
    value: f64,
) {
    for point in region_points(shape, starts, region) {
        data[point * block_size..(point + 1) * block_size].fill(value);
    }
}

fn message_tag(base: Tag, dim: usize, disp: isize) -> Tag {
    base + 2 * dim as Tag + Tag::from(disp > 0)
}

// Send `send` to `dest` and receive `recv` from `source` without risking a deadlock.
fn shift<C: Communicator>(
    comm: &C,
    dest: Option<usize>,
    send: &[f64],
    source: Option<usize>,
    recv: &mut [f64],
    tag: Tag,
) {
    log::trace!(
        "rank {}: tag {tag}, {} values to {dest:?}, {} values from {source:?}",
        comm.rank(),
        send.len(),
        recv.len()
    );

    mpi::request::scope(|scope| {
        let request = dest.map(|dest| {
            comm.process_at_rank(dest as Rank)
                .immediate_send_with_tag(scope, send, tag)
        });

        if let Some(source) = source {
            let status = comm
                .process_at_rank(source as Rank)
                .receive_into_with_tag(recv, tag);
            assert_eq!(
                status.count(f64::equivalent_datatype()) as usize,
                recv.len(),
                "ghost message from rank {source} has the wrong size"
            );
        }

        if let Some(request) = request {
            request.wait();
        }
    });
}

fn check_dims(cart: &CartDecomposition, dims: &[usize]) {
    for &dim in dims {
        assert!(
            dim < cart.ndim(),
            "dimension {dim} out of range for a {}-dimensional decomposition",
            cart.ndim()
        );
    }
}

/// Fill the ghost layers of `array` with the owned values of the neighbouring processes.
///
/// Collective over `comm`, which must be the communicator the decomposition was built for.
pub fn update_ghost_regions<A: GhostedArray, C: Communicator>(array: &mut A, comm: &C) {
    let dims = (0..array.cart().ndim()).collect_vec();
    update_ghost_regions_along(array, &dims, comm);
}

/// Forward exchange restricted to the dimensions in `dims`, processed in the given order.
///
/// Ghost layers along the other dimensions are left untouched. Every process has to pass the
/// same `dims`.
///
/// # Panics
///
/// Panics if a dimension is out of range.
pub fn update_ghost_regions_along<A: GhostedArray, C: Communicator>(
    array: &mut A,
    dims: &[usize],
    comm: &C,
) {
    let cart = Arc::clone(array.cart());
    check_dims(&cart, dims);
    let block_size = array.block_size();
    let shape = cart.shape();

    for &dim in dims {
        for disp in [1, -1] {
            let info = cart.shift_info(dim, disp);
            let send = pack(
                array.data(),
                shape,
                block_size,
                &info.send_starts,
                &info.buf_shape,
            );
            let mut recv = vec![0.0; send.len()];

            shift(
                comm,
                info.dest,
                &send,
                info.source,
                &mut recv,
                message_tag(EXCHANGE_TAG, dim, disp),
            );

            if info.source.is_some() {
                unpack(
                    array.data_mut(),
                    shape,
                    block_size,
                    &info.recv_starts,
                    &info.buf_shape,
                    &recv,
                    UnpackMode::Assign,
                );
            }
        }
    }
}

/// Add the ghost layers of `array` onto the owned values of the neighbouring processes.
///
/// This is the adjoint of [update_ghost_regions]: afterwards every owned entry holds the sum of
/// all contributions written to any copy of it, and the ghost layers that were sent are zero.
/// Collective over `comm`.
pub fn accumulate_ghost_regions<A: GhostedArray, C: Communicator>(array: &mut A, comm: &C) {
    let dims = (0..array.cart().ndim()).collect_vec();
    accumulate_ghost_regions_along(array, &dims, comm);
}

/// Reverse exchange restricted to `dims`, processed in reverse order.
///
/// The adjoint of [update_ghost_regions_along] with the same `dims`.
///
/// # Panics
///
/// Panics if a dimension is out of range.
pub fn accumulate_ghost_regions_along<A: GhostedArray, C: Communicator>(
    array: &mut A,
    dims: &[usize],
    comm: &C,
) {
    let cart = Arc::clone(array.cart());
    check_dims(&cart, dims);
    let block_size = array.block_size();
    let shape = cart.shape();

    for &dim in dims.iter().rev() {
        for disp in [1, -1] {
            let info = cart.shift_info(dim, disp);
            let send = pack(
                array.data(),
                shape,
                block_size,
                &info.recv_starts,
                &info.buf_shape,
            );
            let mut recv = vec![0.0; send.len()];

            shift(
                comm,
                info.source,
                &send,
                info.dest,
                &mut recv,
                message_tag(ACCUMULATE_TAG, dim, disp),
            );

            if info.source.is_some() {
                fill_region(
                    array.data_mut(),
                    shape,
                    block_size,
                    &info.recv_starts,
                    &info.buf_shape,
                    0.0,
                );
            }
            if info.dest.is_some() {
                unpack(
                    array.data_mut(),
                    shape,
                    block_size,
                    &info.send_starts,
                    &info.buf_shape,
                    &recv,
                    UnpackMode::Add,
                );
            }
        }
    }
}

fn check_local_ranks<A: GhostedArray>(arrays: &[A]) {
    for (rank, array) in arrays.iter().enumerate() {
        assert_eq!(
            array.cart().rank(),
            rank,
            "arrays must be ordered by the rank of their decomposition"
        );
        assert_eq!(
            array.cart().nprocs(),
            arrays.len(),
            "one array per rank is required"
        );
    }
}

/// Forward ghost exchange between the arrays of all ranks of a decomposition.
///
/// `arrays[r]` has to live on the view of rank `r`.
pub fn update_ghost_regions_local<A: GhostedArray>(arrays: &mut [A]) {
    let Some(first) = arrays.first() else {
        return;
    };
    let dims = (0..first.cart().ndim()).collect_vec();
    update_ghost_regions_local_along(arrays, &dims);
}

/// Loopback counterpart of [update_ghost_regions_along].
pub fn update_ghost_regions_local_along<A: GhostedArray>(arrays: &mut [A], dims: &[usize]) {
    check_local_ranks(arrays);
    let Some(first) = arrays.first() else {
        return;
    };
    check_dims(first.cart(), dims);

    for &dim in dims {
        for disp in [1, -1] {
            let messages = arrays
                .iter()
                .filter_map(|array| {
                    let info = array.cart().shift_info(dim, disp);
                    info.dest.map(|dest| {
                        let buffer = pack(
                            array.data(),
                            array.cart().shape(),
                            array.block_size(),
                            &info.send_starts,
                            &info.buf_shape,
                        );
                        (dest, buffer)
                    })
                })
                .collect_vec();

            for (dest, buffer) in messages {
                let array = &mut arrays[dest];
                let cart = Arc::clone(array.cart());
                let info = cart.shift_info(dim, disp);
                let block_size = array.block_size();
                unpack(
                    array.data_mut(),
                    cart.shape(),
                    block_size,
                    &info.recv_starts,
                    &info.buf_shape,
                    &buffer,
                    UnpackMode::Assign,
                );
            }
        }
    }
}

/// Reverse ghost exchange between the arrays of all ranks of a decomposition.
///
/// `arrays[r]` has to live on the view of rank `r`.
pub fn accumulate_ghost_regions_local<A: GhostedArray>(arrays: &mut [A]) {
    let Some(first) = arrays.first() else {
        return;
    };
    let dims = (0..first.cart().ndim()).collect_vec();
    accumulate_ghost_regions_local_along(arrays, &dims);
}

/// Loopback counterpart of [accumulate_ghost_regions_along].
pub fn accumulate_ghost_regions_local_along<A: GhostedArray>(arrays: &mut [A], dims: &[usize]) {
    check_local_ranks(arrays);
    let Some(first) = arrays.first() else {
        return;
    };
    check_dims(first.cart(), dims);

    for &dim in dims.iter().rev() {
        for disp in [1, -1] {
            let mut messages = Vec::new();
            for array in arrays.iter_mut() {
                let cart = Arc::clone(array.cart());
                let info = cart.shift_info(dim, disp);
                let block_size = array.block_size();
                if let Some(source) = info.source {
                    let buffer = pack(
                        array.data(),
                        cart.shape(),
                        block_size,
                        &info.recv_starts,
                        &info.buf_shape,
                    );
                    fill_region(
                        array.data_mut(),
                        cart.shape(),
                        block_size,
                        &info.recv_starts,
                        &info.buf_shape,
                        0.0,
                    );
                    messages.push((source, buffer));
                }
            }

            for (target, buffer) in messages {
                let array = &mut arrays[target];
                let cart = Arc::clone(array.cart());
                let info = cart.shift_info(dim, disp);
                let block_size = array.block_size();
                unpack(
                    array.data_mut(),
                    cart.shape(),
                    block_size,
                    &info.send_starts,
                    &info.buf_shape,
                    &buffer,
                    UnpackMode::Add,
                );
            }
        }
    }
}
