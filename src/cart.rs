//! Cartesian decomposition of a structured index space.
//!
//! A [CartDecomposition] splits `npts[0] x ... x npts[n-1]` grid points over a process grid of
//! shape `dims`. Every process owns a contiguous box `starts..=ends` and stores it together with
//! a ghost layer of width `pads[d]` on both sides in each dimension. Ranks are mapped to process
//! grid coordinates in row-major order, the last dimension varying fastest.

use std::sync::{Arc, Weak};

use itertools::{izip, Itertools};
use mpi::traits::Communicator;
use num::Integer;

use crate::{
    error::{Error, Result},
    exchange::{compute_shift_info, ShiftInfo},
};

/// Decomposition of a structured grid over a Cartesian process grid.
///
/// All index ranges are inclusive. Local arrays are laid out over the ghost-extended box of shape
/// `ends - starts + 1 + 2 * pads`, where local index `pads[d]` corresponds to global index
/// `starts[d]`.
#[derive(Debug, Clone)]
pub struct CartDecomposition {
    npts: Vec<usize>,
    pads: Vec<usize>,
    periods: Vec<bool>,
    dims: Vec<usize>,
    rank: usize,
    coords: Vec<usize>,
    starts: Vec<usize>,
    ends: Vec<usize>,
    global_starts: Vec<Vec<usize>>,
    global_ends: Vec<Vec<usize>>,
    shape: Vec<usize>,
    shift_info: Vec<[ShiftInfo; 2]>,
    parent: Option<Weak<CartDecomposition>>,
}

impl CartDecomposition {
    /// Decompose `npts` points over the process grid `dims` and return the view of process `rank`.
    ///
    /// Along each dimension the points are split into contiguous blocks whose sizes differ by at
    /// most one, the larger blocks going to the lower process coordinates.
    pub fn new(
        npts: &[usize],
        pads: &[usize],
        periods: &[bool],
        dims: &[usize],
        rank: usize,
    ) -> Result<Self> {
        let ndim = npts.len();
        if ndim == 0 {
            return Err(Error::configuration("npts", "at least one dimension is required"));
        }
        for (parameter, len) in [
            ("pads", pads.len()),
            ("periods", periods.len()),
            ("dims", dims.len()),
        ] {
            if len != ndim {
                return Err(Error::configuration(
                    parameter,
                    format!("expected {ndim} entries, got {len}"),
                ));
            }
        }

        if let Some(d) = (0..ndim).find(|&d| dims[d] == 0) {
            return Err(Error::configuration(
                "dims",
                format!("dimension {d} has no processes"),
            ));
        }
        if let Some(d) = (0..ndim).find(|&d| npts[d] < dims[d]) {
            return Err(Error::configuration(
                "npts",
                format!(
                    "dimension {d} has {} points for {} processes",
                    npts[d], dims[d]
                ),
            ));
        }

        let nprocs = dims.iter().product::<usize>();
        if rank >= nprocs {
            return Err(Error::configuration(
                "rank",
                format!("rank {rank} is outside of a process grid with {nprocs} processes"),
            ));
        }

        let coords = coords_of(rank, dims);

        let (global_starts, global_ends): (Vec<_>, Vec<_>) = izip!(npts, dims)
            .map(|(&n, &p)| block_partition(n, p))
            .unzip();

        let starts = izip!(&global_starts, &coords)
            .map(|(s, &c)| s[c])
            .collect_vec();
        let ends = izip!(&global_ends, &coords)
            .map(|(e, &c)| e[c])
            .collect_vec();

        let cart = Self {
            npts: npts.to_vec(),
            pads: pads.to_vec(),
            periods: periods.to_vec(),
            dims: dims.to_vec(),
            rank,
            coords,
            starts,
            ends,
            global_starts,
            global_ends,
            shape: Vec::new(),
            shift_info: Vec::new(),
            parent: None,
        }
        .finalize()?;

        log::debug!(
            "rank {}: coords {:?}, owned {:?}..={:?} of {:?}",
            cart.rank,
            cart.coords,
            cart.starts,
            cart.ends,
            cart.npts
        );

        Ok(cart)
    }

    /// Decompose `npts` over the process grid `dims` for the calling process of `comm`.
    ///
    /// The size of the communicator has to match the number of processes in `dims`.
    pub fn with_comm<C: Communicator>(
        npts: &[usize],
        pads: &[usize],
        periods: &[bool],
        dims: &[usize],
        comm: &C,
    ) -> Result<Self> {
        let nprocs = dims.iter().product::<usize>();
        if comm.size() as usize != nprocs {
            return Err(Error::configuration(
                "dims",
                format!(
                    "process grid {:?} has {} processes but the communicator has {}",
                    dims,
                    nprocs,
                    comm.size()
                ),
            ));
        }
        Self::new(npts, pads, periods, dims, comm.rank() as usize)
    }

    /// Derive the decomposition with the first `removed_layers` indices of `radial_dim` removed.
    ///
    /// This is used to eliminate the degrees of freedom at a polar singularity. The numbering of
    /// `radial_dim` is re-anchored at zero and the neighbour information is recomputed. The
    /// derived value keeps a non-owning link to `self`, available through [Self::parent].
    pub fn derive_reduced(
        self: &Arc<Self>,
        radial_dim: usize,
        removed_layers: usize,
    ) -> Result<Self> {
        let d = radial_dim;
        if d >= self.ndim() {
            return Err(Error::configuration(
                "radial_dim",
                format!("dimension {d} does not exist in a {}D grid", self.ndim()),
            ));
        }
        if self.periods[d] {
            return Err(Error::configuration(
                "radial_dim",
                format!("dimension {d} is periodic"),
            ));
        }
        if self.global_ends[d][0] < removed_layers {
            return Err(Error::configuration(
                "removed_layers",
                format!(
                    "removing {removed_layers} layers leaves the first process along dimension {d} empty"
                ),
            ));
        }

        let r = removed_layers;
        let mut child = Self::clone(self);

        child.npts[d] -= r;
        child.starts[d] = child.starts[d].saturating_sub(r);
        child.ends[d] -= r;
        for start in child.global_starts[d].iter_mut() {
            *start = start.saturating_sub(r);
        }
        for end in child.global_ends[d].iter_mut() {
            *end -= r;
        }
        child.parent = Some(Arc::downgrade(self));

        let child = child.finalize()?;

        log::debug!(
            "rank {}: reduced dimension {} by {} layers, owned {:?}..={:?} of {:?}",
            child.rank,
            d,
            r,
            child.starts,
            child.ends,
            child.npts
        );

        Ok(child)
    }

    // Validate the ghost widths and compute the local shape and the neighbour information.
    fn finalize(mut self) -> Result<Self> {
        for d in 0..self.ndim() {
            let has_neighbours = self.dims[d] > 1 || self.periods[d];
            let smallest = izip!(&self.global_starts[d], &self.global_ends[d])
                .map(|(s, e)| e + 1 - s)
                .min()
                .unwrap_or(0);
            if has_neighbours && smallest < self.pads[d] {
                return Err(Error::configuration(
                    "pads",
                    format!(
                        "a process owns {} points along dimension {} but the ghost width is {}",
                        smallest, d, self.pads[d]
                    ),
                ));
            }
        }

        self.shape = izip!(&self.starts, &self.ends, &self.pads)
            .map(|(s, e, p)| e - s + 1 + 2 * p)
            .collect();

        self.shift_info = (0..self.ndim())
            .map(|d| [compute_shift_info(&self, d, -1), compute_shift_info(&self, d, 1)])
            .collect();

        Ok(self)
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.npts.len()
    }

    /// Global number of points per dimension.
    pub fn npts(&self) -> &[usize] {
        &self.npts
    }

    /// Ghost widths per dimension.
    pub fn pads(&self) -> &[usize] {
        &self.pads
    }

    /// Periodicity per dimension.
    pub fn periods(&self) -> &[bool] {
        &self.periods
    }

    /// Shape of the process grid.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of processes.
    pub fn nprocs(&self) -> usize {
        self.dims.iter().product()
    }

    /// Rank of this process.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Coordinates of this process in the process grid.
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    /// First owned global index per dimension.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Last owned global index per dimension.
    pub fn ends(&self) -> &[usize] {
        &self.ends
    }

    /// First owned index of every process coordinate along `dim`.
    pub fn global_starts(&self, dim: usize) -> &[usize] {
        &self.global_starts[dim]
    }

    /// Last owned index of every process coordinate along `dim`.
    pub fn global_ends(&self, dim: usize) -> &[usize] {
        &self.global_ends[dim]
    }

    /// Owned ranges `(start, end)` of all process coordinates along `dim`.
    pub fn ranges_along(&self, dim: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        izip!(&self.global_starts[dim], &self.global_ends[dim]).map(|(&s, &e)| (s, e))
    }

    /// Number of owned points per dimension.
    pub fn local_npts(&self) -> Vec<usize> {
        izip!(&self.starts, &self.ends)
            .map(|(s, e)| e + 1 - s)
            .collect()
    }

    /// Shape of the local arrays including ghost layers.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Cached send/receive information for `dim` and direction `disp` (`-1` or `+1`).
    pub fn shift_info(&self, dim: usize, disp: isize) -> &ShiftInfo {
        assert!(disp == 1 || disp == -1, "direction must be -1 or +1");
        &self.shift_info[dim][usize::from(disp > 0)]
    }

    /// The decomposition this one was derived from, if it is still alive.
    pub fn parent(&self) -> Option<Arc<CartDecomposition>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Rank of the process at the given process grid coordinates.
    pub fn rank_of(&self, coords: &[usize]) -> usize {
        izip!(coords, &self.dims).fold(0, |acc, (&c, &n)| acc * n + c)
    }

    /// Process grid coordinates of `rank`.
    pub fn coords_of(&self, rank: usize) -> Vec<usize> {
        coords_of(rank, &self.dims)
    }

    /// Rank of the neighbour displaced by `disp` along `dim`.
    ///
    /// Returns `None` if the shift leaves a non-periodic process grid.
    pub fn neighbour(&self, dim: usize, disp: isize) -> Option<usize> {
        let n = self.dims[dim] as isize;
        let shifted = self.coords[dim] as isize + disp;

        let c = if self.periods[dim] {
            shifted.mod_floor(&n)
        } else if (0..n).contains(&shifted) {
            shifted
        } else {
            return None;
        };

        let mut coords = self.coords.clone();
        coords[dim] = c as usize;
        Some(self.rank_of(&coords))
    }

    /// Map a local (ghost-extended) multi-index to its global multi-index.
    ///
    /// Periodic dimensions wrap around. Returns `None` for ghost points outside of a non-periodic
    /// domain.
    pub fn local_to_global(&self, local: &[usize]) -> Option<Vec<usize>> {
        izip!(local, &self.starts, &self.pads, &self.npts, &self.periods)
            .map(|(&l, &s, &p, &n, &periodic)| {
                let g = (s + l) as isize - p as isize;
                if periodic {
                    Some(g.rem_euclid(n as isize) as usize)
                } else if (0..n as isize).contains(&g) {
                    Some(g as usize)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Map a global multi-index to its position in the local (ghost-extended) box.
    ///
    /// Owned points are preferred over ghost copies of the same point. Returns `None` if the
    /// point is neither owned nor part of the ghost layer.
    pub fn global_to_local(&self, global: &[usize]) -> Option<Vec<usize>> {
        izip!(global, &self.starts, &self.ends, &self.pads, &self.npts, &self.periods)
            .map(|(&g, &s, &e, &p, &n, &periodic)| {
                if periodic {
                    // Distance above `s` modulo the period.
                    let above = (g + n - s % n) % n;
                    if above <= e - s + p {
                        Some(above + p)
                    } else if n - above <= p {
                        Some(p - (n - above))
                    } else {
                        None
                    }
                } else if g + p >= s && g <= e + p {
                    Some(g + p - s)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Row-major index of a global multi-index.
    pub fn flat_index(&self, global: &[usize]) -> usize {
        izip!(global, &self.npts).fold(0, |acc, (&g, &n)| acc * n + g)
    }
}

fn coords_of(rank: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    let mut rest = rank;
    for (c, &n) in coords.iter_mut().zip(dims).rev() {
        let (q, r) = rest.div_rem(&n);
        *c = r;
        rest = q;
    }
    coords
}

/// Split `npts` points into `nprocs` contiguous blocks.
///
/// Returns the inclusive `(starts, ends)` of every block. The first `npts % nprocs` blocks
/// get one point more than the others.
pub fn block_partition(npts: usize, nprocs: usize) -> (Vec<usize>, Vec<usize>) {
    let (q, r) = npts.div_rem(&nprocs);
    (0..nprocs)
        .map(|k| {
            let start = k * q + k.min(r);
            let len = q + usize::from(k < r);
            (start, start + len - 1)
        })
        .unzip()
}

/// Factorize `nprocs` into a process grid for a grid of `npts` points.
///
/// Prime factors are handed out largest first, each to the dimension with the most points per
/// process at that moment. Ties go to the lower dimension.
pub fn compute_dims(nprocs: usize, npts: &[usize]) -> Result<Vec<usize>> {
    if nprocs == 0 {
        return Err(Error::configuration("nprocs", "at least one process is required"));
    }
    if npts.is_empty() {
        return Err(Error::configuration("npts", "at least one dimension is required"));
    }

    let mut factors = Vec::new();
    let mut rest = nprocs;
    let mut f = 2;
    while f * f <= rest {
        while rest % f == 0 {
            factors.push(f);
            rest /= f;
        }
        f += 1;
    }
    if rest > 1 {
        factors.push(rest);
    }

    let mut dims = vec![1; npts.len()];
    for &factor in factors.iter().rev() {
        let d = (0..npts.len())
            .max_by(|&a, &b| {
                let ra = npts[a] as f64 / dims[a] as f64;
                let rb = npts[b] as f64 / dims[b] as f64;
                ra.total_cmp(&rb).then(b.cmp(&a))
            })
            .unwrap_or(0);
        dims[d] *= factor;
    }

    if let Some(d) = (0..npts.len()).find(|&d| npts[d] < dims[d]) {
        return Err(Error::configuration(
            "nprocs",
            format!(
                "{nprocs} processes cannot be distributed, dimension {d} would get {} processes for {} points",
                dims[d], npts[d]
            ),
        ));
    }

    Ok(dims)
}
