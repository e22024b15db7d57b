//! Assemble a stiffness matrix in parallel and compare it with a serial assembly on rank 0.
//!
//! Run with `mpirun -n 4 cargo run --example mpi_assembly`.

use std::sync::Arc;

use itertools::{izip, Itertools};
use mpi::traits::{Communicator, CommunicatorCollectives};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use spline_ddm::{
    assembly::{assemble_matrix, Laplace},
    cart::{compute_dims, CartDecomposition},
    exchange::{accumulate_ghost_regions, accumulate_ghost_regions_local, update_ghost_regions},
    space::{SplineSpace, TensorSpace},
    stencil::{StencilMatrix, StencilVector},
    tools::gather_to_root,
};

fn stiffness_on(
    cart: CartDecomposition,
    spaces: &[SplineSpace],
) -> (TensorSpace, StencilMatrix) {
    let space = TensorSpace::with_default_quadrature(Arc::new(cart), spaces.to_vec()).unwrap();
    let matrix = assemble_matrix(&space, &Laplace);
    (space, matrix)
}

fn gather_matrix<C: CommunicatorCollectives>(
    matrix: &StencilMatrix,
    comm: &C,
) -> Option<CsrMatrix<f64>> {
    let coo = matrix.to_coo();
    let (rows, cols, values): (Vec<usize>, Vec<usize>, Vec<f64>) = coo
        .triplet_iter()
        .map(|(i, j, &v)| (i, j, v))
        .multiunzip();

    // All ranks have to take part in every gather.
    let rows = gather_to_root(&rows, comm);
    let cols = gather_to_root(&cols, comm);
    let values = gather_to_root(&values, comm);

    let mut global = CooMatrix::new(coo.nrows(), coo.ncols());
    for (i, j, v) in izip!(rows?, cols?, values?) {
        global.push(i, j, v);
    }
    Some(CsrMatrix::from(&global))
}

pub fn main() {
    env_logger::init();

    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let rank = world.rank();

    let spaces = [
        SplineSpace::open(3, 16, [0.0, 1.0]).unwrap(),
        SplineSpace::periodic(2, 12, [0.0, 1.0]).unwrap(),
    ];
    let npts = spaces.iter().map(SplineSpace::ndofs).collect_vec();
    let pads = spaces.iter().map(SplineSpace::degree).collect_vec();
    let periods = spaces.iter().map(SplineSpace::is_periodic).collect_vec();

    let dims = compute_dims(world.size() as usize, &npts).unwrap();
    let cart = CartDecomposition::with_comm(&npts, &pads, &periods, &dims, &world).unwrap();
    let (space, mut matrix) = stiffness_on(cart, &spaces);
    accumulate_ghost_regions(&mut matrix, &world);

    // The energy of a smooth grid function.
    let cart = space.cart().clone();
    let mut x = StencilVector::from_fn(cart.clone(), |g| {
        (g[0] as f64 / npts[0] as f64) * (g[1] as f64).cos()
    });
    update_ghost_regions(&mut x, &world);
    let mut y = StencilVector::new(cart);
    matrix.dot(&x, &mut y);
    let energy = x.dot(&y, &world);

    let gathered = gather_matrix(&matrix, &world);

    if rank == 0 {
        let parallel = DMatrix::from(&gathered.unwrap());

        let serial_cart = CartDecomposition::new(&npts, &pads, &periods, &[1, 1], 0).unwrap();
        let (_, serial) = stiffness_on(serial_cart, &spaces);
        let mut serial = [serial];
        accumulate_ghost_regions_local(&mut serial);
        let serial = DMatrix::from(&CsrMatrix::from(&serial[0].to_coo()));
        let difference = (&parallel - &serial).amax();

        println!("Process grid {dims:?}, {} unknowns.", parallel.nrows());
        println!("Largest difference to the serial matrix: {difference:.3e}");
        println!("Energy of the test function: {energy:.6}");
    }
}
