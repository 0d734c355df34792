//! End-to-end driver over a small multi-block mesh.
//!
//! Builds a 2x1x1 block mesh with coordinates, refines the first block
//! deeper than the second, repartitions, balances and creates quadratic
//! nodes, then reports timings. Run with e.g. `mpirun -n 4`.

use mpi::traits::Communicator;
use octforest::geometry::octant_location;
use octforest::{BlockConnectivity, OctForest};

pub fn main() {
    // Initialise MPI.
    let universe = mpi::initialize().unwrap();

    // Get the world communicator.
    let comm = universe.world();
    let rank = comm.rank();

    // Two unit blocks along the x axis.
    let xpts = [
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        1.0, 1.0, 0.0, //
        0.0, 0.0, 1.0, //
        1.0, 0.0, 1.0, //
        0.0, 1.0, 1.0, //
        1.0, 1.0, 1.0, //
        2.0, 0.0, 0.0, //
        2.0, 1.0, 0.0, //
        2.0, 0.0, 1.0, //
        2.0, 1.0, 1.0,
    ];
    let conn = BlockConnectivity::new(
        12,
        &[
            0, 1, 2, 3, 4, 5, 6, 7, //
            1, 8, 3, 9, 5, 10, 7, 11,
        ],
    )
    .with_points(&xpts);

    let mut forest = OctForest::new(&comm);
    forest.set_connectivity(conn, true);

    // Refine the first block deeper, as a stand-in for a refinement
    // indicator.
    forest.create_trees_refined(&[4, 2]);
    println!("[{}] created {} leaves", rank, forest.num_local_leaves());

    let t0 = mpi::time();
    forest.repartition();
    let t_repart = mpi::time() - t0;
    println!("[{}] repartitioned to {} leaves", rank, forest.num_local_leaves());

    let t0 = mpi::time();
    forest.balance(true);
    let t_balance = mpi::time() - t0;

    let t0 = mpi::time();
    forest.create_nodes(2);
    let t_nodes = mpi::time() - t0;

    let t0 = mpi::time();
    let mesh_conn = forest.create_mesh_conn();
    let t_mesh = mpi::time() - t0;

    let nelems = forest.num_global_leaves();
    let nnodes = forest.num_global_nodes();
    let ndep = forest.dep_node_conn().len();

    // Every leaf should evaluate to a point inside the two-block box.
    for leaf in forest.leaves() {
        let x = octant_location(forest.topology(), leaf).unwrap();
        assert!((-1e-12..=2.0 + 1e-12).contains(&x[0]));
        assert!((-1e-12..=1.0 + 1e-12).contains(&x[1]));
    }
    assert_eq!(mesh_conn.len(), 8 * forest.num_local_leaves());

    if rank == 0 {
        println!("repartition: {:12.5} s", t_repart);
        println!("balance:     {:12.5} s", t_balance);
        println!("nodes:       {:12.5} s", t_nodes);
        println!("mesh:        {:12.5} s", t_mesh);
        println!("nelems:      {:12}", nelems);
        println!("nnodes:      {:12}", nnodes);
        println!("ndep local:  {:12}", ndep);
    }
}
