//! Test leaf conservation and balance of the space-filling-curve
//! repartition across MPI ranks.

use mpi::traits::Communicator;
use octforest::tools::gather_to_root;
use octforest::{BlockConnectivity, OctForest};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub fn main() {
    // Initialise MPI.
    let universe = mpi::initialize().unwrap();

    // Get the world communicator.
    let comm = universe.world();
    let size = comm.size();

    // Initialise a seeded Rng.
    let mut rng = ChaCha8Rng::seed_from_u64(comm.rank() as u64);

    // A strip of four blocks along x. Nodes k and k + 4 bound block k.
    let mut conn = Vec::new();
    for b in 0..4_i32 {
        let (a, c) = (4 * b, 4 * (b + 1));
        conn.extend([a, c, a + 1, c + 1, a + 2, c + 2, a + 3, c + 3]);
    }
    let conn = BlockConnectivity::new(20, &conn);

    let mut forest = OctForest::new(&comm);
    forest.set_connectivity(conn, false);
    forest.create_random_trees(50, 0, 5, &mut rng);

    let total = forest.num_global_leaves();
    forest.repartition();
    assert_eq!(forest.num_global_leaves(), total, "repartition lost leaves");

    // Per-rank counts may differ by at most one.
    let local = forest.num_local_leaves();
    if let Some(counts) = gather_to_root(&[local], &comm) {
        let min = counts.iter().min().unwrap();
        let max = counts.iter().max().unwrap();
        assert!(max - min <= 1, "leaf imbalance {} exceeds one", max - min);
        println!(
            "repartitioned {} leaves over {} ranks, min {} max {}",
            total, size, min, max
        );
    }

    // A second repartition moves nothing.
    let before: Vec<_> = forest.leaves().copied().collect();
    forest.repartition();
    let after: Vec<_> = forest.leaves().copied().collect();
    assert_eq!(before, after, "repartition is not idempotent");

    if comm.rank() == 0 {
        println!("repartition test passed");
    }
}
