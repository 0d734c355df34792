//! Test the distributed 2:1 balance on randomly refined forests.
//!
//! Each rank owns blocks of a shared mesh, refines them randomly, and the
//! forest is balanced with corner balancing enabled. The balanced leaf set
//! is gathered to root and checked for the 2:1 property per block, then the
//! balance is repeated to check idempotence.

use mpi::traits::Communicator;
use octforest::constants::OCT_FACES;
use octforest::container::CellArray;
use octforest::tools::gather_to_root;
use octforest::{BlockConnectivity, OctForest};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub fn main() {
    // Initialise MPI.
    let universe = mpi::initialize().unwrap();

    // Get the world communicator.
    let comm = universe.world();

    // Initialise a seeded Rng.
    let mut rng = ChaCha8Rng::seed_from_u64(comm.rank() as u64);

    // A 2x2 arrangement of blocks in the xy plane.
    let conn = BlockConnectivity::new(
        18,
        &[
            0, 1, 3, 4, 9, 10, 12, 13, //
            1, 2, 4, 5, 10, 11, 13, 14, //
            3, 4, 6, 7, 12, 13, 15, 16, //
            4, 5, 7, 8, 13, 14, 16, 17,
        ],
    );

    let mut forest = OctForest::new(&comm);
    forest.set_connectivity(conn, true);
    forest.create_random_trees(100, 0, 6, &mut rng);

    forest.balance(true);
    let first: Vec<_> = forest.leaves().copied().collect();

    forest.balance(true);
    let second: Vec<_> = forest.leaves().copied().collect();
    assert_eq!(first, second, "balance is not idempotent");

    // Gather everything to root and verify 2:1 across faces per block.
    if let Some(all) = gather_to_root(&first, &comm) {
        for block in 0..4 {
            let tree = CellArray::from_cells(
                all.iter().copied().filter(|o| o.block == block).collect(),
            );
            for leaf in tree.iter() {
                for f in 0..OCT_FACES {
                    let n = leaf.face_neighbor(f);
                    if !n.is_inside() {
                        continue;
                    }
                    if let Some(cover) = tree.containing_leaf(&n) {
                        assert!(
                            cover.level >= leaf.level - 1,
                            "2:1 balance violated in block {}",
                            block
                        );
                    }
                }
            }
        }
        println!("balanced {} leaves, 2:1 verified", all.len());
    }

    // Node creation on the balanced forest must produce a contiguous
    // numbering.
    forest.create_nodes(2);
    let nnodes = forest.num_global_nodes();
    assert_eq!(*forest.node_ranges().last().unwrap() as usize, nnodes);
    if comm.rank() == 0 {
        println!("created {} global nodes", nnodes);
    }
}
