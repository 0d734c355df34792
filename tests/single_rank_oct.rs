//! End-to-end checks of the octree forest on a single process.
//!
//! MPI is initialized once per test binary, so all scenarios run from one
//! test function.

use std::collections::HashSet;

use mpi::traits::CommunicatorCollectives;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use octforest::constants::{HMAX, OCT_FACES};
use octforest::{BlockConnectivity, OctForest};

#[test]
fn single_rank_forest_session() {
    let universe = mpi::initialize().unwrap();
    let comm = universe.world();

    single_block_depth_two(&comm);
    two_block_nonconforming(&comm);
    two_block_balance_refines(&comm);
    shared_edge_orientation_dedup(&comm);
    order_three_nodes(&comm);
    refine_coarsen_roundtrip(&comm);
    random_balance_idempotent(&comm);
    repartition_conserves_leaves(&comm);
    interpolation_rows_sum_to_one(&comm);
}

fn unit_block() -> BlockConnectivity {
    BlockConnectivity::new(8, &[0, 1, 2, 3, 4, 5, 6, 7])
}

/// Two blocks stacked along x, sharing the face between them.
fn two_blocks() -> BlockConnectivity {
    BlockConnectivity::new(
        12,
        &[
            0, 1, 2, 3, 4, 5, 6, 7, //
            1, 8, 3, 9, 5, 10, 7, 11,
        ],
    )
}

/// Every block tree partitions its block and respects 2:1 across in-block
/// faces.
fn check_partition_and_balance<C: CommunicatorCollectives>(forest: &OctForest<C>) {
    for block in forest.held_blocks() {
        let tree = forest.block_leaves(block).unwrap();
        let volume: u128 = tree
            .iter()
            .map(|leaf| {
                let h = leaf.side() as u128;
                h * h * h
            })
            .sum();
        assert_eq!(volume, (HMAX as u128).pow(3), "leaves do not fill block");
        for pair in tree.as_slice().windows(2) {
            assert!(pair[0] < pair[1] && !pair[0].contains(&pair[1]));
        }
        for leaf in tree.iter() {
            for f in 0..OCT_FACES {
                let n = leaf.face_neighbor(f);
                if !n.is_inside() {
                    continue;
                }
                if let Some(cover) = tree.containing_leaf(&n) {
                    assert!(
                        cover.level >= leaf.level - 1,
                        "face neighbor more than one level coarser"
                    );
                }
            }
        }
    }
}

fn check_node_indices_cover<C: CommunicatorCollectives>(forest: &OctForest<C>) {
    let total = forest.num_global_nodes();
    let seen: HashSet<i32> = forest.create_mesh_conn().into_iter().collect();
    assert_eq!(seen.len(), total);
    assert!(seen.iter().all(|&n| 0 <= n && (n as usize) < total));
}

fn single_block_depth_two<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(unit_block(), false);
    forest.create_trees(2);
    assert_eq!(forest.num_global_leaves(), 64);

    // A uniform tree balances to itself.
    forest.balance(false);
    assert_eq!(forest.num_global_leaves(), 64);
    check_partition_and_balance(&forest);

    forest.create_nodes(2);
    assert_eq!(forest.num_global_nodes(), 125);
    assert_eq!(forest.owned_node_range(), 0..125);
    assert!(forest.dep_node_conn().is_empty());
    assert_eq!(forest.create_mesh_conn().len(), 8 * 64);
    check_node_indices_cover(&forest);
}

fn two_block_nonconforming<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(two_blocks(), false);
    forest.create_trees_refined(&[2, 1]);
    assert_eq!(forest.num_global_leaves(), 64 + 8);

    // The interface levels differ by one, which 2:1 balance permits.
    forest.balance(false);
    assert_eq!(forest.num_global_leaves(), 64 + 8);
    check_partition_and_balance(&forest);

    forest.create_nodes(2);
    assert_eq!(forest.num_global_nodes(), 143);
    check_node_indices_cover(&forest);

    // The fine side hangs on the coarse face: four face-centre nodes carry
    // four quarter weights, twelve edge-midpoint nodes carry two halves.
    let dep = forest.dep_node_conn();
    assert_eq!(dep.len(), 16);
    let mut centres = 0;
    let mut midpoints = 0;
    for i in 0..dep.len() {
        let (conn, weights) = dep.row(i);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        match conn.len() {
            4 => {
                centres += 1;
                assert!(weights.iter().all(|&w| (w - 0.25).abs() < 1e-14));
            }
            2 => {
                midpoints += 1;
                assert!(weights.iter().all(|&w| (w - 0.5).abs() < 1e-14));
            }
            n => panic!("unexpected constraint width {}", n),
        }
    }
    assert_eq!((centres, midpoints), (4, 12));
}

fn two_block_balance_refines<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(two_blocks(), false);
    forest.create_trees_refined(&[3, 1]);
    assert_eq!(forest.num_global_leaves(), 512 + 8);

    // Depth 3 against depth 1 violates 2:1: the four interface leaves of
    // the coarse block split once.
    forest.balance(false);
    assert_eq!(forest.num_global_leaves(), 512 + 36);
    check_partition_and_balance(&forest);

    let before: Vec<_> = forest.leaves().copied().collect();
    forest.balance(false);
    let after: Vec<_> = forest.leaves().copied().collect();
    assert_eq!(before, after, "balance is not idempotent");

    forest.create_nodes(2);
    check_node_indices_cover(&forest);
}

fn shared_edge_orientation_dedup<C: CommunicatorCollectives>(comm: &C) {
    // Two blocks sharing one edge, listed in opposite directions.
    let conn = BlockConnectivity::new(
        14,
        &[
            0, 1, 2, 3, 4, 5, 6, 7, //
            3, 8, 1, 9, 10, 11, 12, 13,
        ],
    );
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(conn, false);
    forest.create_trees(2);
    forest.balance(false);
    forest.create_nodes(2);

    // Five nodes on the shared edge are counted once, not twice.
    assert_eq!(forest.num_global_nodes(), 125 + 125 - 5);
    assert!(forest.dep_node_conn().is_empty());
    check_node_indices_cover(&forest);
}

fn order_three_nodes<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(unit_block(), false);
    forest.create_trees(1);
    forest.create_nodes(3);

    // 8 elements x 27 candidates deduplicate to the 5^3 lattice.
    assert_eq!(forest.num_global_nodes(), 125);
    assert!(forest.dep_node_conn().is_empty());
    assert_eq!(forest.create_mesh_conn().len(), 27 * 8);
    check_node_indices_cover(&forest);
}

fn refine_coarsen_roundtrip<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(unit_block(), false);
    forest.create_trees(1);
    let original: Vec<_> = forest.leaves().copied().collect();

    forest.refine(None);
    assert_eq!(forest.num_global_leaves(), 64);

    let coarse = forest.coarsen();
    let roundtrip: Vec<_> = coarse.leaves().copied().collect();
    assert_eq!(roundtrip, original);

    // Per-leaf targets: refine only the first leaf two levels further.
    let mut targets = vec![2_i32; forest.num_local_leaves()];
    targets[0] = 4;
    forest.refine(Some(&targets));
    assert_eq!(forest.num_global_leaves(), 64 - 1 + 64);
}

fn random_balance_idempotent<C: CommunicatorCollectives>(comm: &C) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(two_blocks(), false);
    forest.create_random_trees(100, 0, 6, &mut rng);
    check_partition_and_balance_volumes_only(&forest);

    forest.balance(true);
    check_partition_and_balance(&forest);
    let first: Vec<_> = forest.leaves().copied().collect();

    forest.balance(true);
    let second: Vec<_> = forest.leaves().copied().collect();
    assert_eq!(first, second, "balance is not idempotent");

    forest.create_nodes(2);
    for i in 0..forest.dep_node_conn().len() {
        let (_, weights) = forest.dep_node_conn().row(i);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
    check_node_indices_cover(&forest);
}

fn check_partition_and_balance_volumes_only<C: CommunicatorCollectives>(forest: &OctForest<C>) {
    for block in forest.held_blocks() {
        let volume: u128 = forest
            .block_leaves(block)
            .unwrap()
            .iter()
            .map(|leaf| {
                let h = leaf.side() as u128;
                h * h * h
            })
            .sum();
        assert_eq!(volume, (HMAX as u128).pow(3));
    }
}

fn repartition_conserves_leaves<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(two_blocks(), false);
    forest.create_trees_refined(&[2, 3]);
    let total = forest.num_global_leaves();

    forest.repartition();
    assert_eq!(forest.num_global_leaves(), total);
    check_partition_and_balance_volumes_only(&forest);

    forest.repartition();
    assert_eq!(forest.num_global_leaves(), total);

    forest.balance(false);
    forest.create_nodes(2);
    check_node_indices_cover(&forest);
}

fn interpolation_rows_sum_to_one<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = OctForest::new(comm);
    forest.set_connectivity(unit_block(), false);
    forest.create_trees(2);
    forest.create_nodes(2);

    let mut coarse = forest.coarsen();
    coarse.create_nodes(2);
    assert_eq!(coarse.num_global_nodes(), 27);

    let interp = forest.create_interpolation(&coarse);
    assert_eq!(interp.len(), 125);
    for i in 0..interp.len() {
        let (conn, weights) = interp.row(i);
        assert!(!conn.is_empty() && conn.len() <= 8);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        assert!(conn.iter().all(|&n| 0 <= n && n < 27));
    }
}
