//! End-to-end checks of the quadtree forest on a single process.

use std::collections::HashSet;

use mpi::traits::CommunicatorCollectives;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use octforest::constants::{HMAX, QUAD_EDGES};
use octforest::{QuadConnectivity, QuadForest};

#[test]
fn single_rank_quad_session() {
    let universe = mpi::initialize().unwrap();
    let comm = universe.world();

    single_block_depth_two(&comm);
    two_block_nonconforming(&comm);
    shared_edge_orientation_dedup(&comm);
    order_three_nodes(&comm);
    refine_coarsen_roundtrip(&comm);
    random_balance_idempotent(&comm);
    repartition_conserves_leaves(&comm);
    interpolation_rows_sum_to_one(&comm);
}

fn unit_quad() -> QuadConnectivity {
    QuadConnectivity::new(4, &[0, 1, 2, 3])
}

/// Two quads side by side along x, sharing the edge between them.
fn two_quads() -> QuadConnectivity {
    QuadConnectivity::new(6, &[0, 1, 2, 3, 1, 4, 3, 5])
}

fn check_partition_and_balance<C: CommunicatorCollectives>(forest: &QuadForest<C>) {
    for block in forest.held_blocks() {
        let tree = forest.block_leaves(block).unwrap();
        let area: u128 = tree
            .iter()
            .map(|leaf| {
                let h = leaf.side() as u128;
                h * h
            })
            .sum();
        assert_eq!(area, (HMAX as u128).pow(2), "leaves do not fill block");
        for pair in tree.as_slice().windows(2) {
            assert!(pair[0] < pair[1] && !pair[0].contains(&pair[1]));
        }
        for leaf in tree.iter() {
            for e in 0..QUAD_EDGES {
                let n = leaf.edge_neighbor(e);
                if !n.is_inside() {
                    continue;
                }
                if let Some(cover) = tree.containing_leaf(&n) {
                    assert!(
                        cover.level >= leaf.level - 1,
                        "edge neighbor more than one level coarser"
                    );
                }
            }
        }
    }
}

fn check_node_indices_cover<C: CommunicatorCollectives>(forest: &QuadForest<C>) {
    let total = forest.num_global_nodes();
    let seen: HashSet<i32> = forest.create_mesh_conn().into_iter().collect();
    assert_eq!(seen.len(), total);
    assert!(seen.iter().all(|&n| 0 <= n && (n as usize) < total));
}

fn single_block_depth_two<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(unit_quad(), false);
    forest.create_trees(2);
    assert_eq!(forest.num_global_leaves(), 16);

    forest.balance(false);
    assert_eq!(forest.num_global_leaves(), 16);
    check_partition_and_balance(&forest);

    forest.create_nodes(2);
    assert_eq!(forest.num_global_nodes(), 25);
    assert_eq!(forest.owned_node_range(), 0..25);
    assert!(forest.dep_node_conn().is_empty());
    assert_eq!(forest.create_mesh_conn().len(), 4 * 16);
    check_node_indices_cover(&forest);
}

fn two_block_nonconforming<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(two_quads(), false);
    forest.create_trees_refined(&[2, 1]);
    assert_eq!(forest.num_global_leaves(), 16 + 4);

    forest.balance(false);
    assert_eq!(forest.num_global_leaves(), 16 + 4);
    check_partition_and_balance(&forest);

    forest.create_nodes(2);
    // 25 + 9 nodes, 3 shared on the interface.
    assert_eq!(forest.num_global_nodes(), 31);
    check_node_indices_cover(&forest);

    // The two fine interface nodes off the coarse lattice hang with half
    // weights on the coarse edge ends.
    let dep = forest.dep_node_conn();
    assert_eq!(dep.len(), 2);
    for i in 0..dep.len() {
        let (conn, weights) = dep.row(i);
        assert_eq!(conn.len(), 2);
        assert!(weights.iter().all(|&w| (w - 0.5).abs() < 1e-14));
    }
}

fn shared_edge_orientation_dedup<C: CommunicatorCollectives>(comm: &C) {
    // The second quad lists the shared edge in the opposite direction.
    let conn = QuadConnectivity::new(6, &[0, 1, 2, 3, 3, 4, 1, 5]);
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(conn, false);
    forest.create_trees(2);
    forest.balance(false);
    forest.create_nodes(2);

    // Five nodes on the shared edge are counted once, not twice.
    assert_eq!(forest.num_global_nodes(), 25 + 25 - 5);
    assert!(forest.dep_node_conn().is_empty());
    check_node_indices_cover(&forest);
}

fn order_three_nodes<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(unit_quad(), false);
    forest.create_trees(1);
    forest.create_nodes(3);

    // 4 elements x 9 candidates deduplicate to the 5^2 lattice.
    assert_eq!(forest.num_global_nodes(), 25);
    assert!(forest.dep_node_conn().is_empty());
    assert_eq!(forest.create_mesh_conn().len(), 9 * 4);
    check_node_indices_cover(&forest);
}

fn refine_coarsen_roundtrip<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(unit_quad(), false);
    forest.create_trees(1);
    let original: Vec<_> = forest.leaves().copied().collect();

    forest.refine(None);
    assert_eq!(forest.num_global_leaves(), 16);

    let coarse = forest.coarsen();
    let roundtrip: Vec<_> = coarse.leaves().copied().collect();
    assert_eq!(roundtrip, original);
}

fn random_balance_idempotent<C: CommunicatorCollectives>(comm: &C) {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(two_quads(), false);
    forest.create_random_trees(100, 0, 6, &mut rng);

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

fn repartition_conserves_leaves<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(two_quads(), false);
    forest.create_trees_refined(&[3, 2]);
    let total = forest.num_global_leaves();

    forest.repartition();
    assert_eq!(forest.num_global_leaves(), total);

    forest.balance(false);
    forest.create_nodes(2);
    check_node_indices_cover(&forest);
}

fn interpolation_rows_sum_to_one<C: CommunicatorCollectives>(comm: &C) {
    let mut forest = QuadForest::new(comm);
    forest.set_connectivity(unit_quad(), false);
    forest.create_trees(2);
    forest.create_nodes(2);

    let mut coarse = forest.coarsen();
    coarse.create_nodes(2);
    assert_eq!(coarse.num_global_nodes(), 9);

    let interp = forest.create_interpolation(&coarse);
    assert_eq!(interp.len(), 25);
    for i in 0..interp.len() {
        let (conn, weights) = interp.row(i);
        assert!(!conn.is_empty() && conn.len() <= 4);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        assert!(conn.iter().all(|&n| 0 <= n && n < 9));
    }
}
