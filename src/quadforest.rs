//! The distributed forest of quadtrees, the 2D analogue of
//! [`OctForest`](crate::octforest::OctForest).
//!
//! Everything follows the 3D design with one dimension removed: blocks are
//! quadrilaterals connected through edges (two orientations) and corners,
//! the 2:1 balance ripples across edges and optionally corners, and the node
//! layer hangs nodes on coarse edges only.

pub mod topology;

mod nodes;

use std::collections::HashSet;
use std::rc::Rc;

use itertools::izip;
use mpi::collective::SystemOperation;
use mpi::traits::CommunicatorCollectives;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::constants::{HMAX, MAX_LEVEL, QUAD_CORNERS, QUAD_EDGES};
use crate::container::{complete_region, CellArray, CellQueue};
use crate::parsort::parsort;
use crate::quadrant::Quadrant;
use crate::tools::{gather_to_all, global_size, partition_evenly, redistribute};
use crate::topology::transform_edge_coord;

use self::topology::{QuadConnectivity, QuadTopology};

pub(crate) use nodes::QuadNodeData;

/// A distributed forest of quadtrees over a quadrilateral block mesh.
pub struct QuadForest<'c, C: CommunicatorCollectives> {
    comm: &'c C,
    topo: Option<Rc<QuadTopology>>,
    block_owners: Vec<i32>,
    trees: Vec<Option<CellArray<Quadrant>>>,
    nodes: Option<QuadNodeData>,
}

impl<'c, C: CommunicatorCollectives> QuadForest<'c, C> {
    /// Create an empty forest on a communicator.
    pub fn new(comm: &'c C) -> Self {
        Self {
            comm,
            topo: None,
            block_owners: Vec::new(),
            trees: Vec::new(),
            nodes: None,
        }
    }

    /// The communicator the forest lives on.
    pub fn comm(&self) -> &'c C {
        self.comm
    }

    fn rank(&self) -> i32 {
        self.comm.rank()
    }

    /// Set the block connectivity and derive the topology graph.
    pub fn set_connectivity(&mut self, conn: QuadConnectivity, partition: bool) {
        let topo = QuadTopology::new(conn);
        let owners = if partition {
            topo.graph_partition(self.comm.size() as usize)
        } else {
            topo.contiguous_partition(self.comm.size() as usize)
        };
        self.install_topology(topo, owners);
    }

    /// Set the block connectivity with an externally computed block-to-rank
    /// assignment, one entry per block.
    pub fn set_connectivity_with_owners(&mut self, conn: QuadConnectivity, owners: Vec<i32>) {
        let topo = QuadTopology::new(conn);
        assert_eq!(
            owners.len(),
            topo.num_blocks(),
            "one owner rank per block required"
        );
        let size = self.comm.size();
        assert!(
            owners.iter().all(|&r| 0 <= r && r < size),
            "owner rank out of range"
        );
        self.install_topology(topo, owners);
    }

    fn install_topology(&mut self, topo: QuadTopology, owners: Vec<i32>) {
        let nblocks = topo.num_blocks();
        self.topo = Some(Rc::new(topo));
        self.block_owners = owners;
        self.trees = (0..nblocks).map(|_| None).collect();
        self.nodes = None;
    }

    /// The derived block topology.
    pub fn topology(&self) -> &QuadTopology {
        self.topo.as_ref().expect("connectivity has not been set")
    }

    fn topo_rc(&self) -> Rc<QuadTopology> {
        Rc::clone(self.topo.as_ref().expect("connectivity has not been set"))
    }

    /// The owner rank of a block (lowest rank holding its leaves).
    pub fn block_owner(&self, block: i32) -> i32 {
        self.block_owners[block as usize]
    }

    /// Blocks this rank holds leaves of, in ascending order.
    pub fn held_blocks(&self) -> impl Iterator<Item = i32> + '_ {
        self.trees
            .iter()
            .enumerate()
            .filter_map(|(b, t)| t.as_ref().map(|_| b as i32))
    }

    /// The held leaves of a block.
    pub fn block_leaves(&self, block: i32) -> Option<&CellArray<Quadrant>> {
        self.trees[block as usize].as_ref()
    }

    /// All held leaves in (block, Morton) order.
    pub fn leaves(&self) -> impl Iterator<Item = &Quadrant> + '_ {
        self.trees
            .iter()
            .filter_map(|t| t.as_ref())
            .flat_map(|t| t.iter())
    }

    /// Number of leaves held by this rank.
    pub fn num_local_leaves(&self) -> usize {
        self.trees
            .iter()
            .filter_map(|t| t.as_ref())
            .map(|t| t.len())
            .sum()
    }

    /// Total number of leaves across all ranks.
    pub fn num_global_leaves(&self) -> usize {
        let local = self.num_local_leaves();
        let mut global = 0;
        self.comm
            .all_reduce_into(&local, &mut global, SystemOperation::sum());
        global
    }

    fn clear_nodes(&mut self) {
        self.nodes = None;
    }

    /// Initialize each owned block as a single root quadrant refined
    /// uniformly to `level`.
    pub fn create_trees(&mut self, level: i32) {
        let nblocks = self.topology().num_blocks();
        self.create_trees_refined(&vec![level; nblocks]);
    }

    /// Initialize each owned block's quadtree at its own refinement level.
    pub fn create_trees_refined(&mut self, levels: &[i32]) {
        let nblocks = self.topology().num_blocks();
        assert_eq!(levels.len(), nblocks, "one refinement level per block");
        assert!(
            levels.iter().all(|&l| (0..=MAX_LEVEL).contains(&l)),
            "refinement level outside [0, {}]",
            MAX_LEVEL
        );
        self.clear_nodes();

        let rank = self.rank();
        for block in 0..nblocks {
            if self.block_owners[block] != rank {
                self.trees[block] = None;
                continue;
            }
            let mut cells = vec![Quadrant::root(block as i32)];
            for _ in 0..levels[block] {
                cells = cells.iter().flat_map(|c| c.children()).collect();
            }
            self.trees[block] = Some(CellArray::from_cells(cells));
        }
    }

    /// Insert `nrand` random quadrants per owned block, then linearize and
    /// complete the result to a partition. A testing aid.
    pub fn create_random_trees<R: Rng + ?Sized>(
        &mut self,
        nrand: usize,
        min_level: i32,
        max_level: i32,
        rng: &mut R,
    ) {
        assert!(0 <= min_level && min_level <= max_level && max_level <= MAX_LEVEL);
        let nblocks = self.topology().num_blocks();
        self.clear_nodes();

        let rank = self.rank();
        for block in 0..nblocks {
            if self.block_owners[block] != rank {
                self.trees[block] = None;
                continue;
            }
            let mut cells = Vec::with_capacity(nrand);
            for _ in 0..nrand {
                let level = rng.gen_range(min_level..=max_level);
                let h = 1 << (MAX_LEVEL - level);
                cells.push(Quadrant::new(
                    block as i32,
                    level,
                    rng.gen_range(0..(1 << level)) * h,
                    rng.gen_range(0..(1 << level)) * h,
                ));
            }
            let mut demands = CellArray::from_cells(cells);
            demands.linearize();
            let mut leaves = Vec::new();
            complete_region(Quadrant::root(block as i32), demands.as_slice(), &mut leaves);
            self.trees[block] = Some(CellArray::from_cells(leaves));
        }
    }

    /// Refine held leaves towards per-leaf target levels; `None` refines
    /// every leaf one level.
    pub fn refine(&mut self, levels: Option<&[i32]>) {
        if let Some(levels) = levels {
            assert_eq!(
                levels.len(),
                self.num_local_leaves(),
                "one target level per held leaf required"
            );
            assert!(
                levels.iter().all(|&l| l <= MAX_LEVEL),
                "refinement level outside [0, {}]",
                MAX_LEVEL
            );
        }
        self.clear_nodes();

        let mut offset = 0;
        for tree in self.trees.iter_mut().filter_map(|t| t.as_mut()) {
            let mut refined = Vec::with_capacity(tree.len());
            for (k, leaf) in tree.iter().enumerate() {
                let target = match levels {
                    Some(levels) => levels[offset + k],
                    None => leaf.level + 1,
                };
                push_refined(*leaf, target, &mut refined);
            }
            offset += tree.len();
            *tree = CellArray::from_cells(refined);
        }
    }

    /// A new forest in which every complete sibling group is collapsed into
    /// its parent. The topology is shared with this forest.
    pub fn coarsen(&self) -> QuadForest<'c, C> {
        let trees = self
            .trees
            .iter()
            .map(|t| {
                t.as_ref().map(|tree| {
                    let mut coarse = tree.clone();
                    coarse.coarsen();
                    coarse
                })
            })
            .collect();
        QuadForest {
            comm: self.comm,
            topo: self.topo.clone(),
            block_owners: self.block_owners.clone(),
            trees,
            nodes: None,
        }
    }

    /// Enforce the 2:1 condition across edges; with `balance_corner` set
    /// also across corners. Collective and idempotent.
    pub fn balance(&mut self, balance_corner: bool) {
        let topo = self.topo_rc();
        let nblocks = topo.num_blocks();
        assert!(
            self.num_global_leaves() > 0,
            "balance called on an empty forest"
        );
        self.clear_nodes();

        let rank = self.rank();
        let size = self.comm.size() as usize;
        let holders = self.block_holders();
        let held: Vec<bool> = self.trees.iter().map(|t| t.is_some()).collect();

        let mut inserted: Vec<HashSet<Quadrant>> = vec![HashSet::new(); nblocks];
        let mut queue = CellQueue::new();
        let mut outgoing: Vec<Vec<Quadrant>> = vec![Vec::new(); size];
        let mut sent: HashSet<(i32, Quadrant)> = HashSet::new();

        let route = |d: Quadrant,
                         queue: &mut CellQueue<Quadrant>,
                         outgoing: &mut Vec<Vec<Quadrant>>,
                         sent: &mut HashSet<(i32, Quadrant)>| {
            if held[d.block as usize] {
                queue.push(d);
            }
            for &r in &holders[d.block as usize] {
                if r != rank && sent.insert((r, d)) {
                    outgoing[r as usize].push(d);
                }
            }
        };

        let seeds: Vec<Quadrant> = self.leaves().filter(|q| q.level >= 2).copied().collect();
        for q in &seeds {
            for d in neighbor_demands(&topo, q, balance_corner) {
                route(d, &mut queue, &mut outgoing, &mut sent);
            }
        }

        let mut round = 0;
        loop {
            while let Some(q) = queue.pop() {
                let b = q.block as usize;
                let Some(tree) = &self.trees[b] else {
                    continue;
                };
                if inserted[b].contains(&q) {
                    continue;
                }
                match tree.containing_leaf(&q) {
                    None => continue,
                    Some(leaf) if leaf.level >= q.level => continue,
                    Some(_) => {}
                }
                inserted[b].insert(q);
                if q.level >= 2 {
                    for d in neighbor_demands(&topo, &q, balance_corner) {
                        route(d, &mut queue, &mut outgoing, &mut sent);
                    }
                }
            }

            let local_out: usize = outgoing.iter().map(|v| v.len()).sum();
            let mut global_out = 0_usize;
            self.comm
                .all_reduce_into(&local_out, &mut global_out, SystemOperation::sum());
            if global_out == 0 {
                break;
            }

            let mut flat = Vec::with_capacity(local_out);
            let mut counts = Vec::with_capacity(size);
            for bucket in &mut outgoing {
                counts.push(bucket.len() as i32);
                flat.append(bucket);
            }
            for d in redistribute(&flat, &counts, self.comm) {
                queue.push(d);
            }
            round += 1;
            log::debug!("quad balance round {}: {} demands in flight", round, global_out);
        }

        for block in 0..nblocks {
            if self.trees[block].is_none() || inserted[block].is_empty() {
                continue;
            }
            let mut demands: Vec<Quadrant> = inserted[block].drain().collect();
            demands.sort_unstable();

            let leaves = {
                let tree = self.trees[block].as_ref().unwrap();
                let mut leaves = Vec::with_capacity(tree.len() + demands.len());
                for leaf in tree.iter() {
                    let lo = demands.partition_point(|d| d < leaf);
                    let n = demands[lo..].iter().take_while(|d| leaf.contains(d)).count();
                    complete_region(*leaf, &demands[lo..lo + n], &mut leaves);
                }
                leaves
            };
            self.trees[block] = Some(CellArray::from_cells(leaves));
        }
    }

    /// Redistribute the leaves along the space-filling curve so that every
    /// rank holds a contiguous slice with leaf-count imbalance at most one.
    pub fn repartition(&mut self) {
        let nblocks = self.topology().num_blocks();
        self.clear_nodes();

        let local: Vec<Quadrant> = self.leaves().copied().collect();
        assert!(
            global_size(&local, self.comm) > 0,
            "repartition on an empty forest"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.rank() as u64);
        let sorted = parsort(&local, self.comm, &mut rng);
        let mine = partition_evenly(&sorted, self.comm);

        self.trees = (0..nblocks).map(|_| None).collect();
        let mut start = 0;
        while start < mine.len() {
            let block = mine[start].block;
            let end = start + mine[start..].partition_point(|q| q.block == block);
            self.trees[block as usize] = Some(CellArray::from_cells(mine[start..end].to_vec()));
            start = end;
        }

        let rank = self.rank();
        let held: Vec<i32> = (0..nblocks)
            .map(|b| {
                if self.trees[b].is_some() {
                    rank
                } else {
                    i32::MAX
                }
            })
            .collect();
        let mut owners = vec![0_i32; nblocks];
        self.comm
            .all_reduce_into(&held[..], &mut owners[..], SystemOperation::min());
        assert!(
            owners.iter().all(|&r| r != i32::MAX),
            "repartition left a block without leaves"
        );
        self.block_owners = owners;
    }

    /// Apply an element-creation hook to every held leaf in (block, Morton)
    /// order and collect the results.
    pub fn create_elements<E>(&self, mut create: impl FnMut(&Quadrant) -> E) -> Vec<E> {
        self.leaves().map(|leaf| create(leaf)).collect()
    }

    /// For every block, the sorted list of ranks holding its leaves.
    pub(crate) fn block_holders(&self) -> Vec<Vec<i32>> {
        let held: Vec<i32> = self.held_blocks().collect();
        let ranks = vec![self.rank(); held.len()];
        let all_blocks = gather_to_all(&held, self.comm);
        let all_ranks = gather_to_all(&ranks, self.comm);

        let mut holders = vec![Vec::new(); self.topology().num_blocks()];
        for (&b, &r) in izip!(&all_blocks, &all_ranks) {
            holders[b as usize].push(r);
        }
        for ranks in &mut holders {
            ranks.sort_unstable();
        }
        holders
    }

    /// Ship every held leaf adjacent to an inter-block or inter-holder
    /// interface to the ranks that need it for neighbor resolution.
    pub(crate) fn exchange_boundary_leaves(
        &self,
        holders: &[Vec<i32>],
    ) -> Vec<Option<CellArray<Quadrant>>> {
        let topo = self.topology();
        let rank = self.rank();
        let size = self.comm.size() as usize;

        let mut sends: Vec<HashSet<Quadrant>> = vec![HashSet::new(); size];

        for block in self.held_blocks() {
            let tree = self.trees[block as usize].as_ref().unwrap();

            for &r in &holders[block as usize] {
                if r != rank {
                    sends[r as usize].extend(tree.iter().copied());
                }
            }

            for leaf in tree.iter() {
                let mut destinations = |other: i32| {
                    for &r in &holders[other as usize] {
                        if r != rank {
                            sends[r as usize].insert(*leaf);
                        }
                    }
                };
                // A root leaf touches every boundary entity of its block.
                if leaf.level == 0 {
                    for edge in 0..QUAD_EDGES {
                        if let Some(nb) = topo.edge_adjacent(block, edge) {
                            destinations(nb.block);
                        }
                    }
                    for corner in 0..QUAD_CORNERS {
                        for inc in topo.corner_incidences(block, corner) {
                            destinations(inc.block);
                        }
                    }
                    continue;
                }
                let status = boundary_status(leaf);
                for axis in 0..2 {
                    if status[axis] == 0 {
                        continue;
                    }
                    let edge = 2 * axis + (status[axis] > 0) as usize;
                    if let Some(nb) = topo.edge_adjacent(block, edge) {
                        destinations(nb.block);
                    }
                }
                if status[0] != 0 && status[1] != 0 {
                    let corner = (status[0] > 0) as usize | (((status[1] > 0) as usize) << 1);
                    for inc in topo.corner_incidences(block, corner) {
                        destinations(inc.block);
                    }
                }
            }
        }

        let mut flat = Vec::new();
        let mut counts = Vec::with_capacity(size);
        for set in sends {
            let mut batch: Vec<Quadrant> = set.into_iter().collect();
            batch.sort_unstable();
            counts.push(batch.len() as i32);
            flat.extend(batch);
        }
        let received = redistribute(&flat, &counts, self.comm);

        let mut ghosts: Vec<Option<CellArray<Quadrant>>> =
            (0..topo.num_blocks()).map(|_| None).collect();
        let mut by_block: Vec<Vec<Quadrant>> = vec![Vec::new(); topo.num_blocks()];
        for leaf in received {
            by_block[leaf.block as usize].push(leaf);
        }
        for (block, cells) in by_block.into_iter().enumerate() {
            if !cells.is_empty() {
                ghosts[block] = Some(CellArray::from_cells(cells));
            }
        }
        ghosts
    }

    /// The leaf covering `q`'s lower corner, searching the held tree and the
    /// ghost leaves of `q`'s block.
    pub(crate) fn find_leaf_covering(
        &self,
        ghosts: &[Option<CellArray<Quadrant>>],
        q: &Quadrant,
    ) -> Option<Quadrant> {
        if let Some(tree) = &self.trees[q.block as usize] {
            if let Some(leaf) = tree.containing_leaf(q) {
                return Some(*leaf);
            }
        }
        ghosts[q.block as usize]
            .as_ref()
            .and_then(|tree| tree.containing_leaf(q))
            .copied()
    }
}

fn push_refined(leaf: Quadrant, target: i32, out: &mut Vec<Quadrant>) {
    if leaf.level >= target {
        out.push(leaf);
    } else {
        for child in leaf.children() {
            push_refined(child, target, out);
        }
    }
}

/// The quadrants that must exist so that `q` satisfies the 2:1 condition.
fn neighbor_demands(topo: &QuadTopology, q: &Quadrant, balance_corner: bool) -> Vec<Quadrant> {
    let p = q.parent();
    let mut demands = Vec::new();
    for e in 0..QUAD_EDGES {
        demands.extend(resolve_neighbor(topo, &p.edge_neighbor(e)));
    }
    if balance_corner {
        for c in 0..QUAD_CORNERS {
            demands.extend(resolve_neighbor(topo, &p.corner_neighbor(c)));
        }
    }
    demands
}

/// Per-axis boundary contact of a cell: -1 at the low edge, +1 at the high
/// edge, 0 in the interior.
pub(crate) fn boundary_status(q: &Quadrant) -> [i32; 2] {
    let h = q.side();
    let classify = |lo: i32| {
        if lo == 0 {
            -1
        } else if lo + h == HMAX {
            1
        } else {
            0
        }
    };
    [classify(q.x), classify(q.y)]
}

/// Resolve a same-level neighbor cell into the frames of the blocks actually
/// containing it.
pub(crate) fn resolve_neighbor(topo: &QuadTopology, q: &Quadrant) -> Vec<Quadrant> {
    if q.is_inside() {
        return vec![*q];
    }

    let h = q.side();
    let classify = |c: i32| {
        if c < 0 {
            -1
        } else if c >= HMAX {
            1
        } else {
            0
        }
    };
    let status = [classify(q.x), classify(q.y)];
    let outside = status.iter().filter(|&&s| s != 0).count();

    let mut targets = Vec::new();
    match outside {
        1 => {
            let axis = status.iter().position(|&s| s != 0).unwrap();
            let edge = 2 * axis + (status[axis] > 0) as usize;
            let Some(nb) = topo.edge_adjacent(q.block, edge) else {
                return targets;
            };
            let t = if axis == 0 { q.y } else { q.x };
            let t2 = transform_edge_coord(nb.orient, t, h);
            let normal = if nb.edge & 1 == 0 { 0 } else { HMAX - h };
            targets.push(cell_at_quad_edge(nb.block, nb.edge, t2, normal, q.level));
        }
        2 => {
            let corner = (status[0] > 0) as usize | (((status[1] > 0) as usize) << 1);
            for inc in topo.corner_incidences(q.block, corner) {
                if inc.block == q.block && inc.corner == corner {
                    continue;
                }
                let lo = |bit: bool| if bit { HMAX - h } else { 0 };
                targets.push(Quadrant::new(
                    inc.block,
                    q.level,
                    lo(inc.corner & 1 != 0),
                    lo(inc.corner & 2 != 0),
                ));
            }
        }
        _ => unreachable!("neighbor cells move at most one cell width per axis"),
    }
    targets
}

/// Build a cell from its along-edge and normal coordinates on a local edge.
fn cell_at_quad_edge(block: i32, edge: usize, t: i32, normal: i32, level: i32) -> Quadrant {
    if edge >> 1 == 0 {
        // x-normal edge: the along coordinate runs in y.
        Quadrant::new(block, level, normal, t)
    } else {
        Quadrant::new(block, level, t, normal)
    }
}

/// All copies of a boundary node position in the frames of the other blocks
/// incident to it.
pub(crate) fn node_copies(topo: &QuadTopology, nd: &Quadrant) -> Vec<Quadrant> {
    let classify = |c: i32| {
        if c == 0 {
            -1
        } else if c == HMAX {
            1
        } else {
            0
        }
    };
    let status = [classify(nd.x), classify(nd.y)];
    let on_boundary = status.iter().filter(|&&s| s != 0).count();

    let mut copies = Vec::new();
    match on_boundary {
        0 => {}
        1 => {
            let axis = status.iter().position(|&s| s != 0).unwrap();
            let edge = 2 * axis + (status[axis] > 0) as usize;
            if let Some(nb) = topo.edge_adjacent(nd.block, edge) {
                let t = if axis == 0 { nd.y } else { nd.x };
                let t2 = transform_edge_coord(nb.orient, t, 0);
                let normal = if nb.edge & 1 == 0 { 0 } else { HMAX };
                let mut copy = cell_at_quad_edge(nb.block, nb.edge, t2, normal, nd.level);
                copy.tag = nd.tag;
                copies.push(copy);
            }
        }
        _ => {
            let corner = (status[0] > 0) as usize | (((status[1] > 0) as usize) << 1);
            for inc in topo.corner_incidences(nd.block, corner) {
                if inc.block == nd.block && inc.corner == corner {
                    continue;
                }
                let hi = |bit: bool| if bit { HMAX } else { 0 };
                let mut copy = Quadrant::new(
                    inc.block,
                    nd.level,
                    hi(inc.corner & 1 != 0),
                    hi(inc.corner & 2 != 0),
                );
                copy.tag = nd.tag;
                copies.push(copy);
            }
        }
    }
    copies
}

/// The smallest (block, coordinates) key among a node and all its copies.
pub(crate) fn canonical_node_key(topo: &QuadTopology, nd: &Quadrant) -> [i32; 4] {
    let mut key = nd.node_key();
    for copy in node_copies(topo, nd) {
        let other = copy.node_key();
        if other < key {
            key = other;
        }
    }
    key
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_quad_topology() -> QuadTopology {
        QuadTopology::new(QuadConnectivity::new(6, &[0, 1, 2, 3, 1, 4, 3, 5]))
    }

    #[test]
    fn test_resolve_across_shared_edge() {
        let topo = two_quad_topology();
        let h = Quadrant::root(0).child(0).side();
        let q = Quadrant::new(0, 1, HMAX - h, h);
        let targets = resolve_neighbor(&topo, &q.edge_neighbor(1));
        assert_eq!(targets, vec![Quadrant::new(1, 1, 0, h)]);
    }

    #[test]
    fn test_resolve_reversed_edge() {
        let topo = QuadTopology::new(QuadConnectivity::new(6, &[0, 1, 2, 3, 3, 4, 1, 5]));
        let h = Quadrant::root(0).child(0).side();
        let q = Quadrant::new(0, 1, HMAX - h, 0);
        let targets = resolve_neighbor(&topo, &q.edge_neighbor(1));
        // The neighbor's along coordinate reverses.
        assert_eq!(targets, vec![Quadrant::new(1, 1, 0, HMAX - h)]);
    }

    #[test]
    fn test_node_copies_on_shared_edge() {
        let topo = two_quad_topology();
        let nd = Quadrant::new(0, 2, HMAX, 77);
        assert_eq!(node_copies(&topo, &nd), vec![Quadrant::new(1, 2, 0, 77)]);
        assert_eq!(canonical_node_key(&topo, &nd), [0, HMAX, 77, 0]);
    }
}
