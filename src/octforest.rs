//! The distributed forest of octrees.
//!
//! A forest owns one octree per hexahedral block of the user-supplied block
//! mesh. Blocks are distributed over the ranks of a communicator; after a
//! space-filling-curve repartition a block's leaves may be split between
//! neighboring ranks, in which case every rank holding leaves of the block
//! is a *holder* and the lowest holder rank is the block's *owner*.
//!
//! The forest mutators follow the usual session order: `set_connectivity`,
//! `create_trees`, `refine`, [`balance`](OctForest::balance),
//! [`repartition`](OctForest::repartition), then
//! [`create_nodes`](OctForest::create_nodes) and the connectivity queries.
//! Any mutation invalidates previously created node data.

mod balance;
mod nodes;

use std::collections::HashSet;
use std::rc::Rc;

use itertools::izip;
use mpi::collective::SystemOperation;
use mpi::traits::CommunicatorCollectives;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::constants::{HMAX, MAX_LEVEL, OCT_CORNERS, OCT_EDGES, OCT_FACES};
use crate::container::CellArray;
use crate::octant::Octant;
use crate::parsort::parsort;
use crate::tools::{gather_to_all, global_size, partition_evenly, redistribute};
use crate::topology::{transform_edge_coord, transform_face_coords, BlockConnectivity, BlockTopology};

pub(crate) use nodes::NodeData;

/// A distributed forest of octrees over a hexahedral block mesh.
pub struct OctForest<'c, C: CommunicatorCollectives> {
    comm: &'c C,
    topo: Option<Rc<BlockTopology>>,
    block_owners: Vec<i32>,
    trees: Vec<Option<CellArray<Octant>>>,
    nodes: Option<NodeData>,
}

impl<'c, C: CommunicatorCollectives> OctForest<'c, C> {
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
    ///
    /// With `partition` set the blocks are assigned to ranks by growing
    /// face-connected chunks, otherwise contiguously by block index. A
    /// caller-computed assignment can be supplied through
    /// [`set_connectivity_with_owners`](Self::set_connectivity_with_owners).
    pub fn set_connectivity(&mut self, conn: BlockConnectivity, partition: bool) {
        let topo = BlockTopology::new(conn);
        let owners = if partition {
            topo.graph_partition(self.comm.size() as usize)
        } else {
            topo.contiguous_partition(self.comm.size() as usize)
        };
        self.install_topology(topo, owners);
    }

    /// Set the block connectivity with an externally computed block-to-rank
    /// assignment, one entry per block.
    pub fn set_connectivity_with_owners(&mut self, conn: BlockConnectivity, owners: Vec<i32>) {
        let topo = BlockTopology::new(conn);
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

    fn install_topology(&mut self, topo: BlockTopology, owners: Vec<i32>) {
        let nblocks = topo.num_blocks();
        self.topo = Some(Rc::new(topo));
        self.block_owners = owners;
        self.trees = (0..nblocks).map(|_| None).collect();
        self.nodes = None;
    }

    /// The derived block topology.
    pub fn topology(&self) -> &BlockTopology {
        self.topo.as_ref().expect("connectivity has not been set")
    }

    fn topo_rc(&self) -> Rc<BlockTopology> {
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
    pub fn block_leaves(&self, block: i32) -> Option<&CellArray<Octant>> {
        self.trees[block as usize].as_ref()
    }

    /// All held leaves in (block, Morton) order.
    pub fn leaves(&self) -> impl Iterator<Item = &Octant> + '_ {
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

    /// Initialize each owned block as a single root octant refined uniformly
    /// to `level`.
    pub fn create_trees(&mut self, level: i32) {
        let nblocks = self.topology().num_blocks();
        self.create_trees_refined(&vec![level; nblocks]);
    }

    /// Initialize each owned block's octree at its own refinement level, one
    /// entry per block.
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
            let mut cells = vec![Octant::root(block as i32)];
            for _ in 0..levels[block] {
                cells = cells.iter().flat_map(|c| c.children()).collect();
            }
            self.trees[block] = Some(CellArray::from_cells(cells));
        }
        log::debug!(
            "created {} trees with {} leaves on rank {}",
            self.held_blocks().count(),
            self.num_local_leaves(),
            rank
        );
    }

    /// Insert `nrand` random octants per owned block with levels drawn from
    /// `min_level..=max_level`, then linearize and complete the result to a
    /// partition. A testing aid.
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
                cells.push(Octant::new(
                    block as i32,
                    level,
                    rng.gen_range(0..(1 << level)) * h,
                    rng.gen_range(0..(1 << level)) * h,
                    rng.gen_range(0..(1 << level)) * h,
                ));
            }
            let mut demands = CellArray::from_cells(cells);
            demands.linearize();
            let mut leaves = Vec::new();
            crate::container::complete_region(
                Octant::root(block as i32),
                demands.as_slice(),
                &mut leaves,
            );
            self.trees[block] = Some(CellArray::from_cells(leaves));
        }
    }

    /// Refine held leaves towards per-leaf target levels.
    ///
    /// `levels` holds one absolute target level per held leaf in (block,
    /// Morton) order; a leaf below its target is replaced by its children
    /// recursively until it reaches it. Passing `None` refines every leaf
    /// one level.
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
    pub fn coarsen(&self) -> OctForest<'c, C> {
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
        OctForest {
            comm: self.comm,
            topo: self.topo.clone(),
            block_owners: self.block_owners.clone(),
            trees,
            nodes: None,
        }
    }

    /// Redistribute the leaves along the space-filling curve so that every
    /// rank holds a contiguous slice with leaf-count imbalance at most one.
    ///
    /// Blocks whose leaves straddle a slice boundary end up held by several
    /// ranks; block ownership moves to the lowest holder rank.
    pub fn repartition(&mut self) {
        let nblocks = self.topology().num_blocks();
        self.clear_nodes();

        let local: Vec<Octant> = self.leaves().copied().collect();
        assert!(
            global_size(&local, self.comm) > 0,
            "repartition on an empty forest"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.rank() as u64);
        let sorted = parsort(&local, self.comm, &mut rng);
        let mine = partition_evenly(&sorted, self.comm);

        // Regroup the received slice into per-block trees. The slice is
        // sorted, so the blocks come out in contiguous runs.
        self.trees = (0..nblocks).map(|_| None).collect();
        let mut start = 0;
        while start < mine.len() {
            let block = mine[start].block;
            let end = start + mine[start..].partition_point(|o| o.block == block);
            self.trees[block as usize] =
                Some(CellArray::from_cells(mine[start..end].to_vec()));
            start = end;
        }

        // Ownership moves to the lowest rank holding leaves of each block.
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

        log::debug!(
            "repartitioned to {} leaves on rank {}",
            self.num_local_leaves(),
            rank
        );
    }

    /// Apply an element-creation hook to every held leaf in (block, Morton)
    /// order and collect the results.
    pub fn create_elements<E>(&self, mut create: impl FnMut(&Octant) -> E) -> Vec<E> {
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
    /// interface to the ranks that need it for neighbor resolution. The
    /// received leaves are grouped by block, in each block's own frame.
    pub(crate) fn exchange_boundary_leaves(
        &self,
        holders: &[Vec<i32>],
    ) -> Vec<Option<CellArray<Octant>>> {
        let topo = self.topology();
        let rank = self.rank();
        let size = self.comm.size() as usize;

        let mut sends: Vec<HashSet<Octant>> = vec![HashSet::new(); size];

        for block in self.held_blocks() {
            let tree = self.trees[block as usize].as_ref().unwrap();

            // Ranks sharing this block get the full held tree.
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
                    for face in 0..OCT_FACES {
                        if let Some(nb) = topo.face_adjacent(block, face) {
                            destinations(nb.block);
                        }
                    }
                    for edge in 0..OCT_EDGES {
                        for inc in topo.edge_incidences(block, edge) {
                            destinations(inc.block);
                        }
                    }
                    for corner in 0..OCT_CORNERS {
                        for inc in topo.corner_incidences(block, corner) {
                            destinations(inc.block);
                        }
                    }
                    continue;
                }
                let status = boundary_status(leaf);
                for axis in 0..3 {
                    if status[axis] == 0 {
                        continue;
                    }
                    let face = 2 * axis + (status[axis] > 0) as usize;
                    if let Some(nb) = topo.face_adjacent(block, face) {
                        destinations(nb.block);
                    }
                }
                for edge in touched_edges(&status) {
                    for inc in topo.edge_incidences(block, edge) {
                        destinations(inc.block);
                    }
                }
                if let Some(corner) = touched_corner(&status) {
                    for inc in topo.corner_incidences(block, corner) {
                        destinations(inc.block);
                    }
                }
            }
        }

        let mut flat = Vec::new();
        let mut counts = Vec::with_capacity(size);
        for set in sends {
            let mut batch: Vec<Octant> = set.into_iter().collect();
            batch.sort_unstable();
            counts.push(batch.len() as i32);
            flat.extend(batch);
        }
        let received = redistribute(&flat, &counts, self.comm);

        let mut ghosts: Vec<Option<CellArray<Octant>>> =
            (0..topo.num_blocks()).map(|_| None).collect();
        let mut by_block: Vec<Vec<Octant>> = vec![Vec::new(); topo.num_blocks()];
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
        ghosts: &[Option<CellArray<Octant>>],
        q: &Octant,
    ) -> Option<Octant> {
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

fn push_refined(leaf: Octant, target: i32, out: &mut Vec<Octant>) {
    if leaf.level >= target {
        out.push(leaf);
    } else {
        for child in leaf.children() {
            push_refined(child, target, out);
        }
    }
}

/// Per-axis boundary contact of a cell: -1 at the low face, +1 at the high
/// face, 0 in the interior.
pub(crate) fn boundary_status(o: &Octant) -> [i32; 3] {
    let h = o.side();
    let classify = |lo: i32| {
        if lo == 0 {
            -1
        } else if lo + h == HMAX {
            1
        } else {
            0
        }
    };
    [classify(o.x), classify(o.y), classify(o.z)]
}

/// The local block edges a cell with the given boundary contact touches.
fn touched_edges(status: &[i32; 3]) -> Vec<usize> {
    let mut edges = Vec::new();
    // Edge groups run along x, y, z; the transverse axes follow in order.
    let groups = [(1, 2), (0, 2), (0, 1)];
    for (group, &(t0, t1)) in groups.iter().enumerate() {
        if status[t0] != 0 && status[t1] != 0 {
            let j = (status[t0] > 0) as usize | (((status[t1] > 0) as usize) << 1);
            edges.push(4 * group + j);
        }
    }
    edges
}

/// The local block corner a cell with the given boundary contact touches.
fn touched_corner(status: &[i32; 3]) -> Option<usize> {
    (status.iter().all(|&s| s != 0)).then(|| {
        (status[0] > 0) as usize
            | (((status[1] > 0) as usize) << 1)
            | (((status[2] > 0) as usize) << 2)
    })
}

/// Resolve a same-level neighbor cell into the frames of the blocks actually
/// containing it.
///
/// A cell inside its own block resolves to itself. A cell pushed across a
/// block face, edge or corner is mapped through the topology's orientation
/// transforms into every incident block; a cell pushed over a domain
/// boundary resolves to nothing.
pub(crate) fn resolve_neighbor(topo: &BlockTopology, o: &Octant) -> Vec<Octant> {
    if o.is_inside() {
        return vec![*o];
    }

    let h = o.side();
    let classify = |c: i32| {
        if c < 0 {
            -1
        } else if c >= HMAX {
            1
        } else {
            0
        }
    };
    let status = [classify(o.x), classify(o.y), classify(o.z)];
    let outside = status.iter().filter(|&&s| s != 0).count();

    let mut targets = Vec::new();
    match outside {
        1 => {
            let axis = status.iter().position(|&s| s != 0).unwrap();
            let face = 2 * axis + (status[axis] > 0) as usize;
            let Some(nb) = topo.face_adjacent(o.block, face) else {
                return targets;
            };
            let (u, v) = in_face_coords(axis, o);
            let (u2, v2) = transform_face_coords(nb.orient, u, v, h);
            let normal = if nb.face & 1 == 0 { 0 } else { HMAX - h };
            targets.push(from_face_coords(nb.block, nb.face, u2, v2, normal, o.level));
        }
        2 => {
            let along = status.iter().position(|&s| s == 0).unwrap();
            let (t0, t1) = transverse_axes(along);
            let j = (status[t0] > 0) as usize | (((status[t1] > 0) as usize) << 1);
            let edge = 4 * along + j;
            let t = [o.x, o.y, o.z][along];
            let my_orient = topo.edge_orientation(o.block, edge);
            for inc in topo.edge_incidences(o.block, edge) {
                if inc.block == o.block && inc.edge == edge {
                    continue;
                }
                let t2 = transform_edge_coord(my_orient ^ inc.orient, t, h);
                targets.push(cell_at_edge(inc.block, inc.edge, t2, h, o.level));
            }
        }
        3 => {
            let corner = (status[0] > 0) as usize
                | (((status[1] > 0) as usize) << 1)
                | (((status[2] > 0) as usize) << 2);
            for inc in topo.corner_incidences(o.block, corner) {
                if inc.block == o.block && inc.corner == corner {
                    continue;
                }
                targets.push(cell_at_corner(inc.block, inc.corner, h, o.level));
            }
        }
        _ => unreachable!("neighbor cells move at most one cell width per axis"),
    }
    targets
}

/// The in-face coordinates of a cell relative to a face normal axis.
pub(crate) fn in_face_coords(axis: usize, o: &Octant) -> (i32, i32) {
    match axis {
        0 => (o.y, o.z),
        1 => (o.x, o.z),
        _ => (o.x, o.y),
    }
}

/// Build a cell from in-face coordinates on a local face of a block.
pub(crate) fn from_face_coords(block: i32, face: usize, u: i32, v: i32, normal: i32, level: i32) -> Octant {
    match face >> 1 {
        0 => Octant::new(block, level, normal, u, v),
        1 => Octant::new(block, level, u, normal, v),
        _ => Octant::new(block, level, u, v, normal),
    }
}

pub(crate) fn transverse_axes(along: usize) -> (usize, usize) {
    match along {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

/// The cell of size `h` hugging a local block edge at along-coordinate `t`.
fn cell_at_edge(block: i32, edge: usize, t: i32, h: i32, level: i32) -> Octant {
    let along = edge / 4;
    let j = edge & 3;
    let lo = |bit: bool| if bit { HMAX - h } else { 0 };
    let (t0, t1) = (lo(j & 1 != 0), lo(j & 2 != 0));
    match along {
        0 => Octant::new(block, level, t, t0, t1),
        1 => Octant::new(block, level, t0, t, t1),
        _ => Octant::new(block, level, t0, t1, t),
    }
}

/// The cell of size `h` hugging a local block corner.
fn cell_at_corner(block: i32, corner: usize, h: i32, level: i32) -> Octant {
    let lo = |bit: bool| if bit { HMAX - h } else { 0 };
    Octant::new(
        block,
        level,
        lo(corner & 1 != 0),
        lo(corner & 2 != 0),
        lo(corner & 4 != 0),
    )
}

/// All copies of a boundary node position in the frames of the other blocks
/// incident to it. An interior node has no copies.
pub(crate) fn node_copies(topo: &BlockTopology, nd: &Octant) -> Vec<Octant> {
    let classify = |c: i32| {
        if c == 0 {
            -1
        } else if c == HMAX {
            1
        } else {
            0
        }
    };
    let status = [classify(nd.x), classify(nd.y), classify(nd.z)];
    let on_boundary = status.iter().filter(|&&s| s != 0).count();

    let mut copies = Vec::new();
    match on_boundary {
        0 => {}
        1 => {
            let axis = status.iter().position(|&s| s != 0).unwrap();
            let face = 2 * axis + (status[axis] > 0) as usize;
            if let Some(nb) = topo.face_adjacent(nd.block, face) {
                let (u, v) = in_face_coords(axis, nd);
                let (u2, v2) = transform_face_coords(nb.orient, u, v, 0);
                let normal = if nb.face & 1 == 0 { 0 } else { HMAX };
                let mut copy = from_face_coords(nb.block, nb.face, u2, v2, normal, nd.level);
                copy.tag = nd.tag;
                copies.push(copy);
            }
        }
        2 => {
            let along = status.iter().position(|&s| s == 0).unwrap();
            let (t0, t1) = transverse_axes(along);
            let j = (status[t0] > 0) as usize | (((status[t1] > 0) as usize) << 1);
            let edge = 4 * along + j;
            let t = [nd.x, nd.y, nd.z][along];
            let my_orient = topo.edge_orientation(nd.block, edge);
            for inc in topo.edge_incidences(nd.block, edge) {
                if inc.block == nd.block && inc.edge == edge {
                    continue;
                }
                let t2 = transform_edge_coord(my_orient ^ inc.orient, t, 0);
                let hi = |bit: bool| if bit { HMAX } else { 0 };
                let (c0, c1) = (hi(inc.edge & 1 != 0), hi(inc.edge & 2 != 0));
                let mut copy = match inc.edge / 4 {
                    0 => Octant::new(inc.block, nd.level, t2, c0, c1),
                    1 => Octant::new(inc.block, nd.level, c0, t2, c1),
                    _ => Octant::new(inc.block, nd.level, c0, c1, t2),
                };
                copy.tag = nd.tag;
                copies.push(copy);
            }
        }
        _ => {
            let corner = (status[0] > 0) as usize
                | (((status[1] > 0) as usize) << 1)
                | (((status[2] > 0) as usize) << 2);
            for inc in topo.corner_incidences(nd.block, corner) {
                if inc.block == nd.block && inc.corner == corner {
                    continue;
                }
                let hi = |bit: bool| if bit { HMAX } else { 0 };
                let mut copy = Octant::new(
                    inc.block,
                    nd.level,
                    hi(inc.corner & 1 != 0),
                    hi(inc.corner & 2 != 0),
                    hi(inc.corner & 4 != 0),
                );
                copy.tag = nd.tag;
                copies.push(copy);
            }
        }
    }
    copies
}

/// The smallest (block, coordinates) key among a node and all its copies.
/// Used to give every rank the same canonical identity for shared nodes.
pub(crate) fn canonical_node_key(topo: &BlockTopology, nd: &Octant) -> [i32; 4] {
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
    use crate::topology::BlockConnectivity;

    fn two_block_topology() -> BlockTopology {
        BlockTopology::new(BlockConnectivity::new(
            12,
            &[
                0, 1, 2, 3, 4, 5, 6, 7, //
                1, 8, 3, 9, 5, 10, 7, 11,
            ],
        ))
    }

    #[test]
    fn test_resolve_inside_is_identity() {
        let topo = two_block_topology();
        let o = Octant::root(0).child(0);
        assert_eq!(resolve_neighbor(&topo, &o), vec![o]);
    }

    #[test]
    fn test_resolve_across_shared_face() {
        let topo = two_block_topology();
        // The high-x neighbor of a high-x cell of block 0 lands in block 1
        // against its low-x face.
        let h = Octant::root(0).child(0).side();
        let o = Octant::new(0, 1, HMAX - h, 0, h);
        let targets = resolve_neighbor(&topo, &o.face_neighbor(1));
        assert_eq!(targets, vec![Octant::new(1, 1, 0, 0, h)]);
    }

    #[test]
    fn test_resolve_across_domain_boundary() {
        let topo = two_block_topology();
        let o = Octant::root(0).child(0);
        assert!(resolve_neighbor(&topo, &o.face_neighbor(0)).is_empty());
    }

    #[test]
    fn test_resolve_across_shared_edge() {
        let topo = two_block_topology();
        // Crossing the high-x high-y edge of block 0 reaches the cell at the
        // low-x high-y edge of block 1.
        let h = Octant::root(0).child(0).side();
        let o = Octant::new(0, 1, HMAX - h, HMAX - h, 0);
        let targets = resolve_neighbor(&topo, &o.edge_neighbor(11));
        assert_eq!(targets, vec![Octant::new(1, 1, 0, HMAX - h, 0)]);
    }

    #[test]
    fn test_node_copies_across_face_and_corner() {
        let topo = two_block_topology();
        let face_node = Octant::new(0, 2, HMAX, 5, 9);
        assert_eq!(node_copies(&topo, &face_node), vec![Octant::new(1, 2, 0, 5, 9)]);
        assert_eq!(
            canonical_node_key(&topo, &face_node),
            [0, HMAX, 5, 9]
        );

        let corner_node = Octant::new(1, 2, 0, 0, 0);
        assert_eq!(
            node_copies(&topo, &corner_node),
            vec![Octant::new(0, 2, HMAX, 0, 0)]
        );
        let interior = Octant::new(0, 2, 5, 5, 5);
        assert!(node_copies(&topo, &interior).is_empty());
    }

    #[test]
    fn test_boundary_status_and_entities() {
        let o = Octant::root(0).child(7);
        assert_eq!(boundary_status(&o), [1, 1, 1]);
        assert_eq!(touched_edges(&boundary_status(&o)), vec![3, 7, 11]);
        assert_eq!(touched_corner(&boundary_status(&o)), Some(7));

        let o = Octant::new(0, 2, 0, Octant::new(0, 2, 0, 0, 0).side(), 0);
        assert_eq!(boundary_status(&o), [-1, 0, -1]);
        assert_eq!(touched_edges(&boundary_status(&o)), vec![4]);
        assert_eq!(touched_corner(&boundary_status(&o)), None);
    }
}
