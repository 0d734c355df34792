//! Global node numbering and dependent-node constraints of the quad forest.
//!
//! The 2D reduction of the octree node layer: every leaf contributes an
//! `order^2` lattice, boundary candidates are mirrored through the edge and
//! corner transforms, and the only hanging configuration is a node in the
//! interior of a one-level-coarser neighbor's edge.

use std::collections::{HashMap, HashSet};

use mpi::traits::CommunicatorCollectives;

use crate::constants::{HMAX, MAX_LEVEL, QUAD_EDGES};
use crate::container::CellArray;
use crate::quadrant::Quadrant;
use crate::tools::{gather_to_all, redistribute};
use crate::types::{lagrange, on_coarse_lattice, quarter_pos, trace_weights, IndexWeight, SparseWeights};

use super::topology::QuadTopology;
use super::{canonical_node_key, node_copies, resolve_neighbor, QuadForest};

type ConstraintMap = HashMap<[i32; 4], Vec<([i32; 4], f64)>>;

/// Everything `create_nodes` builds; invalidated by any forest mutation.
pub(crate) struct QuadNodeData {
    pub(crate) order: i32,
    pub(crate) containers: Vec<Option<CellArray<Quadrant>>>,
    pub(crate) maps: Vec<Option<HashMap<[i32; 4], usize>>>,
    pub(crate) ranges: Vec<i32>,
    pub(crate) dep: SparseWeights,
    pub(crate) constraints: ConstraintMap,
    pub(crate) canon_index: HashMap<[i32; 4], i32>,
}

/// The `order^2` candidate nodes of a leaf in y-then-x order with x varying
/// fastest, tagged as unnumbered.
pub(crate) fn leaf_nodes(leaf: &Quadrant, order: i32) -> Vec<Quadrant> {
    let step = leaf.side() / (order - 1);
    let mut out = Vec::with_capacity((order * order) as usize);
    for ky in 0..order {
        for kx in 0..order {
            let mut nd = Quadrant::new(
                leaf.block,
                leaf.level,
                leaf.x + kx * step,
                leaf.y + ky * step,
            );
            nd.tag = -1;
            out.push(nd);
        }
    }
    out
}

/// The candidate nodes of `q` lying on its edge `e`.
fn edge_nodes_of(q: &Quadrant, e: usize, order: i32) -> Vec<Quadrant> {
    let axis = e >> 1;
    let target = [q.x, q.y][axis] + if e & 1 == 1 { q.side() } else { 0 };
    leaf_nodes(q, order)
        .into_iter()
        .filter(|nd| [nd.x, nd.y][axis] == target)
        .collect()
}

/// The coarse lattice node `k` on edge `e` of the parent cell `p`.
fn edge_lattice_node(p: &Quadrant, e: usize, order: i32, k: usize) -> Quadrant {
    let hp = p.side();
    let cs = hp / (order - 1);
    let normal = [p.x, p.y][e >> 1] + if e & 1 == 1 { hp } else { 0 };
    let mut nd = if e >> 1 == 0 {
        Quadrant::new(p.block, p.level, normal, p.y + k as i32 * cs)
    } else {
        Quadrant::new(p.block, p.level, p.x + k as i32 * cs, normal)
    };
    nd.tag = -1;
    nd
}

/// The (owner rank, canonical block) of a node; identical on every rank
/// that can see it.
fn numbering_home(topo: &QuadTopology, owners: &[i32], nd: &Quadrant) -> (i32, i32) {
    let mut owner = owners[nd.block as usize];
    let copies = node_copies(topo, nd);
    for c in &copies {
        owner = owner.min(owners[c.block as usize]);
    }
    let mut canonical = i32::MAX;
    if owners[nd.block as usize] == owner {
        canonical = nd.block;
    }
    for c in &copies {
        if owners[c.block as usize] == owner {
            canonical = canonical.min(c.block);
        }
    }
    (owner, canonical)
}

impl<'c, C: CommunicatorCollectives> QuadForest<'c, C> {
    /// Create a globally consistent node numbering for elements of the given
    /// order (2 for linear, 3 for quadratic) and classify hanging nodes.
    pub fn create_nodes(&mut self, order: i32) {
        assert!(order == 2 || order == 3, "element order must be 2 or 3");
        let topo = self.topo_rc();
        if order == 3 {
            assert!(
                self.leaves().all(|q| q.level < MAX_LEVEL),
                "order 3 needs mid-side positions below the deepest level"
            );
        }

        let rank = self.rank();
        let size = self.comm().size() as usize;
        let nblocks = topo.num_blocks();
        let holders = self.block_holders();
        let held: Vec<bool> = (0..nblocks)
            .map(|b| self.block_leaves(b as i32).is_some())
            .collect();
        let ghosts = self.exchange_boundary_leaves(&holders);

        // Candidate generation with cross-block mirroring.
        let mut cands: Vec<Vec<Quadrant>> = vec![Vec::new(); nblocks];
        let push_with_copies = |nd: Quadrant, into_own: bool, cands: &mut Vec<Vec<Quadrant>>| {
            if into_own && held[nd.block as usize] {
                cands[nd.block as usize].push(nd);
            }
            for copy in node_copies(&topo, &nd) {
                if held[copy.block as usize] {
                    cands[copy.block as usize].push(copy);
                }
            }
        };
        for block in self.held_blocks() {
            for leaf in self.block_leaves(block).unwrap().iter() {
                for nd in leaf_nodes(leaf, order) {
                    push_with_copies(nd, true, &mut cands);
                }
            }
        }
        for (block, ghost) in ghosts.iter().enumerate() {
            let Some(ghost) = ghost else { continue };
            for leaf in ghost.iter() {
                for nd in leaf_nodes(leaf, order) {
                    push_with_copies(nd, held[block], &mut cands);
                }
            }
        }

        let mut containers: Vec<Option<CellArray<Quadrant>>> =
            (0..nblocks).map(|_| None).collect();
        let mut maps: Vec<Option<HashMap<[i32; 4], usize>>> = (0..nblocks).map(|_| None).collect();
        for (block, cells) in cands.into_iter().enumerate() {
            if !held[block] {
                continue;
            }
            let mut container = CellArray::from_cells(cells);
            container.unique_nodes();
            maps[block] = Some(container.node_index_map());
            containers[block] = Some(container);
        }

        // Edge-hanging classification over every leaf this rank can see.
        let sources: Vec<Quadrant> = self
            .leaves()
            .copied()
            .chain(
                ghosts
                    .iter()
                    .filter_map(|g| g.as_ref())
                    .flat_map(|g| g.iter().copied()),
            )
            .collect();
        let mut constraints = ConstraintMap::new();
        for q in &sources {
            if q.level > 0 {
                self.edge_constraints(&topo, &ghosts, q, order, &mut constraints);
            }
        }

        // Count and number the nodes this rank owns.
        let owners = &self.block_owners;
        let mut num_owned = 0_i32;
        for block in 0..nblocks {
            let Some(container) = &containers[block] else {
                continue;
            };
            for nd in container.iter() {
                let (owner, canonical) = numbering_home(&topo, owners, nd);
                if owner == rank && canonical == block as i32 {
                    num_owned += 1;
                }
            }
        }

        let counts = gather_to_all(&[num_owned], self.comm());
        let mut ranges = Vec::with_capacity(size + 1);
        ranges.push(0);
        for r in 0..size {
            ranges.push(ranges[r] + counts[r]);
        }

        let mut next = ranges[rank as usize];
        for block in 0..nblocks {
            let Some(container) = containers[block].as_mut() else {
                continue;
            };
            for nd in container.iter_mut() {
                let (owner, canonical) = numbering_home(&topo, owners, &*nd);
                if owner == rank && canonical == block as i32 {
                    nd.tag = next;
                    next += 1;
                }
            }
        }

        // Broadcast the assigned indices to every other copy.
        let mut sends: Vec<Vec<Quadrant>> = vec![Vec::new(); size];
        let mut local_sets: Vec<Quadrant> = Vec::new();
        for block in 0..nblocks {
            let Some(container) = &containers[block] else {
                continue;
            };
            for nd in container.iter() {
                let (owner, canonical) = numbering_home(&topo, owners, nd);
                if owner != rank || canonical != block as i32 {
                    continue;
                }
                for &r in &holders[block] {
                    if r != rank {
                        sends[r as usize].push(*nd);
                    }
                }
                for copy in node_copies(&topo, nd) {
                    if held[copy.block as usize] {
                        local_sets.push(copy);
                    }
                    for &r in &holders[copy.block as usize] {
                        if r != rank {
                            sends[r as usize].push(copy);
                        }
                    }
                }
            }
        }

        let mut flat = Vec::new();
        let mut counts = Vec::with_capacity(size);
        for bucket in &mut sends {
            counts.push(bucket.len() as i32);
            flat.append(bucket);
        }
        local_sets.extend(redistribute(&flat, &counts, self.comm()));

        for nd in local_sets {
            let idx = maps[nd.block as usize].as_ref().unwrap()[&nd.node_key()];
            containers[nd.block as usize]
                .as_mut()
                .unwrap()
                .cell_mut(idx)
                .tag = nd.tag;
        }

        debug_assert!(containers
            .iter()
            .filter_map(|c| c.as_ref())
            .all(|c| c.iter().all(|nd| nd.tag >= 0)));

        let mut canon_index = HashMap::new();
        for container in containers.iter().filter_map(|c| c.as_ref()) {
            for nd in container.iter() {
                canon_index.insert(canonical_node_key(&topo, nd), nd.tag);
            }
        }

        // Emit the dependent rows, expanding constraint chains.
        let mut dep = SparseWeights::new();
        let mut emitted = HashSet::new();
        for container in containers.iter().filter_map(|c| c.as_ref()) {
            for nd in container.iter() {
                let key = canonical_node_key(&topo, nd);
                if !constraints.contains_key(&key) || !emitted.insert(key) {
                    continue;
                }
                let mut raw = expand_constraint(&key, &constraints);
                let mut iw: Vec<IndexWeight> = raw
                    .drain(..)
                    .map(|(k, w)| {
                        IndexWeight::new(
                            *canon_index
                                .get(&k)
                                .expect("constraining node missing on this rank"),
                            w,
                        )
                    })
                    .collect();
                IndexWeight::unique_sort(&mut iw);
                debug_assert!(
                    (iw.iter().map(|e| e.weight).sum::<f64>() - 1.0).abs() < 1e-12,
                    "dependent-node weights must sum to one"
                );
                dep.push_row(nd.tag, &iw);
            }
        }

        log::debug!(
            "created {} owned quad nodes ({} dependent rows) on rank {}",
            num_owned,
            dep.len(),
            rank
        );

        self.nodes = Some(QuadNodeData {
            order,
            containers,
            maps,
            ranges,
            dep,
            constraints,
            canon_index,
        });
    }

    /// Record trace constraints for the nodes of `q`'s edges that hang on a
    /// one-level-coarser neighbor.
    fn edge_constraints(
        &self,
        topo: &QuadTopology,
        ghosts: &[Option<CellArray<Quadrant>>],
        q: &Quadrant,
        order: i32,
        constraints: &mut ConstraintMap,
    ) {
        for e in 0..QUAD_EDGES {
            for t in resolve_neighbor(topo, &q.edge_neighbor(e)) {
                let Some(cover) = self.find_leaf_covering(ghosts, &t) else {
                    continue;
                };
                if cover.level >= q.level {
                    continue;
                }
                assert!(
                    cover.level == q.level - 1,
                    "edge interface between levels {} and {} violates 2:1 balance",
                    q.level,
                    cover.level
                );

                // The shared edge is half of the parent edge, whose lattice
                // is exactly the coarse neighbor's.
                let p = q.parent();
                let along = 1 - (e >> 1);
                let p_along = [p.x, p.y][along];
                let hp = p.side();
                for nd in edge_nodes_of(q, e, order) {
                    let key = canonical_node_key(topo, &nd);
                    if constraints.contains_key(&key) {
                        continue;
                    }
                    let qq = quarter_pos([nd.x, nd.y][along], p_along, hp);
                    if on_coarse_lattice(order, qq) {
                        continue;
                    }
                    let entries = trace_weights(order, qq)
                        .into_iter()
                        .map(|(k, w)| {
                            let cn = edge_lattice_node(&p, e, order, k);
                            (canonical_node_key(topo, &cn), w)
                        })
                        .collect();
                    constraints.insert(key, entries);
                }
            }
        }
    }

    fn node_data(&self) -> &QuadNodeData {
        self.nodes
            .as_ref()
            .expect("create_nodes must be called before node queries")
    }

    /// The element order the nodes were created with.
    pub fn mesh_order(&self) -> i32 {
        self.node_data().order
    }

    /// The node array of a held block: quadrants whose tag carries the
    /// global node index.
    pub fn block_nodes(&self, block: i32) -> Option<&CellArray<Quadrant>> {
        self.node_data().containers[block as usize].as_ref()
    }

    /// All nodes this rank holds, in (block, node) order.
    pub fn nodes(&self) -> impl Iterator<Item = &Quadrant> + '_ {
        self.node_data()
            .containers
            .iter()
            .filter_map(|c| c.as_ref())
            .flat_map(|c| c.iter())
    }

    /// The contiguous range of global node indices owned by this rank.
    pub fn owned_node_range(&self) -> std::ops::Range<i32> {
        let data = self.node_data();
        let rank = self.rank() as usize;
        data.ranges[rank]..data.ranges[rank + 1]
    }

    /// The per-rank prefix of owned node counts.
    pub fn node_ranges(&self) -> &[i32] {
        &self.node_data().ranges
    }

    /// Number of nodes owned by this rank.
    pub fn num_owned_nodes(&self) -> usize {
        self.owned_node_range().len()
    }

    /// Total number of global nodes.
    pub fn num_global_nodes(&self) -> usize {
        *self.node_data().ranges.last().unwrap() as usize
    }

    /// The dependent-node constraints of the nodes on this rank.
    pub fn dep_node_conn(&self) -> &SparseWeights {
        &self.node_data().dep
    }

    /// The element-to-node connectivity of the held leaves: `order^2` global
    /// node indices per leaf in (block, Morton) element order.
    pub fn create_mesh_conn(&self) -> Vec<i32> {
        let data = self.node_data();
        let per_elem = (data.order * data.order) as usize;
        let mut conn = Vec::with_capacity(per_elem * self.num_local_leaves());
        for block in self.held_blocks() {
            let map = data.maps[block as usize].as_ref().unwrap();
            let container = data.containers[block as usize].as_ref().unwrap();
            for leaf in self.block_leaves(block).unwrap().iter() {
                for nd in leaf_nodes(leaf, data.order) {
                    conn.push(container[map[&nd.node_key()]].tag);
                }
            }
        }
        conn
    }

    /// Apply an element-creation hook to every held leaf together with its
    /// global node indices.
    pub fn create_elements_with_nodes<E>(
        &self,
        mut create: impl FnMut(i32, &Quadrant, &[i32]) -> E,
    ) -> Vec<E> {
        let data = self.node_data();
        let mut out = Vec::with_capacity(self.num_local_leaves());
        let mut elem = Vec::new();
        for block in self.held_blocks() {
            let map = data.maps[block as usize].as_ref().unwrap();
            let container = data.containers[block as usize].as_ref().unwrap();
            for leaf in self.block_leaves(block).unwrap().iter() {
                elem.clear();
                for nd in leaf_nodes(leaf, data.order) {
                    elem.push(container[map[&nd.node_key()]].tag);
                }
                out.push(create(data.order, leaf, &elem));
            }
        }
        out
    }

    /// Build the sparse interpolation carrying this forest's independent
    /// owned nodes from the nodes of a coarser forest over the same blocks.
    pub fn create_interpolation(&self, coarse: &QuadForest<'c, C>) -> SparseWeights {
        let data = self.node_data();
        let cdata = coarse.node_data();
        let topo = self.topology();
        let owners = &self.block_owners;
        let rank = self.rank();

        let mut interp = SparseWeights::new();
        for block in self.held_blocks() {
            let container = data.containers[block as usize].as_ref().unwrap();
            let ctree = coarse
                .block_leaves(block)
                .expect("coarse forest does not hold this rank's blocks");
            let cmap = cdata.maps[block as usize]
                .as_ref()
                .expect("coarse forest holds different blocks");
            let ccontainer = cdata.containers[block as usize].as_ref().unwrap();

            for nd in container.iter() {
                let (owner, canonical) = numbering_home(topo, owners, nd);
                if owner != rank || canonical != block {
                    continue;
                }
                if data.constraints.contains_key(&canonical_node_key(topo, nd)) {
                    continue;
                }

                let probe = Quadrant::new(
                    block,
                    MAX_LEVEL,
                    nd.x.min(HMAX - 1),
                    nd.y.min(HMAX - 1),
                );
                let leaf = *ctree
                    .containing_leaf(&probe)
                    .expect("coarse forest does not cover the fine node");

                let h = leaf.side();
                let cs = h / (cdata.order - 1);
                let wx = lagrange(cdata.order, (nd.x - leaf.x) as f64 / h as f64);
                let wy = lagrange(cdata.order, (nd.y - leaf.y) as f64 / h as f64);

                let mut entries = Vec::new();
                for (ky, wy) in wy.iter().enumerate() {
                    for (kx, wx) in wx.iter().enumerate() {
                        let w = wx * wy;
                        if w == 0.0 {
                            continue;
                        }
                        let cn = Quadrant::new(
                            block,
                            leaf.level,
                            leaf.x + kx as i32 * cs,
                            leaf.y + ky as i32 * cs,
                        );
                        let ckey = canonical_node_key(topo, &cn);
                        if cdata.constraints.contains_key(&ckey) {
                            let mut sub = expand_constraint(&ckey, &cdata.constraints);
                            for e in &mut sub {
                                e.1 *= w;
                            }
                            entries.extend(sub);
                        } else {
                            let idx = cmap[&cn.node_key()];
                            entries.push((canonical_node_key(topo, &ccontainer[idx]), w));
                        }
                    }
                }

                let mut iw: Vec<IndexWeight> = entries
                    .into_iter()
                    .map(|(key, w)| {
                        IndexWeight::new(
                            *cdata
                                .canon_index
                                .get(&key)
                                .expect("coarse node missing on this rank"),
                            w,
                        )
                    })
                    .collect();
                IndexWeight::unique_sort(&mut iw);
                interp.push_row(nd.tag, &iw);
            }
        }
        interp
    }
}

/// Substitute dependent entries through their own constraints until only
/// independent nodes remain.
fn expand_constraint(key: &[i32; 4], constraints: &ConstraintMap) -> Vec<([i32; 4], f64)> {
    let mut result = Vec::new();
    let mut stack: Vec<([i32; 4], f64)> = constraints[key].clone();
    let mut steps = 0_usize;
    while let Some((k, w)) = stack.pop() {
        steps += 1;
        assert!(
            steps < 1_000_000,
            "dependent-node constraints do not terminate"
        );
        match constraints.get(&k) {
            Some(sub) => {
                for (k2, w2) in sub {
                    stack.push((*k2, w * w2));
                }
            }
            None => result.push((k, w)),
        }
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_leaf_nodes_counts_and_order() {
        let leaf = Quadrant::new(0, 2, 0, 0);
        let h = leaf.side();
        let linear = leaf_nodes(&leaf, 2);
        assert_eq!(linear.len(), 4);
        assert_eq!((linear[1].x, linear[1].y), (h, 0));
        assert_eq!((linear[3].x, linear[3].y), (h, h));

        let quadratic = leaf_nodes(&leaf, 3);
        assert_eq!(quadratic.len(), 9);
        assert_eq!((quadratic[4].x, quadratic[4].y), (h / 2, h / 2));
    }

    #[test]
    fn test_edge_node_selection() {
        let leaf = Quadrant::new(0, 3, 0, 0);
        let h = leaf.side();
        let edge = edge_nodes_of(&leaf, 3, 3);
        assert_eq!(edge.len(), 3);
        assert!(edge.iter().all(|nd| nd.y == h));

        let lattice = edge_lattice_node(&leaf, 0, 2, 1);
        assert_eq!((lattice.x, lattice.y), (0, h));
    }
}
