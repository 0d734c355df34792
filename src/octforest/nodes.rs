//! Global node numbering, dependent-node constraints and mesh connectivity.
//!
//! After balance, every leaf contributes an `order^3` lattice of candidate
//! nodes. Candidates on block boundaries are duplicated into every incident
//! block through the topology transforms and deduplicated per block.
//! Candidates sitting in the interior of a coarser neighbor's face or edge
//! become dependent and carry the trace of the coarse element's shape
//! functions; all others are independent. Every geometric node is numbered
//! exactly once by the lowest rank holding one of its incident blocks, and
//! the assigned indices are broadcast back to every other holder.

use std::collections::{HashMap, HashSet};

use mpi::traits::CommunicatorCollectives;

use crate::constants::{HMAX, MAX_LEVEL, OCT_EDGES, OCT_FACES};
use crate::container::CellArray;
use crate::octant::Octant;
use crate::tools::{gather_to_all, redistribute};
use crate::topology::BlockTopology;
use crate::types::{lagrange, on_coarse_lattice, quarter_pos, trace_weights, IndexWeight, SparseWeights};

use super::{
    canonical_node_key, from_face_coords, in_face_coords, node_copies, resolve_neighbor,
    transverse_axes, OctForest,
};

/// Constraint lists keyed by canonical node key; entries reference canonical
/// keys of the constraining nodes.
type ConstraintMap = HashMap<[i32; 4], Vec<([i32; 4], f64)>>;

/// Everything `create_nodes` builds; invalidated by any forest mutation.
pub(crate) struct NodeData {
    pub(crate) order: i32,
    pub(crate) containers: Vec<Option<CellArray<Octant>>>,
    pub(crate) maps: Vec<Option<HashMap<[i32; 4], usize>>>,
    pub(crate) ranges: Vec<i32>,
    pub(crate) dep: SparseWeights,
    pub(crate) constraints: ConstraintMap,
    pub(crate) canon_index: HashMap<[i32; 4], i32>,
}

/// The `order^3` candidate nodes of a leaf in z-then-y-then-x order with x
/// varying fastest, tagged as unnumbered.
pub(crate) fn leaf_nodes(leaf: &Octant, order: i32) -> Vec<Octant> {
    let step = leaf.side() / (order - 1);
    let mut out = Vec::with_capacity((order * order * order) as usize);
    for kz in 0..order {
        for ky in 0..order {
            for kx in 0..order {
                let mut nd = Octant::new(
                    leaf.block,
                    leaf.level,
                    leaf.x + kx * step,
                    leaf.y + ky * step,
                    leaf.z + kz * step,
                );
                nd.tag = -1;
                out.push(nd);
            }
        }
    }
    out
}

fn axis_coord(o: &Octant, axis: usize) -> i32 {
    [o.x, o.y, o.z][axis]
}

/// The candidate nodes of `o` lying on its face `f`.
fn face_nodes_of(o: &Octant, f: usize, order: i32) -> Vec<Octant> {
    let axis = f >> 1;
    let target = axis_coord(o, axis) + if f & 1 == 1 { o.side() } else { 0 };
    leaf_nodes(o, order)
        .into_iter()
        .filter(|nd| axis_coord(nd, axis) == target)
        .collect()
}

/// The candidate nodes of `o` lying on its edge `e`.
fn edge_nodes_of(o: &Octant, e: usize, order: i32) -> Vec<Octant> {
    let along = e / 4;
    let (t0, t1) = transverse_axes(along);
    let j = e & 3;
    let h = o.side();
    let c0 = axis_coord(o, t0) + if j & 1 == 1 { h } else { 0 };
    let c1 = axis_coord(o, t1) + if j & 2 == 2 { h } else { 0 };
    leaf_nodes(o, order)
        .into_iter()
        .filter(|nd| axis_coord(nd, t0) == c0 && axis_coord(nd, t1) == c1)
        .collect()
}

/// The coarse lattice node (ku, kv) on face `f` of the parent cell `p`.
fn face_lattice_node(p: &Octant, f: usize, order: i32, ku: usize, kv: usize) -> Octant {
    let axis = f >> 1;
    let hp = p.side();
    let cs = hp / (order - 1);
    let (pu, pv) = in_face_coords(axis, p);
    let normal = axis_coord(p, axis) + if f & 1 == 1 { hp } else { 0 };
    let mut nd = from_face_coords(
        p.block,
        f,
        pu + ku as i32 * cs,
        pv + kv as i32 * cs,
        normal,
        p.level,
    );
    nd.tag = -1;
    nd
}

/// The coarse lattice node `k` on edge `e` of the parent cell `p`.
fn edge_lattice_node(p: &Octant, e: usize, order: i32, k: usize) -> Octant {
    let along = e / 4;
    let (t0, t1) = transverse_axes(along);
    let j = e & 3;
    let hp = p.side();
    let cs = hp / (order - 1);
    let mut coords = [p.x, p.y, p.z];
    coords[along] += k as i32 * cs;
    coords[t0] += if j & 1 == 1 { hp } else { 0 };
    coords[t1] += if j & 2 == 2 { hp } else { 0 };
    let mut nd = Octant::new(p.block, p.level, coords[0], coords[1], coords[2]);
    nd.tag = -1;
    nd
}

/// The (owner rank, canonical block) of a node: the lowest rank owning an
/// incident block, and the lowest incident block that rank owns. Identical
/// on every rank that can see the node.
fn numbering_home(topo: &BlockTopology, owners: &[i32], nd: &Octant) -> (i32, i32) {
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

impl<'c, C: CommunicatorCollectives> OctForest<'c, C> {
    /// Create a globally consistent node numbering for elements of the given
    /// order (2 for linear, 3 for quadratic) and classify hanging nodes.
    ///
    /// Collective. The forest must be balanced; non-conforming interfaces
    /// more than one level apart abort.
    pub fn create_nodes(&mut self, order: i32) {
        assert!(order == 2 || order == 3, "element order must be 2 or 3");
        let topo = self.topo_rc();
        if order == 3 {
            assert!(
                self.leaves().all(|o| o.level < MAX_LEVEL),
                "order 3 needs mid-side positions below the deepest level"
            );
        }

        let rank = self.rank();
        let size = self.comm.size() as usize;
        let nblocks = topo.num_blocks();
        let holders = self.block_holders();
        let held: Vec<bool> = self.trees.iter().map(|t| t.is_some()).collect();
        let ghosts = self.exchange_boundary_leaves(&holders);

        // Candidate generation: every held leaf contributes its lattice;
        // boundary candidates are mirrored into every incident held block.
        // Ghost leaves contribute the nodes this rank can see of them: the
        // full lattice for co-held blocks, interface copies otherwise.
        let mut cands: Vec<Vec<Octant>> = vec![Vec::new(); nblocks];
        let push_with_copies = |nd: Octant, into_own: bool, cands: &mut Vec<Vec<Octant>>| {
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
            for leaf in self.trees[block as usize].as_ref().unwrap().iter() {
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

        let mut containers: Vec<Option<CellArray<Octant>>> =
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

        // Dependent classification over every leaf this rank can see, faces
        // first so that face constraints take precedence on shared nodes.
        let sources: Vec<Octant> = self
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
        for o in &sources {
            if o.level > 0 {
                self.face_constraints(&topo, &ghosts, o, order, &mut constraints);
            }
        }
        for o in &sources {
            if o.level > 0 {
                self.edge_constraints(&topo, &ghosts, o, order, &mut constraints);
            }
        }

        // Count and number the nodes this rank owns, in (block, node) order.
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

        let counts = gather_to_all(&[num_owned], self.comm);
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
        debug_assert_eq!(next, ranges[rank as usize] + num_owned);

        // Broadcast the assigned indices to every other copy: to the other
        // holders of the node's own block, to the holders of every incident
        // block, and to this rank's own copies.
        let mut sends: Vec<Vec<Octant>> = vec![Vec::new(); size];
        let mut local_sets: Vec<Octant> = Vec::new();
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
        local_sets.extend(redistribute(&flat, &counts, self.comm));

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

        // Canonical key -> global index over everything this rank can see.
        let mut canon_index = HashMap::new();
        for container in containers.iter().filter_map(|c| c.as_ref()) {
            for nd in container.iter() {
                canon_index.insert(canonical_node_key(&topo, nd), nd.tag);
            }
        }

        // Emit the dependent-node rows for the nodes present on this rank,
        // expanding constraint chains until only independent nodes remain.
        let mut dep = SparseWeights::new();
        let mut emitted = HashSet::new();
        for container in containers.iter().filter_map(|c| c.as_ref()) {
            for nd in container.iter() {
                let key = canonical_node_key(&topo, nd);
                if !constraints.contains_key(&key) || !emitted.insert(key) {
                    continue;
                }
                let mut raw = expand_constraint(&key, &constraints);
                let entries = resolve_entries(&mut raw, &canon_index);
                debug_assert!(
                    (entries.iter().map(|e| e.weight).sum::<f64>() - 1.0).abs() < 1e-12,
                    "dependent-node weights must sum to one"
                );
                dep.push_row(nd.tag, &entries);
            }
        }

        log::debug!(
            "created {} owned nodes ({} dependent rows) on rank {}",
            num_owned,
            dep.len(),
            rank
        );

        self.nodes = Some(NodeData {
            order,
            containers,
            maps,
            ranges,
            dep,
            constraints,
            canon_index,
        });
    }

    /// Record trace constraints for the nodes of `o`'s faces that hang on a
    /// one-level-coarser neighbor.
    fn face_constraints(
        &self,
        topo: &BlockTopology,
        ghosts: &[Option<CellArray<Octant>>],
        o: &Octant,
        order: i32,
        constraints: &mut ConstraintMap,
    ) {
        for f in 0..OCT_FACES {
            for t in resolve_neighbor(topo, &o.face_neighbor(f)) {
                let Some(cover) = self.find_leaf_covering(ghosts, &t) else {
                    continue;
                };
                if cover.level >= o.level {
                    continue;
                }
                assert!(
                    cover.level == o.level - 1,
                    "face interface between levels {} and {} violates 2:1 balance",
                    o.level,
                    cover.level
                );

                // The shared face is a quadrant of the parent face, whose
                // lattice is exactly the coarse neighbor's.
                let p = o.parent();
                let axis = f >> 1;
                let (pu, pv) = in_face_coords(axis, &p);
                let hp = p.side();
                for nd in face_nodes_of(o, f, order) {
                    let key = canonical_node_key(topo, &nd);
                    if constraints.contains_key(&key) {
                        continue;
                    }
                    let (u, v) = in_face_coords(axis, &nd);
                    let (qu, qv) = (quarter_pos(u, pu, hp), quarter_pos(v, pv, hp));
                    if on_coarse_lattice(order, qu) && on_coarse_lattice(order, qv) {
                        continue;
                    }
                    let mut entries = Vec::new();
                    for &(ku, wu) in &trace_weights(order, qu) {
                        for &(kv, wv) in &trace_weights(order, qv) {
                            let cn = face_lattice_node(&p, f, order, ku, kv);
                            entries.push((canonical_node_key(topo, &cn), wu * wv));
                        }
                    }
                    constraints.insert(key, entries);
                }
            }
        }
    }

    /// Record trace constraints for the nodes of `o`'s edges that hang on a
    /// one-level-coarser neighbor sharing only the edge.
    fn edge_constraints(
        &self,
        topo: &BlockTopology,
        ghosts: &[Option<CellArray<Octant>>],
        o: &Octant,
        order: i32,
        constraints: &mut ConstraintMap,
    ) {
        let ci = o.child_index();
        for e in 0..OCT_EDGES {
            // Only edges of o that lie on the parent's matching edge can
            // hang on a diagonal neighbor.
            let along = e / 4;
            let (t0, t1) = transverse_axes(along);
            let j = e & 3;
            if (ci >> t0) & 1 != j & 1 || (ci >> t1) & 1 != (j >> 1) & 1 {
                continue;
            }
            for t in resolve_neighbor(topo, &o.edge_neighbor(e)) {
                let Some(cover) = self.find_leaf_covering(ghosts, &t) else {
                    continue;
                };
                if cover.level >= o.level {
                    continue;
                }
                assert!(
                    cover.level == o.level - 1,
                    "edge interface between levels {} and {} violates 2:1 balance",
                    o.level,
                    cover.level
                );

                let p = o.parent();
                let p_along = axis_coord(&p, along);
                let hp = p.side();
                for nd in edge_nodes_of(o, e, order) {
                    let key = canonical_node_key(topo, &nd);
                    if constraints.contains_key(&key) {
                        continue;
                    }
                    let q = quarter_pos(axis_coord(&nd, along), p_along, hp);
                    if on_coarse_lattice(order, q) {
                        continue;
                    }
                    let entries = trace_weights(order, q)
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

    fn node_data(&self) -> &NodeData {
        self.nodes
            .as_ref()
            .expect("create_nodes must be called before node queries")
    }

    /// The element order the nodes were created with.
    pub fn mesh_order(&self) -> i32 {
        self.node_data().order
    }

    /// The node array of a held block: octants whose tag carries the global
    /// node index.
    pub fn block_nodes(&self, block: i32) -> Option<&CellArray<Octant>> {
        self.node_data().containers[block as usize].as_ref()
    }

    /// All nodes this rank holds, in (block, node) order.
    pub fn nodes(&self) -> impl Iterator<Item = &Octant> + '_ {
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

    /// The per-rank prefix of owned node counts, one longer than the
    /// communicator size.
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

    /// The element-to-node connectivity of the held leaves: `order^3` global
    /// node indices per leaf in (block, Morton) element order.
    pub fn create_mesh_conn(&self) -> Vec<i32> {
        let data = self.node_data();
        let per_elem = (data.order * data.order * data.order) as usize;
        let mut conn = Vec::with_capacity(per_elem * self.num_local_leaves());
        for block in self.held_blocks() {
            let map = data.maps[block as usize].as_ref().unwrap();
            let container = data.containers[block as usize].as_ref().unwrap();
            for leaf in self.block_leaves(block).unwrap().iter() {
                for nd in leaf_nodes(leaf, data.order) {
                    let idx = map[&nd.node_key()];
                    conn.push(container[idx].tag);
                }
            }
        }
        conn
    }

    /// Apply an element-creation hook to every held leaf together with its
    /// global node indices.
    pub fn create_elements_with_nodes<E>(
        &self,
        mut create: impl FnMut(i32, &Octant, &[i32]) -> E,
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
    ///
    /// Both forests need node data; coarse dependent nodes are expanded
    /// through their constraints so that every row couples independent
    /// coarse nodes only.
    pub fn create_interpolation(&self, coarse: &OctForest<'c, C>) -> SparseWeights {
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

                // Locate the coarse leaf whose closed region holds the node.
                let probe = Octant::new(
                    block,
                    MAX_LEVEL,
                    nd.x.min(HMAX - 1),
                    nd.y.min(HMAX - 1),
                    nd.z.min(HMAX - 1),
                );
                let leaf = *ctree
                    .containing_leaf(&probe)
                    .expect("coarse forest does not cover the fine node");

                let h = leaf.side();
                let cs = h / (cdata.order - 1);
                let wx = lagrange(cdata.order, (nd.x - leaf.x) as f64 / h as f64);
                let wy = lagrange(cdata.order, (nd.y - leaf.y) as f64 / h as f64);
                let wz = lagrange(cdata.order, (nd.z - leaf.z) as f64 / h as f64);

                let mut entries = Vec::new();
                for (kz, wz) in wz.iter().enumerate() {
                    for (ky, wy) in wy.iter().enumerate() {
                        for (kx, wx) in wx.iter().enumerate() {
                            let w = wx * wy * wz;
                            if w == 0.0 {
                                continue;
                            }
                            let cn = Octant::new(
                                block,
                                leaf.level,
                                leaf.x + kx as i32 * cs,
                                leaf.y + ky as i32 * cs,
                                leaf.z + kz as i32 * cs,
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
                                entries.push((
                                    canonical_node_key(topo, &ccontainer[idx]),
                                    w,
                                ));
                            }
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

/// Turn canonical-key entries into merged index/weight pairs.
fn resolve_entries(
    entries: &mut Vec<([i32; 4], f64)>,
    canon_index: &HashMap<[i32; 4], i32>,
) -> Vec<IndexWeight> {
    let mut iw: Vec<IndexWeight> = entries
        .drain(..)
        .map(|(key, w)| {
            IndexWeight::new(
                *canon_index
                    .get(&key)
                    .expect("constraining node missing on this rank"),
                w,
            )
        })
        .collect();
    IndexWeight::unique_sort(&mut iw);
    iw
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_leaf_nodes_counts_and_order() {
        let leaf = Octant::new(0, 2, 0, 0, 0);
        let h = leaf.side();
        let linear = leaf_nodes(&leaf, 2);
        assert_eq!(linear.len(), 8);
        // x varies fastest.
        assert_eq!((linear[1].x, linear[1].y, linear[1].z), (h, 0, 0));
        assert_eq!((linear[2].x, linear[2].y, linear[2].z), (0, h, 0));
        assert_eq!((linear[7].x, linear[7].y, linear[7].z), (h, h, h));

        let quadratic = leaf_nodes(&leaf, 3);
        assert_eq!(quadratic.len(), 27);
        assert_eq!(quadratic[13].x, h / 2);
        assert_eq!(quadratic[13].y, h / 2);
        assert_eq!(quadratic[13].z, h / 2);
    }

    #[test]
    fn test_face_and_edge_node_selection() {
        let leaf = Octant::new(0, 3, 0, 0, 0);
        let h = leaf.side();
        let face = face_nodes_of(&leaf, 1, 2);
        assert_eq!(face.len(), 4);
        assert!(face.iter().all(|nd| nd.x == h));

        let edge = edge_nodes_of(&leaf, 0, 3);
        assert_eq!(edge.len(), 3);
        assert!(edge.iter().all(|nd| nd.y == 0 && nd.z == 0));
        assert_eq!(edge[1].x, h / 2);
    }

    #[test]
    fn test_expand_constraint_chains() {
        let a = [0, 0, 0, 0];
        let b = [0, 1, 0, 0];
        let c = [0, 2, 0, 0];
        let d = [0, 3, 0, 0];
        let mut constraints = ConstraintMap::new();
        // a hangs on b and c; b itself hangs on c and d.
        constraints.insert(a, vec![(b, 0.5), (c, 0.5)]);
        constraints.insert(b, vec![(c, 0.5), (d, 0.5)]);

        let mut entries = expand_constraint(&a, &constraints);
        let mut canon = HashMap::new();
        canon.insert(c, 10);
        canon.insert(d, 11);
        let iw = resolve_entries(&mut entries, &canon);
        assert_eq!(iw.len(), 2);
        assert_eq!(iw[0], IndexWeight::new(10, 0.75));
        assert_eq!(iw[1], IndexWeight::new(11, 0.25));
    }
}
