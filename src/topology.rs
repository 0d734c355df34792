//! The block-topology graph of a hexahedral block mesh.
//!
//! The user describes the domain as hexahedral blocks, eight corner nodes per
//! block in z-then-y-then-x ordering. From that connectivity this module
//! derives the global face, edge and corner tables together with the
//! orientation codes that map in-face and along-edge coordinates between the
//! blocks sharing them. Every cross-block neighbor query in the forest goes
//! through these transforms.

use std::collections::HashMap;

use crate::constants::{BLOCK_EDGE_NODES, BLOCK_FACE_NODES, HMAX, OCT_CORNERS, OCT_EDGES, OCT_FACES};

/// User-supplied block-node connectivity, optionally with node coordinates.
#[derive(Clone, Debug)]
pub struct BlockConnectivity {
    num_nodes: usize,
    num_blocks: usize,
    conn: Vec<i32>,
    xpts: Option<Vec<[f64; 3]>>,
}

impl BlockConnectivity {
    /// Create a connectivity from eight node indices per block.
    pub fn new(num_nodes: usize, conn: &[i32]) -> Self {
        assert!(
            conn.len() % OCT_CORNERS == 0,
            "connectivity length {} is not a multiple of 8",
            conn.len()
        );
        assert!(
            conn.iter().all(|&n| 0 <= n && (n as usize) < num_nodes),
            "node index out of range"
        );
        Self {
            num_nodes,
            num_blocks: conn.len() / OCT_CORNERS,
            conn: conn.to_vec(),
            xpts: None,
        }
    }

    /// Attach physical node locations, three coordinates per node.
    pub fn with_points(mut self, xpts: &[f64]) -> Self {
        assert_eq!(
            xpts.len(),
            3 * self.num_nodes,
            "expected {} point coordinates, got {}",
            3 * self.num_nodes,
            xpts.len()
        );
        let pts: &[[f64; 3]] = bytemuck::cast_slice(xpts);
        self.xpts = Some(pts.to_vec());
        self
    }

    /// Number of corner nodes in the block mesh.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of blocks in the block mesh.
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// The eight corner node indices of a block.
    pub fn block_nodes(&self, block: i32) -> &[i32] {
        let b = block as usize;
        &self.conn[OCT_CORNERS * b..OCT_CORNERS * (b + 1)]
    }
}

/// A block incident to a global face, from the point of view of a query
/// block: the neighboring block, its local face index and the orientation
/// code carrying in-face coordinates of the query face onto it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceNeighbor {
    /// The adjacent block.
    pub block: i32,
    /// The local face of the adjacent block.
    pub face: usize,
    /// Orientation code, see [`transform_face_coords`].
    pub orient: u8,
}

/// A block incident to a global edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeIncidence {
    /// The incident block.
    pub block: i32,
    /// The local edge of the incident block.
    pub edge: usize,
    /// 1 if the local edge runs against the global edge direction.
    pub orient: u8,
}

/// A block incident to a global corner node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CornerIncidence {
    /// The incident block.
    pub block: i32,
    /// The local corner of the incident block.
    pub corner: usize,
}

/// The derived topology graph. Immutable once constructed and replicated on
/// every rank.
#[derive(Debug)]
pub struct BlockTopology {
    conn: BlockConnectivity,
    num_faces: usize,
    num_edges: usize,
    block_face_ids: Vec<i32>,
    face_blocks: Vec<Vec<(i32, usize)>>,
    block_edge_ids: Vec<i32>,
    edge_blocks: Vec<Vec<EdgeIncidence>>,
    node_blocks: Vec<Vec<CornerIncidence>>,
}

/// Compute the orientation code carrying in-face (u, v) coordinates of the
/// face described by corner node tuple `a` onto the face described by `b`.
///
/// The tuples list the four corner nodes in (u, v) order with u varying
/// fastest; both must contain the same node set. The low two bits give the
/// position of `a`'s origin in `b`, bit 2 is set when the u and v axes swap.
pub fn face_orientation(a: [i32; 4], b: [i32; 4]) -> u8 {
    let j = b
        .iter()
        .position(|&n| n == a[0])
        .expect("faces do not share corner nodes") as u8;
    let j1 = b
        .iter()
        .position(|&n| n == a[1])
        .expect("faces do not share corner nodes") as u8;
    let swap = j1 == j ^ 2;
    debug_assert!(swap || j1 == j ^ 1, "degenerate face orientation");
    j | ((swap as u8) << 2)
}

/// Apply a face orientation code to the in-face coordinates `(u, v)` of an
/// entity of size `h` (zero for point positions, the side length for cells,
/// so that reflected cells keep their lower-corner addressing).
pub fn transform_face_coords(orient: u8, u: i32, v: i32, h: i32) -> (i32, i32) {
    let flip = |t: i32, f: bool| if f { HMAX - h - t } else { t };
    let ju = orient & 1 != 0;
    let jv = orient & 2 != 0;
    if orient & 4 != 0 {
        (flip(v, ju), flip(u, jv))
    } else {
        (flip(u, ju), flip(v, jv))
    }
}

/// The orientation code inverting [`transform_face_coords`] for `orient`.
pub fn invert_face_orientation(orient: u8) -> u8 {
    if orient & 4 == 0 {
        orient
    } else {
        // For swapped codes the origin position transposes.
        let ju = (orient >> 1) & 1;
        let jv = orient & 1;
        ju | (jv << 1) | 4
    }
}

/// Carry an along-edge coordinate of an entity of size `h` between two edge
/// incidences whose orientation bits differ by `rel`.
pub fn transform_edge_coord(rel: u8, t: i32, h: i32) -> i32 {
    if rel != 0 {
        HMAX - h - t
    } else {
        t
    }
}

impl BlockTopology {
    /// Derive the face, edge and corner tables from a block connectivity.
    pub fn new(conn: BlockConnectivity) -> Self {
        let num_blocks = conn.num_blocks();

        // Corner table: mesh node -> incident (block, corner) pairs.
        let mut node_blocks = vec![Vec::new(); conn.num_nodes()];
        for block in 0..num_blocks {
            for (corner, &node) in conn.block_nodes(block as i32).iter().enumerate() {
                node_blocks[node as usize].push(CornerIncidence {
                    block: block as i32,
                    corner,
                });
            }
        }

        // Edge table keyed on the sorted end-node pair. The orientation bit
        // records whether the local edge runs from the smaller to the larger
        // node id.
        let mut edge_ids = HashMap::<(i32, i32), i32>::new();
        let mut block_edge_ids = vec![0; OCT_EDGES * num_blocks];
        let mut edge_blocks: Vec<Vec<EdgeIncidence>> = Vec::new();
        for block in 0..num_blocks {
            let nodes = conn.block_nodes(block as i32);
            for (edge, ends) in BLOCK_EDGE_NODES.iter().enumerate() {
                let (n0, n1) = (nodes[ends[0]], nodes[ends[1]]);
                assert!(n0 != n1, "block {} edge {} is degenerate", block, edge);
                let key = (n0.min(n1), n0.max(n1));
                let next = edge_blocks.len() as i32;
                let id = *edge_ids.entry(key).or_insert(next);
                if id == next {
                    edge_blocks.push(Vec::new());
                }
                block_edge_ids[OCT_EDGES * block + edge] = id;
                edge_blocks[id as usize].push(EdgeIncidence {
                    block: block as i32,
                    edge,
                    orient: (n0 > n1) as u8,
                });
            }
        }

        // Face table keyed on the sorted corner-node quadruple.
        let mut face_ids = HashMap::<[i32; 4], i32>::new();
        let mut block_face_ids = vec![0; OCT_FACES * num_blocks];
        let mut face_blocks: Vec<Vec<(i32, usize)>> = Vec::new();
        for block in 0..num_blocks {
            let nodes = conn.block_nodes(block as i32);
            for (face, corners) in BLOCK_FACE_NODES.iter().enumerate() {
                let mut key = [
                    nodes[corners[0]],
                    nodes[corners[1]],
                    nodes[corners[2]],
                    nodes[corners[3]],
                ];
                key.sort_unstable();
                let next = face_blocks.len() as i32;
                let id = *face_ids.entry(key).or_insert(next);
                if id == next {
                    face_blocks.push(Vec::new());
                }
                block_face_ids[OCT_FACES * block + face] = id;
                face_blocks[id as usize].push((block as i32, face));
            }
        }

        for (id, blocks) in face_blocks.iter().enumerate() {
            assert!(
                blocks.len() <= 2,
                "face {} is shared by {} blocks; the block mesh is not a manifold",
                id,
                blocks.len()
            );
        }

        Self {
            num_faces: face_blocks.len(),
            num_edges: edge_blocks.len(),
            conn,
            block_face_ids,
            face_blocks,
            block_edge_ids,
            edge_blocks,
            node_blocks,
        }
    }

    /// The underlying block connectivity.
    pub fn connectivity(&self) -> &BlockConnectivity {
        &self.conn
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.conn.num_blocks()
    }

    /// Number of distinct global faces.
    pub fn num_faces(&self) -> usize {
        self.num_faces
    }

    /// Number of distinct global edges.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// The corner node tuple of a local face in (u, v) order.
    pub fn face_nodes(&self, block: i32, face: usize) -> [i32; 4] {
        let nodes = self.conn.block_nodes(block);
        let corners = BLOCK_FACE_NODES[face];
        [
            nodes[corners[0]],
            nodes[corners[1]],
            nodes[corners[2]],
            nodes[corners[3]],
        ]
    }

    /// The block on the other side of a local face, with the orientation
    /// code carrying this face's (u, v) coordinates onto it. `None` on the
    /// domain boundary.
    pub fn face_adjacent(&self, block: i32, face: usize) -> Option<FaceNeighbor> {
        let id = self.block_face_ids[OCT_FACES * block as usize + face] as usize;
        let (other_block, other_face) = *self.face_blocks[id]
            .iter()
            .find(|&&(b, f)| (b, f) != (block, face))?;
        let orient = face_orientation(
            self.face_nodes(block, face),
            self.face_nodes(other_block, other_face),
        );
        Some(FaceNeighbor {
            block: other_block,
            face: other_face,
            orient,
        })
    }

    /// All blocks incident to the global edge holding a local edge.
    pub fn edge_incidences(&self, block: i32, edge: usize) -> &[EdgeIncidence] {
        let id = self.block_edge_ids[OCT_EDGES * block as usize + edge] as usize;
        &self.edge_blocks[id]
    }

    /// The orientation bit of a local edge relative to its global edge.
    pub fn edge_orientation(&self, block: i32, edge: usize) -> u8 {
        self.edge_incidences(block, edge)
            .iter()
            .find(|inc| inc.block == block && inc.edge == edge)
            .expect("edge incidence table is complete")
            .orient
    }

    /// All blocks incident to the mesh node at a local corner.
    pub fn corner_incidences(&self, block: i32, corner: usize) -> &[CornerIncidence] {
        let node = self.conn.block_nodes(block)[corner];
        &self.node_blocks[node as usize]
    }

    /// Physical corner locations of a block, when points were supplied.
    pub fn block_points(&self, block: i32) -> Option<[[f64; 3]; 8]> {
        let xpts = self.conn.xpts.as_ref()?;
        let nodes = self.conn.block_nodes(block);
        Some(core::array::from_fn(|k| xpts[nodes[k] as usize]))
    }

    /// Assign blocks to ranks in contiguous chunks.
    pub fn contiguous_partition(&self, size: usize) -> Vec<i32> {
        let n = self.num_blocks();
        (0..n).map(|b| ((b * size) / n.max(1)) as i32).collect()
    }

    /// Assign blocks to ranks by growing face-connected chunks breadth
    /// first. This stands in for an external graph partitioner; the forest
    /// also accepts a caller-supplied assignment.
    pub fn graph_partition(&self, size: usize) -> Vec<i32> {
        let n = self.num_blocks();
        let mut owner = vec![-1_i32; n];
        let chunk = n.div_ceil(size.max(1));
        let mut assigned = 0;
        let mut rank = 0;
        let mut in_rank = 0;

        for seed in 0..n {
            if owner[seed] >= 0 {
                continue;
            }
            let mut queue = std::collections::VecDeque::from([seed]);
            while let Some(b) = queue.pop_front() {
                if owner[b] >= 0 {
                    continue;
                }
                owner[b] = rank as i32;
                assigned += 1;
                in_rank += 1;
                if in_rank == chunk && rank + 1 < size {
                    rank += 1;
                    in_rank = 0;
                    queue.clear();
                    break;
                }
                for face in 0..OCT_FACES {
                    if let Some(nb) = self.face_adjacent(b as i32, face) {
                        if owner[nb.block as usize] < 0 {
                            queue.push_back(nb.block as usize);
                        }
                    }
                }
            }
            if assigned == n {
                break;
            }
        }
        owner
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Two unit blocks stacked along x, sharing the face between them.
    fn two_block_conn() -> BlockConnectivity {
        BlockConnectivity::new(
            12,
            &[
                0, 1, 2, 3, 4, 5, 6, 7, //
                1, 8, 3, 9, 5, 10, 7, 11,
            ],
        )
    }

    #[test]
    fn test_tables_of_two_blocks() {
        let topo = BlockTopology::new(two_block_conn());
        assert_eq!(topo.num_faces(), 11);
        assert_eq!(topo.num_edges(), 20);

        let nb = topo.face_adjacent(0, 1).unwrap();
        assert_eq!((nb.block, nb.face), (1, 0));
        assert_eq!(nb.orient, 0);
        // Interior faces of the pair are boundary faces of the domain.
        assert!(topo.face_adjacent(0, 0).is_none());
        assert!(topo.face_adjacent(1, 1).is_none());
    }

    #[test]
    fn test_identity_face_transform() {
        let (u, v) = transform_face_coords(0, 17, 33, 0);
        assert_eq!((u, v), (17, 33));
    }

    #[test]
    fn test_reflected_face_transform() {
        // Orientation with the origin at corner 1: u reverses.
        let h = 1 << 20;
        let (u, v) = transform_face_coords(1, 0, 5, h);
        assert_eq!((u, v), (HMAX - h, 5));
        let (u, v) = transform_face_coords(1, 0, 5, 0);
        assert_eq!((u, v), (HMAX, 5));
    }

    #[test]
    fn test_swapped_face_transform_inverts() {
        for orient in 0..8u8 {
            let inv = invert_face_orientation(orient);
            for &(u, v) in &[(0, 0), (123, 77), (HMAX, 5)] {
                let (tu, tv) = transform_face_coords(orient, u, v, 0);
                assert_eq!(transform_face_coords(inv, tu, tv, 0), (u, v));
            }
        }
    }

    #[test]
    fn test_face_orientation_codes() {
        // Same tuple: identity.
        assert_eq!(face_orientation([4, 5, 6, 7], [4, 5, 6, 7]), 0);
        // u axis reversed.
        assert_eq!(face_orientation([4, 5, 6, 7], [5, 4, 7, 6]), 1);
        // Axes swapped.
        assert_eq!(face_orientation([4, 5, 6, 7], [4, 6, 5, 7]), 4);
    }

    #[test]
    fn test_edge_orientation() {
        // Second block lists the shared edge in the opposite direction:
        // its nodes 0..4 run against block 0's.
        let conn = BlockConnectivity::new(
            14,
            &[
                0, 1, 2, 3, 4, 5, 6, 7, //
                3, 8, 1, 9, 10, 11, 12, 13,
            ],
        );
        let topo = BlockTopology::new(conn);
        // Block 0 edge 1 is (2, 3); block 1 edge 0 is (3, 1)... the shared
        // global edge between the blocks is (1, 3).
        let shared: Vec<_> = topo
            .edge_incidences(0, 5)
            .iter()
            .copied()
            .collect();
        assert_eq!(shared.len(), 2);
        let a = shared.iter().find(|i| i.block == 0).unwrap();
        let b = shared.iter().find(|i| i.block == 1).unwrap();
        assert_ne!(a.orient, b.orient);
    }

    #[test]
    fn test_corner_incidences() {
        let topo = BlockTopology::new(two_block_conn());
        let shared = topo.corner_incidences(0, 1);
        assert_eq!(shared.len(), 2);
        let lone = topo.corner_incidences(0, 0);
        assert_eq!(lone.len(), 1);
        assert_eq!(lone[0], CornerIncidence { block: 0, corner: 0 });
    }

    #[test]
    fn test_partitions_cover_all_blocks() {
        let topo = BlockTopology::new(two_block_conn());
        assert_eq!(topo.contiguous_partition(2), vec![0, 1]);
        let owners = topo.graph_partition(2);
        assert!(owners.iter().all(|&r| r == 0 || r == 1));
    }
}
