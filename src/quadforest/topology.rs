//! The block-topology graph of a quadrilateral block mesh.
//!
//! The 2D analogue of [`crate::topology`]: blocks are quadrilaterals with
//! four corner nodes in y-then-x ordering, connected through shared edges
//! (two orientations) and corners (no orientation).

use std::collections::HashMap;

use crate::constants::{QUAD_BLOCK_EDGE_NODES, QUAD_CORNERS, QUAD_EDGES};

/// User-supplied block-node connectivity of a quadrilateral mesh.
#[derive(Clone, Debug)]
pub struct QuadConnectivity {
    num_nodes: usize,
    num_blocks: usize,
    conn: Vec<i32>,
    xpts: Option<Vec<[f64; 3]>>,
}

impl QuadConnectivity {
    /// Create a connectivity from four node indices per block.
    pub fn new(num_nodes: usize, conn: &[i32]) -> Self {
        assert!(
            conn.len() % QUAD_CORNERS == 0,
            "connectivity length {} is not a multiple of 4",
            conn.len()
        );
        assert!(
            conn.iter().all(|&n| 0 <= n && (n as usize) < num_nodes),
            "node index out of range"
        );
        Self {
            num_nodes,
            num_blocks: conn.len() / QUAD_CORNERS,
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

    /// The four corner node indices of a block.
    pub fn block_nodes(&self, block: i32) -> &[i32] {
        let b = block as usize;
        &self.conn[QUAD_CORNERS * b..QUAD_CORNERS * (b + 1)]
    }
}

/// The block on the other side of a local edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadEdgeNeighbor {
    /// The adjacent block.
    pub block: i32,
    /// The local edge of the adjacent block.
    pub edge: usize,
    /// 1 if the along-edge coordinate reverses across the interface.
    pub orient: u8,
}

/// A block incident to a global corner node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadCornerIncidence {
    /// The incident block.
    pub block: i32,
    /// The local corner of the incident block.
    pub corner: usize,
}

/// The derived 2D topology graph. Immutable and replicated on every rank.
#[derive(Debug)]
pub struct QuadTopology {
    conn: QuadConnectivity,
    num_edges: usize,
    block_edge_ids: Vec<i32>,
    edge_blocks: Vec<Vec<(i32, usize)>>,
    node_blocks: Vec<Vec<QuadCornerIncidence>>,
}

impl QuadTopology {
    /// Derive the edge and corner tables from a block connectivity.
    pub fn new(conn: QuadConnectivity) -> Self {
        let num_blocks = conn.num_blocks();

        let mut node_blocks = vec![Vec::new(); conn.num_nodes()];
        for block in 0..num_blocks {
            for (corner, &node) in conn.block_nodes(block as i32).iter().enumerate() {
                node_blocks[node as usize].push(QuadCornerIncidence {
                    block: block as i32,
                    corner,
                });
            }
        }

        let mut edge_ids = HashMap::<(i32, i32), i32>::new();
        let mut block_edge_ids = vec![0; QUAD_EDGES * num_blocks];
        let mut edge_blocks: Vec<Vec<(i32, usize)>> = Vec::new();
        for block in 0..num_blocks {
            let nodes = conn.block_nodes(block as i32);
            for (edge, ends) in QUAD_BLOCK_EDGE_NODES.iter().enumerate() {
                let (n0, n1) = (nodes[ends[0]], nodes[ends[1]]);
                assert!(n0 != n1, "block {} edge {} is degenerate", block, edge);
                let key = (n0.min(n1), n0.max(n1));
                let next = edge_blocks.len() as i32;
                let id = *edge_ids.entry(key).or_insert(next);
                if id == next {
                    edge_blocks.push(Vec::new());
                }
                block_edge_ids[QUAD_EDGES * block + edge] = id;
                edge_blocks[id as usize].push((block as i32, edge));
            }
        }

        for (id, blocks) in edge_blocks.iter().enumerate() {
            assert!(
                blocks.len() <= 2,
                "edge {} is shared by {} blocks; the block mesh is not a manifold",
                id,
                blocks.len()
            );
        }

        Self {
            num_edges: edge_blocks.len(),
            conn,
            block_edge_ids,
            edge_blocks,
            node_blocks,
        }
    }

    /// The underlying block connectivity.
    pub fn connectivity(&self) -> &QuadConnectivity {
        &self.conn
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.conn.num_blocks()
    }

    /// Number of distinct global edges.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// The end node tuple of a local edge in along-edge order.
    pub fn edge_nodes(&self, block: i32, edge: usize) -> [i32; 2] {
        let nodes = self.conn.block_nodes(block);
        let ends = QUAD_BLOCK_EDGE_NODES[edge];
        [nodes[ends[0]], nodes[ends[1]]]
    }

    /// The block on the other side of a local edge, with the orientation bit
    /// carrying this edge's along coordinate onto it. `None` on the domain
    /// boundary.
    pub fn edge_adjacent(&self, block: i32, edge: usize) -> Option<QuadEdgeNeighbor> {
        let id = self.block_edge_ids[QUAD_EDGES * block as usize + edge] as usize;
        let (other_block, other_edge) = *self.edge_blocks[id]
            .iter()
            .find(|&&(b, e)| (b, e) != (block, edge))?;
        let mine = self.edge_nodes(block, edge);
        let theirs = self.edge_nodes(other_block, other_edge);
        debug_assert!(mine[0] == theirs[0] || mine[0] == theirs[1]);
        Some(QuadEdgeNeighbor {
            block: other_block,
            edge: other_edge,
            orient: (mine[0] != theirs[0]) as u8,
        })
    }

    /// All blocks incident to the mesh node at a local corner.
    pub fn corner_incidences(&self, block: i32, corner: usize) -> &[QuadCornerIncidence] {
        let node = self.conn.block_nodes(block)[corner];
        &self.node_blocks[node as usize]
    }

    /// Physical corner locations of a block, when points were supplied.
    pub fn block_points(&self, block: i32) -> Option<[[f64; 3]; 4]> {
        let xpts = self.conn.xpts.as_ref()?;
        let nodes = self.conn.block_nodes(block);
        Some(core::array::from_fn(|k| xpts[nodes[k] as usize]))
    }

    /// Assign blocks to ranks in contiguous chunks.
    pub fn contiguous_partition(&self, size: usize) -> Vec<i32> {
        let n = self.num_blocks();
        (0..n).map(|b| ((b * size) / n.max(1)) as i32).collect()
    }

    /// Assign blocks to ranks by growing edge-connected chunks breadth
    /// first. Stands in for an external graph partitioner.
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
                for edge in 0..QUAD_EDGES {
                    if let Some(nb) = self.edge_adjacent(b as i32, edge) {
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

    /// Two unit quads side by side along x.
    fn two_quads() -> QuadConnectivity {
        QuadConnectivity::new(6, &[0, 1, 2, 3, 1, 4, 3, 5])
    }

    #[test]
    fn test_edge_tables() {
        let topo = QuadTopology::new(two_quads());
        assert_eq!(topo.num_edges(), 7);
        let nb = topo.edge_adjacent(0, 1).unwrap();
        assert_eq!((nb.block, nb.edge, nb.orient), (1, 0, 0));
        assert!(topo.edge_adjacent(0, 0).is_none());
    }

    #[test]
    fn test_reversed_edge_orientation() {
        // The second block lists the shared edge upside down.
        let conn = QuadConnectivity::new(6, &[0, 1, 2, 3, 3, 4, 1, 5]);
        let topo = QuadTopology::new(conn);
        let nb = topo.edge_adjacent(0, 1).unwrap();
        assert_eq!((nb.block, nb.edge), (1, 0));
        assert_eq!(nb.orient, 1);
    }

    #[test]
    fn test_corner_incidences() {
        let topo = QuadTopology::new(two_quads());
        assert_eq!(topo.corner_incidences(0, 1).len(), 2);
        assert_eq!(topo.corner_incidences(0, 0).len(), 1);
    }
}
