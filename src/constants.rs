//! Constants shared across the crate.

/// Maximum refinement level of an octant or quadrant.
///
/// Coordinates live on the integer lattice of the deepest level, so the
/// side length of a cell at `level` is `1 << (MAX_LEVEL - level)`.
pub const MAX_LEVEL: i32 = 30;

/// Extent of a block along each axis on the deepest level.
pub const HMAX: i32 = 1 << MAX_LEVEL;

/// Number of children of an octant.
pub const OCT_CHILDREN: usize = 8;

/// Number of faces of an octant or hexahedral block.
pub const OCT_FACES: usize = 6;

/// Number of edges of an octant or hexahedral block.
pub const OCT_EDGES: usize = 12;

/// Number of corners of an octant or hexahedral block.
pub const OCT_CORNERS: usize = 8;

/// Number of children of a quadrant.
pub const QUAD_CHILDREN: usize = 4;

/// Number of edges of a quadrant or quadrilateral block.
pub const QUAD_EDGES: usize = 4;

/// Number of corners of a quadrant or quadrilateral block.
pub const QUAD_CORNERS: usize = 4;

/// Corner nodes of the six local faces of a hexahedral block.
///
/// Blocks are described by eight nodes in z-then-y-then-x ordering, so node
/// `k` sits at `((k & 1), (k >> 1) & 1, (k >> 2) & 1)`. Each face lists its
/// four corners in in-face (u, v) ordering with u varying fastest; the
/// in-face axes of faces 0/1, 2/3 and 4/5 are (y, z), (x, z) and (x, y).
pub const BLOCK_FACE_NODES: [[usize; 4]; OCT_FACES] = [
    [0, 2, 4, 6],
    [1, 3, 5, 7],
    [0, 1, 4, 5],
    [2, 3, 6, 7],
    [0, 1, 2, 3],
    [4, 5, 6, 7],
];

/// End nodes of the twelve local edges of a hexahedral block.
///
/// Edges 0-3 run along x, 4-7 along y and 8-11 along z; within each group the
/// index bits select the transverse sides in axis order.
pub const BLOCK_EDGE_NODES: [[usize; 2]; OCT_EDGES] = [
    [0, 1],
    [2, 3],
    [4, 5],
    [6, 7],
    [0, 2],
    [1, 3],
    [4, 6],
    [5, 7],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// End nodes of the four local edges of a quadrilateral block.
///
/// Edges 0/1 run along y at x = 0/1, edges 2/3 run along x at y = 0/1,
/// matching the face numbering of the quadrant (x faces first).
pub const QUAD_BLOCK_EDGE_NODES: [[usize; 2]; QUAD_EDGES] = [
    [0, 2],
    [1, 3],
    [0, 1],
    [2, 3],
];
