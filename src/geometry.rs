//! Geometry information.
//!
//! The forest itself works on the integer lattice of each block; physical
//! coordinates only enter when the user attaches corner points to the block
//! connectivity. These helpers evaluate the trilinear (bilinear in 2D) block
//! mapping, which is what I/O collaborators use to place leaves and nodes in
//! space.

use mpi::traits::Equivalence;

use crate::constants::HMAX;
use crate::octant::Octant;
use crate::quadrant::Quadrant;
use crate::topology::BlockTopology;

/// Definition of a point.
#[derive(Clone, Copy, Equivalence)]
pub struct Point {
    coords: [f64; 3],
    global_id: usize,
}

impl Point {
    /// Create a new point from coordinates and global id.
    pub fn new(coords: [f64; 3], global_id: usize) -> Self {
        Self { coords, global_id }
    }

    /// Return the coordinates of the point.
    pub fn coords(&self) -> [f64; 3] {
        self.coords
    }

    /// Return the global id of the point.
    pub fn global_id(&self) -> usize {
        self.global_id
    }
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(x: {}, y: {}, z: {}, id: {})",
            self.coords[0], self.coords[1], self.coords[2], self.global_id
        )
    }
}

/// Evaluate the trilinear mapping of a hexahedral block at parametric
/// coordinates `(u, v, w)` in `[0, 1]^3`.
pub fn trilinear(corners: &[[f64; 3]; 8], u: f64, v: f64, w: f64) -> [f64; 3] {
    let shape = [
        (1.0 - u) * (1.0 - v) * (1.0 - w),
        u * (1.0 - v) * (1.0 - w),
        (1.0 - u) * v * (1.0 - w),
        u * v * (1.0 - w),
        (1.0 - u) * (1.0 - v) * w,
        u * (1.0 - v) * w,
        (1.0 - u) * v * w,
        u * v * w,
    ];

    let mut x = [0.0; 3];
    for (n, corner) in shape.iter().zip(corners.iter()) {
        x[0] += n * corner[0];
        x[1] += n * corner[1];
        x[2] += n * corner[2];
    }
    x
}

/// Evaluate the bilinear mapping of a quadrilateral block at parametric
/// coordinates `(u, v)` in `[0, 1]^2`.
pub fn bilinear(corners: &[[f64; 3]; 4], u: f64, v: f64) -> [f64; 3] {
    let shape = [(1.0 - u) * (1.0 - v), u * (1.0 - v), (1.0 - u) * v, u * v];

    let mut x = [0.0; 3];
    for (n, corner) in shape.iter().zip(corners.iter()) {
        x[0] += n * corner[0];
        x[1] += n * corner[1];
        x[2] += n * corner[2];
    }
    x
}

/// Physical location of an octant's lower corner, when the topology carries
/// corner points.
pub fn octant_location(topo: &BlockTopology, oct: &Octant) -> Option<[f64; 3]> {
    let corners = topo.block_points(oct.block)?;
    let scale = 1.0 / HMAX as f64;
    Some(trilinear(
        &corners,
        oct.x as f64 * scale,
        oct.y as f64 * scale,
        oct.z as f64 * scale,
    ))
}

/// Physical location of a quadrant's lower corner given the block's four
/// corner points.
pub fn quadrant_location(corners: &[[f64; 3]; 4], quad: &Quadrant) -> [f64; 3] {
    let scale = 1.0 / HMAX as f64;
    bilinear(corners, quad.x as f64 * scale, quad.y as f64 * scale)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_trilinear_unit_cube() {
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
        ];
        assert_eq!(trilinear(&corners, 0.25, 0.5, 0.75), [0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_bilinear_stretched_quad() {
        let corners = [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 4.0, 0.0],
            [2.0, 4.0, 0.0],
        ];
        assert_eq!(bilinear(&corners, 0.5, 0.5), [1.0, 2.0, 0.0]);
    }
}
