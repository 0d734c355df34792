//! Sorted cell containers shared by the 3D and 2D forests.
//!
//! A [`CellArray`] is a sorted, uniquified list of octants or quadrants with
//! binary search, node-aware search, merge, linearization and sibling
//! collapse. A [`CellQueue`] provides FIFO growth during ripple traversals,
//! and [`CellArray::node_index_map`] builds the hash from (block,
//! coordinates) to array position used for constant-time node lookup.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use crate::constants::MAX_LEVEL;
use crate::octant::Octant;
use crate::quadrant::Quadrant;

/// The cell operations the containers and forest algorithms need, implemented
/// by [`Octant`] and [`Quadrant`].
pub trait TreeCell: Copy + Ord + std::hash::Hash + std::fmt::Debug {
    /// Number of children of a cell (8 in 3D, 4 in 2D).
    const CHILDREN: usize;

    /// The block index the cell belongs to.
    fn block(&self) -> i32;
    /// The refinement level.
    fn level(&self) -> i32;
    /// The containing cell one level up.
    fn parent(&self) -> Self;
    /// The `k`-th child cell.
    fn child(&self, k: usize) -> Self;
    /// Local index within the parent.
    fn child_index(&self) -> usize;
    /// Ancestor-or-equal test.
    fn contains(&self, other: &Self) -> bool;
    /// Comparison ignoring level and tag.
    fn cmp_nodes(&self, other: &Self) -> Ordering;
    /// The cell's lower corner as a deepest-level cell, used for point
    /// location in sorted leaf arrays.
    fn anchor(&self) -> Self;
    /// Hashable (block, coordinates) key.
    fn node_key(&self) -> [i32; 4];
    /// User payload.
    fn tag(&self) -> i32;
    /// Replace the user payload.
    fn set_tag(&mut self, tag: i32);
}

impl TreeCell for Octant {
    const CHILDREN: usize = crate::constants::OCT_CHILDREN;

    fn block(&self) -> i32 {
        self.block
    }
    fn level(&self) -> i32 {
        self.level
    }
    fn parent(&self) -> Self {
        Octant::parent(self)
    }
    fn child(&self, k: usize) -> Self {
        Octant::child(self, k)
    }
    fn child_index(&self) -> usize {
        Octant::child_index(self)
    }
    fn contains(&self, other: &Self) -> bool {
        Octant::contains(self, other)
    }
    fn cmp_nodes(&self, other: &Self) -> Ordering {
        Octant::cmp_nodes(self, other)
    }
    fn anchor(&self) -> Self {
        let mut a = *self;
        a.level = MAX_LEVEL;
        a
    }
    fn node_key(&self) -> [i32; 4] {
        Octant::node_key(self)
    }
    fn tag(&self) -> i32 {
        self.tag
    }
    fn set_tag(&mut self, tag: i32) {
        self.tag = tag;
    }
}

impl TreeCell for Quadrant {
    const CHILDREN: usize = crate::constants::QUAD_CHILDREN;

    fn block(&self) -> i32 {
        self.block
    }
    fn level(&self) -> i32 {
        self.level
    }
    fn parent(&self) -> Self {
        Quadrant::parent(self)
    }
    fn child(&self, k: usize) -> Self {
        Quadrant::child(self, k)
    }
    fn child_index(&self) -> usize {
        Quadrant::child_index(self)
    }
    fn contains(&self, other: &Self) -> bool {
        Quadrant::contains(self, other)
    }
    fn cmp_nodes(&self, other: &Self) -> Ordering {
        Quadrant::cmp_nodes(self, other)
    }
    fn anchor(&self) -> Self {
        let mut a = *self;
        a.level = MAX_LEVEL;
        a
    }
    fn node_key(&self) -> [i32; 4] {
        Quadrant::node_key(self)
    }
    fn tag(&self) -> i32 {
        self.tag
    }
    fn set_tag(&mut self, tag: i32) {
        self.tag = tag;
    }
}

/// A sorted, uniquified array of cells.
#[derive(Clone, Debug, Default)]
pub struct CellArray<T: TreeCell> {
    cells: Vec<T>,
}

impl<T: TreeCell> CellArray<T> {
    /// Create an empty array.
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Sort and uniquify a batch of cells. Duplicates keep the first entry,
    /// so tags of earlier cells win.
    pub fn from_cells(mut cells: Vec<T>) -> Self {
        cells.sort_unstable();
        cells.dedup();
        Self { cells }
    }

    /// Number of stored cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if no cells are stored.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cells as a sorted slice.
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    /// Iterate over the cells in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }

    /// Iterate mutably over the cells. Tags do not participate in the
    /// ordering, so callers may update them in place.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.cells.iter_mut()
    }

    /// Mutable access to the cell at `idx`, for tag updates.
    pub fn cell_mut(&mut self, idx: usize) -> &mut T {
        &mut self.cells[idx]
    }

    /// Consume the array, returning the sorted cells.
    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }

    /// Insert a cell, keeping the array sorted.
    ///
    /// With `as_node` set a cell describing an already stored geometric
    /// node is dropped regardless of level; otherwise only an exact
    /// (coordinates, level) duplicate is dropped.
    pub fn insert(&mut self, cell: T, as_node: bool) {
        if as_node {
            if let Err(idx) = self.cells.binary_search_by(|probe| probe.cmp_nodes(&cell)) {
                self.cells.insert(idx, cell);
            }
        } else if let Err(idx) = self.cells.binary_search(&cell) {
            self.cells.insert(idx, cell);
        }
    }

    /// Search for a stored cell.
    ///
    /// With `as_node` set the level is ignored, which is the lookup used for
    /// node deduplication; otherwise the exact (coordinates, level) entry is
    /// required.
    pub fn contains(&self, q: &T, as_node: bool) -> Option<&T> {
        if as_node {
            let idx = self
                .cells
                .binary_search_by(|probe| probe.cmp_nodes(q))
                .ok()?;
            Some(&self.cells[idx])
        } else {
            let idx = self.cells.binary_search(q).ok()?;
            Some(&self.cells[idx])
        }
    }

    /// Mutable variant of [`contains`](Self::contains), used to assign node
    /// tags in place.
    pub fn contains_mut(&mut self, q: &T, as_node: bool) -> Option<&mut T> {
        let idx = if as_node {
            self.cells
                .binary_search_by(|probe| probe.cmp_nodes(q))
                .ok()?
        } else {
            self.cells.binary_search(q).ok()?
        };
        Some(&mut self.cells[idx])
    }

    /// The leaf whose region contains the lower corner of `q`, if any.
    ///
    /// In a leaf array that partitions a region this locates the unique leaf
    /// covering the point; in a partial array it returns `None` when the
    /// point falls outside every stored leaf.
    pub fn containing_leaf(&self, q: &T) -> Option<&T> {
        let anchor = q.anchor();
        let idx = self.cells.partition_point(|probe| *probe <= anchor);
        if idx == 0 {
            return None;
        }
        let candidate = &self.cells[idx - 1];
        candidate.contains(&anchor).then_some(candidate)
    }

    /// Union with another sorted array, deduplicating.
    pub fn merge(&mut self, other: &CellArray<T>) {
        let mut merged = Vec::with_capacity(self.cells.len() + other.cells.len());
        let (mut i, mut j) = (0, 0);
        while i < self.cells.len() && j < other.cells.len() {
            match self.cells[i].cmp(&other.cells[j]) {
                Ordering::Less => {
                    merged.push(self.cells[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(other.cells[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(self.cells[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.cells[i..]);
        merged.extend_from_slice(&other.cells[j..]);
        self.cells = merged;
    }

    /// Remove every cell that is an ancestor of a later cell, keeping the
    /// finest refinement only.
    pub fn linearize(&mut self) {
        if self.cells.len() < 2 {
            return;
        }
        let mut kept = Vec::with_capacity(self.cells.len());
        for i in 0..self.cells.len() - 1 {
            if !self.cells[i].contains(&self.cells[i + 1]) {
                kept.push(self.cells[i]);
            }
        }
        kept.push(*self.cells.last().unwrap());
        self.cells = kept;
    }

    /// Collapse every complete group of `T::CHILDREN` same-level siblings
    /// into their parent. A single pass; repeated application coarsens
    /// further.
    pub fn coarsen(&mut self) {
        let mut out = Vec::with_capacity(self.cells.len());
        let mut i = 0;
        while i < self.cells.len() {
            let cell = self.cells[i];
            let group = i + T::CHILDREN <= self.cells.len()
                && cell.level() > 0
                && cell.child_index() == 0
                && (1..T::CHILDREN).all(|k| {
                    let s = self.cells[i + k];
                    s.level() == cell.level() && s.child_index() == k && s.parent() == cell.parent()
                });
            if group {
                out.push(cell.parent());
                i += T::CHILDREN;
            } else {
                out.push(cell);
                i += 1;
            }
        }
        self.cells = out;
    }

    /// Sort by node position and drop entries describing the same geometric
    /// node, keeping the coarsest-level entry of each group.
    pub fn unique_nodes(&mut self) {
        self.cells.sort_unstable();
        self.cells.dedup_by(|b, a| a.cmp_nodes(b) == Ordering::Equal);
    }

    /// Build the hash from (block, coordinates) to array index for
    /// constant-time node lookup.
    pub fn node_index_map(&self) -> HashMap<[i32; 4], usize> {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| (cell.node_key(), idx))
            .collect()
    }
}

impl<T: TreeCell> std::ops::Index<usize> for CellArray<T> {
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        &self.cells[idx]
    }
}

impl<'a, T: TreeCell> IntoIterator for &'a CellArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Partition `region` into leaves refined exactly as far as the demands
/// inside it require. `demands` must be sorted and contained in `region`;
/// emitted leaves inherit `region`'s tag.
pub(crate) fn complete_region<T: TreeCell>(region: T, demands: &[T], out: &mut Vec<T>) {
    if demands.iter().all(|d| d.level() <= region.level()) {
        out.push(region);
        return;
    }
    let mut rest = demands;
    for k in 0..T::CHILDREN {
        let child = region.child(k);
        let n = rest.iter().take_while(|d| child.contains(d)).count();
        let (mine, remainder) = rest.split_at(n);
        rest = remainder;
        complete_region(child, mine, out);
    }
    debug_assert!(rest.is_empty(), "refinement demand outside its region");
}

/// FIFO queue of cells used while draining balance ripples.
#[derive(Debug, Default)]
pub struct CellQueue<T: TreeCell> {
    queue: VecDeque<T>,
}

impl<T: TreeCell> CellQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append a cell.
    pub fn push(&mut self, cell: T) {
        self.queue.push_back(cell);
    }

    /// Remove and return the oldest cell.
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Number of queued cells.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::octant::Octant;

    fn refined(block: i32, level: i32) -> Vec<Octant> {
        let mut cells = vec![Octant::root(block)];
        for _ in 0..level {
            cells = cells
                .iter()
                .flat_map(|c| c.children())
                .collect::<Vec<_>>();
        }
        cells
    }

    #[test]
    fn test_from_cells_sorts_and_dedups() {
        let mut cells = refined(0, 2);
        cells.extend(refined(0, 2));
        cells.reverse();
        let arr = CellArray::from_cells(cells);
        assert_eq!(arr.len(), 64);
        for pair in arr.as_slice().windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_insert_keeps_sorted_and_unique() {
        let mut arr = CellArray::from_cells(refined(0, 1));
        let extra = Octant::root(0).child(2).child(5);
        arr.insert(extra, false);
        assert_eq!(arr.len(), 9);
        arr.insert(extra, false);
        assert_eq!(arr.len(), 9);
        for pair in arr.as_slice().windows(2) {
            assert!(pair[0] < pair[1]);
        }

        // As a node, a finer duplicate of a stored position is dropped.
        let mut finer = Octant::root(0).child(0);
        finer.level = 6;
        arr.insert(finer, true);
        assert_eq!(arr.len(), 9);
        arr.insert(finer, false);
        assert_eq!(arr.len(), 10);
    }

    #[test]
    fn test_contains_level_and_node_search() {
        let arr = CellArray::from_cells(refined(0, 1));
        let q = Octant::root(0).child(3);
        assert!(arr.contains(&q, false).is_some());
        let mut as_node = q;
        as_node.level = 5;
        assert!(arr.contains(&as_node, false).is_none());
        assert!(arr.contains(&as_node, true).is_some());
    }

    #[test]
    fn test_containing_leaf() {
        let mut cells = refined(0, 1);
        // Refine one child further so levels are mixed.
        let fine = cells.remove(7);
        cells.extend(fine.children());
        let arr = CellArray::from_cells(cells);

        let probe = fine.child(2);
        assert_eq!(arr.containing_leaf(&probe), Some(&fine.child(2)));
        let coarse_probe = Octant::root(0).child(0).child(1);
        assert_eq!(arr.containing_leaf(&coarse_probe), Some(&Octant::root(0).child(0)));
        let outside = Octant::new(1, 2, 0, 0, 0);
        assert!(arr.containing_leaf(&outside).is_none());
    }

    #[test]
    fn test_coarsen_inverts_uniform_refine() {
        let mut arr = CellArray::from_cells(refined(0, 3));
        arr.coarsen();
        assert_eq!(arr.len(), 64);
        arr.coarsen();
        arr.coarsen();
        assert_eq!(arr.as_slice(), &[Octant::root(0)]);
    }

    #[test]
    fn test_coarsen_skips_incomplete_families() {
        let mut cells = refined(0, 1);
        cells.remove(5);
        let mut arr = CellArray::from_cells(cells);
        arr.coarsen();
        assert_eq!(arr.len(), 7);
    }

    #[test]
    fn test_linearize_drops_ancestors() {
        let root = Octant::root(0);
        let mut cells = vec![root, root.child(1)];
        cells.extend(root.child(1).children());
        let mut arr = CellArray::from_cells(cells);
        arr.linearize();
        assert_eq!(arr.len(), 8);
        assert!(arr.iter().all(|c| c.level == 2));
    }

    #[test]
    fn test_merge_unions() {
        let a = CellArray::from_cells(refined(0, 1));
        let mut b = CellArray::from_cells(refined(1, 1));
        b.merge(&a);
        assert_eq!(b.len(), 16);
        let mut c = CellArray::from_cells(refined(0, 1));
        c.merge(&a);
        assert_eq!(c.len(), 8);
    }

    #[test]
    fn test_unique_nodes_keeps_coarsest() {
        let mut fine = Octant::new(0, 3, 0, 0, 0);
        fine.tag = 7;
        let mut coarse = Octant::new(0, 1, 0, 0, 0);
        coarse.tag = 3;
        let mut arr = CellArray::from_cells(vec![fine, coarse]);
        arr.unique_nodes();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0].tag, 3);
        assert_eq!(arr.node_index_map().len(), 1);
    }
}
