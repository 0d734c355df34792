//! Shared value types of the node layer.

/// A node index paired with a constraint or interpolation weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexWeight {
    /// Global node index.
    pub index: i32,
    /// Weight attached to the node.
    pub weight: f64,
}

impl IndexWeight {
    /// Create a new index/weight pair.
    pub fn new(index: i32, weight: f64) -> Self {
        Self { index, weight }
    }

    /// Sort a list of pairs by index and merge duplicates by adding up
    /// their weights.
    pub fn unique_sort(entries: &mut Vec<IndexWeight>) {
        entries.sort_by_key(|e| e.index);
        let mut merged: Vec<IndexWeight> = Vec::with_capacity(entries.len());
        for e in entries.drain(..) {
            match merged.last_mut() {
                Some(last) if last.index == e.index => last.weight += e.weight,
                _ => merged.push(e),
            }
        }
        *entries = merged;
    }
}

/// A CSR-shaped list of weighted node couplings.
///
/// Row `i` couples `nodes[i]` to the node indices
/// `conn[ptr[i]..ptr[i + 1]]` with the matching `weights`. Used both for the
/// dependent-node constraints and for inter-forest interpolations.
#[derive(Clone, Debug, Default)]
pub struct SparseWeights {
    /// The coupled node of each row.
    pub nodes: Vec<i32>,
    /// Row pointer, one longer than `nodes`.
    pub ptr: Vec<i32>,
    /// Column node indices.
    pub conn: Vec<i32>,
    /// Coupling weights.
    pub weights: Vec<f64>,
}

impl SparseWeights {
    /// An empty coupling list.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            ptr: vec![0],
            conn: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a row.
    pub fn push_row(&mut self, node: i32, entries: &[IndexWeight]) {
        self.nodes.push(node);
        for e in entries {
            self.conn.push(e.index);
            self.weights.push(e.weight);
        }
        self.ptr.push(self.conn.len() as i32);
    }

    /// The column indices and weights of row `i`.
    pub fn row(&self, i: usize) -> (&[i32], &[f64]) {
        let lo = self.ptr[i] as usize;
        let hi = self.ptr[i + 1] as usize;
        (&self.conn[lo..hi], &self.weights[lo..hi])
    }
}

/// The 1D Lagrange basis of an element of the given order, evaluated at
/// parametric coordinate `t` in `[0, 1]`.
pub(crate) fn lagrange(order: i32, t: f64) -> Vec<f64> {
    if order == 2 {
        vec![1.0 - t, t]
    } else {
        vec![
            (1.0 - t) * (1.0 - 2.0 * t),
            4.0 * t * (1.0 - t),
            t * (2.0 * t - 1.0),
        ]
    }
}

/// Nonzero trace weights of the coarse 1D basis at quarter-step position
/// `q` in `[0, 4]` along a coarse edge.
pub(crate) fn trace_weights(order: i32, q: i32) -> Vec<(usize, f64)> {
    lagrange(order, q as f64 / 4.0)
        .into_iter()
        .enumerate()
        .filter(|(_, w)| *w != 0.0)
        .collect()
}

/// True if quarter-step position `q` coincides with a coarse lattice node.
pub(crate) fn on_coarse_lattice(order: i32, q: i32) -> bool {
    if order == 2 {
        q % 4 == 0
    } else {
        q % 2 == 0
    }
}

/// Quarter-step position of `t` within the parent extent starting at `pt`
/// of width `hp`.
pub(crate) fn quarter_pos(t: i32, pt: i32, hp: i32) -> i32 {
    debug_assert!(pt <= t && t <= pt + hp);
    ((t - pt) as i64 * 4 / hp as i64) as i32
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_linear_trace_weights() {
        // Midpoint of a coarse edge: half from each end.
        assert_eq!(trace_weights(2, 2), vec![(0, 0.5), (1, 0.5)]);
        assert!(on_coarse_lattice(2, 0) && on_coarse_lattice(2, 4));
        assert!(!on_coarse_lattice(2, 2));
    }

    #[test]
    fn test_quadratic_trace_weights() {
        // Quarter point of a coarse edge: 3/8, 3/4, -1/8.
        let w = trace_weights(3, 1);
        assert_eq!(w.len(), 3);
        assert_eq!(w[0], (0, 0.375));
        assert_eq!(w[1], (1, 0.75));
        assert_eq!(w[2], (2, -0.125));
        assert!((w.iter().map(|(_, v)| v).sum::<f64>() - 1.0).abs() < 1e-15);
        // The coarse midpoint is a lattice hit for quadratic elements.
        assert!(on_coarse_lattice(3, 2));
        assert!(!on_coarse_lattice(3, 1));
    }

    #[test]
    fn test_unique_sort_merges_weights() {
        let mut entries = vec![
            IndexWeight::new(5, 0.25),
            IndexWeight::new(2, 0.5),
            IndexWeight::new(5, 0.25),
        ];
        IndexWeight::unique_sort(&mut entries);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], IndexWeight::new(2, 0.5));
        assert_eq!(entries[1], IndexWeight::new(5, 0.5));
    }

    #[test]
    fn test_sparse_weights_rows() {
        let mut sw = SparseWeights::new();
        sw.push_row(7, &[IndexWeight::new(0, 0.5), IndexWeight::new(1, 0.5)]);
        sw.push_row(9, &[IndexWeight::new(3, 1.0)]);
        assert_eq!(sw.len(), 2);
        let (conn, weights) = sw.row(0);
        assert_eq!(conn, &[0, 1]);
        assert_eq!(weights, &[0.5, 0.5]);
        let (conn, _) = sw.row(1);
        assert_eq!(conn, &[3]);
    }
}
