//! 2:1 balance refinement of the forest.
//!
//! Balance runs the Bern-Eppstein ripple: every leaf demands that the
//! same-size neighbors of its parent exist, demands that are not yet covered
//! by an equal-or-finer leaf are recorded and ripple further, and demands
//! whose target block lives on other ranks are shipped there in an
//! all-to-all exchange. Rounds repeat until a global reduction reports no
//! demand left in flight; the demand sets are then folded back into the leaf
//! arrays by completing each original leaf towards its recorded refinements.

use std::collections::HashSet;

use mpi::collective::SystemOperation;
use mpi::traits::CommunicatorCollectives;

use crate::constants::{OCT_CORNERS, OCT_EDGES, OCT_FACES};
use crate::container::{complete_region, CellArray, CellQueue};
use crate::octant::Octant;
use crate::tools::redistribute;
use crate::topology::BlockTopology;

use super::{resolve_neighbor, OctForest};

/// Routes demands to the local queue and the per-rank send buffers.
struct DemandRouter {
    queue: CellQueue<Octant>,
    outgoing: Vec<Vec<Octant>>,
    sent: HashSet<(i32, Octant)>,
}

impl DemandRouter {
    fn route(&mut self, d: Octant, rank: i32, held: &[bool], holders: &[Vec<i32>]) {
        if held[d.block as usize] {
            self.queue.push(d);
        }
        for &r in &holders[d.block as usize] {
            if r != rank && self.sent.insert((r, d)) {
                self.outgoing[r as usize].push(d);
            }
        }
    }
}

/// The octants that must exist so that `o` satisfies the 2:1 condition: the
/// neighbors of its parent, resolved into the frames of the blocks holding
/// them.
fn neighbor_demands(topo: &BlockTopology, o: &Octant, balance_corner: bool) -> Vec<Octant> {
    let p = o.parent();
    let mut demands = Vec::new();
    for f in 0..OCT_FACES {
        demands.extend(resolve_neighbor(topo, &p.face_neighbor(f)));
    }
    if balance_corner {
        for e in 0..OCT_EDGES {
            demands.extend(resolve_neighbor(topo, &p.edge_neighbor(e)));
        }
        for c in 0..OCT_CORNERS {
            demands.extend(resolve_neighbor(topo, &p.corner_neighbor(c)));
        }
    }
    demands
}

impl<'c, C: CommunicatorCollectives> OctForest<'c, C> {
    /// Enforce the 2:1 condition across faces; with `balance_corner` set
    /// also across edges and corners.
    ///
    /// Balance is collective, idempotent, and leaves every held block
    /// partitioned exactly as before except for the insertions the 2:1
    /// condition requires.
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

        let mut inserted: Vec<HashSet<Octant>> = vec![HashSet::new(); nblocks];
        let mut router = DemandRouter {
            queue: CellQueue::new(),
            outgoing: vec![Vec::new(); size],
            sent: HashSet::new(),
        };

        // Seed with the demands of the existing leaves. Level-1 leaves only
        // demand level-0 neighbors, which every block satisfies by
        // construction.
        let seeds: Vec<Octant> = self.leaves().filter(|o| o.level >= 2).copied().collect();
        for o in &seeds {
            for d in neighbor_demands(&topo, o, balance_corner) {
                router.route(d, rank, &held, &holders);
            }
        }

        let mut round = 0;
        loop {
            // Drain the local queue, rippling fresh insertions.
            while let Some(q) = router.queue.pop() {
                let b = q.block as usize;
                let Some(tree) = &self.trees[b] else {
                    continue;
                };
                if inserted[b].contains(&q) {
                    continue;
                }
                // Skip demands already covered by an equal-or-finer leaf,
                // and demands whose region this rank does not hold.
                match tree.containing_leaf(&q) {
                    None => continue,
                    Some(leaf) if leaf.level >= q.level => continue,
                    Some(_) => {}
                }
                inserted[b].insert(q);
                if q.level >= 2 {
                    for d in neighbor_demands(&topo, &q, balance_corner) {
                        router.route(d, rank, &held, &holders);
                    }
                }
            }

            // Exchange pending demands; quiesce once no rank has any left.
            let local_out: usize = router.outgoing.iter().map(|v| v.len()).sum();
            let mut global_out = 0_usize;
            self.comm
                .all_reduce_into(&local_out, &mut global_out, SystemOperation::sum());
            if global_out == 0 {
                break;
            }

            let mut flat = Vec::with_capacity(local_out);
            let mut counts = Vec::with_capacity(size);
            for bucket in &mut router.outgoing {
                counts.push(bucket.len() as i32);
                flat.append(bucket);
            }
            for d in redistribute(&flat, &counts, self.comm) {
                router.queue.push(d);
            }

            round += 1;
            log::debug!("balance round {}: {} demands in flight", round, global_out);
        }

        // Fold the demand sets back into the leaf arrays: each original leaf
        // is completed towards the demands recorded inside it.
        for block in 0..nblocks {
            if self.trees[block].is_none() || inserted[block].is_empty() {
                continue;
            }
            let mut demands: Vec<Octant> = inserted[block].drain().collect();
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

        debug_assert!(self.held_blocks_linear());
        debug_assert!(self.locally_balanced());
        log::debug!(
            "balance finished after {} rounds with {} leaves on rank {}",
            round,
            self.num_local_leaves(),
            rank
        );
    }

    /// True if every held tree is sorted with no overlapping leaves.
    pub(crate) fn held_blocks_linear(&self) -> bool {
        self.trees.iter().filter_map(|t| t.as_ref()).all(|tree| {
            tree.as_slice()
                .windows(2)
                .all(|w| w[0] < w[1] && !w[0].contains(&w[1]))
        })
    }

    /// True if no held leaf sees an in-rank face neighbor more than one
    /// level coarser. Cross-rank interfaces are checked collectively by the
    /// node layer.
    fn locally_balanced(&self) -> bool {
        let topo = self.topology();
        for leaf in self.leaves() {
            if leaf.level < 2 {
                continue;
            }
            let p = leaf.parent();
            for f in 0..OCT_FACES {
                for t in resolve_neighbor(topo, &p.face_neighbor(f)) {
                    if let Some(tree) = &self.trees[t.block as usize] {
                        if let Some(cover) = tree.containing_leaf(&t) {
                            if cover.level < t.level {
                                return false;
                            }
                        }
                    }
                }
            }
        }
        true
    }
}
