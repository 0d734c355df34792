//! A Rust based distributed forest-of-octrees library
//!
//! This library maintains adaptively refined hexahedral (octree) and
//! quadrilateral (quadtree) element meshes over a user-supplied topology of
//! connected blocks, distributed across MPI ranks.
//!
//! Each block of the input mesh carries one octree whose leaves partition
//! the block. Leaves are addressed by bit-encoded octants ordered along the
//! Morton curve, so neighbor, ancestor and containment queries are integer
//! arithmetic. Where octrees meet across block faces, edges and corners,
//! orientation codes derived from the block connectivity map coordinates
//! between the adjacent frames.
//!
//! On top of the octant calculus the forest provides the operations of an
//! AMR session: local refinement, 2:1 balance with parallel ghost exchange,
//! space-filling-curve repartitioning, and the construction of a globally
//! consistent node numbering with dependent-node constraints at
//! non-conforming interfaces.
//!
//! ## Using the library
//!
//! A forest is created on a communicator, given a block connectivity, and
//! then driven through the usual session:
//!
//! ```
//! use octforest::{BlockConnectivity, OctForest};
//!
//! let universe = mpi::initialize().unwrap();
//! let comm = universe.world();
//!
//! // A single unit-cube block.
//! let conn = BlockConnectivity::new(8, &[0, 1, 2, 3, 4, 5, 6, 7]);
//!
//! let mut forest = OctForest::new(&comm);
//! forest.set_connectivity(conn, false);
//! forest.create_trees(2);
//! forest.balance(false);
//! forest.create_nodes(2);
//!
//! assert_eq!(forest.num_global_leaves(), 64);
//! assert_eq!(forest.num_global_nodes(), 125);
//! let conn = forest.create_mesh_conn();
//! assert_eq!(conn.len(), 8 * forest.num_local_leaves());
//! ```
//!
//! All forest operations that communicate are collective over the forest's
//! communicator; within a rank the library is single threaded. Note that in
//! `debug` mode a number of invariant checks run after every forest
//! mutation which cost noticeable time for larger forests. These checks are
//! disabled in `release` mode.
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod constants;
pub mod container;
pub mod geometry;
pub mod octant;
pub mod octforest;
pub mod parsort;
pub mod quadforest;
pub mod quadrant;
pub mod tools;
pub mod topology;
pub mod types;

pub use crate::octant::Octant;
pub use crate::octforest::OctForest;
pub use crate::quadforest::topology::{QuadConnectivity, QuadTopology};
pub use crate::quadforest::QuadForest;
pub use crate::quadrant::Quadrant;
pub use crate::topology::{BlockConnectivity, BlockTopology};
pub use crate::types::{IndexWeight, SparseWeights};
