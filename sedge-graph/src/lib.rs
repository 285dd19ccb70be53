//! Concurrent call-graph accumulator.
//!
//! Many worker threads parse translation units and feed one shared graph:
//! nodes keyed by canonical name (with an optional human-readable username),
//! caller/callee/reference edges, first-writer-wins file locations, and
//! resettable labels. Everything is built on the RCU-protected containers
//! from `sedge-table`, so queries never block and mutation scales with the
//! writer count.
//!
//! Node identity is an index ([`NodeId`]) into the node list, never a
//! pointer: indices survive the containers' buffer swaps, which is what
//! keeps lock-free growth compatible with a graph full of cross-references.
//!
//! The [`capi`] module exports the C-callable surface consumed by the
//! analysis pipeline's AST visitor.

#![warn(missing_docs)]

pub mod capi;
mod graph;
mod iter;

pub use graph::{Graph, Node, NodeId};
pub use iter::NodeIter;
