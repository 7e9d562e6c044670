//! Error types for graph construction and editing

use thiserror::Error;

use crate::barrier::BarrierType;
use crate::graph::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    /// Node id does not exist in this graph
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    /// Operation requires a node on the fixed chain
    #[error("node {0:?} is not on the fixed chain")]
    NotFixed(NodeId),

    /// Fixed nodes may only be inserted relative to nodes still on the chain
    #[error("node {0:?} has been removed from the fixed chain")]
    Removed(NodeId),

    /// Node is not an access
    #[error("node {0:?} is not an access")]
    NotAnAccess(NodeId),

    /// An access was classified twice
    #[error("access already classified as {existing}, refusing {requested}")]
    AlreadyClassified {
        existing: BarrierType,
        requested: BarrierType,
    },
}

pub type Result<T> = std::result::Result<T, IrError>;
