//! Error types for mirror tree operations
//!
//! Simple, flat error hierarchy. No over-engineering.

use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("invalid node type code: {0}")]
    InvalidNodeType(u8),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
