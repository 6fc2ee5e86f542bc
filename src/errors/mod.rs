/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use thiserror::Error;

use crate::types::{EntityID, RelationID, VertexID};

pub type Result<T> = std::result::Result<T, IndexError>;

/// Contract violations on keys and ids.
///
/// Pool-index violations (node 0, basket 0, count underflow) never reach
/// this type; they are `debug_assert!`s inside the lists.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("key ({0}, {1}) already present")]
    KeyExists(EntityID, EntityID),
    #[error("key ({0}, {1}) undefined")]
    KeyUndefined(EntityID, EntityID),
    #[error("vertex {0} undefined")]
    VertexUndefined(VertexID),
    #[error("relation {0} undefined")]
    RelationUndefined(RelationID),
    #[error("entity id 0 is reserved")]
    NullEntity,
    #[error("inconsistent index: {0}")]
    Inconsistent(String),
    #[error("invalid config value for {field}: {reason}")]
    Config {
        field: &'static str,
        reason: String,
    },
}
