/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

//! Relation index for an entity store: a pair-keyed hash index, per-vertex
//! adjacency baskets and a dense relation info table kept consistent by one
//! façade, [`RelationIndex`].

pub mod config;
pub mod errors;
pub mod graph;
pub mod graph_context;
pub mod types;

pub use config::{ConfigOptionField, IndexConfig, RelationKind};
pub use errors::{IndexError, Result};
pub use graph::{EdgeDir, RelationHost, RelationIndex, RelationInfo, WorldRole};
pub use graph_context::{GraphContext, World};
