/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

pub mod host;
pub mod list;
pub mod matrix;
pub mod relation_index;

pub use host::{EdgeDir, RelationHost, WorldRole};
pub use relation_index::{RelationIndex, RelationIndexStats, RelationInfo, RelationIter};
