/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

pub type EntityID = u32;
pub type VertexID = EntityID;
pub type RelationID = EntityID;

/// Reserved id: "no entity", "no relation", "no node".
pub const NULL_ENTITY: EntityID = 0;
