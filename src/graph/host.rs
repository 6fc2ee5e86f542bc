/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use crate::types::RelationID;

/// Which host world a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldRole {
    Start,
    End,
    Relation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeDir {
    /// Relations where the vertex is the start.
    Outgoing,
    /// Relations where the vertex is the end.
    Incoming,
    Both,
}

impl EdgeDir {
    pub fn includes_outgoing(self) -> bool {
        matches!(self, EdgeDir::Outgoing | EdgeDir::Both)
    }

    pub fn includes_incoming(self) -> bool {
        matches!(self, EdgeDir::Incoming | EdgeDir::Both)
    }
}

/// Requests the relation index issues to the entity manager owning the
/// relation world. The index never invents relation ids.
pub trait RelationHost {
    /// A fresh, non-zero relation id.
    fn allocate_relation_entity(&mut self) -> RelationID;

    /// The host's deletion request path for a relation entity. The host may
    /// defer the release and report it back later through
    /// `RelationIndex::on_entities_released`; that report is a no-op for
    /// relations the index already unbound.
    fn release_relation_entity(
        &mut self,
        id: RelationID,
    );

    /// Current capacity of the relation world.
    fn relation_capacity(&self) -> usize;
}
