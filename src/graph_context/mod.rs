/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

//! A minimal host for the relation index: entity worlds with id recycling
//! and deferred deletion, wired to one [`RelationIndex`].

use tracing::debug;

use crate::{
    config::{IndexConfig, RelationKind},
    errors::{IndexError, Result},
    graph::{
        host::{RelationHost, WorldRole},
        relation_index::RelationIndex,
    },
    types::{EntityID, RelationID, VertexID, NULL_ENTITY},
};

/// Entity ids of one role. Deletions are buffered until [`World::flush`];
/// a buffered id stays alive and is not reused before then.
pub struct World {
    role: WorldRole,
    next: EntityID,
    free: Vec<EntityID>,
    alive: Vec<bool>,
    live: usize,
    pending: Vec<EntityID>,
    buffered: Vec<bool>,
}

impl World {
    pub fn new(
        role: WorldRole,
        capacity: usize,
    ) -> Self {
        Self {
            role,
            next: 1,
            free: Vec::new(),
            alive: vec![false; capacity.max(2)],
            live: 0,
            pending: Vec::new(),
            buffered: vec![false; capacity.max(2)],
        }
    }

    pub fn role(&self) -> WorldRole {
        self.role
    }

    pub fn capacity(&self) -> usize {
        self.alive.len()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_alive(
        &self,
        id: EntityID,
    ) -> bool {
        self.alive.get(id as usize).copied().unwrap_or(false)
    }

    pub fn pending(&self) -> &[EntityID] {
        &self.pending
    }

    /// Allocates an id, reusing flushed ids first. Capacity doubles when the
    /// id would not fit.
    pub fn create(&mut self) -> EntityID {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        };

        if id as usize >= self.alive.len() {
            let mut cap = self.alive.len();
            while cap <= id as usize {
                cap *= 2;
            }
            debug!(role = ?self.role, from = self.alive.len(), to = cap, "world.grow");
            self.alive.resize(cap, false);
            self.buffered.resize(cap, false);
        }

        self.alive[id as usize] = true;
        self.live += 1;
        id
    }

    /// Buffers `id` for deletion. Returns false if it is not alive or
    /// already buffered.
    pub fn delete(
        &mut self,
        id: EntityID,
    ) -> bool {
        if id == NULL_ENTITY || !self.is_alive(id) || self.buffered[id as usize] {
            return false;
        }
        self.buffered[id as usize] = true;
        self.pending.push(id);
        true
    }

    /// Finalizes buffered deletions and returns the released ids in buffer
    /// order.
    pub fn flush(&mut self) -> Vec<EntityID> {
        let ids = std::mem::take(&mut self.pending);
        for id in ids.iter() {
            self.alive[*id as usize] = false;
            self.buffered[*id as usize] = false;
            self.free.push(*id);
        }
        self.live -= ids.len();
        ids
    }
}

impl RelationHost for World {
    fn allocate_relation_entity(&mut self) -> RelationID {
        self.create()
    }

    fn release_relation_entity(
        &mut self,
        id: RelationID,
    ) {
        self.delete(id);
    }

    fn relation_capacity(&self) -> usize {
        self.capacity()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub vertices: usize,
    pub relations: usize,
}

/// Start, end and relation worlds driving one relation index. Under a loop
/// kind a single vertex world plays both roles.
pub struct GraphContext {
    start: World,
    end: Option<World>,
    relations: World,
    index: RelationIndex,
}

impl GraphContext {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            start: World::new(WorldRole::Start, config.vertex_capacity),
            end: match config.kind {
                RelationKind::Directed => Some(World::new(WorldRole::End, config.vertex_capacity)),
                RelationKind::Loop => None,
            },
            relations: World::new(WorldRole::Relation, config.relation_capacity),
            index: RelationIndex::new(config),
        }
    }

    pub fn index(&self) -> &RelationIndex {
        &self.index
    }

    pub fn start_world(&self) -> &World {
        &self.start
    }

    pub fn end_world(&self) -> &World {
        self.end.as_ref().unwrap_or(&self.start)
    }

    pub fn relation_world(&self) -> &World {
        &self.relations
    }

    pub fn create_start(&mut self) -> VertexID {
        let before = self.start.capacity();
        let id = self.start.create();
        if self.start.capacity() != before {
            self.index
                .on_capacity_grown(WorldRole::Start, self.start.capacity());
        }
        id
    }

    pub fn create_end(&mut self) -> VertexID {
        match self.end.as_mut() {
            Some(end) => {
                let before = end.capacity();
                let id = end.create();
                if end.capacity() != before {
                    self.index.on_capacity_grown(WorldRole::End, end.capacity());
                }
                id
            }
            None => self.create_start(),
        }
    }

    /// Buffers a start vertex deletion; its relations go at the next flush.
    pub fn delete_start(
        &mut self,
        vertex: VertexID,
    ) -> bool {
        self.start.delete(vertex)
    }

    pub fn delete_end(
        &mut self,
        vertex: VertexID,
    ) -> bool {
        match self.end.as_mut() {
            Some(end) => end.delete(vertex),
            None => self.start.delete(vertex),
        }
    }

    /// Buffers a relation entity deletion, bypassing the index. The index
    /// learns about it at the next flush.
    pub fn delete_relation(
        &mut self,
        relation: RelationID,
    ) -> bool {
        self.relations.delete(relation)
    }

    /// Relates two live vertices. Ids never created, or already flushed,
    /// are rejected.
    pub fn connect(
        &mut self,
        start: VertexID,
        end: VertexID,
    ) -> Result<RelationID> {
        if start != NULL_ENTITY && !self.start.is_alive(start) {
            return Err(IndexError::VertexUndefined(start));
        }
        if end != NULL_ENTITY && !self.end_world().is_alive(end) {
            return Err(IndexError::VertexUndefined(end));
        }
        self.index.get_or_new(start, end, &mut self.relations)
    }

    pub fn disconnect(
        &mut self,
        start: VertexID,
        end: VertexID,
    ) -> Result<RelationID> {
        self.index.del_pair(start, end, &mut self.relations)
    }

    pub fn inverse(
        &mut self,
        relation: RelationID,
    ) -> Result<RelationID> {
        self.index.get_inverse(relation, &mut self.relations)
    }

    /// Finalizes buffered deletions: vertex worlds first, so their cascades
    /// land in the relation world's buffer, then the relation world.
    pub fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        let starts = self.start.flush();
        report.vertices += starts.len();
        self.index
            .on_entities_released(WorldRole::Start, &starts, &mut self.relations);

        if let Some(end) = self.end.as_mut() {
            let ends = end.flush();
            report.vertices += ends.len();
            self.index
                .on_entities_released(WorldRole::End, &ends, &mut self.relations);
        }

        let relations = self.relations.flush();
        report.relations = relations.len();
        self.index
            .on_entities_released(WorldRole::Relation, &relations, &mut self.relations);

        if report != FlushReport::default() {
            debug!(
                vertices = report.vertices,
                relations = report.relations,
                "graph_context.flush"
            );
        }
        report
    }

    pub fn tear_down(self) {
        self.index.tear_down();
    }
}
