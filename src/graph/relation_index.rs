/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use tracing::{debug, trace};

use crate::{
    config::{IndexConfig, RelationKind},
    errors::{IndexError, Result},
    types::{RelationID, VertexID, NULL_ENTITY},
};

use super::{
    host::{EdgeDir, RelationHost, WorldRole},
    list::{
        basket_list::{BasketIter, BasketList},
        forward_list::AdjacencySnapshot,
    },
    matrix::sparse_matrix::SparseMatrix,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationInfo {
    pub start: VertexID,
    pub end: VertexID,
}

impl RelationInfo {
    pub fn is_empty(&self) -> bool {
        self.start == NULL_ENTITY && self.end == NULL_ENTITY
    }
}

// basket nodes holding a bound relation, for O(1) unlinking
#[derive(Clone, Copy, Debug, Default)]
struct RelationLinks {
    start_node: u32,
    end_node: u32,
}

// the side of a shared basket an iterator keeps
#[derive(Clone, Copy, Debug)]
enum Role {
    Start(VertexID),
    End(VertexID),
}

#[derive(Clone, Copy, Debug)]
enum Cascade {
    None,
    Start(VertexID),
    End(VertexID),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelationIndexStats {
    pub relations: usize,
    pub relation_capacity: usize,
    pub vertex_capacity: usize,
    pub matrix_capacity: usize,
    pub basket_nodes: usize,
}

/// Pair index, relation info table and adjacency baskets kept in lockstep.
///
/// Every mutation goes through this type and updates all three structures
/// before returning; precondition failures leave all three untouched.
/// Under [`RelationKind::Loop`] one basket per vertex serves both roles and
/// `end` is `None`.
pub struct RelationIndex {
    kind: RelationKind,
    matrix: SparseMatrix,
    info: Vec<RelationInfo>,
    links: Vec<RelationLinks>,
    start: BasketList,
    end: Option<BasketList>,
}

impl RelationIndex {
    pub fn new(config: &IndexConfig) -> Self {
        let relation_capacity = config.relation_capacity.max(1);
        let baskets = || BasketList::new(config.vertex_capacity, config.node_pool_capacity);
        Self {
            kind: config.kind,
            matrix: SparseMatrix::from_config(config),
            info: vec![RelationInfo::default(); relation_capacity],
            links: vec![RelationLinks::default(); relation_capacity],
            start: baskets(),
            end: match config.kind {
                RelationKind::Directed => Some(baskets()),
                RelationKind::Loop => None,
            },
        }
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Number of bound relations.
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    pub fn relation_capacity(&self) -> usize {
        self.info.len()
    }

    pub fn vertex_capacity(&self) -> usize {
        self.start
            .basket_capacity()
            .max(self.end_baskets().basket_capacity())
    }

    pub fn stats(&self) -> RelationIndexStats {
        RelationIndexStats {
            relations: self.len(),
            relation_capacity: self.relation_capacity(),
            vertex_capacity: self.vertex_capacity(),
            matrix_capacity: self.matrix.capacity(),
            basket_nodes: self.start.node_count()
                + self.end.as_ref().map_or(0, |e| e.node_count()),
        }
    }

    pub fn has_relation(
        &self,
        start: VertexID,
        end: VertexID,
    ) -> bool {
        self.matrix.has_key(start, end)
    }

    pub fn try_get_relation(
        &self,
        start: VertexID,
        end: VertexID,
    ) -> Option<RelationID> {
        self.matrix.try_get_value(start, end)
    }

    pub fn get_relation(
        &self,
        start: VertexID,
        end: VertexID,
    ) -> Result<RelationID> {
        self.matrix.get_value(start, end)
    }

    pub fn is_bound(
        &self,
        relation: RelationID,
    ) -> bool {
        self.try_info(relation).is_some()
    }

    pub fn try_info(
        &self,
        relation: RelationID,
    ) -> Option<RelationInfo> {
        self.info
            .get(relation as usize)
            .copied()
            .filter(|i| relation != NULL_ENTITY && !i.is_empty())
    }

    pub fn info(
        &self,
        relation: RelationID,
    ) -> Result<RelationInfo> {
        self.try_info(relation)
            .ok_or(IndexError::RelationUndefined(relation))
    }

    /// Creates the relation `(start, end)` with an id drawn from `host`.
    pub fn new_relation(
        &mut self,
        start: VertexID,
        end: VertexID,
        host: &mut impl RelationHost,
    ) -> Result<RelationID> {
        if start == NULL_ENTITY || end == NULL_ENTITY {
            return Err(IndexError::NullEntity);
        }
        if self.matrix.has_key(start, end) {
            return Err(IndexError::KeyExists(start, end));
        }

        let id = host.allocate_relation_entity();
        debug_assert!(id != NULL_ENTITY, "host allocated the null relation id");
        if id as usize >= self.info.len() {
            // the host grew its relation world while allocating
            self.grow_relations(host.relation_capacity().max(id as usize + 1));
        }
        debug_assert!(self.info[id as usize].is_empty(), "relation {id} reused while bound");

        self.bind(id, start, end);
        trace!(relation = id, start, end, "relation.new");
        Ok(id)
    }

    pub fn get_or_new(
        &mut self,
        start: VertexID,
        end: VertexID,
        host: &mut impl RelationHost,
    ) -> Result<RelationID> {
        match self.matrix.try_get_value(start, end) {
            Some(id) => Ok(id),
            None => self.new_relation(start, end, host),
        }
    }

    /// The relation `(end, start)` of a bound relation, created if absent.
    pub fn get_inverse(
        &mut self,
        relation: RelationID,
        host: &mut impl RelationHost,
    ) -> Result<RelationID> {
        let info = self.info(relation)?;
        self.get_or_new(info.end, info.start, host)
    }

    /// Unbinds `relation` and asks the host to release its entity.
    pub fn del(
        &mut self,
        relation: RelationID,
        host: &mut impl RelationHost,
    ) -> Result<()> {
        if !self.is_bound(relation) {
            return Err(IndexError::RelationUndefined(relation));
        }
        let info = self.unbind(relation, Cascade::None);
        host.release_relation_entity(relation);
        trace!(relation, start = info.start, end = info.end, "relation.del");
        Ok(())
    }

    pub fn try_del(
        &mut self,
        relation: RelationID,
        host: &mut impl RelationHost,
    ) -> bool {
        self.del(relation, host).is_ok()
    }

    pub fn del_pair(
        &mut self,
        start: VertexID,
        end: VertexID,
        host: &mut impl RelationHost,
    ) -> Result<RelationID> {
        let relation = self.matrix.get_value(start, end)?;
        self.del(relation, host)?;
        Ok(relation)
    }

    pub fn try_del_pair(
        &mut self,
        start: VertexID,
        end: VertexID,
        host: &mut impl RelationHost,
    ) -> bool {
        self.del_pair(start, end, host).is_ok()
    }

    /// Deletes every relation in `vertex`'s start basket, then drops the
    /// basket. Under a loop kind that is every relation touching `vertex`.
    pub fn del_start(
        &mut self,
        vertex: VertexID,
        host: &mut impl RelationHost,
    ) -> usize {
        if vertex == NULL_ENTITY {
            return 0;
        }
        let relations: Vec<RelationID> = self.start.iter(vertex).collect();
        for r in relations.iter() {
            self.unbind(*r, Cascade::Start(vertex));
            host.release_relation_entity(*r);
        }
        let dropped = self.start.remove_basket(vertex);
        debug_assert_eq!(dropped, relations.len());

        if !relations.is_empty() {
            debug!(vertex, removed = relations.len(), "relation.cascade_start");
        }
        relations.len()
    }

    /// Deletes every relation in `vertex`'s end basket, then drops the
    /// basket. Under a loop kind this is the same as [`Self::del_start`].
    pub fn del_end(
        &mut self,
        vertex: VertexID,
        host: &mut impl RelationHost,
    ) -> usize {
        if vertex == NULL_ENTITY {
            return 0;
        }
        let relations: Vec<RelationID> = self.end_baskets().iter(vertex).collect();
        for r in relations.iter() {
            self.unbind(*r, Cascade::End(vertex));
            host.release_relation_entity(*r);
        }
        let dropped = self.end_baskets_mut().remove_basket(vertex);
        debug_assert_eq!(dropped, relations.len());

        if !relations.is_empty() {
            debug!(vertex, removed = relations.len(), "relation.cascade_end");
        }
        relations.len()
    }

    pub fn has_start(
        &self,
        vertex: VertexID,
    ) -> bool {
        self.start_relations(vertex).next().is_some()
    }

    pub fn has_end(
        &self,
        vertex: VertexID,
    ) -> bool {
        self.end_relations(vertex).next().is_some()
    }

    /// Relations whose start is `vertex`, most recent first.
    pub fn start_relations(
        &self,
        vertex: VertexID,
    ) -> RelationIter<'_> {
        RelationIter {
            inner: self.start.iter(vertex),
            info: &self.info,
            filter: match self.kind {
                RelationKind::Directed => None,
                RelationKind::Loop => Some(Role::Start(vertex)),
            },
        }
    }

    /// Relations whose end is `vertex`, most recent first.
    pub fn end_relations(
        &self,
        vertex: VertexID,
    ) -> RelationIter<'_> {
        RelationIter {
            inner: self.end_baskets().iter(vertex),
            info: &self.info,
            filter: match self.kind {
                RelationKind::Directed => None,
                RelationKind::Loop => Some(Role::End(vertex)),
            },
        }
    }

    /// Incident relation count. `Both` counts a self-loop twice.
    pub fn degree(
        &self,
        vertex: VertexID,
        dir: EdgeDir,
    ) -> usize {
        let mut count = 0;
        if dir.includes_outgoing() {
            count += match self.kind {
                RelationKind::Directed => self.start.count(vertex),
                RelationKind::Loop => self.start_relations(vertex).count(),
            };
        }
        if dir.includes_incoming() {
            count += match self.kind {
                RelationKind::Directed => self.end_baskets().count(vertex),
                RelationKind::Loop => self.end_relations(vertex).count(),
            };
        }
        count
    }

    /// Rebuilds `out` with the neighbors of each source: the end of every
    /// outgoing relation and/or the start of every incoming one. Returns the
    /// number of values pushed.
    pub fn snapshot_neighbors(
        &self,
        sources: &[VertexID],
        dir: EdgeDir,
        out: &mut impl AdjacencySnapshot,
    ) -> usize {
        out.clear();
        out.resize(self.vertex_capacity());

        let mut pushed = 0;
        for &v in sources {
            if v == NULL_ENTITY {
                continue;
            }
            if dir.includes_outgoing() {
                for r in self.start_relations(v) {
                    out.push(v, self.info[r as usize].end);
                    pushed += 1;
                }
            }
            if dir.includes_incoming() {
                for r in self.end_relations(v) {
                    out.push(v, self.info[r as usize].start);
                    pushed += 1;
                }
            }
        }
        pushed
    }

    pub fn on_capacity_grown(
        &mut self,
        role: WorldRole,
        new_capacity: usize,
    ) {
        match role {
            WorldRole::Start => self.start.resize(new_capacity),
            WorldRole::End => self.end_baskets_mut().resize(new_capacity),
            WorldRole::Relation => self.grow_relations(new_capacity),
        }
    }

    /// Reacts to a flushed deletion buffer of the given world.
    ///
    /// Vertex ids cascade through their baskets. Relation ids take the
    /// reverse path: still-bound relations are unbound without calling back
    /// into the host, already unbound ones are skipped.
    pub fn on_entities_released(
        &mut self,
        role: WorldRole,
        ids: &[u32],
        host: &mut impl RelationHost,
    ) {
        match role {
            WorldRole::Start => {
                for v in ids {
                    self.del_start(*v, host);
                }
            }
            WorldRole::End => {
                for v in ids {
                    self.del_end(*v, host);
                }
            }
            WorldRole::Relation => {
                for r in ids {
                    if self.is_bound(*r) {
                        let info = self.unbind(*r, Cascade::None);
                        trace!(relation = *r, start = info.start, end = info.end, "relation.released");
                    }
                }
            }
        }
    }

    /// Releases every structure. The index is consumed.
    pub fn tear_down(self) {
        debug!(relations = self.len(), "relation_index.tear_down");
    }

    /// Checks that matrix, info table and baskets describe the same
    /// relations, reporting the first disagreement found.
    pub fn verify(&self) -> Result<()> {
        let inconsistent = |msg: String| Err(IndexError::Inconsistent(msg));

        for (s, e, r) in self.matrix.iter() {
            match self.try_info(r) {
                Some(i) if i.start == s && i.end == e => {}
                other => {
                    return inconsistent(format!("matrix ({s}, {e}) -> {r} but info is {other:?}"))
                }
            }
        }

        let mut bound = 0;
        let mut self_loops = 0;
        for (r, i) in self.info.iter().enumerate().skip(1) {
            if i.is_empty() {
                continue;
            }
            bound += 1;
            if i.start == NULL_ENTITY || i.end == NULL_ENTITY {
                return inconsistent(format!("relation {r} half bound: {i:?}"));
            }
            if self.matrix.try_get_value(i.start, i.end) != Some(r as u32) {
                return inconsistent(format!("info {r} = {i:?} missing from matrix"));
            }

            let l = self.links[r];
            if self.start.pool().node(l.start_node).value != r as u32 {
                return inconsistent(format!("relation {r} start node {} stale", l.start_node));
            }
            if self.end_baskets().pool().node(l.end_node).value != r as u32 {
                return inconsistent(format!("relation {r} end node {} stale", l.end_node));
            }
            if self.end.is_none() && i.start == i.end {
                self_loops += 1;
            }
        }
        if bound != self.matrix.len() {
            return inconsistent(format!(
                "{bound} bound relations but matrix holds {}",
                self.matrix.len()
            ));
        }

        let expected_nodes = match self.end {
            Some(_) => 2 * bound,
            None => 2 * bound - self_loops,
        };
        let basket_nodes = self.stats().basket_nodes;
        if basket_nodes != expected_nodes {
            return inconsistent(format!(
                "{basket_nodes} basket nodes, expected {expected_nodes}"
            ));
        }

        for v in 1..self.start.basket_capacity() as u32 {
            for r in self.start.iter(v) {
                let i = self.info[r as usize];
                let member = match self.end {
                    Some(_) => i.start == v,
                    None => i.start == v || i.end == v,
                };
                if !member {
                    return inconsistent(format!("basket {v} holds unrelated relation {r}"));
                }
            }
        }
        if let Some(end) = self.end.as_ref() {
            for v in 1..end.basket_capacity() as u32 {
                for r in end.iter(v) {
                    if self.info[r as usize].end != v {
                        return inconsistent(format!("end basket {v} holds unrelated relation {r}"));
                    }
                }
            }
        }

        Ok(())
    }

    fn end_baskets(&self) -> &BasketList {
        self.end.as_ref().unwrap_or(&self.start)
    }

    fn end_baskets_mut(&mut self) -> &mut BasketList {
        match self.end.as_mut() {
            Some(end) => end,
            None => &mut self.start,
        }
    }

    fn grow_relations(
        &mut self,
        capacity: usize,
    ) {
        if capacity <= self.info.len() {
            return;
        }
        debug!(from = self.info.len(), to = capacity, "relation_index.grow_relations");
        self.info.resize(capacity, RelationInfo::default());
        self.links.resize(capacity, RelationLinks::default());
    }

    fn bind(
        &mut self,
        id: RelationID,
        start: VertexID,
        end: VertexID,
    ) {
        let prev = self.matrix.set(start, end, id);
        debug_assert!(prev.is_none());

        self.info[id as usize] = RelationInfo { start, end };

        let start_node = self.start.add_to_basket(start, id);
        let end_node = if self.end.is_none() && start == end {
            start_node
        } else {
            self.end_baskets_mut().add_to_basket(end, id)
        };
        self.links[id as usize] = RelationLinks {
            start_node,
            end_node,
        };
    }

    // the basket being cascaded is dropped wholesale by the caller, so its
    // node is left in place
    fn unbind(
        &mut self,
        id: RelationID,
        cascade: Cascade,
    ) -> RelationInfo {
        let info = self.info[id as usize];
        let links = self.links[id as usize];
        debug_assert!(!info.is_empty());

        let removed = self.matrix.try_del(info.start, info.end);
        debug_assert!(removed);

        let shared = self.end.is_none();
        let (skip_start, skip_end) = match cascade {
            Cascade::None => (false, false),
            Cascade::Start(v) | Cascade::End(v) if shared => (info.start == v, info.end == v),
            Cascade::Start(_) => (true, false),
            Cascade::End(_) => (false, true),
        };

        if !skip_start {
            self.start.remove_from_basket(info.start, links.start_node);
        }
        let same_node = shared && links.start_node == links.end_node;
        if !skip_end && !same_node {
            self.end_baskets_mut()
                .remove_from_basket(info.end, links.end_node);
        }

        self.info[id as usize] = RelationInfo::default();
        self.links[id as usize] = RelationLinks::default();
        info
    }
}

/// Relation ids of one basket, restricted to one role under a loop kind.
#[derive(Clone)]
pub struct RelationIter<'a> {
    inner: BasketIter<'a>,
    info: &'a [RelationInfo],
    filter: Option<Role>,
}

impl Iterator for RelationIter<'_> {
    type Item = RelationID;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let r = self.inner.next()?;
            let i = &self.info[r as usize];
            let keep = match self.filter {
                None => true,
                Some(Role::Start(v)) => i.start == v,
                Some(Role::End(v)) => i.end == v,
            };
            if keep {
                return Some(r);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        match self.filter {
            None => (lower, upper),
            Some(_) => (0, upper),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use proptest::prelude::*;

    use super::{RelationIndex, RelationInfo};
    use crate::{
        config::{IndexConfig, RelationKind},
        errors::IndexError,
        graph::{
            host::{EdgeDir, RelationHost, WorldRole},
            list::forward_list::{OrderedForwardList, UnorderedForwardList},
        },
        types::RelationID,
    };

    struct TestHost {
        next: u32,
        free: Vec<u32>,
        capacity: usize,
        released: Vec<u32>,
        allocations: usize,
    }

    impl TestHost {
        fn new(capacity: usize) -> Self {
            Self {
                next: 1,
                free: Vec::new(),
                capacity,
                released: Vec::new(),
                allocations: 0,
            }
        }

        // finalizes pending releases, making the ids reusable
        fn flush(&mut self) -> Vec<u32> {
            let ids = std::mem::take(&mut self.released);
            self.free.extend(ids.iter().copied());
            ids
        }
    }

    impl RelationHost for TestHost {
        fn allocate_relation_entity(&mut self) -> RelationID {
            self.allocations += 1;
            if let Some(id) = self.free.pop() {
                return id;
            }
            let id = self.next;
            self.next += 1;
            while self.next as usize >= self.capacity {
                self.capacity *= 2;
            }
            id
        }

        fn release_relation_entity(
            &mut self,
            id: RelationID,
        ) {
            self.released.push(id);
        }

        fn relation_capacity(&self) -> usize {
            self.capacity
        }
    }

    fn index(kind: RelationKind) -> RelationIndex {
        let mut config = IndexConfig::with_kind(kind);
        config.vertex_capacity = 8;
        config.relation_capacity = 8;
        config.node_pool_capacity = 4;
        config.matrix_capacity = 4;
        RelationIndex::new(&config)
    }

    fn set_of(it: impl Iterator<Item = u32>) -> HashSet<u32> {
        it.collect()
    }

    #[test]
    fn test_new_index() {
        let idx = index(RelationKind::Directed);
        assert_eq!(idx.len(), 0);
        assert!(idx.is_empty());
        assert_eq!(idx.relation_capacity(), 8);
        assert_eq!(idx.kind(), RelationKind::Directed);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_scenario_delete_middle_vertex() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        let r12 = idx.new_relation(1, 2, &mut host).unwrap();
        let r23 = idx.new_relation(2, 3, &mut host).unwrap();
        let r13 = idx.new_relation(1, 3, &mut host).unwrap();

        assert!(idx.has_relation(1, 2));
        assert_eq!(set_of(idx.start_relations(1)), HashSet::from([r12, r13]));
        assert_eq!(idx.degree(1, EdgeDir::Outgoing), 2);

        idx.on_entities_released(WorldRole::Start, &[2], &mut host);

        assert!(!idx.has_relation(1, 2));
        assert!(!idx.has_relation(2, 3));
        assert_eq!(idx.get_relation(1, 3), Ok(r13));
        assert_eq!(idx.len(), 1);
        assert!(!idx.has_start(2));
        assert!(!idx.has_end(2));
        assert_eq!(set_of(host.released.iter().copied()), HashSet::from([r12, r23]));
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_scenario_directed_needs_both_roles() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let r12 = idx.new_relation(1, 2, &mut host).unwrap();
        let r23 = idx.new_relation(2, 3, &mut host).unwrap();
        let r13 = idx.new_relation(1, 3, &mut host).unwrap();

        assert_eq!(idx.del_start(2, &mut host), 1);
        assert!(!idx.has_relation(2, 3));
        assert!(idx.has_relation(1, 2));

        assert_eq!(idx.del_end(2, &mut host), 1);
        assert!(!idx.has_relation(1, 2));
        assert_eq!(idx.get_relation(1, 3), Ok(r13));
        assert_eq!(idx.len(), 1);
        assert!(!idx.has_start(2));
        assert!(!idx.has_end(2));
        assert_eq!(host.released, vec![r23, r12]);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_batched_vertex_release() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        let r12 = idx.new_relation(1, 2, &mut host).unwrap();
        let r21 = idx.new_relation(2, 1, &mut host).unwrap();
        let r11 = idx.new_relation(1, 1, &mut host).unwrap();
        let r23 = idx.new_relation(2, 3, &mut host).unwrap();
        let r34 = idx.new_relation(3, 4, &mut host).unwrap();

        // both endpoints of (1,2) and (2,1) are in the same batch
        idx.on_entities_released(WorldRole::Start, &[1, 2], &mut host);

        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get_relation(3, 4), Ok(r34));
        for v in [1, 2] {
            assert!(!idx.has_start(v));
            assert!(!idx.has_end(v));
        }
        assert_eq!(idx.degree(3, EdgeDir::Both), 1);
        assert_eq!(
            set_of(host.released.iter().copied()),
            HashSet::from([r12, r21, r11, r23])
        );
        // each relation is released exactly once
        assert_eq!(host.released.len(), 4);
        assert_eq!(idx.stats().basket_nodes, 2);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_batched_release_per_role_directed() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        idx.new_relation(1, 1, &mut host).unwrap();
        idx.new_relation(1, 2, &mut host).unwrap();
        idx.new_relation(2, 1, &mut host).unwrap();
        let r33 = idx.new_relation(3, 3, &mut host).unwrap();

        idx.on_entities_released(WorldRole::End, &[1, 2, 1], &mut host);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get_relation(3, 3), Ok(r33));
        assert_eq!(host.released.len(), 3);

        idx.on_entities_released(WorldRole::Start, &[3], &mut host);
        assert!(idx.is_empty());
        assert_eq!(idx.stats().basket_nodes, 0);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_new_existing_pair_fails_without_allocating() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        idx.new_relation(4, 5, &mut host).unwrap();
        assert_eq!(
            idx.new_relation(4, 5, &mut host),
            Err(IndexError::KeyExists(4, 5))
        );
        assert_eq!(host.allocations, 1);
        assert_eq!(idx.len(), 1);
        // (5, 4) is a different key
        assert!(idx.new_relation(5, 4, &mut host).is_ok());
    }

    #[test]
    fn test_null_ids_are_rejected() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        assert_eq!(idx.new_relation(0, 1, &mut host), Err(IndexError::NullEntity));
        assert_eq!(idx.new_relation(1, 0, &mut host), Err(IndexError::NullEntity));
        assert_eq!(host.allocations, 0);
        assert_eq!(idx.del(0, &mut host), Err(IndexError::RelationUndefined(0)));
        assert_eq!(idx.del_start(0, &mut host), 0);
        assert_eq!(idx.info(0), Err(IndexError::RelationUndefined(0)));
    }

    #[test]
    fn test_get_or_new() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let a = idx.get_or_new(1, 2, &mut host).unwrap();
        let b = idx.get_or_new(1, 2, &mut host).unwrap();
        assert_eq!(a, b);
        assert_eq!(host.allocations, 1);
        assert_eq!(idx.info(a), Ok(RelationInfo { start: 1, end: 2 }));
    }

    #[test]
    fn test_del_by_id_and_pair() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let a = idx.new_relation(1, 2, &mut host).unwrap();
        let b = idx.new_relation(3, 4, &mut host).unwrap();

        idx.del(a, &mut host).unwrap();
        assert!(!idx.has_relation(1, 2));
        assert!(idx.try_info(a).is_none());
        assert_eq!(idx.degree(1, EdgeDir::Outgoing), 0);
        assert_eq!(idx.degree(2, EdgeDir::Incoming), 0);

        assert_eq!(idx.del_pair(3, 4, &mut host), Ok(b));
        assert!(!idx.try_del_pair(3, 4, &mut host));
        assert_eq!(
            idx.del_pair(3, 4, &mut host),
            Err(IndexError::KeyUndefined(3, 4))
        );
        assert_eq!(host.released, vec![a, b]);
        assert!(idx.is_empty());
        assert_eq!(idx.stats().basket_nodes, 0);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_delete_is_idempotent_across_paths() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        let a = idx.new_relation(1, 2, &mut host).unwrap();
        let b = idx.new_relation(2, 1, &mut host).unwrap();

        idx.del(a, &mut host).unwrap();
        let released = host.flush();
        assert_eq!(released, vec![a]);

        // the host reports the finalized deletion back
        idx.on_entities_released(WorldRole::Relation, &released, &mut host);
        assert!(!idx.try_del(a, &mut host));
        assert!(host.released.is_empty());

        assert_eq!(idx.len(), 1);
        assert_eq!(idx.degree(1, EdgeDir::Both), 1);
        assert_eq!(idx.degree(2, EdgeDir::Both), 1);
        assert_eq!(idx.get_relation(2, 1), Ok(b));
        assert_eq!(idx.stats().basket_nodes, 2);
        assert!(idx.verify().is_ok());

        // freed id is reused for a new relation
        let c = idx.new_relation(3, 1, &mut host).unwrap();
        assert_eq!(c, a);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_host_initiated_release_unbinds() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let a = idx.new_relation(1, 2, &mut host).unwrap();
        idx.on_entities_released(WorldRole::Relation, &[a], &mut host);

        assert!(!idx.has_relation(1, 2));
        assert!(!idx.has_start(1));
        assert!(!idx.has_end(2));
        // the reverse path never calls back into the host
        assert!(host.released.is_empty());
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_get_inverse_round_trip() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        let r = idx.new_relation(1, 2, &mut host).unwrap();
        let inv = idx.get_inverse(r, &mut host).unwrap();
        assert_ne!(inv, r);
        assert_eq!(idx.info(inv), Ok(RelationInfo { start: 2, end: 1 }));
        assert_eq!(idx.get_inverse(inv, &mut host), Ok(r));
        assert_eq!(host.allocations, 2);

        assert_eq!(
            idx.get_inverse(99, &mut host),
            Err(IndexError::RelationUndefined(99))
        );
    }

    #[test]
    fn test_self_loop_shares_one_node() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        let r = idx.new_relation(5, 5, &mut host).unwrap();
        idx.new_relation(5, 6, &mut host).unwrap();

        assert!(idx.has_start(5));
        assert!(idx.has_end(5));
        assert_eq!(idx.degree(5, EdgeDir::Outgoing), 2);
        assert_eq!(idx.degree(5, EdgeDir::Incoming), 1);
        assert_eq!(idx.degree(5, EdgeDir::Both), 3);
        assert_eq!(idx.stats().basket_nodes, 3);
        assert!(idx.verify().is_ok());

        idx.del(r, &mut host).unwrap();
        assert_eq!(idx.stats().basket_nodes, 2);
        assert!(idx.verify().is_ok());

        let r = idx.new_relation(5, 5, &mut host).unwrap();
        assert_eq!(idx.del_end(5, &mut host), 2);
        assert!(!idx.is_bound(r));
        assert!(idx.is_empty());
        assert_eq!(idx.stats().basket_nodes, 0);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_relation_ids_beyond_capacity_grow_tables() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let ids: Vec<u32> = (1..=40)
            .map(|v| idx.new_relation(v, v + 1, &mut host).unwrap())
            .collect();

        assert!(idx.relation_capacity() > 40);
        assert!(idx.relation_capacity() >= host.relation_capacity());
        for (v, r) in (1..=40).zip(ids) {
            assert_eq!(idx.info(r), Ok(RelationInfo { start: v, end: v + 1 }));
        }
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_resize_stability() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let mut expected = HashMap::new();
        for s in 1..6 {
            for e in 1..6 {
                if (s + e) % 2 == 0 {
                    let r = idx.new_relation(s, e, &mut host).unwrap();
                    expected.insert((s, e), r);
                }
            }
        }
        let before: Vec<HashSet<u32>> = (1..6).map(|v| set_of(idx.start_relations(v))).collect();

        idx.on_capacity_grown(WorldRole::Start, 1024);
        idx.on_capacity_grown(WorldRole::End, 1024);
        idx.on_capacity_grown(WorldRole::Relation, 1024);

        assert_eq!(idx.relation_capacity(), 1024);
        assert_eq!(idx.vertex_capacity(), 1024);
        for ((s, e), r) in expected.iter() {
            assert_eq!(idx.get_relation(*s, *e), Ok(*r));
        }
        let after: Vec<HashSet<u32>> = (1..6).map(|v| set_of(idx.start_relations(v))).collect();
        assert_eq!(before, after);
        assert!(idx.verify().is_ok());
    }

    #[test]
    fn test_relation_iter_order_is_most_recent_first() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let a = idx.new_relation(1, 2, &mut host).unwrap();
        let b = idx.new_relation(1, 3, &mut host).unwrap();
        let c = idx.new_relation(1, 4, &mut host).unwrap();

        assert_eq!(idx.start_relations(1).collect::<Vec<_>>(), vec![c, b, a]);
        assert_eq!(idx.end_relations(3).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_snapshot_neighbors() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);

        idx.new_relation(1, 2, &mut host).unwrap();
        idx.new_relation(1, 3, &mut host).unwrap();
        idx.new_relation(4, 1, &mut host).unwrap();
        idx.new_relation(2, 3, &mut host).unwrap();

        let mut ordered = OrderedForwardList::new(1);
        let pushed = idx.snapshot_neighbors(&[1, 2], EdgeDir::Outgoing, &mut ordered);
        assert_eq!(pushed, 3);
        // baskets are most recent first, the ordered list keeps that order
        assert_eq!(ordered.iter(1).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(ordered.iter(2).collect::<Vec<_>>(), vec![3]);

        let mut unordered = UnorderedForwardList::new(1);
        idx.snapshot_neighbors(&[1], EdgeDir::Both, &mut unordered);
        assert_eq!(set_of(unordered.iter(1)), HashSet::from([2, 3, 4]));
        assert_eq!(unordered.count(1), 3);

        // a second snapshot replaces the first
        idx.snapshot_neighbors(&[3], EdgeDir::Incoming, &mut unordered);
        assert_eq!(unordered.count(1), 0);
        assert_eq!(set_of(unordered.iter(3)), HashSet::from([1, 2]));
    }

    #[test]
    fn test_verify_detects_divergence() {
        let mut idx = index(RelationKind::Directed);
        let mut host = TestHost::new(8);

        let r = idx.new_relation(1, 2, &mut host).unwrap();
        idx.matrix.try_del(1, 2);
        assert!(matches!(idx.verify(), Err(IndexError::Inconsistent(_))));

        idx.matrix.set(1, 2, r);
        assert!(idx.verify().is_ok());
        idx.info[r as usize].end = 3;
        assert!(matches!(idx.verify(), Err(IndexError::Inconsistent(_))));
    }

    #[test]
    fn test_tear_down() {
        let mut idx = index(RelationKind::Loop);
        let mut host = TestHost::new(8);
        idx.new_relation(1, 2, &mut host).unwrap();
        idx.tear_down();
    }

    #[derive(Clone, Debug)]
    enum Op {
        New(u32, u32),
        Del(u32, u32),
        DelStart(u32),
        DelEnd(u32),
        Inverse(u32, u32),
        Flush,
        Grow(usize),
        Release(WorldRole, Vec<u32>),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (1u32..12, 1u32..12).prop_map(|(s, e)| Op::New(s, e)),
            3 => (1u32..12, 1u32..12).prop_map(|(s, e)| Op::Del(s, e)),
            1 => (1u32..12).prop_map(Op::DelStart),
            1 => (1u32..12).prop_map(Op::DelEnd),
            1 => (1u32..12, 1u32..12).prop_map(|(s, e)| Op::Inverse(s, e)),
            1 => Just(Op::Flush),
            1 => (8usize..64).prop_map(Op::Grow),
            2 => (
                prop_oneof![
                    Just(WorldRole::Start),
                    Just(WorldRole::End),
                    Just(WorldRole::Relation),
                ],
                prop::collection::vec(1u32..12, 0..5),
            )
                .prop_map(|(role, ids)| Op::Release(role, ids)),
        ]
    }

    fn run_ops(
        kind: RelationKind,
        ops: Vec<Op>,
    ) -> Result<(), TestCaseError> {
        let mut idx = index(kind);
        let mut host = TestHost::new(8);
        let mut model: HashMap<(u32, u32), u32> = HashMap::new();

        for op in ops {
            match op {
                Op::New(s, e) => {
                    let res = idx.new_relation(s, e, &mut host);
                    if model.contains_key(&(s, e)) {
                        prop_assert_eq!(res, Err(IndexError::KeyExists(s, e)));
                    } else {
                        model.insert((s, e), res.unwrap());
                    }
                }
                Op::Del(s, e) => {
                    let res = idx.del_pair(s, e, &mut host);
                    prop_assert_eq!(res.ok(), model.remove(&(s, e)));
                }
                Op::DelStart(v) => {
                    let n = idx.del_start(v, &mut host);
                    let before = model.len();
                    match kind {
                        RelationKind::Directed => model.retain(|(s, _), _| *s != v),
                        RelationKind::Loop => model.retain(|(s, e), _| *s != v && *e != v),
                    }
                    prop_assert_eq!(n, before - model.len());
                    prop_assert!(!idx.has_start(v));
                }
                Op::DelEnd(v) => {
                    let n = idx.del_end(v, &mut host);
                    let before = model.len();
                    match kind {
                        RelationKind::Directed => model.retain(|(_, e), _| *e != v),
                        RelationKind::Loop => model.retain(|(s, e), _| *s != v && *e != v),
                    }
                    prop_assert_eq!(n, before - model.len());
                    prop_assert!(!idx.has_end(v));
                }
                Op::Inverse(s, e) => {
                    if let Some(r) = model.get(&(s, e)).copied() {
                        let inv = idx.get_inverse(r, &mut host).unwrap();
                        model.entry((e, s)).or_insert(inv);
                        prop_assert_eq!(model[&(e, s)], inv);
                        prop_assert_eq!(idx.get_inverse(inv, &mut host), Ok(r));
                    }
                }
                Op::Flush => {
                    let ids = host.flush();
                    idx.on_entities_released(WorldRole::Relation, &ids, &mut host);
                }
                Op::Grow(cap) => {
                    idx.on_capacity_grown(WorldRole::Start, cap);
                    idx.on_capacity_grown(WorldRole::End, cap);
                }
                Op::Release(role, ids) => {
                    idx.on_entities_released(role, &ids, &mut host);
                    for v in ids.iter().copied() {
                        match (role, kind) {
                            (WorldRole::Relation, _) => model.retain(|_, r| *r != v),
                            (_, RelationKind::Loop) => {
                                model.retain(|(s, e), _| *s != v && *e != v)
                            }
                            (WorldRole::Start, RelationKind::Directed) => {
                                model.retain(|(s, _), _| *s != v)
                            }
                            (WorldRole::End, RelationKind::Directed) => {
                                model.retain(|(_, e), _| *e != v)
                            }
                        }
                    }
                    for v in ids.iter().copied() {
                        match role {
                            WorldRole::Start => {
                                prop_assert!(!idx.has_start(v));
                            }
                            WorldRole::End => {
                                prop_assert!(!idx.has_end(v));
                            }
                            WorldRole::Relation => {
                                prop_assert!(!idx.is_bound(v));
                            }
                        }
                    }
                }
            }

            prop_assert_eq!(idx.verify(), Ok(()));
            prop_assert_eq!(idx.len(), model.len());
        }

        for ((s, e), r) in model.iter() {
            prop_assert_eq!(idx.get_relation(*s, *e), Ok(*r));
            prop_assert!(idx.start_relations(*s).any(|x| x == *r));
            prop_assert!(idx.end_relations(*e).any(|x| x == *r));
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn proptest_directed_index_stays_consistent(ops in prop::collection::vec(arb_op(), 1..120)) {
            run_ops(RelationKind::Directed, ops)?;
        }

        #[test]
        fn proptest_loop_index_stays_consistent(ops in prop::collection::vec(arb_op(), 1..120)) {
            run_ops(RelationKind::Loop, ops)?;
        }
    }
}
