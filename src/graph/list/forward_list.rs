/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use std::{iter::FusedIterator, marker::PhantomData};

use crate::types::NULL_ENTITY;

#[derive(Clone, Copy, Debug, Default)]
struct ForwardNode {
    value: u32,
    next: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct ListHead {
    head: u32,
    tail: u32,
    count: u32,
}

/// Where a pushed value lands in its source's list.
pub trait Placement {
    const AT_TAIL: bool;
}

/// Insert after tail: iteration follows insertion order.
pub struct AppendTail;

/// Insert into head: iteration is reverse insertion order, no tail upkeep.
pub struct PrependHead;

impl Placement for AppendTail {
    const AT_TAIL: bool = true;
}

impl Placement for PrependHead {
    const AT_TAIL: bool = false;
}

/// Anything a neighbor snapshot can be materialized into.
pub trait AdjacencySnapshot {
    fn clear(&mut self);

    fn resize(
        &mut self,
        capacity: usize,
    );

    fn push(
        &mut self,
        source: u32,
        value: u32,
    );
}

/// Singly linked lists per source id over an append-only node array.
///
/// Nodes are never recycled one by one; the whole structure is reset with
/// [`ForwardList::clear`] before it is rebuilt. Sources must be below
/// [`ForwardList::capacity`], which the owner keeps in step with the vertex
/// id space through [`ForwardList::resize`].
pub struct ForwardList<P: Placement> {
    heads: Vec<ListHead>,
    nodes: Vec<ForwardNode>,
    _placement: PhantomData<P>,
}

pub type OrderedForwardList = ForwardList<AppendTail>;
pub type UnorderedForwardList = ForwardList<PrependHead>;

impl<P: Placement> ForwardList<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            heads: vec![ListHead::default(); capacity.max(1)],
            // slot 0 is the null link
            nodes: vec![ForwardNode::default()],
            _placement: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.heads.len()
    }

    /// Total values across all sources.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(
        &self,
        source: u32,
    ) -> usize {
        self.heads
            .get(source as usize)
            .map_or(0, |h| h.count as usize)
    }

    pub fn push(
        &mut self,
        source: u32,
        value: u32,
    ) {
        debug_assert!(source != NULL_ENTITY);
        debug_assert!(
            (source as usize) < self.heads.len(),
            "forward list not resized for source {source}"
        );

        let node = self.nodes.len() as u32;
        let h = &mut self.heads[source as usize];

        if P::AT_TAIL {
            self.nodes.push(ForwardNode {
                value,
                next: NULL_ENTITY,
            });
            if h.tail == NULL_ENTITY {
                h.head = node;
            } else {
                self.nodes[h.tail as usize].next = node;
            }
            h.tail = node;
        } else {
            self.nodes.push(ForwardNode {
                value,
                next: h.head,
            });
            h.head = node;
        }
        h.count += 1;
    }

    pub fn iter(
        &self,
        source: u32,
    ) -> ForwardIter<'_> {
        let h = self
            .heads
            .get(source as usize)
            .copied()
            .unwrap_or_default();
        ForwardIter {
            nodes: &self.nodes,
            current: h.head,
            remaining: h.count as usize,
        }
    }

    pub fn clear(&mut self) {
        self.heads.fill(ListHead::default());
        self.nodes.truncate(1);
    }

    pub fn resize(
        &mut self,
        capacity: usize,
    ) {
        if capacity > self.heads.len() {
            self.heads.resize(capacity, ListHead::default());
        }
    }
}

impl<P: Placement> AdjacencySnapshot for ForwardList<P> {
    fn clear(&mut self) {
        ForwardList::clear(self);
    }

    fn resize(
        &mut self,
        capacity: usize,
    ) {
        ForwardList::resize(self, capacity);
    }

    fn push(
        &mut self,
        source: u32,
        value: u32,
    ) {
        ForwardList::push(self, source, value);
    }
}

#[derive(Clone)]
pub struct ForwardIter<'a> {
    nodes: &'a [ForwardNode],
    current: u32,
    remaining: usize,
}

impl Iterator for ForwardIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NULL_ENTITY {
            return None;
        }
        let n = self.nodes[self.current as usize];
        self.current = n.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(n.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ForwardIter<'_> {}

impl FusedIterator for ForwardIter<'_> {}
