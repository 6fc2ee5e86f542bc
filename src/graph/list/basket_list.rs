/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use std::iter::FusedIterator;

use tracing::debug;

use crate::types::NULL_ENTITY;

use super::node_pool::NodePool;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Basket {
    head: u32,
    count: u32,
}

/// Independent doubly linked lists, one per basket index, sharing a single
/// [`NodePool`].
///
/// Basket 0 is never valid. Reading an out-of-range basket yields an empty
/// basket; inserting into one grows the record array.
pub struct BasketList {
    pool: NodePool,
    baskets: Vec<Basket>,
}

impl BasketList {
    pub fn new(
        basket_capacity: usize,
        node_capacity: usize,
    ) -> Self {
        Self {
            pool: NodePool::new(node_capacity),
            baskets: vec![Basket::default(); basket_capacity.max(1)],
        }
    }

    pub fn basket_capacity(&self) -> usize {
        self.baskets.len()
    }

    /// Live nodes across all baskets.
    pub fn node_count(&self) -> usize {
        self.pool.len()
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn count(
        &self,
        basket: u32,
    ) -> usize {
        self.baskets
            .get(basket as usize)
            .map_or(0, |b| b.count as usize)
    }

    /// Grows the record array to hold at least `capacity` baskets.
    pub fn resize(
        &mut self,
        capacity: usize,
    ) {
        if capacity > self.baskets.len() {
            self.baskets.resize(capacity, Basket::default());
        }
    }

    /// Inserts `value` at the head of `basket`, returning its node index.
    pub fn add_to_basket(
        &mut self,
        basket: u32,
        value: u32,
    ) -> u32 {
        debug_assert!(basket != NULL_ENTITY, "basket 0 is reserved");

        if basket as usize >= self.baskets.len() {
            let mut cap = self.baskets.len();
            while cap <= basket as usize {
                cap *= 2;
            }
            debug!(from = self.baskets.len(), to = cap, "basket_list.grow");
            self.baskets.resize(cap, Basket::default());
        }

        let node = self.pool.allocate(value);
        let b = &mut self.baskets[basket as usize];
        let head = b.head;
        b.head = node;
        b.count += 1;
        self.pool.link(node, head);
        node
    }

    /// Unlinks `node` from `basket` and recycles it.
    ///
    /// `node` must currently belong to `basket`.
    pub fn remove_from_basket(
        &mut self,
        basket: u32,
        node: u32,
    ) {
        debug_assert!(basket != NULL_ENTITY && node != NULL_ENTITY);
        debug_assert!((basket as usize) < self.baskets.len());
        debug_assert!(self.baskets[basket as usize].count > 0, "basket count underflow");

        let n = *self.pool.node(node);
        if n.prev == NULL_ENTITY {
            debug_assert_eq!(self.baskets[basket as usize].head, node);
            self.baskets[basket as usize].head = n.next;
            if n.next != NULL_ENTITY {
                self.pool.node_mut(n.next).prev = NULL_ENTITY;
            }
        } else {
            self.pool.link(n.prev, n.next);
        }

        self.pool.recycle(node);
        self.baskets[basket as usize].count -= 1;
    }

    /// Drops every node of `basket` at once, returning how many were removed.
    pub fn remove_basket(
        &mut self,
        basket: u32,
    ) -> usize {
        debug_assert!(basket != NULL_ENTITY);

        let Some(b) = self.baskets.get(basket as usize).copied() else {
            return 0;
        };
        if b.count == 0 {
            return 0;
        }

        let mut tail = b.head;
        loop {
            let next = self.pool.node(tail).next;
            if next == NULL_ENTITY {
                break;
            }
            tail = next;
        }

        self.pool.recycle_chain(b.head, tail, b.count as usize);
        self.baskets[basket as usize] = Basket::default();
        b.count as usize
    }

    /// Values of `basket`, most recently inserted first.
    ///
    /// The iterator borrows the list, so the basket cannot change while it is
    /// alive; collect first when the values drive mutations.
    pub fn iter(
        &self,
        basket: u32,
    ) -> BasketIter<'_> {
        let b = self
            .baskets
            .get(basket as usize)
            .copied()
            .unwrap_or_default();
        BasketIter {
            pool: &self.pool,
            current: b.head,
            remaining: b.count as usize,
        }
    }

    pub fn clear(&mut self) {
        self.baskets.fill(Basket::default());
        self.pool.clear();
    }
}

#[derive(Clone)]
pub struct BasketIter<'a> {
    pool: &'a NodePool,
    current: u32,
    remaining: usize,
}

impl Iterator for BasketIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NULL_ENTITY {
            return None;
        }
        let n = self.pool.node(self.current);
        self.current = n.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(n.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for BasketIter<'_> {}

impl FusedIterator for BasketIter<'_> {}
