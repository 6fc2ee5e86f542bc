/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use tracing::debug;

use crate::types::NULL_ENTITY;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListNode {
    pub value: u32,
    pub prev: u32,
    pub next: u32,
}

/// Flat arena of link nodes with a free list threaded through `next`.
///
/// Index 0 is a sentinel and never handed out, so `0` doubles as the null
/// link in every chain built on top of the pool.
pub struct NodePool {
    nodes: Vec<ListNode>,
    free_head: u32,
    live: usize,
}

impl NodePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut pool = Self {
            nodes: vec![ListNode::default(); capacity + 1],
            free_head: NULL_ENTITY,
            live: 0,
        };
        pool.thread_free_range(1, pool.nodes.len());
        pool
    }

    /// Number of usable nodes, excluding the sentinel.
    pub fn capacity(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Number of nodes currently handed out.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn allocate(
        &mut self,
        value: u32,
    ) -> u32 {
        if self.free_head == NULL_ENTITY {
            self.grow();
        }

        let idx = self.free_head;
        self.free_head = self.nodes[idx as usize].next;
        self.nodes[idx as usize] = ListNode {
            value,
            prev: NULL_ENTITY,
            next: NULL_ENTITY,
        };
        self.live += 1;
        idx
    }

    pub fn recycle(
        &mut self,
        idx: u32,
    ) {
        debug_assert!(idx != NULL_ENTITY && (idx as usize) < self.nodes.len());
        debug_assert!(self.live > 0);

        self.nodes[idx as usize].next = self.free_head;
        self.free_head = idx;
        self.live -= 1;
    }

    /// Splices an already linked chain `head ..= tail` of `count` nodes onto
    /// the free list without walking it.
    pub fn recycle_chain(
        &mut self,
        head: u32,
        tail: u32,
        count: usize,
    ) {
        debug_assert!(head != NULL_ENTITY && tail != NULL_ENTITY);
        debug_assert!(self.live >= count);

        self.nodes[tail as usize].next = self.free_head;
        self.free_head = head;
        self.live -= count;
    }

    pub fn clear(&mut self) {
        self.free_head = NULL_ENTITY;
        self.live = 0;
        self.thread_free_range(1, self.nodes.len());
    }

    #[inline]
    pub(crate) fn node(
        &self,
        idx: u32,
    ) -> &ListNode {
        debug_assert!(idx != NULL_ENTITY);
        &self.nodes[idx as usize]
    }

    #[inline]
    pub(crate) fn node_mut(
        &mut self,
        idx: u32,
    ) -> &mut ListNode {
        debug_assert!(idx != NULL_ENTITY);
        &mut self.nodes[idx as usize]
    }

    /// Links `a -> b`. Either side may be the null link.
    #[inline]
    pub(crate) fn link(
        &mut self,
        a: u32,
        b: u32,
    ) {
        if a != NULL_ENTITY {
            self.nodes[a as usize].next = b;
        }
        if b != NULL_ENTITY {
            self.nodes[b as usize].prev = a;
        }
    }

    fn grow(&mut self) {
        let old_len = self.nodes.len();
        let new_len = (old_len - 1) * 2 + 1;
        debug!(from = old_len - 1, to = new_len - 1, "node_pool.grow");

        self.nodes.resize(new_len, ListNode::default());
        self.thread_free_range(old_len, new_len);
    }

    // prepends [from, to) to the free list, keeping ascending hand-out order
    fn thread_free_range(
        &mut self,
        from: usize,
        to: usize,
    ) {
        if from >= to {
            return;
        }
        for i in from..to - 1 {
            self.nodes[i].next = (i + 1) as u32;
        }
        self.nodes[to - 1].next = self.free_head;
        self.free_head = from as u32;
    }
}
