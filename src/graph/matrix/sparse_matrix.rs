/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use tracing::debug;

use crate::{
    config::IndexConfig,
    errors::{IndexError, Result},
    types::NULL_ENTITY,
};

use super::sparse_matrix_iter::SparseMatrixIter;

const MIX_MUL: u32 = 0x045d_9f3b;
const MIX_MUL_INV: u32 = mod_inverse(MIX_MUL);

// Newton iteration for the inverse of an odd number modulo 2^32
const fn mod_inverse(a: u32) -> u32 {
    let mut x = a;
    let mut i = 0;
    while i < 5 {
        x = x.wrapping_mul(2u32.wrapping_sub(a.wrapping_mul(x)));
        i += 1;
    }
    x
}

/// Bijective bit mix of the second key component.
#[inline]
pub fn scramble(y: u32) -> u32 {
    let h = y ^ (y >> 16);
    let h = h.wrapping_mul(MIX_MUL);
    h ^ (h >> 16)
}

#[inline]
pub fn unscramble(h: u32) -> u32 {
    let y = h ^ (h >> 16);
    let y = y.wrapping_mul(MIX_MUL_INV);
    y ^ (y >> 16)
}

#[inline]
fn hash(
    x: u32,
    y: u32,
    y_mix: u32,
) -> u32 {
    x ^ y ^ y_mix
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct Entry {
    pub(super) next: u32,
    pub(super) x: u32,
    pub(super) y_mix: u32,
    pub(super) value: u32,
}

/// Chained hash index from an ordered `(x, y)` pair to a `u32` value.
///
/// Entries live in one pool addressed by bucket chains; entry 0 is the null
/// link. Deleted entries go onto a free list and are reused before the pool
/// grows. Capacity is always a power of two and doubles when the pool is
/// exhausted, or when an insert meets a chain of `max_chain_len` entries
/// while the load factor is at least `load_factor`.
pub struct SparseMatrix {
    buckets: Vec<u32>,
    entries: Vec<Entry>,
    used: u32,
    free_head: u32,
    len: usize,
    max_chain_len: usize,
    load_factor: f32,
}

enum Lookup {
    Found { bucket: usize, prev: u32, idx: u32 },
    Missing { bucket: usize, chain_len: usize },
}

impl SparseMatrix {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let config = IndexConfig::default();
        Self::with_policy(capacity, config.max_chain_len, config.load_factor)
    }

    #[must_use]
    pub fn with_policy(
        capacity: usize,
        max_chain_len: usize,
        load_factor: f32,
    ) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            buckets: vec![NULL_ENTITY; capacity],
            entries: vec![Entry::default(); capacity + 1],
            used: 0,
            free_head: NULL_ENTITY,
            len: 0,
            max_chain_len: max_chain_len.max(1),
            load_factor,
        }
    }

    #[must_use]
    pub fn from_config(config: &IndexConfig) -> Self {
        Self::with_policy(
            config.matrix_capacity,
            config.max_chain_len,
            config.load_factor,
        )
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_key(
        &self,
        x: u32,
        y: u32,
    ) -> bool {
        matches!(self.lookup(x, y), Lookup::Found { .. })
    }

    pub fn try_get_value(
        &self,
        x: u32,
        y: u32,
    ) -> Option<u32> {
        match self.lookup(x, y) {
            Lookup::Found { idx, .. } => Some(self.entries[idx as usize].value),
            Lookup::Missing { .. } => None,
        }
    }

    pub fn get_value(
        &self,
        x: u32,
        y: u32,
    ) -> Result<u32> {
        self.try_get_value(x, y)
            .ok_or(IndexError::KeyUndefined(x, y))
    }

    /// Inserts a new key. Fails without touching the matrix if it exists.
    pub fn add(
        &mut self,
        x: u32,
        y: u32,
        value: u32,
    ) -> Result<()> {
        match self.lookup(x, y) {
            Lookup::Found { .. } => Err(IndexError::KeyExists(x, y)),
            Lookup::Missing { bucket, chain_len } => {
                self.insert_missing(x, y, value, bucket, chain_len);
                Ok(())
            }
        }
    }

    pub fn try_add(
        &mut self,
        x: u32,
        y: u32,
        value: u32,
    ) -> bool {
        self.add(x, y, value).is_ok()
    }

    /// Inserts or overwrites, returning the previous value.
    pub fn set(
        &mut self,
        x: u32,
        y: u32,
        value: u32,
    ) -> Option<u32> {
        match self.lookup(x, y) {
            Lookup::Found { idx, .. } => {
                let old = self.entries[idx as usize].value;
                self.entries[idx as usize].value = value;
                Some(old)
            }
            Lookup::Missing { bucket, chain_len } => {
                self.insert_missing(x, y, value, bucket, chain_len);
                None
            }
        }
    }

    pub fn try_del(
        &mut self,
        x: u32,
        y: u32,
    ) -> bool {
        self.remove(x, y).is_some()
    }

    /// Removes an existing key, returning its value.
    pub fn del(
        &mut self,
        x: u32,
        y: u32,
    ) -> Result<u32> {
        self.remove(x, y).ok_or(IndexError::KeyUndefined(x, y))
    }

    pub fn clear(&mut self) {
        self.buckets.fill(NULL_ENTITY);
        self.entries.fill(Entry::default());
        self.used = 0;
        self.free_head = NULL_ENTITY;
        self.len = 0;
    }

    /// Live `(x, y, value)` triples in bucket order.
    pub fn iter(&self) -> SparseMatrixIter<'_> {
        SparseMatrixIter::new(self)
    }

    #[inline]
    pub(super) fn bucket_head(
        &self,
        bucket: usize,
    ) -> u32 {
        self.buckets[bucket]
    }

    #[inline]
    pub(super) fn entry(
        &self,
        idx: u32,
    ) -> &Entry {
        &self.entries[idx as usize]
    }

    fn bucket_of(
        &self,
        x: u32,
        y: u32,
    ) -> usize {
        (hash(x, y, scramble(y)) as usize) & (self.buckets.len() - 1)
    }

    fn lookup(
        &self,
        x: u32,
        y: u32,
    ) -> Lookup {
        let y_mix = scramble(y);
        let bucket = (hash(x, y, y_mix) as usize) & (self.buckets.len() - 1);

        let mut prev = NULL_ENTITY;
        let mut idx = self.buckets[bucket];
        let mut chain_len = 0;
        while idx != NULL_ENTITY {
            let e = &self.entries[idx as usize];
            if e.x == x && e.y_mix == y_mix {
                return Lookup::Found { bucket, prev, idx };
            }
            prev = idx;
            idx = e.next;
            chain_len += 1;
        }
        Lookup::Missing { bucket, chain_len }
    }

    fn insert_missing(
        &mut self,
        x: u32,
        y: u32,
        value: u32,
        mut bucket: usize,
        chain_len: usize,
    ) {
        let exhausted = self.free_head == NULL_ENTITY && self.used as usize == self.capacity();
        let overloaded = chain_len >= self.max_chain_len
            && self.len as f32 >= self.load_factor * self.capacity() as f32;

        if exhausted || overloaded {
            self.grow(self.capacity() * 2);
            bucket = self.bucket_of(x, y);
        }

        let idx = if self.free_head != NULL_ENTITY {
            let idx = self.free_head;
            self.free_head = self.entries[idx as usize].next;
            idx
        } else {
            self.used += 1;
            self.used
        };

        self.entries[idx as usize] = Entry {
            next: self.buckets[bucket],
            x,
            y_mix: scramble(y),
            value,
        };
        self.buckets[bucket] = idx;
        self.len += 1;
    }

    fn remove(
        &mut self,
        x: u32,
        y: u32,
    ) -> Option<u32> {
        let Lookup::Found { bucket, prev, idx } = self.lookup(x, y) else {
            return None;
        };

        let e = self.entries[idx as usize];
        if prev == NULL_ENTITY {
            self.buckets[bucket] = e.next;
        } else {
            self.entries[prev as usize].next = e.next;
        }

        self.entries[idx as usize].next = self.free_head;
        self.free_head = idx;
        self.len -= 1;
        Some(e.value)
    }

    // rehashes every live entry into a compacted pool of `capacity` entries
    fn grow(
        &mut self,
        capacity: usize,
    ) {
        debug_assert!(capacity.is_power_of_two());
        debug!(
            from = self.capacity(),
            to = capacity,
            len = self.len,
            "sparse_matrix.grow"
        );

        let mut buckets = vec![NULL_ENTITY; capacity];
        let mut entries = Vec::with_capacity(capacity + 1);
        entries.push(Entry::default());

        for (x, y, value) in self.iter() {
            let y_mix = scramble(y);
            let b = (hash(x, y, y_mix) as usize) & (capacity - 1);
            let idx = entries.len() as u32;
            entries.push(Entry {
                next: buckets[b],
                x,
                y_mix,
                value,
            });
            buckets[b] = idx;
        }
        entries.resize(capacity + 1, Entry::default());

        self.buckets = buckets;
        self.entries = entries;
        self.used = self.len as u32;
        self.free_head = NULL_ENTITY;
    }
}
