/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use std::iter::FusedIterator;

use crate::types::NULL_ENTITY;

use super::sparse_matrix::{unscramble, SparseMatrix};

/// Walks bucket chains in bucket order, yielding raw `(x, y, value)`.
pub struct SparseMatrixIter<'a> {
    m: &'a SparseMatrix,
    bucket: usize,
    entry: u32,
    remaining: usize,
}

impl<'a> SparseMatrixIter<'a> {
    pub fn new(m: &'a SparseMatrix) -> SparseMatrixIter<'a> {
        Self {
            m,
            bucket: 0,
            entry: if m.capacity() > 0 {
                m.bucket_head(0)
            } else {
                NULL_ENTITY
            },
            remaining: m.len(),
        }
    }
}

impl Iterator for SparseMatrixIter<'_> {
    type Item = (u32, u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        while self.entry == NULL_ENTITY {
            self.bucket += 1;
            if self.bucket >= self.m.capacity() {
                return None;
            }
            self.entry = self.m.bucket_head(self.bucket);
        }

        let e = self.m.entry(self.entry);
        self.entry = e.next;
        self.remaining -= 1;
        Some((e.x, unscramble(e.y_mix), e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SparseMatrixIter<'_> {}

impl FusedIterator for SparseMatrixIter<'_> {}
