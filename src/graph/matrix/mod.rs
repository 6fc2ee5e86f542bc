/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

pub mod sparse_matrix;
mod sparse_matrix_iter;

pub use sparse_matrix_iter::SparseMatrixIter;
