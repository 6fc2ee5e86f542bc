/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

pub mod basket_list;
pub mod forward_list;
pub mod node_pool;
