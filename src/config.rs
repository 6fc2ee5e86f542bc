/*
 * Copyright FalkorDB Ltd. 2023 - present
 * Licensed under the Server Side Public License v1 (SSPLv1).
 */

use std::str::FromStr;

use crate::errors::{IndexError, Result};

/// Whether start and end vertices live in separate worlds or in one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Start and end worlds differ: one basket list per role.
    Directed,
    /// Start and end share a world: one basket per vertex serves both roles.
    Loop,
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigOptionField {
    VERTEX_CAPACITY,
    RELATION_CAPACITY,
    NODE_POOL_CAPACITY,
    MATRIX_CAPACITY,
    MATRIX_MAX_CHAIN_LEN,
    MATRIX_LOAD_FACTOR,
    RELATION_KIND,
}

impl ConfigOptionField {
    pub fn name(self) -> &'static str {
        match self {
            ConfigOptionField::VERTEX_CAPACITY => "VERTEX_CAPACITY",
            ConfigOptionField::RELATION_CAPACITY => "RELATION_CAPACITY",
            ConfigOptionField::NODE_POOL_CAPACITY => "NODE_POOL_CAPACITY",
            ConfigOptionField::MATRIX_CAPACITY => "MATRIX_CAPACITY",
            ConfigOptionField::MATRIX_MAX_CHAIN_LEN => "MATRIX_MAX_CHAIN_LEN",
            ConfigOptionField::MATRIX_LOAD_FACTOR => "MATRIX_LOAD_FACTOR",
            ConfigOptionField::RELATION_KIND => "RELATION_KIND",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexConfig {
    pub vertex_capacity: usize,
    pub relation_capacity: usize,
    pub node_pool_capacity: usize,
    pub matrix_capacity: usize,
    pub max_chain_len: usize,
    pub load_factor: f32,
    pub kind: RelationKind,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vertex_capacity: 64,
            relation_capacity: 64,
            node_pool_capacity: 64,
            matrix_capacity: 64,
            max_chain_len: 5,
            load_factor: 0.7,
            kind: RelationKind::Directed,
        }
    }
}

impl IndexConfig {
    pub fn with_kind(kind: RelationKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Sets an option from its textual value.
    ///
    /// Capacities must be positive, the load factor must lie in `(0, 1]` and
    /// the chain length must be at least 1. On error the config is unchanged.
    pub fn set_option(
        &mut self,
        field: ConfigOptionField,
        value: &str,
    ) -> Result<()> {
        match field {
            ConfigOptionField::VERTEX_CAPACITY => {
                self.vertex_capacity = parse_positive(field, value)?;
            }
            ConfigOptionField::RELATION_CAPACITY => {
                self.relation_capacity = parse_positive(field, value)?;
            }
            ConfigOptionField::NODE_POOL_CAPACITY => {
                self.node_pool_capacity = parse_positive(field, value)?;
            }
            ConfigOptionField::MATRIX_CAPACITY => {
                self.matrix_capacity = parse_positive(field, value)?;
            }
            ConfigOptionField::MATRIX_MAX_CHAIN_LEN => {
                self.max_chain_len = parse_positive(field, value)?;
            }
            ConfigOptionField::MATRIX_LOAD_FACTOR => {
                let lf: f32 = parse(field, value)?;
                if !(lf > 0.0 && lf <= 1.0) {
                    return Err(IndexError::Config {
                        field: field.name(),
                        reason: format!("{lf} not in (0, 1]"),
                    });
                }
                self.load_factor = lf;
            }
            ConfigOptionField::RELATION_KIND => {
                self.kind = match value.trim().to_ascii_lowercase().as_str() {
                    "directed" => RelationKind::Directed,
                    "loop" => RelationKind::Loop,
                    other => {
                        return Err(IndexError::Config {
                            field: field.name(),
                            reason: format!("unknown relation kind '{other}'"),
                        })
                    }
                };
            }
        }
        Ok(())
    }

    pub fn get_option(
        &self,
        field: ConfigOptionField,
    ) -> String {
        match field {
            ConfigOptionField::VERTEX_CAPACITY => self.vertex_capacity.to_string(),
            ConfigOptionField::RELATION_CAPACITY => self.relation_capacity.to_string(),
            ConfigOptionField::NODE_POOL_CAPACITY => self.node_pool_capacity.to_string(),
            ConfigOptionField::MATRIX_CAPACITY => self.matrix_capacity.to_string(),
            ConfigOptionField::MATRIX_MAX_CHAIN_LEN => self.max_chain_len.to_string(),
            ConfigOptionField::MATRIX_LOAD_FACTOR => self.load_factor.to_string(),
            ConfigOptionField::RELATION_KIND => match self.kind {
                RelationKind::Directed => "directed".to_string(),
                RelationKind::Loop => "loop".to_string(),
            },
        }
    }
}

fn parse<T: FromStr>(
    field: ConfigOptionField,
    value: &str,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| IndexError::Config {
            field: field.name(),
            reason: e.to_string(),
        })
}

fn parse_positive(
    field: ConfigOptionField,
    value: &str,
) -> Result<usize> {
    let v: usize = parse(field, value)?;
    if v == 0 {
        return Err(IndexError::Config {
            field: field.name(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(v)
}
