//! Core type definitions for chainreg.

use std::fmt;

/// Identifier of an ecosystem, the multi-tenant partition of the metadata
/// store under which tables like members/keys/pages are scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EcosystemId(pub i64);

impl EcosystemId {
    /// Creates a new ecosystem ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EcosystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eco:{}", self.0)
    }
}

/// Addresses one row of the metadata registry: ecosystem, table name and
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    /// Ecosystem the table is scoped under.
    pub ecosystem: EcosystemId,
    /// Table name, e.g. `members`.
    pub table: String,
    /// Primary key bytes.
    pub pk: Vec<u8>,
}

impl RowKey {
    /// Creates a row key.
    pub fn new(ecosystem: EcosystemId, table: impl Into<String>, pk: impl Into<Vec<u8>>) -> Self {
        Self {
            ecosystem,
            table: table.into(),
            pk: pk.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{} bytes]", self.ecosystem, self.table, self.pk.len())
    }
}
