//! # chainreg core
//!
//! Transactional state registry for a blockchain node.
//!
//! Applies a block's state changes atomically across two heterogeneous
//! stores with no native cross-store transaction primitive:
//!
//! - the **metadata registry**, a relational store of ecosystem-scoped
//!   tables (members, keys, parameters, pages)
//! - the **blockchain registry**, an embedded key-value store of raw
//!   block/ledger data
//!
//! A durable undo log of before-images is the reconciliation mechanism.
//! Every write through a [`MultiTransaction`] first records the previous
//! row/key state; on failure (or when a committed block must be reverted)
//! the [`RegistryManager`] replays those records in reverse.
//!
//! The block-application pipeline is the caller: it begins a transaction,
//! routes all block-time writes through the handles the transaction issues,
//! and finishes with commit or rollback. This crate never inspects the
//! business data it moves.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod block;
mod error;
mod manager;
pub mod metadata;
mod types;
pub mod undo;

pub use block::{BlockStore, BlockStoreTx, BlockTransaction, MemoryBlockStore};
pub use error::{RegistryError, RegistryResult, StoreError};
pub use manager::{MultiTransaction, RegistryManager, TransactionState};
pub use metadata::{MemoryMetadataStore, MetadataStore, MetadataStoreTx, MetadataTransaction};
pub use types::{EcosystemId, RowKey};
pub use undo::{UndoLog, UndoRecord, UndoRecordType};
