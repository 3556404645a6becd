//! # chainreg storage
//!
//! Byte-store backends for the chainreg undo log.
//!
//! Backends are opaque: they hold an append-only sequence of bytes and never
//! interpret the undo record framing layered on top by `chainreg_core`.
//!
//! ## Available backends
//!
//! - [`InMemoryBackend`] - for tests and ephemeral registries
//! - [`FileBackend`] - persistent, file-backed
//!
//! ## Example
//!
//! ```rust
//! use chainreg_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"before-image").unwrap();
//! assert_eq!(backend.read_at(offset, 12).unwrap(), b"before-image");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
