//! # ormkit Storage
//!
//! Storage backend contract and reference implementation for ormkit.
//!
//! This crate is the lowest layer of ormkit. A backend stores flat
//! [`Record`]s in named tables and answers condition queries. It has no
//! knowledge of entity lifecycles, identity maps or commit ordering; those
//! belong to `ormkit_core`.
//!
//! ## Design Principles
//!
//! - Backends work on plain field maps, never on tracked entity handles
//! - Conditions arrive as SQL-style fragments with `?` placeholders
//! - Backends must be `Send + Sync` so one instance can serve many persisters
//! - A backend transaction brackets a whole commit
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Transactional reference backend for tests and demos
//!
//! ## Example
//!
//! ```rust
//! use ormkit_storage::{record, InMemoryBackend, Query, SaveOptions, StorageBackend, Value};
//!
//! let backend = InMemoryBackend::new();
//! let id = backend
//!     .save("products", "id", &record! { "name" => "lamp" }, SaveOptions::default())
//!     .unwrap();
//! assert_eq!(id, Value::Integer(1));
//!
//! let rows = backend.query("products", &Query::new()).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod condition;
mod error;
mod memory;
mod query;
mod value;

pub use backend::{SaveOptions, StorageBackend};
pub use condition::CompiledCondition;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
pub use query::{Concatenator, ConditionParam, Direction, OrderClause, Query};
pub use value::{Record, Value};
