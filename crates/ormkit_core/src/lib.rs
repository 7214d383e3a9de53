//! # ormkit Core
//!
//! Unit of work and identity map for ormkit.
//!
//! This crate provides:
//! - Entity handles with stable object identity ([`EntityRef`])
//! - Static per-type metadata ([`EntityDescriptor`], [`DescriptorRegistry`])
//! - Lifecycle state tracking and change scheduling ([`UnitOfWork`])
//! - Dependency-ordered, transactional commits ([`CommitOrderCalculator`])
//! - Per-type persisters with criteria and expression translation
//! - The [`EntityManager`] session facade and [`EntityRepository`] queries
//!
//! ## Example
//!
//! ```rust
//! use ormkit_core::{
//!     EntityDescriptor, EntityManager, EntityRef, Relations, StaticRegistry,
//! };
//! use ormkit_storage::{record, InMemoryBackend};
//! use std::sync::Arc;
//!
//! let registry = StaticRegistry::new()
//!     .with(EntityDescriptor::structured("category").with_relations(Relations::None))
//!     .unwrap()
//!     .with(
//!         EntityDescriptor::structured("product")
//!             .with_relations(Relations::declared(["category"])),
//!     )
//!     .unwrap();
//! let backend = Arc::new(InMemoryBackend::new());
//! let mut em = EntityManager::new(Arc::new(registry), backend.clone());
//!
//! let product = EntityRef::create("product", record! { "name" => "lamp" });
//! let category = EntityRef::create("category", record! { "name" => "lighting" });
//! em.persist(&product).unwrap();
//! em.persist(&category).unwrap();
//! em.flush().unwrap();
//!
//! assert_eq!(backend.row_count("object_product"), 1);
//! assert!(em.contains(&product));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod manager;
mod metadata;
mod persister;
mod repository;
mod types;
mod unit_of_work;

pub use config::{CyclePolicy, ManagerConfig};
pub use entity::{Entity, EntityRef, Identifier, ObjectId};
pub use error::{CoreError, CoreResult};
pub use manager::EntityManager;
pub use metadata::{DescriptorRegistry, ElementKind, EntityDescriptor, Relations, StaticRegistry};
pub use persister::{
    CompositeKind, Criteria, Criterion, ElementPersister, EntityPersister, Expr,
    ExpressionVisitor, ObjectPersister, Operator, OrderBy, PersisterBase, PersisterFactory,
    SqlExpressionVisitor, SqlValueVisitor, COMPARISON_MAP,
};
pub use repository::EntityRepository;
pub use types::{EntityState, SessionId};
pub use unit_of_work::{CommitOrderCalculator, UnitOfWork};
