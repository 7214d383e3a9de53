//! Sample schema and session helpers.
//!
//! The catalog schema has four types: `category` (no dependencies),
//! `product` (depends on `category`), and the `page` document and `image`
//! asset element types.

use crate::recording::RecordingBackend;
use ormkit_core::{
    EntityDescriptor, EntityManager, EntityRef, ManagerConfig, Relations, StaticRegistry,
};
use ormkit_storage::{record, InMemoryBackend, Value};
use std::sync::Arc;

/// Type name of the sample category type.
pub const CATEGORY: &str = "category";
/// Type name of the sample product type.
pub const PRODUCT: &str = "product";
/// Type name of the sample document type.
pub const PAGE: &str = "page";
/// Type name of the sample asset type.
pub const IMAGE: &str = "image";

/// Table of [`CATEGORY`] rows.
pub const CATEGORY_TABLE: &str = "object_category";
/// Table of [`PRODUCT`] rows.
pub const PRODUCT_TABLE: &str = "object_product";

/// Builds the catalog registry.
pub fn catalog_registry() -> StaticRegistry {
    StaticRegistry::new()
        .with(EntityDescriptor::structured(CATEGORY).with_relations(Relations::None))
        .expect("category descriptor")
        .with(
            EntityDescriptor::structured(PRODUCT)
                .with_relations(Relations::declared([CATEGORY]))
                .with_fields(["name", "stock", "category", "published"]),
        )
        .expect("product descriptor")
        .with(EntityDescriptor::document(PAGE).with_relations(Relations::None))
        .expect("page descriptor")
        .with(EntityDescriptor::asset(IMAGE).with_relations(Relations::None))
        .expect("image descriptor")
}

/// A manager over the catalog schema and a recording backend.
pub struct TestSession {
    /// The entity manager.
    pub manager: EntityManager,
    /// The backend the manager writes to.
    pub backend: Arc<RecordingBackend>,
}

impl TestSession {
    /// Creates a session over an empty backend.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a session with a custom configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        Self::with_backend(InMemoryBackend::new(), config)
    }

    /// Creates a session over a prepared backend.
    pub fn with_backend(backend: InMemoryBackend, config: ManagerConfig) -> Self {
        let backend = Arc::new(RecordingBackend::wrap(backend));
        let manager =
            EntityManager::with_config(Arc::new(catalog_registry()), backend.clone(), config);
        Self { manager, backend }
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestSession {
    type Target = EntityManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl std::ops::DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}

/// Runs a test with a fresh catalog session.
///
/// # Example
///
/// ```rust
/// use ormkit_testkit::{product, with_session};
///
/// with_session(|em, _backend| {
///     em.persist(&product("lamp", 1)).unwrap();
///     em.flush().unwrap();
/// });
/// ```
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&mut EntityManager, &RecordingBackend) -> R,
{
    let mut session = TestSession::new();
    f(&mut session.manager, &*session.backend)
}

/// Creates an unsaved category.
pub fn category(name: &str) -> EntityRef {
    EntityRef::create(CATEGORY, record! { "name" => name })
}

/// Creates an unsaved, published product.
pub fn product(name: &str, stock: i64) -> EntityRef {
    EntityRef::create(
        PRODUCT,
        record! { "name" => name, "stock" => stock, "published" => true },
    )
}

/// Creates an unsaved page document.
pub fn page(key: &str) -> EntityRef {
    EntityRef::create(PAGE, record! { "key" => key, "type" => "page" })
}

/// Creates an unsaved image asset.
pub fn image(filename: &str) -> EntityRef {
    EntityRef::create(IMAGE, record! { "filename" => filename, "type" => "image" })
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Products seeded by [`seeded_catalog`]: identifier, name, stock and
    /// published flag.
    pub const SEEDED_PRODUCTS: [(i64, &str, i64, bool); 4] = [
        (1, "lamp", 3, true),
        (2, "desk", 0, true),
        (3, "chair", 5, true),
        (4, "sofa", 2, false),
    ];

    /// Creates a session whose backend holds two categories and the
    /// [`SEEDED_PRODUCTS`]. The call journal starts empty.
    pub fn seeded_catalog() -> TestSession {
        let backend = InMemoryBackend::new();
        for (id, name) in [(1, "lighting"), (2, "furniture")] {
            backend.seed(CATEGORY_TABLE, "o_id", Value::Integer(id), record! { "name" => name });
        }
        for (id, name, stock, published) in SEEDED_PRODUCTS {
            backend.seed(
                PRODUCT_TABLE,
                "o_id",
                Value::Integer(id),
                record! {
                    "name" => name,
                    "stock" => stock,
                    "category" => if id == 1 { 1 } else { 2 },
                    "published" => published,
                },
            );
        }
        TestSession::with_backend(backend, ManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_core::DescriptorRegistry;

    #[test]
    fn registry_has_catalog_types() {
        let registry = catalog_registry();
        for name in [CATEGORY, PRODUCT, PAGE, IMAGE] {
            assert!(registry.has_descriptor(name));
        }
        assert_eq!(registry.descriptor(PAGE).unwrap().storage_location(), "documents");
    }

    #[test]
    fn seeded_catalog_starts_with_clean_journal() {
        let session = scenarios::seeded_catalog();
        assert!(session.backend.calls().is_empty());
        assert_eq!(session.backend.inner().row_count(PRODUCT_TABLE), 4);
    }
}
