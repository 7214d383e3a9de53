//! Descriptor registry.

use super::descriptor::EntityDescriptor;
use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves entity type names to descriptors.
///
/// # Invariants
///
/// - The same type name always resolves to the same descriptor
/// - Resolution never mutates a descriptor once handed out
pub trait DescriptorRegistry: Send + Sync {
    /// Returns the descriptor for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] if no descriptor exists.
    fn descriptor(&self, type_name: &str) -> CoreResult<Arc<EntityDescriptor>>;

    /// Returns true if a descriptor for `type_name` is already available.
    fn has_descriptor(&self, type_name: &str) -> bool;

    /// Returns every descriptor currently known, ordered by type name.
    fn all_descriptors(&self) -> Vec<Arc<EntityDescriptor>>;
}

type Loader = Box<dyn Fn(&str) -> Option<EntityDescriptor> + Send + Sync>;

/// A registry of explicitly registered descriptors, optionally backed by a
/// loader that is asked once for types not registered up front.
///
/// # Example
///
/// ```rust
/// use ormkit_core::{DescriptorRegistry, EntityDescriptor, StaticRegistry};
///
/// let registry = StaticRegistry::new()
///     .with(EntityDescriptor::structured("product"))
///     .unwrap();
/// assert_eq!(registry.descriptor("product").unwrap().storage_location(), "object_product");
/// assert!(registry.descriptor("missing").is_err());
/// ```
#[derive(Default)]
pub struct StaticRegistry {
    descriptors: RwLock<HashMap<String, Arc<EntityDescriptor>>>,
    loader: Option<Loader>,
}

impl StaticRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that loads unknown types on first use.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(&str) -> Option<EntityDescriptor> + Send + Sync + 'static,
    {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            loader: Some(Box::new(loader)),
        }
    }

    /// Registers a descriptor, replacing any previous one for its type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDescriptor`] if the descriptor fails
    /// validation.
    pub fn register(&self, descriptor: EntityDescriptor) -> CoreResult<Arc<EntityDescriptor>> {
        descriptor.validate()?;
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .write()
            .insert(descriptor.type_name().to_string(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Registers a descriptor, builder style.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDescriptor`] if the descriptor fails
    /// validation.
    pub fn with(self, descriptor: EntityDescriptor) -> CoreResult<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Returns the number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    /// Returns true if no descriptors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

impl DescriptorRegistry for StaticRegistry {
    fn descriptor(&self, type_name: &str) -> CoreResult<Arc<EntityDescriptor>> {
        if let Some(descriptor) = self.descriptors.read().get(type_name) {
            return Ok(Arc::clone(descriptor));
        }

        let loaded = self
            .loader
            .as_ref()
            .and_then(|load| load(type_name))
            .ok_or_else(|| CoreError::unknown_type(type_name))?;
        if loaded.type_name() != type_name {
            return Err(CoreError::invalid_descriptor(
                type_name,
                format!("loader returned descriptor for '{}'", loaded.type_name()),
            ));
        }
        loaded.validate()?;

        // Another caller may have loaded it meanwhile; keep the first.
        let mut descriptors = self.descriptors.write();
        let entry = descriptors
            .entry(type_name.to_string())
            .or_insert_with(|| Arc::new(loaded));
        Ok(Arc::clone(entry))
    }

    fn has_descriptor(&self, type_name: &str) -> bool {
        self.descriptors.read().contains_key(type_name)
    }

    fn all_descriptors(&self) -> Vec<Arc<EntityDescriptor>> {
        let mut all: Vec<_> = self.descriptors.read().values().cloned().collect();
        all.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        all
    }
}

impl fmt::Debug for StaticRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.descriptors.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("StaticRegistry")
            .field("types", &names)
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}
