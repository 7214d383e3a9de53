//! Entity metadata: descriptors and their registry.

mod descriptor;
mod registry;

pub use descriptor::{ElementKind, EntityDescriptor, Relations};
pub use registry::{DescriptorRegistry, StaticRegistry};
