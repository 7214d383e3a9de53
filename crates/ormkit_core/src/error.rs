//! Error types for ormkit core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ormkit core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("backend failure: {0}")]
    Backend(#[from] ormkit_storage::StorageError),

    /// The requested lifecycle operation is not valid in the entity's state.
    #[error("invalid state transition: {message}")]
    InvalidStateTransition {
        /// Description of the rejected transition.
        message: String,
    },

    /// An identifier was required but is absent or has a null component.
    #[error("entity of type {type_name} has no usable identifier")]
    MissingIdentity {
        /// Type of the entity.
        type_name: String,
    },

    /// The entity is not managed by this unit of work.
    #[error("entity {oid} is not managed")]
    NotManaged {
        /// Rendered object id of the entity.
        oid: String,
    },

    /// The operation is not supported.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the operation.
        operation: String,
    },

    /// The dependency graph between committed types has a cycle.
    #[error("cyclic dependency between entity types: {}", path.join(" -> "))]
    CyclicDependency {
        /// The types forming the cycle, in edge order.
        path: Vec<String>,
    },

    /// A criteria or ordering key is not a field of the entity type.
    #[error("unrecognized field '{field}' for type {type_name}")]
    UnrecognizedField {
        /// Type being queried.
        type_name: String,
        /// The offending key.
        field: String,
    },

    /// No descriptor is registered for the type.
    #[error("unknown entity type: {name}")]
    UnknownEntityType {
        /// Requested type name.
        name: String,
    },

    /// A row addressed by identifier no longer exists.
    #[error("entity of type {type_name} with identifier {identifier} not found")]
    EntityNotFound {
        /// Type of the entity.
        type_name: String,
        /// Rendered identifier.
        identifier: String,
    },

    /// A descriptor failed validation.
    #[error("invalid descriptor for {type_name}: {message}")]
    InvalidDescriptor {
        /// Type the descriptor describes.
        type_name: String,
        /// Description of the problem.
        message: String,
    },

    /// A caller-supplied argument is malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The entity manager was closed.
    #[error("entity manager is closed")]
    ManagerClosed,
}

impl CoreError {
    /// Creates an invalid state transition error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            message: message.into(),
        }
    }

    /// Creates a missing identity error.
    pub fn missing_identity(type_name: impl Into<String>) -> Self {
        Self::MissingIdentity {
            type_name: type_name.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates an unrecognized field error.
    pub fn unrecognized_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnrecognizedField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Creates an unknown entity type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownEntityType { name: name.into() }
    }

    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
