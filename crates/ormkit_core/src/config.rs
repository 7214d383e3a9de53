//! Entity manager configuration.

/// What the commit-order calculator does when committed types depend on
/// each other in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Ignore the edge that closes the cycle and log a warning.
    #[default]
    Break,
    /// Fail the commit with [`crate::CoreError::CyclicDependency`].
    Fail,
}

/// Configuration for an entity manager and its unit of work.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Separator joining identifier values into an identity-map key.
    pub identifier_separator: &'static str,

    /// Handling of dependency cycles between committed types.
    pub cycle_policy: CyclePolicy,

    /// Whether identifiers generated by the backend on insert are written
    /// back into the entities and registered in the identity map.
    pub register_generated_identifiers: bool,

    /// Whether state probing may ask the backend if an untracked entity
    /// with an identifier already exists.
    pub probe_backend_for_state: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            identifier_separator: " ",
            cycle_policy: CyclePolicy::Break,
            register_generated_identifiers: true,
            probe_backend_for_state: true,
        }
    }
}

impl ManagerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identifier separator.
    #[must_use]
    pub const fn identifier_separator(mut self, separator: &'static str) -> Self {
        self.identifier_separator = separator;
        self
    }

    /// Sets the cycle policy.
    #[must_use]
    pub const fn cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// Sets whether generated identifiers are registered after commit.
    #[must_use]
    pub const fn register_generated_identifiers(mut self, value: bool) -> Self {
        self.register_generated_identifiers = value;
        self
    }

    /// Sets whether state probing may query the backend.
    #[must_use]
    pub const fn probe_backend_for_state(mut self, value: bool) -> Self {
        self.probe_backend_for_state = value;
        self
    }
}
