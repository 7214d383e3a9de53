//! # ormkit Testkit
//!
//! Test utilities for ormkit.
//!
//! This crate provides:
//! - A sample catalog schema and session helpers
//! - A call-recording backend with failure injection
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use ormkit_testkit::prelude::*;
//!
//! with_session(|em, backend| {
//!     let lamp = product("lamp", 3);
//!     em.persist(&lamp).unwrap();
//!     em.flush().unwrap();
//!     assert_eq!(backend.write_count(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;
