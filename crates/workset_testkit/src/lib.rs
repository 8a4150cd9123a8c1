//! # Workset Testkit
//!
//! Test utilities for Workset.
//!
//! This crate provides:
//! - Module fixtures wired over in-memory stores
//! - Scripted store doubles for completion-protocol tests
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use workset_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_session() {
//!     init_test_tracing();
//!     let fixture = ShopFixture::single_store();
//!     let uow = fixture.factory.new_unit_of_work();
//!     // ... session operations
//!     uow.complete().unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
