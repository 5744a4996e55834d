//! Internal implementation modules for `pkgharness-core`.
//!
//! The crate root re-exports the public surface; tests should not need to
//! reach into these modules directly.

pub mod assertions;
pub mod config;
pub mod diff;
pub mod errors;
pub mod fixtures;
pub(crate) mod fs;
pub mod runner;
pub mod sandbox;
pub mod session;
pub mod snapshot;
