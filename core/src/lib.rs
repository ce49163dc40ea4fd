//! # Ember Core
//!
//! Utilities shared by every Ember crate. Currently this is the profiling
//! layer; see [`profiling`].

pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
