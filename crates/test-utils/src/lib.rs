//! Shared test utilities for the gridcat workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Axis fixtures (latitude, forecast times, levels)
//! - Field generators with predictable values
//! - An in-memory file opener for catalog and domain tests
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, MemoryOpener};
//! ```

pub mod fixtures;
pub mod generators;
pub mod memory;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use memory::{MemoryOpener, MemoryVariable};
