//! Storage abstractions for gridcat.
//!
//! Provides:
//! - The [`FileOpener`] contract through which per-format adapters expose
//!   variables, axes and lazy readers
//! - [`OpenerRegistry`] for resolving adapters by identity or file extension
//! - The persisted [`Manifest`] catalog of file → variable metadata

pub mod manifest;
pub mod opener;

pub use manifest::{discover_files, CatalogEntry, Manifest, ScanReport, VariableRecord, MANIFEST_VERSION};
pub use opener::{FileOpener, OpenedVariable, OpenerRegistry, VariableReader};
