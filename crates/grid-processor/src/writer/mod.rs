//! Zarr writer for cache artifacts.
//!
//! Artifacts use the same store layout the Zarr opener reads, so a cached
//! result can be scanned and opened like any other file.

mod zarr_writer;

pub use zarr_writer::{ZarrWriteResult, ZarrWriter, ATTRIBUTES_ATTR, AXES_ATTR};
