//! Result cache: persisted, fingerprinted variable results.

mod fingerprint;
mod result_cache;

pub use fingerprint::fingerprint;
pub use result_cache::{robust_range, CachedVar, ResultCache, ARTIFACT_EXTENSION};
