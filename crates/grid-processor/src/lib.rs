//! Catalog-backed virtual arrays with a persistent result cache.
//!
//! A [`storage::Manifest`] records which variables and axes each file
//! holds. This crate turns that table into a small set of [`Domain`]s,
//! exposes every (domain, variable) pair as a lazily read [`DataVar`], and
//! persists computed results in a fingerprinted Zarr [`ResultCache`].
//!
//! # Architecture
//!
//! ```text
//! Manifest::get_table(files)
//!      │
//!      ▼
//! SourceRow::from_table ──► AxisManager (interned axes, value sets)
//!      │
//!      ├─► aggregate: group by schema, union along one axis
//!      ├─► merge: cross-domain unions to a fixed point
//!      └─► remove_subsumed
//!               │
//!               ▼
//!      Dataset { domains, DataVar per variable }
//!               │
//!               ├─► find_best(names, maximize, requirement)
//!               │
//!               └─► DataVar::read(selection)
//!                        │  open each contributing file, scatter, NaN gaps
//!                        ▼
//!                  ResultCache::write ──► {prefix}{caller}_{fingerprint}[_{span}].zarr
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{AxisManager, Dataset, GridcatConfig, ResultCache, Selection};
//!
//! let config = GridcatConfig::from_env();
//! let dataset = Dataset::from_manifest(&manifest, &files, registry, Arc::new(AxisManager::new()), &config)?;
//!
//! let tt = dataset.find_best(&["TT"], |v| v.len(), |_| true)?[0];
//! let block = tt.read(&Selection::all().value("level", 850.0))?;
//!
//! let cache = ResultCache::new(config.cache_config());
//! let cached = cache.write(tt, "tt")?;
//! ```

pub mod axis_manager;
pub mod cache;
pub mod config;
pub mod domain;
pub mod processor;
pub mod query;
pub mod writer;

// Re-export commonly used types at crate root
pub use axis_manager::{AxisId, AxisManager, AxisManagerStats, SetId};
pub use cache::{fingerprint, robust_range, CachedVar, ResultCache};
pub use config::{GridcatConfig, ResultCacheConfig, ZarrCompression, ZarrSettings};
pub use domain::{compute_domains, Domain, DomainAxis, SourceRow};
pub use processor::{
    ArrayBlock, AxisSelector, DataVar, DerivedVar, Selection, Variable, ZarrOpener, ZARR_OPENER_ID,
};
pub use query::Dataset;
pub use writer::{ZarrWriteResult, ZarrWriter};
