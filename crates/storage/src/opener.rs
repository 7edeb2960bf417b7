//! File-opener contract.
//!
//! Each supported file format is exposed through a [`FileOpener`]. Opening a
//! file yields its variables with their axes and attributes, plus a lazy
//! [`VariableReader`] that fetches data only when asked. The catalog uses the
//! metadata during scans; virtual arrays open the file again at read time.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use gridcat_common::{Attributes, Axis, GridcatResult};

use crate::manifest::VariableRecord;

/// Lazy access to one variable's data inside an opened file.
pub trait VariableReader: Send {
    /// Read the hyper-rectangle given by one index range per axis.
    ///
    /// Values are returned in row-major order (last axis fastest).
    fn read(&self, ranges: &[Range<usize>]) -> GridcatResult<Vec<f32>>;
}

/// A variable discovered in a file.
pub struct OpenedVariable {
    pub name: String,
    pub axes: Vec<Axis>,
    pub attrs: Attributes,
    pub reader: Box<dyn VariableReader>,
}

impl OpenedVariable {
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }

    /// Metadata-only copy for the catalog.
    pub fn record(&self) -> VariableRecord {
        VariableRecord {
            name: self.name.clone(),
            axes: self.axes.clone(),
            attrs: self.attrs.clone(),
        }
    }
}

impl std::fmt::Debug for OpenedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedVariable")
            .field("name", &self.name)
            .field("axes", &self.axes)
            .field("attrs", &self.attrs)
            .finish_non_exhaustive()
    }
}

/// Per-format adapter.
pub trait FileOpener: Send + Sync {
    /// Stable identity, recorded in the catalog and used to group domains.
    fn id(&self) -> &str;

    /// Lower-case filename suffixes this opener handles (e.g. `.zarr`).
    fn extensions(&self) -> &[&str] {
        &[]
    }

    /// Open a file and list its variables without loading data.
    fn open(&self, path: &Path) -> GridcatResult<Vec<OpenedVariable>>;
}

/// Registry of openers, keyed by identity.
#[derive(Default, Clone)]
pub struct OpenerRegistry {
    openers: Vec<Arc<dyn FileOpener>>,
}

impl OpenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an opener. A later registration with the same id replaces the earlier one.
    pub fn register(&mut self, opener: Arc<dyn FileOpener>) {
        self.openers.retain(|o| o.id() != opener.id());
        self.openers.push(opener);
    }

    pub fn with(mut self, opener: Arc<dyn FileOpener>) -> Self {
        self.register(opener);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn FileOpener>> {
        self.openers.iter().find(|o| o.id() == id).cloned()
    }

    /// Pick an opener by filename suffix (case-insensitive).
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn FileOpener>> {
        let lower = path.to_string_lossy().to_lowercase();
        let lower = lower.trim_end_matches(['/', '\\']);
        self.openers
            .iter()
            .find(|o| o.extensions().iter().any(|ext| lower.ends_with(ext)))
            .cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.openers.iter().map(|o| o.id()).collect()
    }

    /// All suffixes known to the registered openers.
    pub fn extensions(&self) -> Vec<String> {
        self.openers
            .iter()
            .flat_map(|o| o.extensions().iter().map(|e| e.to_string()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.openers.is_empty()
    }
}

impl std::fmt::Debug for OpenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenerRegistry")
            .field("openers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Named(&'static str, &'static [&'static str]);

    impl FileOpener for Named {
        fn id(&self) -> &str {
            self.0
        }

        fn extensions(&self) -> &[&str] {
            self.1
        }

        fn open(&self, _path: &Path) -> GridcatResult<Vec<OpenedVariable>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_for_path_matches_suffix() {
        let registry = OpenerRegistry::new()
            .with(Arc::new(Named("zarr", &[".zarr"])))
            .with(Arc::new(Named("fst", &[".fst", ".std"])));

        let path = PathBuf::from("/data/run/2024010100_000.FST");
        assert_eq!(registry.for_path(&path).unwrap().id(), "fst");

        let store = PathBuf::from("/data/out/TT.zarr/");
        assert_eq!(registry.for_path(&store).unwrap().id(), "zarr");

        assert!(registry.for_path(Path::new("/data/readme.txt")).is_none());
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = OpenerRegistry::new();
        registry.register(Arc::new(Named("fst", &[".fst"])));
        registry.register(Arc::new(Named("fst", &[".std"])));

        assert_eq!(registry.ids(), vec!["fst"]);
        assert_eq!(registry.extensions(), vec![".std".to_string()]);
    }
}
