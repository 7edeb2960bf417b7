//! Write-once cache of materialized variables.
//!
//! Artifacts are Zarr stores named after a structural fingerprint of the
//! variable. Lookup searches the writable directory and then each read-only
//! directory by exact filename; an existing artifact is opened instead of
//! recomputing. New artifacts are written to a hidden temp store in the
//! writable directory and renamed into place, so a store under the target
//! name is always complete.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use gridcat_common::{
    AttrKey, Attributes, Axis, CancelFlag, DateRange, GridcatError, GridcatResult, Progress,
    ProgressFn,
};
use storage::{FileOpener, VariableReader};

use super::fingerprint::fingerprint;
use crate::config::ResultCacheConfig;
use crate::processor::{Variable, ZarrOpener};
use crate::writer::ZarrWriter;

/// Extension of cache artifacts.
pub const ARTIFACT_EXTENSION: &str = "zarr";

const LOW_QUANTILE: f64 = 0.002;
const HIGH_QUANTILE: f64 = 0.998;

/// Result cache over one writable directory and any number of read-only
/// fallbacks.
pub struct ResultCache {
    config: ResultCacheConfig,
    writer: ZarrWriter,
    cancel: CancelFlag,
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Self {
        let writer = ZarrWriter::new(config.zarr.clone());
        Self {
            config,
            writer,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag with the caller. Cancelling it while a
    /// write is in progress aborts the write with `Interrupted`.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Artifact filename for `var` under the caller prefix `prefix`:
    /// `{global}{prefix}_{fingerprint}[_{start}-{end}].zarr`.
    pub fn filename(&self, var: &dyn Variable, prefix: &str) -> String {
        let fp = fingerprint(var.axes(), var.attributes());
        let span = var
            .time_axis()
            .and_then(DateRange::from_axis)
            .map(|r| format!("_{}", r.suffix()))
            .unwrap_or_default();
        format!(
            "{}{}_{}{}.{}",
            self.config.prefix, prefix, fp, span, ARTIFACT_EXTENSION
        )
    }

    /// Search the writable directory, then the read directories in order.
    pub fn locate(&self, filename: &str) -> Option<PathBuf> {
        self.config
            .write_dir
            .iter()
            .chain(self.config.read_dirs.iter())
            .map(|dir| dir.join(filename))
            .find(|path| path.exists())
    }

    pub fn contains(&self, var: &dyn Variable, prefix: &str) -> bool {
        self.locate(&self.filename(var, prefix)).is_some()
    }

    /// Open the artifact for `var`, which must already exist.
    pub fn open_existing(&self, var: &dyn Variable, prefix: &str) -> GridcatResult<CachedVar> {
        let filename = self.filename(var, prefix);
        match self.locate(&filename) {
            Some(path) => CachedVar::open(&path),
            None => Err(GridcatError::CacheNotFound(filename)),
        }
    }

    pub fn write(&self, var: &dyn Variable, prefix: &str) -> GridcatResult<CachedVar> {
        self.write_with_progress(var, prefix, &mut |_: Progress| {})
    }

    /// Return the cached artifact for `var`, materializing and writing it
    /// first if no directory holds one yet.
    ///
    /// Concurrent writers of the same artifact each write a private temp
    /// store; the first to rename it into place wins and the others discard
    /// theirs and open the winner's. Equal fingerprints are assumed to mean
    /// equal content, so callers may get data computed by another writer.
    pub fn write_with_progress(
        &self,
        var: &dyn Variable,
        prefix: &str,
        progress: &mut ProgressFn<'_>,
    ) -> GridcatResult<CachedVar> {
        let filename = self.filename(var, prefix);
        if let Some(path) = self.locate(&filename) {
            info!(path = %path.display(), variable = var.name(), "Cache hit");
            return CachedVar::open(&path);
        }

        let write_dir = self
            .config
            .write_dir
            .as_deref()
            .ok_or(GridcatError::NowhereToWrite)?;
        fs::create_dir_all(write_dir)
            .map_err(|e| GridcatError::cache_write(write_dir, e.to_string()))?;

        let data = var.materialize(progress)?;

        let mut attrs = var.attributes().clone();
        attrs.remove(AttrKey::Low);
        attrs.remove(AttrKey::High);
        if let Some((low, high)) = robust_range(&data) {
            attrs.set(AttrKey::Low, low);
            attrs.set(AttrKey::High, high);
        }

        let target = write_dir.join(&filename);
        let mut partial = PartialStore::new(write_dir.join(format!(
            ".{}.{}.partial",
            filename,
            Uuid::new_v4()
        )));

        let result = self.writer.write_variable(
            partial.path(),
            var.name(),
            var.axes(),
            &attrs,
            &data,
            &self.cancel,
        );
        if let Err(e) = result {
            if e.is_interrupted() {
                warn!(path = %target.display(), "Cache write interrupted");
                return Err(GridcatError::Interrupted(target));
            }
            return Err(e);
        }

        if target.exists() {
            debug!(path = %target.display(), "Cache artifact appeared during write, keeping it");
        } else {
            match fs::rename(partial.path(), &target) {
                Ok(()) => partial.disarm(),
                // Lost the rename to another writer.
                Err(_) if target.exists() => {
                    debug!(path = %target.display(), "Cache artifact appeared during rename, keeping it");
                }
                Err(e) => return Err(GridcatError::cache_write(&target, e.to_string())),
            }
        }

        info!(
            path = %target.display(),
            variable = var.name(),
            elements = data.len(),
            "Wrote cache artifact"
        );
        CachedVar::open(&target)
    }
}

/// Temp store removed on drop unless disarmed.
struct PartialStore {
    path: PathBuf,
    armed: bool,
}

impl PartialStore {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialStore {
    fn drop(&mut self) {
        if !self.armed || !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove partial cache store");
        }
    }
}

/// 2‰ and 998‰ quantiles of the finite values, or `None` if there are none.
pub fn robust_range(data: &[f32]) -> Option<(f64, f64)> {
    let mut finite: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f32::total_cmp);

    let at = |q: f64| {
        let idx = ((finite.len() - 1) as f64 * q).round() as usize;
        finite[idx] as f64
    };
    Some((at(LOW_QUANTILE), at(HIGH_QUANTILE)))
}

/// A variable read back from a cache artifact.
pub struct CachedVar {
    path: PathBuf,
    name: String,
    axes: Vec<Arc<Axis>>,
    attrs: Attributes,
    reader: Box<dyn VariableReader>,
}

impl std::fmt::Debug for CachedVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedVar")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("axes", &self.axes)
            .field("attrs", &self.attrs)
            .finish_non_exhaustive()
    }
}

impl CachedVar {
    /// Open the single array of an artifact store.
    pub fn open(path: &Path) -> GridcatResult<Self> {
        let mut opened = ZarrOpener::new().open(path)?;
        if opened.len() != 1 {
            return Err(GridcatError::catalog_read(
                path,
                format!("cache artifact holds {} arrays, expected 1", opened.len()),
            ));
        }
        let var = opened.remove(0);
        debug!(path = %path.display(), variable = %var.name, "Opened cache artifact");

        Ok(Self {
            path: path.to_path_buf(),
            name: var.name,
            axes: var.axes.into_iter().map(Arc::new).collect(),
            attrs: var.attrs,
            reader: var.reader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored `low`/`high` range.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.attrs.range()
    }

    /// Read a sub-block given per-dimension index ranges.
    pub fn read(&self, ranges: &[Range<usize>]) -> GridcatResult<Vec<f32>> {
        self.reader.read(ranges)
    }
}

impl Variable for CachedVar {
    fn name(&self) -> &str {
        &self.name
    }

    fn axes(&self) -> &[Arc<Axis>] {
        &self.axes
    }

    fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    fn materialize(&self, progress: &mut ProgressFn<'_>) -> GridcatResult<Vec<f32>> {
        let ranges: Vec<Range<usize>> = self.axes.iter().map(|a| 0..a.len()).collect();
        let data = self.reader.read(&ranges)?;
        let total = data.len() as u64;
        progress(Progress { done: total, total });
        Ok(data)
    }
}
