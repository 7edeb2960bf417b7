//! Persisted file catalog.
//!
//! The manifest maps each scanned file to the opener that understood it and
//! the variables it holds (name, axes, attributes). It is stored as a single
//! versioned JSON blob; the blob's modification time doubles as the
//! staleness watermark, so files not touched since the last save are not
//! reopened on the next scan. Only files read successfully (or skipped as
//! unchanged) move the watermark.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use gridcat_common::{Attributes, Axis, GridcatError, GridcatResult, Progress, ProgressFn};

use crate::opener::{FileOpener, OpenerRegistry};

/// Bump whenever the serialized layout changes; mismatched manifests are discarded.
pub const MANIFEST_VERSION: u32 = 1;

/// Files between progress callbacks during a scan.
const PROGRESS_EVERY: usize = 100;

/// One variable found in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub name: String,
    pub axes: Vec<Axis>,
    #[serde(default)]
    pub attrs: Attributes,
}

impl VariableRecord {
    pub fn axis(&self, name: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.name() == name)
    }
}

/// A catalog entry representing one scanned file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub opener: String,
    pub modified: DateTime<Utc>,
    pub variables: Vec<VariableRecord>,
}

impl CatalogEntry {
    pub fn variable(&self, name: &str) -> Option<&VariableRecord> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Outcome counts for one scan call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Files (re)read through their opener and stored.
    pub scanned: usize,
    /// Files skipped because they have not changed since the watermark.
    pub unchanged: usize,
    /// Files that could not be stat'ed or opened (left as they were).
    pub failed: usize,
    /// Entries whose stored content actually changed.
    pub changed: usize,
}

#[derive(Serialize, Deserialize)]
struct ManifestBlob {
    version: u32,
    entries: Vec<CatalogEntry>,
}

/// File catalog with incremental rescans.
#[derive(Debug, Default)]
pub struct Manifest {
    location: Option<PathBuf>,
    entries: Vec<CatalogEntry>,
    index: HashMap<PathBuf, usize>,
    watermark: Option<SystemTime>,
    dirty: bool,
}

impl Manifest {
    /// A manifest that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the manifest stored at `path`.
    ///
    /// A missing file, a corrupt payload or a version mismatch all yield an
    /// empty manifest bound to `path` (cold start).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let location = path.into();
        let mut manifest = Self {
            location: Some(location.clone()),
            ..Self::default()
        };

        let raw = match fs::read(&location) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %location.display(), error = %e, "No manifest on disk, starting cold");
                return manifest;
            }
        };

        let blob: ManifestBlob = match serde_json::from_slice(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(path = %location.display(), error = %e, "Corrupt manifest, starting cold");
                return manifest;
            }
        };

        if blob.version != MANIFEST_VERSION {
            warn!(
                path = %location.display(),
                found = blob.version,
                expected = MANIFEST_VERSION,
                "Manifest version mismatch, starting cold"
            );
            return manifest;
        }

        manifest.watermark = fs::metadata(&location).and_then(|m| m.modified()).ok();
        for entry in blob.entries {
            manifest.insert(entry);
        }

        info!(
            path = %location.display(),
            files = manifest.entries.len(),
            "Loaded manifest"
        );
        manifest
    }

    /// Scan files with a single opener.
    pub fn scan<P: AsRef<Path>>(&mut self, files: &[P], opener: &dyn FileOpener) -> ScanReport {
        self.scan_inner(files, |_| Some(opener), None)
    }

    /// Scan files, reporting progress every few hundred files.
    pub fn scan_with_progress<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        opener: &dyn FileOpener,
        progress: &mut ProgressFn<'_>,
    ) -> ScanReport {
        self.scan_inner(files, |_| Some(opener), Some(progress))
    }

    /// Scan files, choosing an opener for each file by extension.
    pub fn scan_registry<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        registry: &OpenerRegistry,
    ) -> ScanReport {
        let resolved: Vec<_> = files.iter().map(|f| registry.for_path(f.as_ref())).collect();
        self.scan_inner(files, |i| resolved[i].as_deref(), None)
    }

    fn scan_inner<'o, P, F>(
        &mut self,
        files: &[P],
        opener_for: F,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> ScanReport
    where
        P: AsRef<Path>,
        F: Fn(usize) -> Option<&'o dyn FileOpener>,
    {
        let mut report = ScanReport::default();
        let mut newest = self.watermark;
        let total = files.len() as u64;

        for (i, file) in files.iter().enumerate() {
            let path = file.as_ref();
            let opener = opener_for(i);

            let modified = match modification_time(path) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat file, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            let mut advance = || newest = Some(newest.map_or(modified, |n| n.max(modified)));

            // Skip only if neither the watermark nor the file's own entry is older.
            let stored = self.get(path).map(|e| e.modified);
            let unchanged = stored.is_some_and(|at| DateTime::<Utc>::from(modified) <= at)
                && self.watermark.is_some_and(|wm| modified <= wm);
            if unchanged {
                report.unchanged += 1;
                advance();
            } else {
                match opener {
                    Some(opener) => match Self::read_entry(path, modified, opener) {
                        Ok(entry) => {
                            report.scanned += 1;
                            advance();
                            if self.insert(entry) {
                                report.changed += 1;
                                self.dirty = true;
                            }
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                            report.failed += 1;
                        }
                    },
                    None => {
                        warn!(path = %path.display(), "No opener for file, skipping");
                        report.failed += 1;
                    }
                }
            }

            if let Some(cb) = progress.as_deref_mut() {
                if (i + 1) % PROGRESS_EVERY == 0 {
                    cb(Progress {
                        done: (i + 1) as u64,
                        total,
                    });
                }
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            cb(Progress { done: total, total });
        }

        self.watermark = newest;

        info!(
            scanned = report.scanned,
            unchanged = report.unchanged,
            failed = report.failed,
            changed = report.changed,
            "Scan complete"
        );
        report
    }

    fn read_entry(
        path: &Path,
        modified: SystemTime,
        opener: &dyn FileOpener,
    ) -> GridcatResult<CatalogEntry> {
        let variables = opener
            .open(path)
            .map_err(|e| GridcatError::catalog_read(path, e.to_string()))?
            .iter()
            .map(|v| v.record())
            .collect();

        Ok(CatalogEntry {
            path: path.to_path_buf(),
            opener: opener.id().to_string(),
            modified: DateTime::<Utc>::from(modified),
            variables,
        })
    }

    /// Insert or replace an entry, keeping the original position of replaced
    /// entries. Returns whether the stored table changed.
    fn insert(&mut self, entry: CatalogEntry) -> bool {
        match self.index.get(&entry.path) {
            Some(&idx) => {
                if self.entries[idx] == entry {
                    false
                } else {
                    self.entries[idx] = entry;
                    true
                }
            }
            None => {
                self.index.insert(entry.path.clone(), self.entries.len());
                self.entries.push(entry);
                true
            }
        }
    }

    /// Re-read the given files regardless of the watermark, dropping entries
    /// for files that no longer exist.
    pub fn rescan<P: AsRef<Path>>(&mut self, files: &[P], opener: &dyn FileOpener) -> ScanReport {
        let mut present = Vec::with_capacity(files.len());
        for file in files {
            let path = file.as_ref();
            if path.exists() {
                present.push(path.to_path_buf());
            } else if self.forget(path).is_some() {
                debug!(path = %path.display(), "Dropped vanished file from manifest");
            }
        }

        let previous = self.watermark.take();
        let report = self.scan(&present, opener);
        self.watermark = match (previous, self.watermark) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        report
    }

    /// Remove a file from the table.
    pub fn forget(&mut self, path: &Path) -> Option<CatalogEntry> {
        let idx = self.index.remove(path)?;
        let entry = self.entries.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        self.dirty = true;
        Some(entry)
    }

    /// Entries for the selected files only, in stored (scan insertion) order.
    pub fn get_table<P: AsRef<Path>>(&self, selected: &[P]) -> Vec<CatalogEntry> {
        let wanted: HashSet<&Path> = selected.iter().map(|p| p.as_ref()).collect();
        self.entries
            .iter()
            .filter(|e| wanted.contains(e.path.as_path()))
            .cloned()
            .collect()
    }

    /// Persist the manifest if it changed since it was loaded or last saved.
    ///
    /// Returns whether anything was written.
    pub fn save(&mut self) -> GridcatResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let location = self
            .location
            .clone()
            .ok_or_else(|| GridcatError::Config("manifest has no location".to_string()))?;

        if let Some(parent) = location.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let blob = ManifestBlob {
            version: MANIFEST_VERSION,
            entries: self.entries.clone(),
        };
        let payload = serde_json::to_vec(&blob)?;

        let mut tmp = location.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &location)?;

        if let Some(watermark) = self.watermark {
            filetime::set_file_mtime(&location, FileTime::from_system_time(watermark))?;
        }

        self.dirty = false;
        info!(path = %location.display(), files = self.entries.len(), "Saved manifest");
        Ok(true)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, path: &Path) -> Option<&CatalogEntry> {
        self.index.get(path).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn watermark(&self) -> Option<SystemTime> {
        self.watermark
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
}

/// Latest modification time of a file, or of anything inside a directory
/// store. Rewriting a chunk of a store leaves the directory's own time as is.
fn modification_time(path: &Path) -> std::io::Result<SystemTime> {
    let meta = fs::metadata(path)?;
    let mut latest = meta.modified()?;
    if meta.is_dir() {
        for entry in WalkDir::new(path).min_depth(1) {
            latest = latest.max(entry?.metadata()?.modified()?);
        }
    }
    Ok(latest)
}

/// Walk `root` and collect files whose names end with one of `extensions`,
/// sorted by path. Matching directories (e.g. Zarr stores) are returned
/// as-is and not descended into.
pub fn discover_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let lowered: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let mut found = Vec::new();

    let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Error while walking directory");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_lowercase();
        if lowered.iter().any(|ext| name.ends_with(ext.as_str())) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            found.push(entry.into_path());
        }
    }

    found
}
