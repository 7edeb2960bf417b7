//! In-memory file opener.
//!
//! Catalog scans still stat real files for their modification time, so
//! [`MemoryOpener::add_file`] creates an empty placeholder on disk and keeps
//! the variables in memory. Replacing a file's variables after a scan
//! simulates a file rewritten in place.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use gridcat_common::{Attributes, Axis, GridcatError, GridcatResult};
use storage::{FileOpener, OpenedVariable, VariableReader};

/// One variable held in memory, values row-major over `axes`.
#[derive(Debug, Clone)]
pub struct MemoryVariable {
    pub name: String,
    pub axes: Vec<Axis>,
    pub attrs: Attributes,
    pub data: Arc<Vec<f32>>,
}

impl MemoryVariable {
    /// Panics when `data` does not match the axes' shape.
    pub fn new(name: &str, axes: Vec<Axis>, data: Vec<f32>) -> Self {
        let expected: usize = axes.iter().map(Axis::len).product();
        assert_eq!(
            data.len(),
            expected,
            "variable '{}' has {} values for shape of {} elements",
            name,
            data.len(),
            expected
        );
        Self {
            name: name.to_string(),
            axes,
            attrs: Attributes::new(),
            data: Arc::new(data),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }
}

/// File opener serving variables from memory.
pub struct MemoryOpener {
    id: String,
    extensions: &'static [&'static str],
    files: Mutex<HashMap<PathBuf, Vec<MemoryVariable>>>,
    opens: AtomicUsize,
    reads: Arc<AtomicUsize>,
}

impl MemoryOpener {
    pub fn new(id: &str) -> Self {
        Self::with_extensions(id, &[".mem"])
    }

    pub fn with_extensions(id: &str, extensions: &'static [&'static str]) -> Self {
        Self {
            id: id.to_string(),
            extensions,
            files: Mutex::new(HashMap::new()),
            opens: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register variables for `path` without touching the filesystem.
    pub fn insert(&self, path: impl Into<PathBuf>, variables: Vec<MemoryVariable>) {
        self.files.lock().insert(path.into(), variables);
    }

    /// Create an empty placeholder file `dir/name` and register its variables.
    pub fn add_file(&self, dir: &Path, name: &str, variables: Vec<MemoryVariable>) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").expect("failed to create placeholder file");
        self.insert(path.clone(), variables);
        path
    }

    /// Forget a file; later opens of it fail.
    pub fn remove(&self, path: &Path) {
        self.files.lock().remove(path);
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of `read` calls so far, across all opened variables.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FileOpener for MemoryOpener {
    fn id(&self) -> &str {
        &self.id
    }

    fn extensions(&self) -> &[&str] {
        self.extensions
    }

    fn open(&self, path: &Path) -> GridcatResult<Vec<OpenedVariable>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock();
        let variables = files
            .get(path)
            .ok_or_else(|| GridcatError::data_read(format!("no such file: {}", path.display())))?;

        Ok(variables
            .iter()
            .map(|v| OpenedVariable {
                name: v.name.clone(),
                axes: v.axes.clone(),
                attrs: v.attrs.clone(),
                reader: Box::new(MemoryReader {
                    shape: v.shape(),
                    data: Arc::clone(&v.data),
                    reads: Arc::clone(&self.reads),
                }),
            })
            .collect())
    }
}

struct MemoryReader {
    shape: Vec<usize>,
    data: Arc<Vec<f32>>,
    reads: Arc<AtomicUsize>,
}

impl VariableReader for MemoryReader {
    fn read(&self, ranges: &[Range<usize>]) -> GridcatResult<Vec<f32>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if ranges.len() != self.shape.len() {
            return Err(GridcatError::data_read(format!(
                "expected {} ranges, got {}",
                self.shape.len(),
                ranges.len()
            )));
        }
        for (range, &extent) in ranges.iter().zip(&self.shape) {
            if range.start > range.end || range.end > extent {
                return Err(GridcatError::data_read(format!(
                    "range {:?} out of bounds for extent {}",
                    range, extent
                )));
            }
        }

        let counts: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        let total: usize = counts.iter().product();
        let mut out = Vec::with_capacity(total);
        if total == 0 {
            return Ok(out);
        }

        let mut strides = vec![1usize; self.shape.len()];
        for d in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.shape[d + 1];
        }

        let mut offset = vec![0usize; ranges.len()];
        for _ in 0..total {
            let flat: usize = offset
                .iter()
                .zip(ranges)
                .zip(&strides)
                .map(|((o, r), s)| (r.start + o) * s)
                .sum();
            out.push(self.data[flat]);
            for d in (0..counts.len()).rev() {
                offset[d] += 1;
                if offset[d] < counts[d] {
                    break;
                }
                offset[d] = 0;
            }
        }
        Ok(out)
    }
}
