//! File opener for Zarr V3 directory stores.
//!
//! A store holds one array node per variable at `/<name>`. Each node's
//! attributes carry the serialized axes (`axes`) and variable attributes
//! (`attributes`), which is also the layout result-cache artifacts use.

use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use gridcat_common::{Attributes, Axis, GridcatError, GridcatResult};
use storage::{FileOpener, OpenedVariable, VariableReader};

use crate::writer::{ATTRIBUTES_ATTR, AXES_ATTR};

/// Identity under which the Zarr opener is registered.
pub const ZARR_OPENER_ID: &str = "zarr";

/// Opens Zarr V3 stores written in the catalog layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZarrOpener;

impl ZarrOpener {
    pub fn new() -> Self {
        Self
    }
}

impl FileOpener for ZarrOpener {
    fn id(&self) -> &str {
        ZARR_OPENER_ID
    }

    fn extensions(&self) -> &[&str] {
        &[".zarr"]
    }

    fn open(&self, path: &Path) -> GridcatResult<Vec<OpenedVariable>> {
        let store = Arc::new(
            FilesystemStore::new(path)
                .map_err(|e| GridcatError::storage(format!("{}: {}", path.display(), e)))?,
        );

        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && entry.path().join("zarr.json").is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let mut variables = Vec::with_capacity(names.len());
        for name in names {
            match open_array(Arc::clone(&store), path, &name) {
                Ok(var) => variables.push(var),
                Err(e) => {
                    warn!(path = %path.display(), variable = %name, error = %e, "Skipping unreadable array");
                }
            }
        }

        debug!(path = %path.display(), variables = variables.len(), "Opened Zarr store");
        Ok(variables)
    }
}

fn open_array(
    store: Arc<FilesystemStore>,
    path: &Path,
    name: &str,
) -> GridcatResult<OpenedVariable> {
    let array = Array::open(store, &format!("/{}", name))
        .map_err(|e| GridcatError::storage(format!("{}/{}: {}", path.display(), name, e)))?;

    let attrs = array.attributes();
    let axes: Vec<Axis> = match attrs.get(AXES_ATTR) {
        Some(value) => serde_json::from_value(value.clone())?,
        None => {
            return Err(GridcatError::catalog_read(
                path,
                format!("array '{}' has no '{}' attribute", name, AXES_ATTR),
            ))
        }
    };
    let var_attrs: Attributes = match attrs.get(ATTRIBUTES_ATTR) {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Attributes::new(),
    };

    let scalar = axes.is_empty();
    let shape: Vec<u64> = if scalar {
        vec![1]
    } else {
        axes.iter().map(|a| a.len() as u64).collect()
    };
    if array.shape() != shape.as_slice() {
        return Err(GridcatError::inconsistent(
            path,
            name,
            format!(
                "array shape {:?} does not match axes {:?}",
                array.shape(),
                shape
            ),
        ));
    }

    Ok(OpenedVariable {
        name: name.to_string(),
        axes,
        attrs: var_attrs,
        reader: Box::new(ZarrReader { array, scalar }),
    })
}

/// Reads sub-blocks of one Zarr array.
struct ZarrReader {
    array: Array<FilesystemStore>,
    /// Stored as shape `[1]`, read with no ranges.
    scalar: bool,
}

impl VariableReader for ZarrReader {
    fn read(&self, ranges: &[Range<usize>]) -> GridcatResult<Vec<f32>> {
        let (start, shape): (Vec<u64>, Vec<u64>) = if self.scalar && ranges.is_empty() {
            (vec![0], vec![1])
        } else {
            (
                ranges.iter().map(|r| r.start as u64).collect(),
                ranges.iter().map(|r| r.len() as u64).collect(),
            )
        };

        // Zarr uses the stored dimension order directly
        let subset = ArraySubset::new_with_start_shape(start, shape)
            .map_err(|e| GridcatError::data_read(e.to_string()))?;

        self.array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(|e| GridcatError::data_read(e.to_string()))
    }
}
