//! Zarr V3 writer for variables with catalog axes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use gridcat_common::{Attributes, Axis, CancelFlag, GridcatError, GridcatResult};

use crate::config::{ZarrCompression, ZarrSettings};

/// Array attribute holding the serialized axis list.
pub const AXES_ATTR: &str = "axes";

/// Array attribute holding the variable attributes.
pub const ATTRIBUTES_ATTR: &str = "attributes";

/// Result of writing a Zarr array.
#[derive(Debug, Clone)]
pub struct ZarrWriteResult {
    /// Store directory written to.
    pub path: PathBuf,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    /// Uncompressed bytes written.
    pub bytes_written: u64,
    pub compression: String,
}

/// Writer for creating Zarr V3 arrays from variable data.
pub struct ZarrWriter {
    settings: ZarrSettings,
}

impl ZarrWriter {
    pub fn new(settings: ZarrSettings) -> Self {
        Self { settings }
    }

    /// Write `data` (row-major over `axes`) as array `/<name>` of the store
    /// at `store_dir`. A variable without axes is written as shape `[1]`.
    ///
    /// Data is written slab by slab along the first dimension; `cancel` is
    /// checked before each slab and a cancelled write returns
    /// [`GridcatError::Interrupted`], leaving the partial store for the
    /// caller to remove.
    pub fn write_variable(
        &self,
        store_dir: &Path,
        name: &str,
        axes: &[Arc<Axis>],
        attrs: &Attributes,
        data: &[f32],
        cancel: &CancelFlag,
    ) -> GridcatResult<ZarrWriteResult> {
        let mut shape: Vec<u64> = axes.iter().map(|a| a.len() as u64).collect();
        let expected: u64 = shape.iter().product();
        // Scalars are stored as a single element; the empty axis list marks them.
        if shape.is_empty() {
            shape.push(1);
        }
        if data.len() as u64 != expected {
            return Err(GridcatError::cache_write(
                store_dir,
                format!("{} values for shape {:?}", data.len(), shape),
            ));
        }

        let chunk_shape = self.chunk_shape(&shape);
        let fail = |e: &dyn std::fmt::Display| GridcatError::cache_write(store_dir, e.to_string());

        std::fs::create_dir_all(store_dir).map_err(|e| fail(&e))?;
        let store = Arc::new(FilesystemStore::new(store_dir).map_err(|e| fail(&e))?);

        let mut attributes = serde_json::Map::new();
        let axis_refs: Vec<&Axis> = axes.iter().map(|a| a.as_ref()).collect();
        attributes.insert(AXES_ATTR.to_string(), serde_json::to_value(axis_refs)?);
        attributes.insert(ATTRIBUTES_ATTR.to_string(), serde_json::to_value(attrs)?);

        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .clone()
            .try_into()
            .map_err(|e| GridcatError::Config(format!("{:?}", e)))?;

        let mut builder = ArrayBuilder::new(
            shape.clone(),
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        builder.attributes(attributes);
        if self.settings.compression != ZarrCompression::None {
            builder.bytes_to_bytes_codecs(vec![self.create_compression_codec()?]);
        }

        let array = builder
            .build(store, &format!("/{}", name))
            .map_err(|e| fail(&e))?;
        array.store_metadata().map_err(|e| fail(&e))?;

        // Slabs of whole chunks along the first dimension.
        let slab_rows = chunk_shape[0];
        let row_len: u64 = shape[1..].iter().product();
        let mut start_row = 0u64;
        while start_row < shape[0] {
            if cancel.is_cancelled() {
                return Err(GridcatError::Interrupted(store_dir.to_path_buf()));
            }
            let rows = slab_rows.min(shape[0] - start_row);

            let mut start = vec![0u64; shape.len()];
            start[0] = start_row;
            let mut extent = shape.clone();
            extent[0] = rows;
            let subset = ArraySubset::new_with_start_shape(start, extent).map_err(|e| fail(&e))?;

            let from = (start_row * row_len) as usize;
            let to = ((start_row + rows) * row_len) as usize;
            array
                .store_array_subset_elements(&subset, &data[from..to])
                .map_err(|e| fail(&e))?;
            start_row += rows;
        }

        debug!(
            path = %store_dir.display(),
            variable = name,
            shape = ?shape,
            "Wrote Zarr array"
        );

        Ok(ZarrWriteResult {
            path: store_dir.to_path_buf(),
            shape,
            chunk_shape,
            bytes_written: (data.len() * std::mem::size_of::<f32>()) as u64,
            compression: self.settings.compression.as_str().to_string(),
        })
    }

    /// Square chunks over the two innermost dimensions, one element deep
    /// along the others.
    fn chunk_shape(&self, shape: &[u64]) -> Vec<u64> {
        let size = self.settings.chunk_size.max(1) as u64;
        let inner = shape.len().saturating_sub(2);
        shape
            .iter()
            .enumerate()
            .map(|(d, &n)| if d >= inner { n.clamp(1, size) } else { 1 })
            .collect()
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
    ) -> GridcatResult<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.settings.compression_level)
            .map_err(|_| GridcatError::Config("Invalid compression level".to_string()))?;

        let shuffle = if self.settings.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.settings.shuffle { Some(4) } else { None };

        let compressor = match self.settings.compression {
            ZarrCompression::None => {
                return Err(GridcatError::Config(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| GridcatError::Config(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}
