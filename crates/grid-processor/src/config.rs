//! Configuration for catalog queries and the result cache.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use storage::Manifest;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridcatConfig {
    /// Where the manifest is persisted; `None` keeps it in memory.
    pub manifest_path: Option<PathBuf>,

    /// Prefix prepended to every cache artifact filename.
    pub cache_prefix: String,

    /// The single directory new cache artifacts are written to.
    pub cache_write_dir: Option<PathBuf>,

    /// Read-only fallback directories searched after the write directory.
    pub cache_read_dirs: Vec<PathBuf>,

    /// Maximum number of pairwise merge rounds in domain algebra.
    pub merge_iteration_limit: usize,

    /// Elements written between progress callbacks during array reads.
    pub progress_interval: u64,

    /// Layout of Zarr cache artifacts.
    pub zarr: ZarrSettings,
}

impl Default for GridcatConfig {
    fn default() -> Self {
        Self {
            manifest_path: None,
            cache_prefix: String::new(),
            cache_write_dir: None,
            cache_read_dirs: Vec::new(),
            merge_iteration_limit: 64,
            progress_interval: 1_000_000,
            zarr: ZarrSettings::default(),
        }
    }
}

impl GridcatConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRIDCAT_MANIFEST") {
            if !val.is_empty() {
                config.manifest_path = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GRIDCAT_CACHE_PREFIX") {
            config.cache_prefix = val;
        }

        if let Ok(val) = std::env::var("GRIDCAT_CACHE_WRITE_DIR") {
            if !val.is_empty() {
                config.cache_write_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GRIDCAT_CACHE_READ_DIRS") {
            config.cache_read_dirs = parse_dir_list(&val);
        }

        if let Ok(val) = std::env::var("GRIDCAT_MERGE_ITERATION_LIMIT") {
            if let Ok(limit) = val.parse() {
                config.merge_iteration_limit = limit;
            }
        }

        if let Ok(val) = std::env::var("GRIDCAT_PROGRESS_INTERVAL") {
            if let Ok(interval) = val.parse() {
                config.progress_interval = interval;
            }
        }

        config.zarr = ZarrSettings::from_env();
        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.merge_iteration_limit == 0 {
            return Err("merge_iteration_limit must be > 0".to_string());
        }

        if self.progress_interval == 0 {
            return Err("progress_interval must be > 0".to_string());
        }

        if let Some(dir) = &self.cache_write_dir {
            if self.cache_read_dirs.contains(dir) {
                return Err(format!(
                    "cache write dir {} is also listed as a read dir",
                    dir.display()
                ));
            }
        }

        self.zarr.validate()
    }

    /// The manifest at `manifest_path`, or an unpersisted one.
    pub fn open_manifest(&self) -> Manifest {
        match &self.manifest_path {
            Some(path) => Manifest::open(path),
            None => Manifest::in_memory(),
        }
    }

    /// Settings for the result cache.
    pub fn cache_config(&self) -> ResultCacheConfig {
        ResultCacheConfig {
            prefix: self.cache_prefix.clone(),
            write_dir: self.cache_write_dir.clone(),
            read_dirs: self.cache_read_dirs.clone(),
            zarr: self.zarr.clone(),
        }
    }
}

/// Settings for the result cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultCacheConfig {
    /// Global filename prefix.
    pub prefix: String,
    /// Writable directory, searched first.
    pub write_dir: Option<PathBuf>,
    /// Read-only fallbacks, in priority order.
    pub read_dirs: Vec<PathBuf>,
    /// Artifact layout.
    pub zarr: ZarrSettings,
}

impl ResultCacheConfig {
    /// A cache that writes to (and reads from) a single directory.
    pub fn writable(dir: impl Into<PathBuf>) -> Self {
        Self {
            write_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_read_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.read_dirs.push(dir.into());
        self
    }
}

/// Chunking and compression of Zarr artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZarrSettings {
    /// Chunk extent along the two innermost dimensions.
    pub chunk_size: usize,

    /// Compression codec.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for ZarrSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl ZarrSettings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(val) = std::env::var("ZARR_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                settings.chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            settings.compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                settings.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            settings.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        settings
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("zarr chunk_size must be > 0".to_string());
        }

        if self.compression_level == 0 || self.compression_level > 9 {
            return Err("zarr compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive). Unknown names fall back to Blosc/Zstd.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn parse_dir_list(val: &str) -> Vec<PathBuf> {
    val.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
