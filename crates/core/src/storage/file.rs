//! File-based index storage
//!
//! Each stored index is a pair of files in one directory: the encoded index
//! (`<name>.omx`, see [`format`](super::format)) and a small bincode sidecar
//! (`<name>.meta`) with timestamps and sizes. Both are written to a
//! temporary file first and then renamed into place.
//!
//! # Examples
//!
//! ```no_run
//! use omega_core::storage::file::FileStorage;
//! use omega_core::storage::compression::Codec;
//! use omega_core::HnswGraph;
//!
//! # fn main() -> omega_core::Result<()> {
//! let storage = FileStorage::with_codec("/tmp/omega_indexes", Codec::Gzip)?;
//!
//! let mut graph = HnswGraph::with_defaults(3);
//! graph.insert(7, &[0.1, 0.2, 0.3])?;
//! storage.save_index("products", &graph)?;
//!
//! let loaded = storage.load_index("products")?;
//! assert_eq!(loaded.len(), 1);
//! # Ok(())
//! # }
//! ```

use super::compression::Codec;
use super::format::{decode_graph, encode_graph_sized, HEADER_SIZE};
use crate::index::HnswGraph;
use crate::{OmegaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const STORAGE_VERSION: u32 = 1;
const DATA_EXTENSION: &str = "omx";
const META_EXTENSION: &str = "meta";
const TMP_EXTENSION: &str = "tmp";

/// Item type recorded for graph indexes
pub const HNSW_ITEM_TYPE: &str = "hnsw_index";

/// Sidecar metadata for a stored index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMetadata {
    /// Storage layout version
    pub version: u32,
    /// Unix timestamp when the item was first written
    pub created_at: u64,
    /// Unix timestamp of the last write
    pub updated_at: u64,
    /// Kind of stored item
    pub item_type: String,
    /// Codec of the index body
    pub compression: Codec,
    /// Uncompressed size of the index in bytes (header + raw body)
    pub original_size: usize,
    /// Size of the index file in bytes
    pub compressed_size: usize,
    /// Number of vectors in the index
    pub vector_count: usize,
}

impl StorageMetadata {
    fn new(compression: Codec, original_size: usize, compressed_size: usize, vector_count: usize) -> Self {
        let now = unix_now();
        Self {
            version: STORAGE_VERSION,
            created_at: now,
            updated_at: now,
            item_type: HNSW_ITEM_TYPE.to_string(),
            compression,
            original_size,
            compressed_size,
            vector_count,
        }
    }

    /// Compressed size over original size
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 1.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Directory-backed index storage
///
/// ```text
/// base_path/
/// ├── products.omx     # header + compressed graph body
/// └── products.meta    # sidecar metadata
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
    codec: Codec,
}

impl FileStorage {
    /// Open (creating if needed) storage rooted at `base_path`, without compression
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_codec(base_path, Codec::None)
    }

    /// Open storage that compresses index bodies with `codec`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the path is not
    /// a directory.
    pub fn with_codec(base_path: impl AsRef<Path>, codec: Codec) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                OmegaError::StorageError(format!("Failed to create storage directory: {}", e))
            })?;
        }

        if !base_path.is_dir() {
            return Err(OmegaError::StorageError(format!(
                "Storage path is not a directory: {}",
                base_path.display()
            )));
        }

        Ok(Self { base_path, codec })
    }

    /// Directory this storage writes into
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Codec used for new writes
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Write `graph` under `name`, replacing any previous index of that name
    pub fn save_index(&self, name: &str, graph: &HnswGraph) -> Result<StorageMetadata> {
        let (bytes, original_size) = encode_graph_sized(graph, self.codec)?;

        let metadata = match self.get_metadata(name) {
            Ok(mut meta) if self.exists(name) => {
                meta.updated_at = unix_now();
                meta.compression = self.codec;
                meta.original_size = original_size;
                meta.compressed_size = bytes.len();
                meta.vector_count = graph.len();
                meta
            }
            _ => StorageMetadata::new(self.codec, original_size, bytes.len(), graph.len()),
        };

        self.write_atomic(&self.item_path(name), &bytes)?;
        self.write_atomic(&self.metadata_path(name), &bincode::serialize(&metadata)?)?;

        debug!(
            name,
            vectors = graph.len(),
            bytes = bytes.len(),
            codec = self.codec.name(),
            "saved index"
        );
        Ok(metadata)
    }

    /// Read the index stored under `name`
    ///
    /// The codec is taken from the file header, so indexes written with a
    /// different codec than this storage's load fine.
    pub fn load_index(&self, name: &str) -> Result<HnswGraph> {
        if !self.exists(name) {
            return Err(OmegaError::StorageError(format!("Index not found: {}", name)));
        }

        let metadata = self.get_metadata(name)?;
        if metadata.version != STORAGE_VERSION {
            return Err(OmegaError::StorageError(format!(
                "Incompatible storage version: expected {}, got {}",
                STORAGE_VERSION, metadata.version
            )));
        }
        if metadata.item_type != HNSW_ITEM_TYPE {
            return Err(OmegaError::StorageError(format!(
                "{} is a {}, not an index",
                name, metadata.item_type
            )));
        }

        let bytes = fs::read(self.item_path(name))?;
        if bytes.len() != metadata.compressed_size || bytes.len() < HEADER_SIZE {
            return Err(OmegaError::StorageError(format!(
                "Data corruption detected: size mismatch for {}",
                name
            )));
        }

        let graph = decode_graph(&bytes)?;
        debug!(name, vectors = graph.len(), "loaded index");
        Ok(graph)
    }

    /// Remove both files of `name`; missing files are not an error
    pub fn delete(&self, name: &str) -> Result<()> {
        for path in [self.item_path(name), self.metadata_path(name)] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    OmegaError::StorageError(format!(
                        "Failed to delete {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Names of stored items, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            OmegaError::StorageError(format!("Failed to read storage directory: {}", e))
        })?;

        let mut names = BTreeSet::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let known = path
                .extension()
                .is_some_and(|ext| ext == DATA_EXTENSION || ext == META_EXTENSION);
            if let (true, Some(name)) = (known, path.file_stem().and_then(|s| s.to_str())) {
                names.insert(name.to_string());
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Read the sidecar metadata of `name`
    pub fn get_metadata(&self, name: &str) -> Result<StorageMetadata> {
        let meta_path = self.metadata_path(name);
        if !meta_path.exists() {
            return Err(OmegaError::StorageError(format!(
                "Metadata not found for item: {}",
                name
            )));
        }

        let contents = fs::read(&meta_path)?;
        Ok(bincode::deserialize(&contents)?)
    }

    /// True when both the index and its metadata are present
    pub fn exists(&self, name: &str) -> bool {
        self.item_path(name).exists() && self.metadata_path(name).exists()
    }

    fn item_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", name, DATA_EXTENSION))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", name, META_EXTENSION))
    }

    /// Write to a temporary file, sync, then rename over `path`
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension(TMP_EXTENSION);

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            OmegaError::IoError(e)
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswConfig;
    use crate::metric::Metric;
    use tempfile::TempDir;

    fn create_test_graph(count: u64) -> HnswGraph {
        let mut graph = HnswGraph::new(
            4,
            Metric::SquaredEuclidean,
            HnswConfig::default().with_seed(21),
        );
        for key in 0..count {
            let x = key as f32;
            graph.insert(key, &[x, x * 0.5, -x, 1.0]).unwrap();
        }
        graph
    }

    #[test]
    fn test_new_storage_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store");
        let storage = FileStorage::new(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(storage.codec(), Codec::None);
        assert_eq!(storage.base_path(), path.as_path());
    }

    #[test]
    fn test_invalid_storage_path() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("plain_file");
        fs::write(&file_path, b"x").unwrap();
        assert!(matches!(
            FileStorage::new(&file_path),
            Err(OmegaError::StorageError(_))
        ));
    }

    #[test]
    fn test_index_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::with_codec(temp_dir.path(), Codec::Gzip).unwrap();
        let graph = create_test_graph(200);

        let metadata = storage.save_index("idx", &graph).unwrap();
        assert_eq!(metadata.vector_count, 200);
        assert_eq!(metadata.item_type, HNSW_ITEM_TYPE);
        assert!(metadata.ratio() < 1.0);

        let loaded = storage.load_index("idx").unwrap();
        assert_eq!(loaded.to_parts(), graph.to_parts());
        assert_eq!(
            loaded.search(&[3.0, 1.5, -3.0, 1.0], 5).unwrap(),
            graph.search(&[3.0, 1.5, -3.0, 1.0], 5).unwrap()
        );
    }

    #[test]
    fn test_sizes_recorded_per_codec() {
        let temp_dir = TempDir::new().unwrap();
        let graph = create_test_graph(150);
        let plain = FileStorage::new(temp_dir.path().join("plain")).unwrap();
        let packed = FileStorage::with_codec(temp_dir.path().join("packed"), Codec::Gzip).unwrap();

        let plain_meta = plain.save_index("idx", &graph).unwrap();
        let packed_meta = packed.save_index("idx", &graph).unwrap();

        assert_eq!(plain_meta.original_size, plain_meta.compressed_size);
        assert_eq!(packed_meta.original_size, plain_meta.original_size);
        assert!(packed_meta.compressed_size < packed_meta.original_size);
        let on_disk = fs::metadata(packed.item_path("idx")).unwrap().len() as usize;
        assert_eq!(packed_meta.compressed_size, on_disk);
    }

    #[test]
    fn test_load_with_other_codec() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FileStorage::with_codec(temp_dir.path(), Codec::Gzip).unwrap();
        writer.save_index("idx", &create_test_graph(20)).unwrap();

        let reader = FileStorage::new(temp_dir.path()).unwrap();
        assert_eq!(reader.load_index("idx").unwrap().len(), 20);
    }

    #[test]
    fn test_index_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        assert!(matches!(
            storage.load_index("missing"),
            Err(OmegaError::StorageError(_))
        ));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        storage.save_index("idx", &create_test_graph(5)).unwrap();

        let leftovers = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == TMP_EXTENSION))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_metadata_update_keeps_creation_time() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();

        let first = storage.save_index("idx", &create_test_graph(5)).unwrap();
        let second = storage.save_index("idx", &create_test_graph(9)).unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(storage.get_metadata("idx").unwrap().vector_count, 9);
    }

    #[test]
    fn test_list_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        storage.save_index("b", &create_test_graph(3)).unwrap();
        storage.save_index("a", &create_test_graph(3)).unwrap();

        assert_eq!(storage.list().unwrap(), vec!["a".to_string(), "b".to_string()]);

        storage.delete("a").unwrap();
        assert!(!storage.exists("a"));
        assert_eq!(storage.list().unwrap(), vec!["b".to_string()]);

        // deleting twice is fine
        storage.delete("a").unwrap();
    }

    #[test]
    fn test_corrupted_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        storage.save_index("idx", &create_test_graph(30)).unwrap();

        let path = temp_dir.path().join("idx.omx");
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2 + HEADER_SIZE / 2;
        bytes[mid] ^= 0x5A;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(storage.load_index("idx"), Err(OmegaError::Format(_))));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        storage.save_index("idx", &create_test_graph(30)).unwrap();

        let path = temp_dir.path().join("idx.omx");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        assert!(matches!(
            storage.load_index("idx"),
            Err(OmegaError::StorageError(_))
        ));
    }
}
