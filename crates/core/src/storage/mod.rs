//! Storage layer with compression and persistence
//!
//! [`format`] defines the versioned on-disk layout of an index,
//! [`compression`] the body codecs and [`file`] a directory-backed store.

pub mod compression;
pub mod file;
pub mod format;

pub use compression::{best_codec, compress_with, decompress_with, Codec};
pub use file::{FileStorage, StorageMetadata};
pub use format::{decode_graph, encode_graph, IndexHeader};
