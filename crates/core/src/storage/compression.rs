//! Compression codecs for index bodies
//!
//! The codec used for a body is recorded in the index header, so the
//! compressed bytes carry no framing of their own (apart from LZ4, which
//! needs the original length up front).
//!
//! # Supported Codecs
//!
//! - **None**: passthrough
//! - **Gzip**: always available via flate2
//! - **LZ4**: fast, feature `lz4`
//! - **Zstd**: better ratios, feature `zstd`
//!
//! ```
//! use omega_core::storage::compression::{compress_with, decompress_with, Codec};
//!
//! let data = b"Hello, World! ".repeat(100);
//! let packed = compress_with(&data, Codec::Gzip).unwrap();
//! assert!(packed.len() < data.len());
//! assert_eq!(decompress_with(&packed, Codec::Gzip).unwrap(), data);
//! ```

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Compression codec identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Codec {
    /// No compression (passthrough)
    #[default]
    None,
    /// Gzip compression (always available)
    Gzip,
    /// LZ4 compression (requires `lz4` feature)
    #[cfg(feature = "lz4")]
    Lz4,
    /// Zstd compression (requires `zstd` feature)
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Codec {
    /// Stable identifier stored in the index header
    pub fn id(&self) -> u8 {
        match self {
            Codec::None => 0,
            Codec::Gzip => 1,
            #[cfg(feature = "lz4")]
            Codec::Lz4 => 2,
            #[cfg(feature = "zstd")]
            Codec::Zstd => 3,
        }
    }

    /// Parse codec from its identifier
    pub fn from_id(id: u8) -> Result<Self, CompressionError> {
        match id {
            0 => Ok(Codec::None),
            1 => Ok(Codec::Gzip),
            #[cfg(feature = "lz4")]
            2 => Ok(Codec::Lz4),
            #[cfg(not(feature = "lz4"))]
            2 => Err(CompressionError::UnsupportedCodec(
                "LZ4 feature not enabled".to_string(),
            )),
            #[cfg(feature = "zstd")]
            3 => Ok(Codec::Zstd),
            #[cfg(not(feature = "zstd"))]
            3 => Err(CompressionError::UnsupportedCodec(
                "Zstd feature not enabled".to_string(),
            )),
            _ => Err(CompressionError::UnknownCodec(id)),
        }
    }

    /// Parse a codec name as used in parameters
    pub fn from_name(name: &str) -> Result<Self, CompressionError> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Codec::None),
            "gzip" => Ok(Codec::Gzip),
            #[cfg(feature = "lz4")]
            "lz4" => Ok(Codec::Lz4),
            #[cfg(feature = "zstd")]
            "zstd" => Ok(Codec::Zstd),
            other => Err(CompressionError::UnsupportedCodec(other.to_string())),
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Codec::None => "None",
            Codec::Gzip => "Gzip",
            #[cfg(feature = "lz4")]
            Codec::Lz4 => "LZ4",
            #[cfg(feature = "zstd")]
            Codec::Zstd => "Zstd",
        }
    }
}

/// Error types for compression operations
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown codec id: {0}")]
    UnknownCodec(u8),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),
}

/// Get the best available codec based on enabled features
///
/// Priority order: LZ4 > Zstd > Gzip
pub fn best_codec() -> Codec {
    #[cfg(feature = "lz4")]
    {
        return Codec::Lz4;
    }

    #[cfg(all(feature = "zstd", not(feature = "lz4")))]
    {
        return Codec::Zstd;
    }

    #[cfg(not(any(feature = "lz4", feature = "zstd")))]
    {
        Codec::Gzip
    }
}

/// Compress `data` with `codec`
pub fn compress_with(data: &[u8], codec: Codec) -> Result<Vec<u8>, CompressionError> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Gzip => compress_gzip(data),
        #[cfg(feature = "lz4")]
        Codec::Lz4 => compress_lz4(data),
        #[cfg(feature = "zstd")]
        Codec::Zstd => compress_zstd(data),
    }
}

/// Decompress `data` that was produced by [`compress_with`] with `codec`
pub fn decompress_with(data: &[u8], codec: Codec) -> Result<Vec<u8>, CompressionError> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Gzip => decompress_gzip(data),
        #[cfg(feature = "lz4")]
        Codec::Lz4 => decompress_lz4(data),
        #[cfg(feature = "zstd")]
        Codec::Zstd => decompress_zstd(data),
    }
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    use flate2::read::GzDecoder;

    let mut decoder = GzDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;
    Ok(result)
}

/// LZ4 block with the original size stored as a little-endian u32 prefix
#[cfg(feature = "lz4")]
fn compress_lz4(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let original_size = u32::try_from(data.len())
        .map_err(|_| CompressionError::CompressionFailed("LZ4 input over 4 GiB".to_string()))?;

    let compressed = lz4::block::compress(
        data,
        Some(lz4::block::CompressionMode::HIGHCOMPRESSION(9)),
        false,
    )
    .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;

    let mut output = Vec::with_capacity(4 + compressed.len());
    output.extend_from_slice(&original_size.to_le_bytes());
    output.extend_from_slice(&compressed);
    Ok(output)
}

#[cfg(feature = "lz4")]
fn decompress_lz4(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    if data.len() < 4 {
        return Err(CompressionError::DecompressionFailed(
            "LZ4 data too small: missing size header".to_string(),
        ));
    }
    let (size, body) = data.split_at(4);
    let original_size = u32::from_le_bytes([size[0], size[1], size[2], size[3]]);
    let original_size = i32::try_from(original_size)
        .map_err(|_| CompressionError::DecompressionFailed("LZ4 size out of range".to_string()))?;

    lz4::block::decompress(body, Some(original_size))
        .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))
}

#[cfg(feature = "zstd")]
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    zstd::encode_all(data, 3).map_err(|e| CompressionError::CompressionFailed(e.to_string()))
}

#[cfg(feature = "zstd")]
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    zstd::decode_all(data).map_err(|e| CompressionError::DecompressionFailed(e.to_string()))
}
