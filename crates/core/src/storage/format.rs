//! Versioned on-disk layout of an HNSW index
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header (64 bytes, little-endian)             │
//! │   0  magic "OMGX"             4              │
//! │   4  version                  u16            │
//! │   6  header size              u16            │
//! │   8  metric id                u8             │
//! │   9  codec id                 u8             │
//! │  10  reserved                 2 bytes (zero) │
//! │  12  dimension                u32            │
//! │  16  vector count             u32            │
//! │  20  max level                u32            │
//! │  24  entry point              u32            │
//! │  28  m                        u32            │
//! │  32  m0                       u32            │
//! │  36  ef_construction          u32            │
//! │  40  ef_search                u32            │
//! │  44  body length              u64            │
//! │  52  body CRC32               u32            │
//! │  56  reserved                 8 bytes (zero) │
//! ├──────────────────────────────────────────────┤
//! │ Body (compressed with the header's codec)    │
//! │   ml f32, flags u8, seed flag u8 + u64       │
//! │   keys        count × u64                    │
//! │   vectors     count × dimension × f32        │
//! │   links       per node: level count u32,     │
//! │               per level: len u32, ids u32... │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every field is written and read explicitly; nothing is reinterpreted
//! from raw memory. The CRC covers the body bytes exactly as stored.

use super::compression::{compress_with, decompress_with, Codec};
use crate::config::HnswConfig;
use crate::index::hnsw::{GraphParts, MAX_LEVEL};
use crate::index::HnswGraph;
use crate::metric::Metric;
use crate::{NodeId, OmegaError, Result, INVALID_NODE};

/// Magic bytes at the start of every index file
pub const INDEX_MAGIC: [u8; 4] = *b"OMGX";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 64;

const RESERVED_A: std::ops::Range<usize> = 10..12;
const RESERVED_B: std::ops::Range<usize> = 56..64;

const FLAG_HEURISTIC: u8 = 1;
const FLAG_EXTEND: u8 = 1 << 1;
const FLAG_KEEP_PRUNED: u8 = 1 << 2;

/// Fixed-size index header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub header_size: u16,
    pub metric: u8,
    pub codec: u8,
    pub dimension: u32,
    pub count: u32,
    pub max_level: u32,
    pub entry_point: u32,
    pub m: u32,
    pub m0: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    pub body_len: u64,
    pub body_crc: u32,
}

impl IndexHeader {
    /// Encode into exactly [`HEADER_SIZE`] bytes; reserved ranges are zero
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.header_size.to_le_bytes());
        out[8] = self.metric;
        out[9] = self.codec;
        out[12..16].copy_from_slice(&self.dimension.to_le_bytes());
        out[16..20].copy_from_slice(&self.count.to_le_bytes());
        out[20..24].copy_from_slice(&self.max_level.to_le_bytes());
        out[24..28].copy_from_slice(&self.entry_point.to_le_bytes());
        out[28..32].copy_from_slice(&self.m.to_le_bytes());
        out[32..36].copy_from_slice(&self.m0.to_le_bytes());
        out[36..40].copy_from_slice(&self.ef_construction.to_le_bytes());
        out[40..44].copy_from_slice(&self.ef_search.to_le_bytes());
        out[44..52].copy_from_slice(&self.body_len.to_le_bytes());
        out[52..56].copy_from_slice(&self.body_crc.to_le_bytes());
        out
    }

    /// Decode and validate a header from the start of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(OmegaError::Format(format!(
                "header needs {HEADER_SIZE} bytes, found {}",
                bytes.len()
            )));
        }
        let bytes = &bytes[..HEADER_SIZE];
        if bytes[RESERVED_A].iter().chain(&bytes[RESERVED_B]).any(|&b| b != 0) {
            return Err(OmegaError::Format(
                "reserved header bytes are not zero".to_string(),
            ));
        }

        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let mut body_len = [0u8; 8];
        body_len.copy_from_slice(&bytes[44..52]);

        let header = Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: u16_at(4),
            header_size: u16_at(6),
            metric: bytes[8],
            codec: bytes[9],
            dimension: u32_at(12),
            count: u32_at(16),
            max_level: u32_at(20),
            entry_point: u32_at(24),
            m: u32_at(28),
            m0: u32_at(32),
            ef_construction: u32_at(36),
            ef_search: u32_at(40),
            body_len: u64::from_le_bytes(body_len),
            body_crc: u32_at(52),
        };
        header.validate()?;
        Ok(header)
    }

    /// Check the fields for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.magic != INDEX_MAGIC {
            return Err(OmegaError::Format(format!("bad magic {:?}", self.magic)));
        }
        if self.version != FORMAT_VERSION {
            return Err(OmegaError::Format(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }
        if self.header_size as usize != HEADER_SIZE {
            return Err(OmegaError::Format(format!(
                "unexpected header size {}",
                self.header_size
            )));
        }
        Metric::from_id(self.metric)?;
        Codec::from_id(self.codec)?;
        if self.dimension == 0 {
            return Err(OmegaError::Format("zero dimension".to_string()));
        }
        if self.max_level as usize > MAX_LEVEL {
            return Err(OmegaError::Format(format!(
                "max level {} exceeds {MAX_LEVEL}",
                self.max_level
            )));
        }
        let empty = self.count == 0;
        if empty != (self.entry_point == INVALID_NODE) {
            return Err(OmegaError::Format(format!(
                "entry point {} inconsistent with count {}",
                self.entry_point, self.count
            )));
        }
        if !empty && self.entry_point >= self.count {
            return Err(OmegaError::Format(format!(
                "entry point {} out of range",
                self.entry_point
            )));
        }
        Ok(())
    }
}

/// Serialize `graph` into header + compressed body
pub fn encode_graph(graph: &HnswGraph, codec: Codec) -> Result<Vec<u8>> {
    encode_graph_sized(graph, codec).map(|(bytes, _)| bytes)
}

/// [`encode_graph`] plus the size the file would have without compression
pub(crate) fn encode_graph_sized(graph: &HnswGraph, codec: Codec) -> Result<(Vec<u8>, usize)> {
    let parts = graph.to_parts();
    let raw = encode_body(&parts);
    let body = compress_with(&raw, codec)?;

    let header = IndexHeader {
        magic: INDEX_MAGIC,
        version: FORMAT_VERSION,
        header_size: HEADER_SIZE as u16,
        metric: parts.metric.id(),
        codec: codec.id(),
        dimension: to_u32(parts.dimension, "dimension")?,
        count: to_u32(parts.keys.len(), "vector count")?,
        max_level: to_u32(parts.max_level, "max level")?,
        entry_point: parts.entry_point,
        m: to_u32(parts.config.m, "m")?,
        m0: to_u32(parts.config.m0, "m0")?,
        ef_construction: to_u32(parts.config.ef_construction, "ef_construction")?,
        ef_search: to_u32(parts.config.ef_search, "ef_search")?,
        body_len: body.len() as u64,
        body_crc: crc32fast::hash(&body),
    };
    header.validate()?;

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&body);
    Ok((out, HEADER_SIZE + raw.len()))
}

/// Parse bytes produced by [`encode_graph`]
pub fn decode_graph(bytes: &[u8]) -> Result<HnswGraph> {
    let header = IndexHeader::decode(bytes)?;
    let body = &bytes[HEADER_SIZE..];
    if body.len() as u64 != header.body_len {
        return Err(OmegaError::Format(format!(
            "body is {} bytes, header says {}",
            body.len(),
            header.body_len
        )));
    }
    if crc32fast::hash(body) != header.body_crc {
        return Err(OmegaError::Format("body checksum mismatch".to_string()));
    }

    let raw = decompress_with(body, Codec::from_id(header.codec)?)?;
    let parts = decode_body(&header, &raw)?;
    HnswGraph::from_parts(parts)
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| OmegaError::Format(format!("{what} {value} exceeds u32")))
}

fn encode_body(parts: &GraphParts) -> Vec<u8> {
    let count = parts.keys.len();
    let link_ids: usize = parts.links.iter().flatten().map(Vec::len).sum();
    let mut out =
        Vec::with_capacity(14 + count * (8 + 4 + parts.dimension * 4) + link_ids * 4);

    let config = &parts.config;
    out.extend_from_slice(&config.ml.to_le_bytes());
    let mut flags = 0u8;
    if config.use_heuristic {
        flags |= FLAG_HEURISTIC;
    }
    if config.extend_candidates {
        flags |= FLAG_EXTEND;
    }
    if config.keep_pruned_connections {
        flags |= FLAG_KEEP_PRUNED;
    }
    out.push(flags);
    out.push(u8::from(config.seed.is_some()));
    out.extend_from_slice(&config.seed.unwrap_or(0).to_le_bytes());

    for key in &parts.keys {
        out.extend_from_slice(&key.to_le_bytes());
    }
    for value in &parts.vectors {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for levels in &parts.links {
        out.extend_from_slice(&(levels.len() as u32).to_le_bytes());
        for list in levels {
            out.extend_from_slice(&(list.len() as u32).to_le_bytes());
            for id in list {
                out.extend_from_slice(&id.to_le_bytes());
            }
        }
    }
    out
}

fn decode_body(header: &IndexHeader, raw: &[u8]) -> Result<GraphParts> {
    let mut reader = BodyReader { bytes: raw, pos: 0 };
    let count = header.count as usize;
    let dimension = header.dimension as usize;

    let ml = reader.f32()?;
    let flags = reader.u8()?;
    let has_seed = reader.u8()? != 0;
    let seed = reader.u64()?;
    let config = HnswConfig {
        m: header.m as usize,
        m0: header.m0 as usize,
        ef_construction: header.ef_construction as usize,
        ef_search: header.ef_search as usize,
        ml,
        use_heuristic: flags & FLAG_HEURISTIC != 0,
        extend_candidates: flags & FLAG_EXTEND != 0,
        keep_pruned_connections: flags & FLAG_KEEP_PRUNED != 0,
        seed: has_seed.then_some(seed),
    };

    let keys = (0..count).map(|_| reader.u64()).collect::<Result<Vec<_>>>()?;
    let vectors = (0..count * dimension)
        .map(|_| reader.f32())
        .collect::<Result<Vec<_>>>()?;

    let mut links = Vec::with_capacity(count);
    for node in 0..count {
        let level_count = reader.u32()? as usize;
        if level_count == 0 || level_count > header.max_level as usize + 1 {
            return Err(OmegaError::Format(format!(
                "node {node} declares {level_count} levels"
            )));
        }
        let mut levels = Vec::with_capacity(level_count);
        for _ in 0..level_count {
            let len = reader.u32()? as usize;
            let list = (0..len)
                .map(|_| reader.u32())
                .collect::<Result<Vec<NodeId>>>()?;
            levels.push(list);
        }
        links.push(levels);
    }

    if reader.pos != raw.len() {
        return Err(OmegaError::Format(format!(
            "{} trailing body bytes",
            raw.len() - reader.pos
        )));
    }

    Ok(GraphParts {
        dimension,
        metric: Metric::from_id(header.metric)?,
        config,
        keys,
        vectors,
        links,
        entry_point: header.entry_point,
        max_level: header.max_level as usize,
    })
}

/// Cursor over a decompressed body
struct BodyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            OmegaError::Format(format!("body truncated at byte {}", self.pos))
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sample_graph(count: usize, metric: Metric) -> HnswGraph {
        let mut rng = StdRng::seed_from_u64(11);
        let mut graph = HnswGraph::new(8, metric, HnswConfig::default().with_seed(5));
        for key in 0..count {
            let v: Vec<f32> = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
            graph.insert(key as u64 + 100, &v).unwrap();
        }
        graph
    }

    fn sample_header() -> IndexHeader {
        IndexHeader {
            magic: INDEX_MAGIC,
            version: FORMAT_VERSION,
            header_size: HEADER_SIZE as u16,
            metric: Metric::Cosine.id(),
            codec: Codec::Gzip.id(),
            dimension: 16,
            count: 3,
            max_level: 1,
            entry_point: 2,
            m: 16,
            m0: 32,
            ef_construction: 200,
            ef_search: 50,
            body_len: 1234,
            body_crc: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn test_header_layout() {
        let header = sample_header();
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"OMGX");
        assert_eq!(bytes[8], 3);
        assert_eq!(&bytes[16..20], &3u32.to_le_bytes());
        assert_eq!(&bytes[52..56], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(IndexHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_nonzero_reserved() {
        let mut bytes = sample_header().encode();
        bytes[60] = 1;
        assert!(matches!(IndexHeader::decode(&bytes), Err(OmegaError::Format(_))));

        let mut bytes = sample_header().encode();
        bytes[11] = 7;
        assert!(IndexHeader::decode(&bytes).is_err());
    }

    #[test]
    fn test_header_validation() {
        let mut header = sample_header();
        header.magic = *b"NOPE";
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.version = 99;
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.metric = 42;
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.codec = 200;
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.entry_point = 3;
        assert!(header.validate().is_err());

        let mut header = sample_header();
        header.count = 0;
        assert!(header.validate().is_err());
        header.entry_point = INVALID_NODE;
        assert!(header.validate().is_ok());

        assert!(IndexHeader::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_graph_survives_encoding() {
        let graph = sample_graph(300, Metric::InnerProduct);
        for codec in [Codec::None, Codec::Gzip] {
            let bytes = encode_graph(&graph, codec).unwrap();
            let decoded = decode_graph(&bytes).unwrap();
            assert_eq!(decoded.to_parts(), graph.to_parts());

            let query = graph.vector(17).unwrap().to_vec();
            assert_eq!(decoded.search(&query, 10).unwrap(), graph.search(&query, 10).unwrap());
        }
    }

    #[test]
    fn test_uncompressed_size_reported() {
        let graph = sample_graph(120, Metric::SquaredEuclidean);
        let plain = encode_graph(&graph, Codec::None).unwrap();

        let (bytes, raw_size) = encode_graph_sized(&graph, Codec::None).unwrap();
        assert_eq!(bytes, plain);
        assert_eq!(raw_size, plain.len());

        let (packed, raw_size) = encode_graph_sized(&graph, Codec::Gzip).unwrap();
        assert_eq!(raw_size, plain.len());
        assert_eq!(decode_graph(&packed).unwrap().to_parts(), graph.to_parts());
    }

    #[test]
    fn test_empty_graph_encoding() {
        let graph = HnswGraph::with_defaults(4);
        let decoded = decode_graph(&encode_graph(&graph, Codec::Gzip).unwrap()).unwrap();
        assert!(decoded.is_empty());
        assert!(decoded.search(&[0.0; 4], 3).unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_body_detected() {
        let graph = sample_graph(50, Metric::SquaredEuclidean);
        let mut bytes = encode_graph(&graph, Codec::None).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(decode_graph(&bytes), Err(OmegaError::Format(_))));
    }

    #[test]
    fn test_truncated_file_detected() {
        let graph = sample_graph(50, Metric::SquaredEuclidean);
        let bytes = encode_graph(&graph, Codec::Gzip).unwrap();
        assert!(decode_graph(&bytes[..bytes.len() - 5]).is_err());
        assert!(decode_graph(&bytes[..HEADER_SIZE - 1]).is_err());
    }
}
