//! Bloom Blob Codec
//!
//! Versioned binary format for persisting a bloom filter with its metadata,
//! so cold starts load a prebuilt filter instead of rehashing every term.
//!
//! Layout:
//!
//! ```text
//! magic(4) = "VBLM" | version(1) | metaLen(4, LE) | metaJSON | filterLen(4, LE) | filterBlob
//! ```
//!
//! `metaJSON` is `{version, size, nbHashes, itemCount, fpRate, createdAt}`.
//! The filter blob is the codec's own raw bit array, not any library's
//! internal field dump. Unknown magic or version is a hard format error;
//! callers respond by rebuilding the filter from source terms.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::BloomFilter;
use crate::error::{CodecError, CodecResult};
use crate::text;

/// File magic, "VBLM".
pub const MAGIC: [u8; 4] = *b"VBLM";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 5;

/// Metadata block persisted alongside the bit array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    /// Format version, mirrors the header byte.
    pub version: u8,
    /// Filter size in bits.
    pub size: u64,
    /// Hash probes per item.
    pub nb_hashes: u32,
    /// Number of terms inserted when the filter was built.
    pub item_count: u64,
    /// Target false-positive rate the filter was sized for.
    pub fp_rate: f64,
    /// Build timestamp, epoch milliseconds.
    pub created_at: i64,
}

/// Serialization entry points for the blob format.
pub struct BlobCodec;

impl BlobCodec {
    /// Encode a filter and its metadata into the blob layout.
    pub fn serialize(filter: &BloomFilter, item_count: u64) -> Vec<u8> {
        let metadata = BlobMetadata {
            version: FORMAT_VERSION,
            size: filter.bit_size(),
            nb_hashes: filter.hash_count(),
            item_count,
            fp_rate: filter.fp_rate(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        // Metadata is plain serializable data; encoding cannot fail.
        let meta_json = serde_json::to_vec(&metadata).unwrap_or_default();
        let bits = filter.as_bytes();

        let mut out = Vec::with_capacity(HEADER_LEN + 8 + meta_json.len() + bits.len());
        out.extend_from_slice(&MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&(meta_json.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta_json);
        out.extend_from_slice(&(bits.len() as u32).to_le_bytes());
        out.extend_from_slice(bits);
        out
    }

    /// Decode a blob, validating magic, version, and section lengths.
    pub fn deserialize(bytes: &[u8]) -> CodecResult<(BloomFilter, BlobMetadata)> {
        let (metadata, offset) = Self::parse_metadata(bytes)?;

        if bytes.len() < offset + 4 {
            return Err(CodecError::Truncated("missing filter length"));
        }
        let filter_len = u32::from_le_bytes(
            bytes[offset..offset + 4].try_into().unwrap_or_default(),
        ) as usize;
        let bits_start = offset + 4;

        if bytes.len() < bits_start + filter_len {
            return Err(CodecError::Truncated("filter blob shorter than declared"));
        }
        if filter_len as u64 != metadata.size.div_ceil(8) {
            return Err(CodecError::Truncated("filter blob disagrees with metadata size"));
        }

        let bits = bytes[bits_start..bits_start + filter_len].to_vec();
        let filter = BloomFilter::from_parts(metadata.size, metadata.nb_hashes, metadata.fp_rate, bits);
        Ok((filter, metadata))
    }

    /// Header-only validity check: magic and version, nothing else.
    ///
    /// Reads five bytes regardless of filter size, so it stays cheap for
    /// startup probes over large filters.
    pub fn is_valid(path: &Path) -> bool {
        let mut header = [0u8; HEADER_LEN];
        let Ok(mut file) = File::open(path) else {
            return false;
        };
        if file.read_exact(&mut header).is_err() {
            return false;
        }
        header[0..4] == MAGIC && header[4] == FORMAT_VERSION
    }

    /// Parse only the metadata section of a blob on disk.
    pub fn metadata(path: &Path) -> CodecResult<BlobMetadata> {
        let mut file = File::open(path)?;

        let mut header = [0u8; HEADER_LEN + 4];
        file.read_exact(&mut header)
            .map_err(|_| CodecError::Truncated("missing header"))?;
        Self::check_header(&header[0..HEADER_LEN])?;

        let meta_len =
            u32::from_le_bytes(header[HEADER_LEN..HEADER_LEN + 4].try_into().unwrap_or_default())
                as usize;
        let mut meta_buf = vec![0u8; meta_len];
        file.read_exact(&mut meta_buf)
            .map_err(|_| CodecError::Truncated("metadata shorter than declared"))?;

        Ok(serde_json::from_slice(&meta_buf)?)
    }

    /// Load a blob file into a live filter.
    pub fn load(path: &Path) -> CodecResult<(BloomFilter, BlobMetadata)> {
        let bytes = std::fs::read(path)?;
        Self::deserialize(&bytes)
    }

    /// Build a filter over `terms` and persist it.
    ///
    /// Terms are lowercased and trimmed first, with empties dropped, so the
    /// blob always matches the normalized space queries live in.
    pub fn build_and_save(
        terms: &[String],
        path: &Path,
        error_rate: f64,
    ) -> CodecResult<BlobMetadata> {
        let normalized: Vec<String> = terms
            .iter()
            .map(|t| text::normalize(t))
            .filter(|t| !t.is_empty())
            .collect();

        let mut filter = BloomFilter::with_rate(normalized.len(), error_rate);
        for term in &normalized {
            filter.insert(term);
        }

        let blob = Self::serialize(&filter, normalized.len() as u64);
        std::fs::write(path, &blob)?;
        debug!(
            path = %path.display(),
            items = normalized.len(),
            bits = filter.bit_size(),
            "bloom blob written"
        );

        Self::deserialize(&blob).map(|(_, metadata)| metadata)
    }

    fn check_header(header: &[u8]) -> CodecResult<()> {
        if header[0..4] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        if header[4] != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: header[4],
                expected: FORMAT_VERSION,
            });
        }
        Ok(())
    }

    fn parse_metadata(bytes: &[u8]) -> CodecResult<(BlobMetadata, usize)> {
        if bytes.len() < HEADER_LEN + 4 {
            return Err(CodecError::Truncated("missing header"));
        }
        Self::check_header(&bytes[0..HEADER_LEN])?;

        let meta_len = u32::from_le_bytes(
            bytes[HEADER_LEN..HEADER_LEN + 4].try_into().unwrap_or_default(),
        ) as usize;
        let meta_end = HEADER_LEN + 4 + meta_len;
        if bytes.len() < meta_end {
            return Err(CodecError::Truncated("metadata shorter than declared"));
        }

        let metadata: BlobMetadata = serde_json::from_slice(&bytes[HEADER_LEN + 4..meta_end])?;
        Ok((metadata, meta_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn build_filter(terms: &[&str], rate: f64) -> BloomFilter {
        let mut filter = BloomFilter::with_rate(terms.len(), rate);
        for term in terms {
            filter.insert(term);
        }
        filter
    }

    #[test]
    fn test_round_trip_membership_and_metadata() {
        let terms = ["smith", "garcia", "penelope"];
        let filter = build_filter(&terms, 0.01);
        let blob = BlobCodec::serialize(&filter, terms.len() as u64);

        let (loaded, metadata) = BlobCodec::deserialize(&blob).unwrap();
        for term in terms {
            assert!(loaded.contains(term));
        }
        assert_eq!(metadata.version, FORMAT_VERSION);
        assert_eq!(metadata.size, filter.bit_size());
        assert_eq!(metadata.nb_hashes, filter.hash_count());
        assert_eq!(metadata.item_count, 3);
        assert!((metadata.fp_rate - 0.01).abs() < f64::EPSILON);
        assert!(metadata.created_at > 0);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let filter = build_filter(&["smith"], 0.01);
        let mut blob = BlobCodec::serialize(&filter, 1);
        blob[0] = b'X';
        assert!(matches!(BlobCodec::deserialize(&blob), Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let filter = build_filter(&["smith"], 0.01);
        let mut blob = BlobCodec::serialize(&filter, 1);
        blob[4] = 99;
        assert!(matches!(
            BlobCodec::deserialize(&blob),
            Err(CodecError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let filter = build_filter(&["smith"], 0.01);
        let blob = BlobCodec::serialize(&filter, 1);
        let truncated = &blob[..blob.len() - 4];
        assert!(matches!(
            BlobCodec::deserialize(truncated),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn test_is_valid_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.bloom");
        let bad = dir.path().join("bad.bloom");
        let missing = dir.path().join("missing.bloom");

        let filter = build_filter(&["smith"], 0.01);
        std::fs::write(&good, BlobCodec::serialize(&filter, 1)).unwrap();
        std::fs::write(&bad, b"not a blob at all").unwrap();

        assert!(BlobCodec::is_valid(&good));
        assert!(!BlobCodec::is_valid(&bad));
        assert!(!BlobCodec::is_valid(&missing));
    }

    #[test]
    fn test_metadata_section_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.bloom");
        let saved = BlobCodec::build_and_save(
            &["Smith".to_string(), "  GARCIA ".to_string(), String::new()],
            &path,
            0.02,
        )
        .unwrap();

        let metadata = BlobCodec::metadata(&path).unwrap();
        assert_eq!(metadata, saved);
        // Empty input term was dropped before sizing.
        assert_eq!(metadata.item_count, 2);
    }

    #[test]
    fn test_build_and_save_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.bloom");
        BlobCodec::build_and_save(&["  PENELOPE ".to_string()], &path, 0.01).unwrap();

        let (filter, _) = BlobCodec::load(&path).unwrap();
        assert!(filter.contains("penelope"));
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_membership(
            terms in proptest::collection::vec("[a-z]{2,12}", 1..50),
            rate in 0.001f64..0.2,
        ) {
            let mut filter = BloomFilter::with_rate(terms.len(), rate);
            for term in &terms {
                filter.insert(term);
            }
            let blob = BlobCodec::serialize(&filter, terms.len() as u64);
            let (loaded, metadata) = BlobCodec::deserialize(&blob).unwrap();

            for term in &terms {
                prop_assert!(loaded.contains(term));
            }
            prop_assert_eq!(metadata.size, filter.bit_size());
            prop_assert_eq!(metadata.nb_hashes, filter.hash_count());
            prop_assert_eq!(metadata.item_count, terms.len() as u64);
        }
    }
}
