//! Bloom Filter
//!
//! Probabilistic membership prefilter used to reject tokens that cannot be
//! gazetteer terms before any index or store work happens. No false
//! negatives: every inserted term tests positive for the lifetime of the
//! filter, including after a serialize/deserialize round trip.
//!
//! Hashing is blake3-based double hashing. The digest is stable across
//! processes and platforms, which a persisted filter depends on; the standard
//! library hasher is randomly keyed per process and would silently corrupt
//! membership after reload.

pub mod blob;

pub use blob::{BlobCodec, BlobMetadata};

/// Bit-array bloom filter with `k` derived hash probes per item.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    bit_size: u64,
    hash_count: u32,
    fp_rate: f64,
}

impl BloomFilter {
    /// Size a filter for `expected_items` at the target false-positive rate.
    pub fn with_rate(expected_items: usize, fp_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);

        let ln2 = std::f64::consts::LN_2;
        let bit_size = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(8.0) as u64;
        let hash_count = ((bit_size as f64 / n) * ln2).round().max(1.0) as u32;

        Self {
            bits: vec![0u8; bit_size.div_ceil(8) as usize],
            bit_size,
            hash_count,
            fp_rate: p,
        }
    }

    /// Rebuild a filter from its persisted parts. The bit size is clamped to
    /// the capacity of the byte vector so inconsistent inputs cannot index
    /// out of bounds.
    pub fn from_parts(bit_size: u64, hash_count: u32, fp_rate: f64, bits: Vec<u8>) -> Self {
        let bits = if bits.is_empty() { vec![0u8] } else { bits };
        let capacity = bits.len() as u64 * 8;
        Self {
            bits,
            bit_size: bit_size.clamp(1, capacity),
            hash_count: hash_count.max(1),
            fp_rate,
        }
    }

    pub fn insert(&mut self, item: &str) {
        let (h1, h2) = Self::hash_pair(item);
        for i in 0..self.hash_count {
            let idx = self.probe(h1, h2, i);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        let (h1, h2) = Self::hash_pair(item);
        (0..self.hash_count).all(|i| {
            let idx = self.probe(h1, h2, i);
            self.bits[(idx / 8) as usize] & (1 << (idx % 8)) != 0
        })
    }

    pub fn bit_size(&self) -> u64 {
        self.bit_size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn fp_rate(&self) -> f64 {
        self.fp_rate
    }

    /// Raw bit array, little-endian bit order within each byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn probe(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.bit_size
    }

    fn hash_pair(item: &str) -> (u64, u64) {
        let digest = blake3::hash(item.as_bytes());
        let bytes = digest.as_bytes();
        let h1 = u64::from_le_bytes(bytes[0..8].try_into().unwrap_or_default());
        let h2 = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or_default());
        // An even h2 could cycle through a fraction of the bit space.
        (h1, h2 | 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let terms = ["smith", "garcia", "o'brien", "johns hopkins hospital"];
        let mut filter = BloomFilter::with_rate(terms.len(), 0.01);
        for term in terms {
            filter.insert(term);
        }
        for term in terms {
            assert!(filter.contains(term), "inserted term must test positive: {term}");
        }
    }

    #[test]
    fn test_rejects_most_garbage() {
        let mut filter = BloomFilter::with_rate(1000, 0.01);
        for i in 0..1000 {
            filter.insert(&format!("term-{i}"));
        }
        let rejected = (0..1000)
            .filter(|i| !filter.contains(&format!("garbage-{i}")))
            .count();
        // 1% target rate leaves plenty of headroom against 5% observed.
        assert!(rejected > 950, "only {rejected} of 1000 garbage probes rejected");
    }

    #[test]
    fn test_deterministic_across_instances() {
        let mut a = BloomFilter::with_rate(100, 0.01);
        let mut b = BloomFilter::with_rate(100, 0.01);
        a.insert("penelope");
        b.insert("penelope");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_from_parts_preserves_membership() {
        let mut filter = BloomFilter::with_rate(50, 0.01);
        filter.insert("mercy general");
        let rebuilt = BloomFilter::from_parts(
            filter.bit_size(),
            filter.hash_count(),
            filter.fp_rate(),
            filter.as_bytes().to_vec(),
        );
        assert!(rebuilt.contains("mercy general"));
        assert!(!rebuilt.contains("unrelated token"));
    }

    #[test]
    fn test_sizing_scales_with_rate() {
        let loose = BloomFilter::with_rate(1000, 0.1);
        let tight = BloomFilter::with_rate(1000, 0.001);
        assert!(tight.bit_size() > loose.bit_size());
        assert!(tight.hash_count() >= loose.hash_count());
    }
}
