//! MinHash signatures and a banded LSH index for near-duplicate sentences.
//!
//! Sentences are tokenized into whitespace-split words; each word is hashed
//! per permutation with a seeded XXH3 and the minimum per permutation forms
//! the signature. The index groups signature rows into bands; two sentences
//! land in the same bucket for a band exactly when that band's rows agree,
//! which approximates a Jaccard similarity test at the configured threshold.
//!
//! Band and row counts are chosen so that the candidate probability curve
//! has its inflection point near the threshold: P(candidate) ≈
//! 1 - (1 - s^r)^b.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// Cap on candidates returned from a single query.
const MAX_CANDIDATES: usize = 100;

/// MinHash signature generator with deterministic per-permutation seeds.
#[derive(Debug, Clone)]
pub struct MinHasher {
    num_perm: usize,
    seeds: Vec<u64>,
}

impl MinHasher {
    pub fn new(num_perm: usize) -> Self {
        let seeds = (0..num_perm as u64)
            .map(|i| i.wrapping_mul(0x517c_c1b7_2722_0a95))
            .collect();
        Self { num_perm, seeds }
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    /// Signature over the whitespace-split word tokens of `text`, each
    /// hashed as its UTF-8 bytes.
    pub fn signature(&self, text: &str) -> Vec<u64> {
        let tokens: FxHashSet<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return vec![u64::MAX; self.num_perm];
        }

        let mut signature = vec![u64::MAX; self.num_perm];
        for token in tokens {
            for (slot, &seed) in signature.iter_mut().zip(self.seeds.iter()) {
                let hash = xxh3_64_with_seed(token.as_bytes(), seed);
                *slot = (*slot).min(hash);
            }
        }
        signature
    }
}

/// A stable key derived from a signature's hash values.
pub fn signature_key(signature: &[u64]) -> u64 {
    let mut bytes = Vec::with_capacity(signature.len() * 8);
    for value in signature {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    xxh3_64(&bytes)
}

/// Banded LSH index over MinHash signatures.
#[derive(Debug, Clone)]
pub struct MinHashLsh {
    num_bands: usize,
    rows_per_band: usize,
    /// One bucket map per band: band hash -> keys inserted under it.
    buckets: Vec<FxHashMap<u64, SmallVec<[u64; 4]>>>,
    len: usize,
}

impl MinHashLsh {
    pub fn new(num_perm: usize, threshold: f64) -> Self {
        let (num_bands, rows_per_band) = optimal_lsh_params(num_perm, threshold);
        let buckets = (0..num_bands).map(|_| FxHashMap::default()).collect();
        Self {
            num_bands,
            rows_per_band,
            buckets,
            len: 0,
        }
    }

    /// Insert a signature under `key`.
    pub fn insert(&mut self, key: u64, signature: &[u64]) {
        for (band_idx, chunk) in signature.chunks(self.rows_per_band).enumerate() {
            if band_idx >= self.num_bands {
                break;
            }
            self.buckets[band_idx]
                .entry(hash_band(chunk))
                .or_default()
                .push(key);
        }
        self.len += 1;
    }

    /// Keys of previously inserted signatures that share at least one band
    /// bucket with `signature`.
    pub fn query(&self, signature: &[u64]) -> Vec<u64> {
        let mut candidates = FxHashSet::default();
        for (band_idx, chunk) in signature.chunks(self.rows_per_band).enumerate() {
            if band_idx >= self.num_bands {
                break;
            }
            if let Some(keys) = self.buckets[band_idx].get(&hash_band(chunk)) {
                for &key in keys {
                    if candidates.len() >= MAX_CANDIDATES {
                        return candidates.into_iter().collect();
                    }
                    candidates.insert(key);
                }
            }
        }
        candidates.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn params(&self) -> (usize, usize) {
        (self.num_bands, self.rows_per_band)
    }
}

/// Fold a band's rows into one bucket key.
fn hash_band(band: &[u64]) -> u64 {
    let mut result = 0u64;
    for (i, &value) in band.iter().enumerate() {
        result ^= value.rotate_left((i * 7) as u32);
    }
    result
}

/// Pick (bands, rows) whose candidate-probability inflection point sits
/// closest to the threshold.
fn optimal_lsh_params(num_perm: usize, threshold: f64) -> (usize, usize) {
    let threshold = threshold.clamp(0.1, 0.99);

    let mut best_bands = 1;
    let mut best_rows = num_perm.max(1);
    let mut best_score = f64::MAX;

    for bands in 1..=num_perm.max(1) {
        if num_perm % bands != 0 {
            continue;
        }
        let rows = num_perm / bands;
        let p_at_threshold = 1.0 - (1.0 - threshold.powi(rows as i32)).powi(bands as i32);
        let score = (p_at_threshold - 0.5).abs();
        if score < best_score {
            best_score = score;
            best_bands = bands;
            best_rows = rows;
        }
    }

    (best_bands, best_rows)
}
