//! Local BM25 sparse encoder.
//!
//! Produces term-weight vectors compatible with a sparse index that applies
//! IDF on the engine side: documents carry the BM25 term-frequency
//! component, queries carry `1.0` per unique term.
//!
//! Term indices are the first four bytes of the SHA-256 of the normalized
//! token, so the same text always maps to the same vector, across processes
//! and machines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::SparseConfig;

/// Sparse vector with sorted, unique indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Dot product of two sorted sparse vectors.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will", "with",
];

#[derive(Debug, Clone)]
pub struct Bm25Encoder {
    k1: f32,
    b: f32,
    avg_doc_len: f32,
    stopwords: bool,
}

impl Default for Bm25Encoder {
    fn default() -> Self {
        Self::new(&SparseConfig::default())
    }
}

impl Bm25Encoder {
    pub fn new(config: &SparseConfig) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
            avg_doc_len: config.avg_doc_len,
            stopwords: config.stopwords,
        }
    }

    /// Lowercased alphanumeric tokens, stopwords removed when enabled.
    ///
    /// `char::is_alphanumeric` is Unicode-aware, so Georgian and Cyrillic
    /// product text tokenizes the same way Latin text does.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !(self.stopwords && STOPWORDS.contains(&t.as_str())))
            .collect()
    }

    /// Encode a stored document (BM25 term-frequency saturation).
    pub fn encode_document(&self, text: &str) -> SparseVector {
        let tokens = self.tokenize(text);
        let doc_len = tokens.len() as f32;
        let mut tf: BTreeMap<u32, f32> = BTreeMap::new();
        for token in &tokens {
            *tf.entry(token_index(token)).or_insert(0.0) += 1.0;
        }

        let norm = 1.0 - self.b + self.b * doc_len / self.avg_doc_len;
        let (indices, values) = tf
            .into_iter()
            .map(|(idx, f)| (idx, f * (self.k1 + 1.0) / (f + self.k1 * norm)))
            .unzip();
        SparseVector { indices, values }
    }

    /// Encode a query: unit weight per unique term.
    pub fn encode_query(&self, text: &str) -> SparseVector {
        let mut indices: Vec<u32> = self.tokenize(text).iter().map(|t| token_index(t)).collect();
        indices.sort_unstable();
        indices.dedup();
        let values = vec![1.0; indices.len()];
        SparseVector { indices, values }
    }
}

fn token_index(token: &str) -> u32 {
    let digest = Sha256::digest(token.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}
