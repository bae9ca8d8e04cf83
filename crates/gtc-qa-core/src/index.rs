//! Per-document semantic index with hybrid retrieval.
//!
//! A [`SemanticIndex`] is the chunked text of one document plus, when an
//! embedding provider is configured, one vector per chunk. It is
//! serializable so the application can persist it next to the document
//! body and load it back for every question.
//!
//! # Retrieval
//!
//! 1. Keyword candidates: chunks containing at least one query term,
//!    scored by the number of distinct matched terms.
//! 2. Vector candidates (only with a query vector and an embedded index):
//!    chunks with positive cosine similarity.
//! 3. Both candidate sets are min-max normalized to `[0, 1]`.
//! 4. Merge: `score = (1 - α) × keyword + α × semantic`.
//! 5. Sort by score (desc), chunk index (asc); keep the best `top_k`.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::embedding::cosine_similarity;

/// Query terms shorter than this are ignored unless nothing longer remains.
const MIN_TERM_CHARS: usize = 3;

/// One chunk of the index, with its embedding when available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub index: i64,
    pub text: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Searchable index over a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticIndex {
    /// Path of the file the index was built from.
    pub source: String,
    /// Embedding model used for chunk vectors, if any.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    pub chunks: Vec<IndexedChunk>,
}

/// Retrieval tuning, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    /// `hybrid = (1-α)*keyword + α*semantic`.
    pub hybrid_alpha: f64,
    pub top_k: usize,
}

/// A retrieved chunk and how it scored.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
    pub keyword_score: f64,
    pub semantic_score: f64,
}

impl SemanticIndex {
    /// Build a keyword-only index from chunks.
    pub fn new(source: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self {
            source: source.into(),
            model: None,
            dims: None,
            chunks: chunks
                .into_iter()
                .map(|c| IndexedChunk {
                    index: c.index,
                    text: c.text,
                    hash: c.hash,
                    vector: None,
                })
                .collect(),
        }
    }

    /// Attach one vector per chunk, in chunk order.
    pub fn with_vectors(mut self, model: &str, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if vectors.len() != self.chunks.len() {
            bail!(
                "expected {} vectors, got {}",
                self.chunks.len(),
                vectors.len()
            );
        }
        let dims = vectors.first().map(|v| v.len());
        if vectors.iter().any(|v| Some(v.len()) != dims) {
            bail!("embedding vectors have inconsistent dimensions");
        }
        for (chunk, vector) in self.chunks.iter_mut().zip(vectors) {
            chunk.vector = Some(vector);
        }
        self.model = Some(model.to_string());
        self.dims = dims;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn has_vectors(&self) -> bool {
        !self.chunks.is_empty() && self.chunks.iter().all(|c| c.vector.is_some())
    }

    /// Rank chunks against a query. Returns an empty vector when nothing
    /// matches.
    pub fn retrieve(
        &self,
        query: &str,
        query_vec: Option<&[f32]>,
        params: &RetrievalParams,
    ) -> Vec<Passage> {
        let terms = query_terms(query);

        let keyword: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let text_lower = c.text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(t.as_str())).count();
                (matches > 0).then_some((i, matches as f64))
            })
            .collect();

        let vector: Vec<(usize, f64)> = match query_vec {
            Some(qv) => self
                .chunks
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    let sim = cosine_similarity(qv, c.vector.as_deref()?) as f64;
                    (sim > 0.0).then_some((i, sim))
                })
                .collect(),
            None => Vec::new(),
        };

        let alpha = if vector.is_empty() {
            0.0
        } else if keyword.is_empty() {
            1.0
        } else {
            params.hybrid_alpha
        };

        let mut merged: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
        for (i, s) in normalize_scores(&keyword) {
            merged.entry(i).or_default().0 = s;
        }
        for (i, s) in normalize_scores(&vector) {
            merged.entry(i).or_default().1 = s;
        }

        let mut passages: Vec<Passage> = merged
            .into_iter()
            .map(|(i, (k, v))| {
                let chunk = &self.chunks[i];
                Passage {
                    chunk_index: chunk.index,
                    text: chunk.text.clone(),
                    score: (1.0 - alpha) * k + alpha * v,
                    keyword_score: k,
                    semantic_score: v,
                }
            })
            .collect();

        passages.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        passages.truncate(params.top_k);
        passages
    }
}

/// Lowercased alphanumeric terms, deduplicated, short ones dropped when
/// longer ones exist.
fn query_terms(query: &str) -> Vec<String> {
    let mut all: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    all.sort();
    all.dedup();

    let long: Vec<String> = all
        .iter()
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .cloned()
        .collect();
    if long.is_empty() {
        all
    } else {
        long
    }
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
fn normalize_scores(candidates: &[(usize, f64)]) -> Vec<(usize, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let s_min = candidates.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.1)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|&(i, raw)| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (raw - s_min) / (s_max - s_min)
            };
            (i, norm)
        })
        .collect()
}
