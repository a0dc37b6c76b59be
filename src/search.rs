//! Candidate ranking for retrieval: plain similarity and MMR.
//!
//! The vector index scores every stored chunk against the query vector with
//! cosine similarity, then hands the candidates to [`select`]:
//!
//! - [`SearchStrategy::Similarity`]: the `k` most similar chunks.
//! - [`SearchStrategy::Mmr`]: take the `fetch_k` most similar, then pick `k`
//!   of them greedily by Maximal Marginal Relevance,
//!   `λ·sim(q, d) − (1 − λ)·max sim(d, selected)`. The first pick is always
//!   the most relevant candidate. λ = 1 degenerates to similarity order,
//!   λ = 0 maximises diversity.
//!
//! Scores on returned chunks are always the query similarity, never the MMR
//! objective.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::RetrievedChunk;

/// How to choose the final `k` chunks from scored candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchStrategy {
    Similarity,
    Mmr { fetch_k: usize, lambda: f32 },
}

/// A stored chunk together with its embedding.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: RetrievedChunk,
    pub vector: Vec<f32>,
}

/// Score each candidate against `query` and sort by similarity, descending.
///
/// Ties keep their input order.
pub fn rank_by_similarity(query: &[f32], mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    for c in &mut candidates {
        c.chunk.score = cosine_similarity(query, &c.vector);
    }
    candidates.sort_by(|a, b| {
        b.chunk
            .score
            .partial_cmp(&a.chunk.score)
            .unwrap_or(Ordering::Equal)
    });
    candidates
}

/// Pick at most `k` chunks according to `strategy`.
pub fn select(
    query: &[f32],
    candidates: Vec<Candidate>,
    k: usize,
    strategy: SearchStrategy,
) -> Vec<RetrievedChunk> {
    let mut ranked = rank_by_similarity(query, candidates);
    match strategy {
        SearchStrategy::Similarity => {
            ranked.truncate(k);
            ranked.into_iter().map(|c| c.chunk).collect()
        }
        SearchStrategy::Mmr { fetch_k, lambda } => {
            ranked.truncate(fetch_k.max(k));
            mmr_select(ranked, k, lambda)
                .into_iter()
                .map(|c| c.chunk)
                .collect()
        }
    }
}

/// Greedy MMR over candidates already scored against the query.
pub fn mmr_select(candidates: Vec<Candidate>, k: usize, lambda: f32) -> Vec<Candidate> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());
    let mut selected: Vec<Candidate> = Vec::with_capacity(k);
    let mut remaining = candidates;
    // Highest similarity of each remaining candidate to anything selected.
    let mut max_sim_to_selected = vec![f32::NEG_INFINITY; remaining.len()];

    while selected.len() < k {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let redundancy = if selected.is_empty() {
                0.0
            } else {
                max_sim_to_selected[idx]
            };
            let mmr = lambda * candidate.chunk.score - (1.0 - lambda) * redundancy;
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = idx;
            }
        }

        let best = remaining.remove(best_idx);
        max_sim_to_selected.remove(best_idx);
        for (idx, candidate) in remaining.iter().enumerate() {
            let sim = cosine_similarity(&candidate.vector, &best.vector);
            if sim > max_sim_to_selected[idx] {
                max_sim_to_selected[idx] = sim;
            }
        }
        selected.push(best);
    }

    selected
}
