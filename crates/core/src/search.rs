//! Exact similarity search: a linear scan over every stored vector.

use crate::error::IndexError;
use crate::models::SearchHit;
use crate::store::{ChunkStore, StoredVector};
use crate::vector::dot;

/// Scores each candidate against a unit-length `query` and keeps the best `k`.
///
/// Candidates whose dimensionality differs from the query (including the
/// empty placeholders of untracked file types) are ignored. Equal scores keep
/// their stored order.
pub fn rank_top_k(query: &[f32], candidates: &[StoredVector], k: usize) -> Vec<SearchHit> {
    if k == 0 || query.is_empty() {
        return Vec::new();
    }

    let mut scored = candidates
        .iter()
        .filter(|candidate| candidate.embedding.len() == query.len())
        .map(|candidate| (dot(query, &candidate.embedding), candidate))
        .collect::<Vec<_>>();

    scored.sort_by(|left, right| right.0.total_cmp(&left.0));

    scored
        .into_iter()
        .take(k)
        .map(|(score, candidate)| SearchHit {
            file_name: candidate.file_name.clone(),
            chunk_index: candidate.chunk_index,
            score,
            content: candidate.content.clone(),
        })
        .collect()
}

impl ChunkStore {
    pub fn search_similar(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.is_empty() {
            return Err(IndexError::InvalidArgument("query vector is empty".to_string()));
        }
        let candidates = self.stored_vectors()?;
        Ok(rank_top_k(query, &candidates, k))
    }
}
