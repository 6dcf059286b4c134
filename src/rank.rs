//! Related candidate merging and ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::{RankedRelatedCandidate, RelatedCandidate};

/// Total order over candidates: stronger relation, more mentions, closer,
/// cheaper, then path. Missing estimates sort as the most expensive.
pub fn compare_candidates(left: &RelatedCandidate, right: &RelatedCandidate) -> Ordering {
    right
        .relation_weight
        .cmp(&left.relation_weight)
        .then_with(|| right.frequency.cmp(&left.frequency))
        .then_with(|| left.distance.cmp(&right.distance))
        .then_with(|| token_key(left).cmp(&token_key(right)))
        .then_with(|| left.path.cmp(&right.path))
}

fn token_key(candidate: &RelatedCandidate) -> u64 {
    candidate.estimated_tokens.unwrap_or(u64::MAX)
}

/// Sort and assign dense 1-based ranks.
pub fn rank_related_candidates<I>(candidates: I) -> Vec<RankedRelatedCandidate>
where
    I: IntoIterator<Item = RelatedCandidate>,
{
    let mut sorted: Vec<RelatedCandidate> = candidates.into_iter().collect();
    sorted.sort_by(compare_candidates);

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| RankedRelatedCandidate {
            candidate,
            rank: index + 1,
        })
        .collect()
}

/// Rank again after estimates changed.
pub fn rerank(ranked: Vec<RankedRelatedCandidate>) -> Vec<RankedRelatedCandidate> {
    rank_related_candidates(ranked.into_iter().map(RankedRelatedCandidate::into_candidate))
}

/// At most one candidate per path; repeated mentions are folded together.
#[derive(Debug, Default)]
pub struct CandidatePool {
    by_path: BTreeMap<String, RelatedCandidate>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mention. Returns true if the path was new.
    pub fn insert(&mut self, candidate: RelatedCandidate) -> bool {
        match self.by_path.get_mut(&candidate.path) {
            Some(existing) => {
                existing.absorb(&candidate);
                false
            }
            None => {
                self.by_path.insert(candidate.path.clone(), candidate);
                true
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Candidates in path order.
    pub fn into_candidates(self) -> Vec<RelatedCandidate> {
        self.by_path.into_values().collect()
    }
}
