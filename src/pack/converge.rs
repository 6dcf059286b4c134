//! Render, measure, evict until the pack fits.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::RankedRelatedCandidate;
use crate::error::PackError;

/// Renders the pack with a given related set and returns its true token count.
#[async_trait]
pub trait PackMeasure: Send + Sync {
    async fn measure(&self, related: &[RankedRelatedCandidate]) -> Result<u64, PackError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    /// Related files in the final pack, in priority order.
    pub included: Vec<RankedRelatedCandidate>,
    /// Dropped by the loop, in eviction order.
    pub evicted: Vec<RankedRelatedCandidate>,
    pub final_tokens: u64,
    pub iterations: usize,
}

/// Measure the pack and drop the lowest-priority related file until the
/// measured total is within `budget`.
///
/// Terminates after at most `included.len() + 1` measurements. An empty set
/// that still does not fit is [`PackError::CoreOverBudget`].
pub async fn converge<M>(
    measure: &M,
    budget: u64,
    mut included: Vec<RankedRelatedCandidate>,
) -> Result<Convergence, PackError>
where
    M: PackMeasure + ?Sized,
{
    let mut evicted = Vec::new();
    let mut iterations = 0;

    loop {
        iterations += 1;
        let tokens = measure.measure(&included).await?;
        debug!(
            "Convergence pass {}: {} related file(s), {} tokens (budget {})",
            iterations,
            included.len(),
            tokens,
            budget
        );

        if tokens <= budget {
            info!(
                "Pack converged at {} tokens with {} related file(s) after {} pass(es)",
                tokens,
                included.len(),
                iterations
            );
            return Ok(Convergence {
                included,
                evicted,
                final_tokens: tokens,
                iterations,
            });
        }

        match included.pop() {
            Some(candidate) => {
                info!(
                    "Evicting {} (rank {}) to fit budget: {} > {}",
                    candidate.path, candidate.rank, tokens, budget
                );
                evicted.push(candidate);
            }
            None => {
                return Err(PackError::CoreOverBudget {
                    over: tokens - budget,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RelatedCandidate, RelationReason};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Base cost plus the estimate of every related file, plus a fixed
    /// markup overhead per file that the estimates do not see.
    struct MarkupMeasure {
        base: u64,
        overhead_per_file: u64,
        calls: AtomicUsize,
    }

    impl MarkupMeasure {
        fn new(base: u64, overhead_per_file: u64) -> Self {
            Self {
                base,
                overhead_per_file,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PackMeasure for MarkupMeasure {
        async fn measure(&self, related: &[RankedRelatedCandidate]) -> Result<u64, PackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.base
                + related
                    .iter()
                    .map(|c| c.estimated_tokens.unwrap_or(0) + self.overhead_per_file)
                    .sum::<u64>())
        }
    }

    fn ranked(path: &str, rank: usize, tokens: u64) -> RankedRelatedCandidate {
        let mut candidate = RelatedCandidate::new(path, RelationReason::Dependency, 1);
        candidate.estimated_tokens = Some(tokens);
        RankedRelatedCandidate { candidate, rank }
    }

    #[tokio::test]
    async fn test_fits_on_first_pass() {
        let measure = MarkupMeasure::new(50, 0);
        let result = converge(&measure, 100, vec![ranked("a.rs", 1, 30)]).await.unwrap();

        assert_eq!(result.final_tokens, 80);
        assert_eq!(result.iterations, 1);
        assert!(result.evicted.is_empty());
    }

    #[tokio::test]
    async fn test_evicts_lowest_priority_first() {
        // Estimates say 50 + 20 + 20 + 10 = 100, markup adds 3 per file.
        let measure = MarkupMeasure::new(50, 3);
        let included = vec![ranked("a.rs", 1, 20), ranked("b.rs", 2, 20), ranked("c.rs", 3, 10)];

        let result = converge(&measure, 100, included).await.unwrap();

        let kept: Vec<_> = result.included.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(kept, vec!["a.rs", "b.rs"]);
        assert_eq!(result.evicted.len(), 1);
        assert_eq!(result.evicted[0].path, "c.rs");
        assert_eq!(result.final_tokens, 96);
        assert_eq!(result.iterations, 2);
        assert_eq!(measure.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_set_over_budget_fails() {
        let measure = MarkupMeasure::new(120, 0);
        let err = converge(&measure, 100, vec![ranked("a.rs", 1, 5)])
            .await
            .unwrap_err();

        assert!(matches!(err, PackError::CoreOverBudget { over: 20 }));
        assert_eq!(measure.calls.load(Ordering::SeqCst), 2);
    }
}
