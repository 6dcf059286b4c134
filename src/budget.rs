//! Budget fitting for related candidates.
//!
//! Both policies are built from one greedy primitive, [`fit_within_budget`],
//! which walks candidates in priority order and keeps every candidate whose
//! estimate still fits. Each pass is a pure function of a remaining budget and
//! a candidate list, so passes compose without shared counters.

use serde::Serialize;

use crate::domain::{OmissionReason, RankedRelatedCandidate};

pub const DEFAULT_CLOSE_TEST_RESERVE_RATIO: f64 = 0.25;
pub const DEFAULT_CLOSE_TEST_RESERVE_MIN_TOKENS: u64 = 4096;

/// Result of one greedy pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFit {
    pub included: Vec<RankedRelatedCandidate>,
    pub omitted: Vec<RankedRelatedCandidate>,
    pub remaining_budget: u64,
    pub used_tokens: u64,
}

/// Greedy first-fit in the given order. Candidates without an estimate never fit.
pub fn fit_within_budget(budget: u64, candidates: Vec<RankedRelatedCandidate>) -> PartialFit {
    let mut fit = PartialFit {
        included: Vec::new(),
        omitted: Vec::new(),
        remaining_budget: budget,
        used_tokens: 0,
    };

    for candidate in candidates {
        match candidate.estimated_tokens {
            Some(tokens) if tokens <= fit.remaining_budget => {
                fit.remaining_budget -= tokens;
                fit.used_tokens += tokens;
                fit.included.push(candidate);
            }
            _ => fit.omitted.push(candidate),
        }
    }

    fit
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OmittedCandidate {
    pub candidate: RankedRelatedCandidate,
    pub reason: OmissionReason,
}

impl OmittedCandidate {
    fn over_budget(candidate: RankedRelatedCandidate) -> Self {
        Self {
            candidate,
            reason: OmissionReason::OverBudget,
        }
    }
}

/// Provisional split of the related candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetFit {
    /// Included candidates in priority order.
    pub included: Vec<RankedRelatedCandidate>,
    pub omitted: Vec<OmittedCandidate>,
    pub final_tokens_estimate: u64,
    pub remaining_budget_estimate: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetFitInput<'a> {
    pub budget: u64,
    pub baseline_tokens: u64,
    pub candidates: &'a [RankedRelatedCandidate],
}

impl BudgetFitInput<'_> {
    pub fn related_budget(&self) -> u64 {
        self.budget.saturating_sub(self.baseline_tokens)
    }
}

/// How much of the related budget is held back for close tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseTestPreference {
    pub reserve_ratio: f64,
    pub reserve_min_tokens: u64,
}

impl Default for CloseTestPreference {
    fn default() -> Self {
        Self {
            reserve_ratio: DEFAULT_CLOSE_TEST_RESERVE_RATIO,
            reserve_min_tokens: DEFAULT_CLOSE_TEST_RESERVE_MIN_TOKENS,
        }
    }
}

fn sort_by_rank(candidates: &mut [RankedRelatedCandidate]) {
    candidates.sort_by(|l, r| l.rank.cmp(&r.rank).then_with(|| l.path.cmp(&r.path)));
}

fn estimate_sum(candidates: &[RankedRelatedCandidate]) -> u64 {
    candidates
        .iter()
        .map(|c| c.estimated_tokens.unwrap_or(0))
        .fold(0u64, u64::saturating_add)
}

/// Single greedy pass over the whole ranked list.
pub fn fit_related_candidates_to_budget(input: BudgetFitInput<'_>) -> BudgetFit {
    let fit = fit_within_budget(input.related_budget(), input.candidates.to_vec());

    BudgetFit {
        included: fit.included,
        omitted: fit.omitted.into_iter().map(OmittedCandidate::over_budget).collect(),
        final_tokens_estimate: input.baseline_tokens.saturating_add(fit.used_tokens),
        remaining_budget_estimate: fit.remaining_budget,
    }
}

/// Tokens held back for close tests out of `related_budget`.
pub fn compute_close_test_reserve(
    related_budget: u64,
    has_close_tests: bool,
    preference: CloseTestPreference,
) -> u64 {
    if !has_close_tests || related_budget == 0 {
        return 0;
    }

    let ratio = if preference.reserve_ratio.is_nan() {
        0.0
    } else {
        preference.reserve_ratio.clamp(0.0, 1.0)
    };
    let ratio_reserve = (related_budget as f64 * ratio).floor() as u64;
    let min_reserve = related_budget.min(preference.reserve_min_tokens);

    related_budget.min(min_reserve.max(ratio_reserve))
}

/// Three greedy passes: non-tests into the budget minus the reserve, close
/// tests into what is left, then leftovers back to the non-tests that missed.
pub fn fit_related_candidates_with_close_test_preference<F>(
    input: BudgetFitInput<'_>,
    is_close_test: F,
    preference: CloseTestPreference,
) -> BudgetFit
where
    F: Fn(&RankedRelatedCandidate) -> bool,
{
    let related_budget = input.related_budget();

    let (mut close_tests, mut non_tests): (Vec<_>, Vec<_>) = input
        .candidates
        .iter()
        .cloned()
        .partition(|c| is_close_test(c));
    sort_by_rank(&mut close_tests);
    sort_by_rank(&mut non_tests);

    let reserve = compute_close_test_reserve(related_budget, !close_tests.is_empty(), preference);

    let first = fit_within_budget(related_budget - reserve, non_tests);
    let tests = fit_within_budget(related_budget - first.used_tokens, close_tests);
    let second = fit_within_budget(tests.remaining_budget, first.omitted);

    let mut included = first.included;
    included.extend(tests.included);
    included.extend(second.included);
    sort_by_rank(&mut included);

    let mut omitted = tests.omitted;
    omitted.extend(second.omitted);
    omitted.sort_by(|l, r| l.path.cmp(&r.path));

    let final_tokens_estimate = input
        .baseline_tokens
        .saturating_add(estimate_sum(&included));

    BudgetFit {
        included,
        omitted: omitted.into_iter().map(OmittedCandidate::over_budget).collect(),
        final_tokens_estimate,
        remaining_budget_estimate: input.budget.saturating_sub(final_tokens_estimate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RelatedCandidate, RelationReason};
    use crate::filters::is_test_like_path;
    use crate::rank::rank_related_candidates;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ranked(entries: &[(&str, u64)]) -> Vec<RankedRelatedCandidate> {
        // Same weight and distance, so the given order is kept through the
        // frequency tie-break.
        let count = entries.len() as u32;
        rank_related_candidates(entries.iter().enumerate().map(|(i, (path, tokens))| {
            RelatedCandidate {
                frequency: count - i as u32,
                estimated_tokens: Some(*tokens),
                ..RelatedCandidate::new(*path, RelationReason::DirectDependency, 1)
            }
        }))
    }

    fn paths(candidates: &[RankedRelatedCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.path.as_str()).collect()
    }

    fn is_test(candidate: &RankedRelatedCandidate) -> bool {
        is_test_like_path(&candidate.path)
    }

    #[test]
    fn test_greedy_does_not_backtrack() {
        let fit = fit_within_budget(50, ranked(&[("a", 30), ("b", 30), ("c", 20)]));
        assert_eq!(paths(&fit.included), vec!["a", "c"]);
        assert_eq!(paths(&fit.omitted), vec!["b"]);
        assert_eq!(fit.used_tokens, 50);
        assert_eq!(fit.remaining_budget, 0);
    }

    #[test]
    fn test_missing_estimate_never_fits() {
        let mut candidates = ranked(&[("a", 1)]);
        candidates[0].candidate.estimated_tokens = None;
        let fit = fit_within_budget(u64::MAX, candidates);
        assert!(fit.included.is_empty());
        assert_eq!(fit.omitted.len(), 1);
    }

    #[test]
    fn test_plain_fit() {
        let candidates = ranked(&[("one", 10), ("two", 30), ("three", 25)]);
        let fit = fit_related_candidates_to_budget(BudgetFitInput {
            budget: 100,
            baseline_tokens: 40,
            candidates: &candidates,
        });

        assert_eq!(paths(&fit.included), vec!["one", "two"]);
        assert_eq!(fit.omitted.len(), 1);
        assert_eq!(fit.omitted[0].candidate.path, "three");
        assert_eq!(fit.omitted[0].reason, OmissionReason::OverBudget);
        assert_eq!(fit.final_tokens_estimate, 80);
        assert_eq!(fit.remaining_budget_estimate, 20);
    }

    #[test]
    fn test_reserve_computation() {
        let pref = |ratio, min| CloseTestPreference {
            reserve_ratio: ratio,
            reserve_min_tokens: min,
        };
        assert_eq!(compute_close_test_reserve(60, true, pref(0.34, 0)), 20);
        assert_eq!(compute_close_test_reserve(60, false, pref(0.34, 0)), 0);
        assert_eq!(compute_close_test_reserve(0, true, pref(0.34, 0)), 0);
        assert_eq!(compute_close_test_reserve(10_000, true, pref(0.25, 4096)), 4096);
        assert_eq!(compute_close_test_reserve(100_000, true, pref(0.25, 4096)), 25_000);
        assert_eq!(compute_close_test_reserve(1_000, true, pref(0.25, 4096)), 1_000);
        assert_eq!(compute_close_test_reserve(80, true, pref(7.0, 0)), 80);
        assert_eq!(compute_close_test_reserve(80, true, pref(-1.0, 0)), 0);
    }

    #[test]
    fn test_close_test_preference_holds_room_for_tests() {
        let candidates = ranked(&[("src/a.rs", 35), ("src/b.rs", 25), ("tests/c.rs", 20)]);
        let fit = fit_related_candidates_with_close_test_preference(
            BudgetFitInput {
                budget: 100,
                baseline_tokens: 40,
                candidates: &candidates,
            },
            is_test,
            CloseTestPreference {
                reserve_ratio: 0.34,
                reserve_min_tokens: 0,
            },
        );

        assert_eq!(paths(&fit.included), vec!["src/a.rs", "tests/c.rs"]);
        assert_eq!(fit.omitted.len(), 1);
        assert_eq!(fit.omitted[0].candidate.path, "src/b.rs");
        assert_eq!(fit.final_tokens_estimate, 95);
        assert_eq!(fit.remaining_budget_estimate, 5);
    }

    #[test]
    fn test_unused_reserve_returns_to_non_tests() {
        let candidates = ranked(&[("src/a.rs", 30), ("src/b.rs", 20), ("tests/c.rs", 5)]);
        let fit = fit_related_candidates_with_close_test_preference(
            BudgetFitInput {
                budget: 100,
                baseline_tokens: 40,
                candidates: &candidates,
            },
            is_test,
            CloseTestPreference {
                reserve_ratio: 0.5,
                reserve_min_tokens: 0,
            },
        );

        assert_eq!(paths(&fit.included), vec!["src/a.rs", "src/b.rs", "tests/c.rs"]);
        assert!(fit.omitted.is_empty());
        assert_eq!(fit.final_tokens_estimate, 95);
        assert_eq!(fit.remaining_budget_estimate, 5);
    }

    #[test]
    fn test_baseline_over_budget_fits_nothing() {
        let candidates = ranked(&[("src/a.rs", 1), ("tests/b.rs", 1)]);
        let input = BudgetFitInput {
            budget: 10,
            baseline_tokens: 12,
            candidates: &candidates,
        };

        let fit = fit_related_candidates_with_close_test_preference(
            input,
            is_test,
            CloseTestPreference::default(),
        );
        assert!(fit.included.is_empty());
        assert_eq!(fit.remaining_budget_estimate, 0);

        let plain = fit_related_candidates_to_budget(input);
        assert!(plain.included.is_empty());
        assert_eq!(plain.remaining_budget_estimate, 0);
    }

    fn arb_fit_case() -> impl Strategy<Value = (u64, u64, Vec<RankedRelatedCandidate>)> {
        let entry = (any::<bool>(), 0u64..60);
        (0u64..300, 0u64..300, prop::collection::vec(entry, 0..16)).prop_map(
            |(budget, baseline, entries)| {
                let baseline = baseline.min(budget);
                let candidates = entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, (test, tokens))| {
                        let path = if test {
                            format!("tests/t{}.rs", i)
                        } else {
                            format!("src/m{}.rs", i)
                        };
                        RelatedCandidate {
                            estimated_tokens: Some(tokens),
                            ..RelatedCandidate::new(path, RelationReason::Dependency, 1)
                        }
                    });
                (budget, baseline, rank_related_candidates(candidates))
            },
        )
    }

    fn assert_partition(fit: &BudgetFit, input: &BudgetFitInput<'_>) -> Result<(), TestCaseError> {
        let included: u64 = fit.included.iter().filter_map(|c| c.estimated_tokens).sum();
        prop_assert_eq!(included, fit.final_tokens_estimate - input.baseline_tokens);
        prop_assert!(included <= input.budget - input.baseline_tokens);

        let mut seen = BTreeSet::new();
        for path in fit
            .included
            .iter()
            .map(|c| c.path.clone())
            .chain(fit.omitted.iter().map(|o| o.candidate.path.clone()))
        {
            prop_assert!(seen.insert(path), "duplicate path");
        }
        let expected: BTreeSet<String> = input.candidates.iter().map(|c| c.path.clone()).collect();
        prop_assert_eq!(seen, expected);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_plain_fit_partitions((budget, baseline, candidates) in arb_fit_case()) {
            let input = BudgetFitInput { budget, baseline_tokens: baseline, candidates: &candidates };
            let fit = fit_related_candidates_to_budget(input);
            assert_partition(&fit, &input)?;
        }

        #[test]
        fn prop_close_test_fit_partitions((budget, baseline, candidates) in arb_fit_case()) {
            let input = BudgetFitInput { budget, baseline_tokens: baseline, candidates: &candidates };
            let fit = fit_related_candidates_with_close_test_preference(
                input,
                is_test,
                CloseTestPreference::default(),
            );
            assert_partition(&fit, &input)?;
            for pair in fit.included.windows(2) {
                prop_assert!(pair[0].rank < pair[1].rank);
            }
        }
    }
}
