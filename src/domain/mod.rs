//! Domain types shared across modules.
//!
//! This module contains data structures that are used by multiple
//! parts of the pipeline (git collector, classifier, ranker, budget
//! fitting, report emitter). Keeping them here avoids circular
//! dependencies between those modules.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

/// One file touched between the base commit and HEAD.
///
/// `status` is the raw git status code (`M`, `A`, `R100`, ...). Rename and
/// copy records carry their destination path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFileRecord {
    pub path: String,
    pub status: String,
}

/// Why a path did not make it into the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OmissionReason {
    #[serde(rename = "filtered:lockfile")]
    Lockfile,
    #[serde(rename = "filtered:env")]
    Env,
    #[serde(rename = "filtered:secret")]
    Secret,
    #[serde(rename = "filtered:binary")]
    Binary,
    #[serde(rename = "filtered:docs")]
    Docs,
    #[serde(rename = "filtered:tests")]
    Tests,
    #[serde(rename = "filtered:tests-not-close")]
    TestsNotClose,
    #[serde(rename = "filtered:generated-cache")]
    GeneratedCache,
    #[serde(rename = "filtered:missing")]
    Missing,
    #[serde(rename = "filtered:unknown")]
    Unknown,
    #[serde(rename = "over-budget")]
    OverBudget,
}

impl OmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OmissionReason::Lockfile => "filtered:lockfile",
            OmissionReason::Env => "filtered:env",
            OmissionReason::Secret => "filtered:secret",
            OmissionReason::Binary => "filtered:binary",
            OmissionReason::Docs => "filtered:docs",
            OmissionReason::Tests => "filtered:tests",
            OmissionReason::TestsNotClose => "filtered:tests-not-close",
            OmissionReason::GeneratedCache => "filtered:generated-cache",
            OmissionReason::Missing => "filtered:missing",
            OmissionReason::Unknown => "filtered:unknown",
            OmissionReason::OverBudget => "over-budget",
        }
    }
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A changed file left out of the pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmittedEntry {
    pub path: String,
    pub reason: OmissionReason,
}

/// Omitted paths with the first reason recorded for each, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OmissionLedger {
    reasons: BTreeMap<String, OmissionReason>,
}

impl OmissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason` unless the path already has one. Returns true if recorded.
    pub fn record(&mut self, path: impl Into<String>, reason: OmissionReason) -> bool {
        match self.reasons.entry(path.into()) {
            Entry::Vacant(slot) => {
                slot.insert(reason);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<OmissionReason> {
        self.reasons.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, OmissionReason)> {
        self.reasons.iter().map(|(path, reason)| (path.as_str(), *reason))
    }
}

/// How a related file connects to the changed file that recalled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationReason {
    TargetFile,
    DirectDependency,
    DirectDependent,
    Dependency,
    Dependent,
    Unknown,
}

impl RelationReason {
    /// Parse the recall tool's reason label. Anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "TargetFile" => RelationReason::TargetFile,
            "DirectDependency" => RelationReason::DirectDependency,
            "DirectDependent" => RelationReason::DirectDependent,
            "Dependency" => RelationReason::Dependency,
            "Dependent" => RelationReason::Dependent,
            _ => RelationReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationReason::TargetFile => "TargetFile",
            RelationReason::DirectDependency => "DirectDependency",
            RelationReason::DirectDependent => "DirectDependent",
            RelationReason::Dependency => "Dependency",
            RelationReason::Dependent => "Dependent",
            RelationReason::Unknown => "Unknown",
        }
    }

    /// Numeric priority used by the ranker (higher is more important).
    pub fn weight(&self) -> u32 {
        match self {
            RelationReason::TargetFile => 100,
            RelationReason::DirectDependency | RelationReason::DirectDependent => 90,
            RelationReason::Dependency | RelationReason::Dependent => 70,
            RelationReason::Unknown => 50,
        }
    }
}

impl fmt::Display for RelationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file recalled as related to one or more changed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedCandidate {
    pub path: String,
    pub reason: RelationReason,
    /// Hop count from the originating changed file; smaller is closer.
    pub distance: u32,
    /// Number of distinct changed-file queries that produced this path.
    pub frequency: u32,
    pub relation_weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
}

impl RelatedCandidate {
    pub fn new(path: impl Into<String>, reason: RelationReason, distance: u32) -> Self {
        Self {
            path: path.into(),
            reason,
            distance,
            frequency: 1,
            relation_weight: reason.weight(),
            estimated_tokens: None,
        }
    }

    /// Fold another mention of the same path into this one.
    ///
    /// Frequency accumulates, distance keeps the closest hop and weight keeps
    /// the strongest relation.
    pub fn absorb(&mut self, other: &RelatedCandidate) {
        self.frequency = self.frequency.saturating_add(1);
        self.distance = self.distance.min(other.distance);
        self.relation_weight = self.relation_weight.max(other.relation_weight);
    }
}

/// A related candidate with its dense 1-based rank (1 = most important).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRelatedCandidate {
    #[serde(flatten)]
    pub candidate: RelatedCandidate,
    pub rank: usize,
}

impl RankedRelatedCandidate {
    pub fn into_candidate(self) -> RelatedCandidate {
        self.candidate
    }
}

impl Deref for RankedRelatedCandidate {
    type Target = RelatedCandidate;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}
