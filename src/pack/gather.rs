//! Changed-file selection and related-candidate gathering.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::ContextPackOptions;
use crate::domain::{ChangedFileRecord, OmissionLedger, OmissionReason, OmittedEntry, RelatedCandidate};
use crate::filters::{
    evaluate_changed_file, evaluate_related_file, is_close_test_candidate, is_test_like_path,
    lower_segments, normalize_path,
};
use crate::rank::CandidatePool;
use crate::recall::RecallTargetResult;

use super::cache::{inspect_file, ContentCache, FileKind};

/// Changed files split into pack members and omissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedSelection {
    /// Normalised paths, in snapshot order.
    pub included: Vec<String>,
    pub omitted: Vec<OmittedEntry>,
}

/// Missing first, then the classifier, then the binary check.
pub async fn select_changed_files(
    repo_root: &Path,
    records: &[ChangedFileRecord],
    options: &ContextPackOptions,
) -> ChangedSelection {
    let mut selection = ChangedSelection::default();
    let mut seen = HashSet::new();

    for record in records {
        let path = normalize_path(&record.path);
        if path.is_empty() || !seen.insert(path.clone()) {
            continue;
        }

        let kind = inspect_file(repo_root, &path).await;
        let reason = if kind == FileKind::Missing {
            Some(OmissionReason::Missing)
        } else {
            let decision = evaluate_changed_file(&path, options);
            if !decision.include {
                Some(decision.omission_reason())
            } else if kind == FileKind::Binary {
                Some(OmissionReason::Binary)
            } else {
                None
            }
        };

        match reason {
            Some(reason) => {
                debug!("Omitting changed file {} ({})", path, reason);
                selection.omitted.push(OmittedEntry { path, reason });
            }
            None => selection.included.push(path),
        }
    }

    selection
}

/// Merged related candidates plus every related path that was filtered out.
#[derive(Debug, Default)]
pub struct RelatedGathering {
    /// In path order, before ranking.
    pub candidates: Vec<RelatedCandidate>,
    pub omitted: OmissionLedger,
}

/// Walk every recall result and keep the candidates worth ranking.
///
/// Contents of accepted candidates are loaded into `cache`. Test-like paths
/// that are neither few hops away nor next to a changed file are dropped
/// after merging, so the closest mention decides.
pub async fn gather_related_candidates(
    repo_root: &Path,
    targets: &[RecallTargetResult],
    changed_included: &[String],
    options: &ContextPackOptions,
    cache: &mut ContentCache,
) -> RelatedGathering {
    let changed: HashSet<&str> = changed_included.iter().map(String::as_str).collect();
    let mut pool = CandidatePool::new();
    let mut omitted = OmissionLedger::new();

    for target in targets {
        for candidate in &target.candidates {
            let path = normalize_path(&candidate.path);
            if path.is_empty() || changed.contains(path.as_str()) {
                continue;
            }
            if omitted.get(&path).is_some() {
                continue;
            }

            if !pool.contains(&path) {
                let decision = evaluate_related_file(&path, options);
                if !decision.include {
                    omitted.record(path, decision.omission_reason());
                    continue;
                }

                match inspect_file(repo_root, &path).await {
                    FileKind::Missing => {
                        omitted.record(path, OmissionReason::Missing);
                        continue;
                    }
                    FileKind::Binary => {
                        omitted.record(path, OmissionReason::Binary);
                        continue;
                    }
                    FileKind::Text => {}
                }

                if let Err(e) = cache.load(repo_root, &path).await {
                    warn!("Treating unreadable related file as binary: {}", e);
                    omitted.record(path, OmissionReason::Binary);
                    continue;
                }
            }

            let mut merged = candidate.clone();
            merged.path = path;
            pool.insert(merged);
        }
    }

    if pool.is_empty() {
        debug!("No related candidates left after filtering");
        return RelatedGathering {
            candidates: Vec::new(),
            omitted,
        };
    }

    let changed_segments: Vec<Vec<String>> =
        changed_included.iter().map(|p| lower_segments(p)).collect();

    let mut candidates = Vec::with_capacity(pool.len());
    for candidate in pool.into_candidates() {
        if is_test_like_path(&candidate.path)
            && !is_close_test_candidate(candidate.distance, &candidate.path, &changed_segments)
        {
            omitted.record(candidate.path, OmissionReason::TestsNotClose);
            continue;
        }
        candidates.push(candidate);
    }

    debug!(
        "Gathered {} related candidate(s), {} related path(s) filtered",
        candidates.len(),
        omitted.len()
    );

    RelatedGathering { candidates, omitted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RelationReason;
    use crate::recall::RecallTargetRow;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &[u8]) {
        let file = root.join(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }

    fn record(path: &str) -> ChangedFileRecord {
        ChangedFileRecord {
            path: path.to_string(),
            status: "M".to_string(),
        }
    }

    fn target(name: &str, candidates: Vec<RelatedCandidate>) -> RecallTargetResult {
        let mut row = RecallTargetRow::skipped(name, "");
        row.status = crate::recall::RecallTargetStatus::Ok;
        RecallTargetResult { row, candidates }
    }

    #[tokio::test]
    async fn test_select_changed_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/main.rs", b"fn main() {}\n");
        write(root, "docs/guide.md", b"# guide\n");
        write(root, "Cargo.lock", b"# lock\n");
        write(root, "assets/logo.bin", &[1, 0, 2]);

        let records = vec![
            record("Cargo.lock"),
            record("assets/logo.bin"),
            record("docs/guide.md"),
            record("gone.rs"),
            record("src/main.rs"),
        ];
        let options = ContextPackOptions::for_project(root);
        let selection = select_changed_files(root, &records, &options).await;

        // Changed docs are never filtered as docs.
        assert_eq!(selection.included, vec!["docs/guide.md", "src/main.rs"]);
        let omitted: Vec<_> = selection
            .omitted
            .iter()
            .map(|e| (e.path.as_str(), e.reason))
            .collect();
        assert_eq!(
            omitted,
            vec![
                ("Cargo.lock", OmissionReason::Lockfile),
                ("assets/logo.bin", OmissionReason::Binary),
                ("gone.rs", OmissionReason::Missing),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_wins_over_classifier() {
        let temp_dir = TempDir::new().unwrap();
        let options = ContextPackOptions::for_project(temp_dir.path());
        let selection = select_changed_files(temp_dir.path(), &[record(".env")], &options).await;

        assert_eq!(selection.omitted[0].reason, OmissionReason::Missing);
    }

    #[tokio::test]
    async fn test_gather_related_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/app/api/v1/handler.rs", b"pub fn handle() {}\n");
        write(root, "src/util.rs", b"pub fn util() {}\n");
        write(root, "src/app/api/v1/handler_test.rs", b"#[test] fn t() {}\n");
        write(root, "tests/far/far_test.rs", b"#[test] fn far() {}\n");
        write(root, "node_modules/pkg/index.js", b"module.exports = 1;\n");
        write(root, "assets/icon.bin", &[0, 1]);

        let changed = vec!["src/app/api/v1/handler.rs".to_string(), "src/app/router.rs".to_string()];
        let targets = vec![
            target(
                "src/app/api/v1/handler.rs",
                vec![
                    RelatedCandidate::new("src/app/router.rs", RelationReason::TargetFile, 0),
                    RelatedCandidate::new("./src/util.rs", RelationReason::Dependency, 3),
                    RelatedCandidate::new("src/app/api/v1/handler_test.rs", RelationReason::Dependent, 5),
                    RelatedCandidate::new("tests/far/far_test.rs", RelationReason::Dependent, 4),
                    RelatedCandidate::new("node_modules/pkg/index.js", RelationReason::Dependency, 1),
                    RelatedCandidate::new("assets/icon.bin", RelationReason::Dependency, 1),
                    RelatedCandidate::new("src/missing.rs", RelationReason::Dependency, 1),
                ],
            ),
            target(
                "src/app/router.rs",
                vec![RelatedCandidate::new("src/util.rs", RelationReason::DirectDependency, 1)],
            ),
        ];

        let options = ContextPackOptions::for_project(root);
        let mut cache = ContentCache::new();
        let gathered = gather_related_candidates(root, &targets, &changed, &options, &mut cache).await;

        let paths: Vec<_> = gathered.candidates.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app/api/v1/handler_test.rs", "src/util.rs"]);

        let util = &gathered.candidates[1];
        assert_eq!(util.frequency, 2);
        assert_eq!(util.distance, 1);
        assert_eq!(util.relation_weight, 90);

        assert_eq!(
            gathered.omitted.get("tests/far/far_test.rs"),
            Some(OmissionReason::TestsNotClose)
        );
        assert_eq!(
            gathered.omitted.get("node_modules/pkg/index.js"),
            Some(OmissionReason::GeneratedCache)
        );
        assert_eq!(gathered.omitted.get("assets/icon.bin"), Some(OmissionReason::Binary));
        assert_eq!(gathered.omitted.get("src/missing.rs"), Some(OmissionReason::Missing));
        assert_eq!(gathered.omitted.get("src/app/router.rs"), None);

        assert_eq!(cache.get("src/util.rs"), Some("pub fn util() {}\n"));
        assert!(cache.get("assets/icon.bin").is_none());
    }

    #[tokio::test]
    async fn test_tests_excluded_when_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/a_test.rs", b"#[test] fn t() {}\n");

        let mut options = ContextPackOptions::for_project(root);
        options.include_tests = false;
        let targets = vec![target(
            "src/a.rs",
            vec![RelatedCandidate::new("src/a_test.rs", RelationReason::DirectDependent, 1)],
        )];
        let gathered = gather_related_candidates(
            root,
            &targets,
            &["src/a.rs".to_string()],
            &options,
            &mut ContentCache::new(),
        )
        .await;

        assert!(gathered.candidates.is_empty());
        assert_eq!(gathered.omitted.get("src/a_test.rs"), Some(OmissionReason::Tests));
    }
}
