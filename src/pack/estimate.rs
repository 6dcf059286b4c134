//! Per-candidate token estimates.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use tracing::debug;

use crate::domain::RankedRelatedCandidate;
use crate::error::PackError;
use crate::rank::rerank;
use crate::render::{render_file_block, FileBlock};
use crate::tokens::TokenOracle;

use super::cache::{compute_content_digest, ContentCache};

const SCRATCH_EXTENSION: &str = "txt";

/// Render each candidate's file block on its own, count it, then re-rank.
///
/// At most `concurrency` counts run at once; results keep input order, so the
/// outcome does not depend on which count finishes first. Candidates without
/// cached content keep no estimate and therefore rank last and never fit.
pub async fn estimate_candidates(
    oracle: &dyn TokenOracle,
    cache: &ContentCache,
    ranked: Vec<RankedRelatedCandidate>,
    concurrency: usize,
) -> Result<Vec<RankedRelatedCandidate>, PackError> {
    if ranked.is_empty() {
        return Ok(ranked);
    }

    let scratch = tempfile::Builder::new()
        .prefix("review-pack-")
        .tempdir()
        .map_err(|e| PackError::io("create scratch directory", e))?;
    let scratch_dir = scratch.path();

    let estimated: Vec<RankedRelatedCandidate> = stream::iter(
        ranked
            .into_iter()
            .map(|candidate| estimate_one(oracle, cache, scratch_dir, candidate)),
    )
    .buffered(concurrency.max(1))
    .try_collect()
    .await?;

    Ok(rerank(estimated))
}

async fn estimate_one(
    oracle: &dyn TokenOracle,
    cache: &ContentCache,
    scratch_dir: &Path,
    mut ranked: RankedRelatedCandidate,
) -> Result<RankedRelatedCandidate, PackError> {
    let Some(content) = cache.get(&ranked.path) else {
        debug!("No cached content for {}, leaving it unestimated", ranked.path);
        return Ok(ranked);
    };

    let block = render_file_block(&FileBlock::new(ranked.path.clone(), content));
    let scratch_file = scratch_dir.join(format!(
        "{}.{}",
        compute_content_digest(&ranked.path, content.as_bytes()),
        SCRATCH_EXTENSION
    ));
    tokio::fs::write(&scratch_file, block)
        .await
        .map_err(|e| PackError::io(format!("write {}", scratch_file.display()), e))?;

    let tokens = oracle.count_file(&scratch_file, SCRATCH_EXTENSION).await?;
    debug!("Estimated {} at {} tokens", ranked.path, tokens);
    ranked.candidate.estimated_tokens = Some(tokens);
    Ok(ranked)
}
