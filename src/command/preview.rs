use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cli::{self, PackArgs};
use crate::exec::SystemRunner;
use crate::filters::is_recognized_source;
use crate::git::GitClient;
use crate::pack::select_changed_files;
use crate::recall::is_recall_target;

/// Dry run: collect the snapshot and classify the changed files.
pub async fn run_preview(args: PackArgs) -> Result<()> {
    let project_dir = cli::resolve_project_dir(args.project.clone())?;
    let options = args.to_options(project_dir);

    let git = GitClient::new(Arc::new(SystemRunner), &options.tools.git);
    let context = git
        .resolve_repo_context(&options.project_dir, options.base_ref.as_deref())
        .await?;
    let snapshot = git.collect_snapshot(&context, options.diff_context).await?;
    let selection = select_changed_files(&context.repo_root, &snapshot.changed_files, &options).await;

    println!("Repository: {}", context.repo_root.display());
    println!(
        "Range: {} ({}...{})\n",
        context.base_ref, context.base_commit, context.head_commit
    );

    let targets = selection
        .included
        .iter()
        .filter(|path| is_recall_target(path))
        .count();

    println!("Summary:");
    println!("  Changed files: {}", snapshot.changed_files.len());
    println!("  Included: {}", selection.included.len());
    println!("  Omitted: {}", selection.omitted.len());
    println!("  Recall targets: {}", targets);

    let statuses: BTreeMap<&str, &str> = snapshot
        .changed_files
        .iter()
        .map(|record| (record.path.as_str(), record.status.as_str()))
        .collect();

    let mut rows: Vec<(String, String)> = selection
        .included
        .iter()
        .map(|path| {
            let mut tags = vec!["include"];
            if is_recall_target(path) {
                tags.push("recall");
            }
            if !is_recognized_source(path) {
                tags.push("unrecognized");
            }
            (path.clone(), tags.join(","))
        })
        .chain(
            selection
                .omitted
                .iter()
                .map(|entry| (entry.path.clone(), entry.reason.to_string())),
        )
        .collect();
    rows.sort();

    println!("\nFiles:");
    for (path, decision) in &rows {
        let status = statuses.get(path.as_str()).copied().unwrap_or("?");
        println!("  {:<5} {:<28} {}", status, decision, path);
    }

    if selection.included.is_empty() {
        println!("\n⚠️  No eligible changed files; a pack run would fail.");
    }

    Ok(())
}
