//! Incremental reindexing driven by a source-control diff.

use std::sync::Arc;
use std::time::Instant;

use tib_llm::{Embedder, TextGenerator};

use crate::error::Result;
use crate::filter::{IgnoreRules, is_eligible};
use crate::git::ChangeSet;
use crate::indexer::{
    CodeIndexer, IndexReport, PurgeScope, RepoConfig, elapsed_ms, ensure_repo_dir, log_summary,
};

impl<E: Embedder, G: TextGenerator> CodeIndexer<E, G> {
    /// Re-index only what changed since the stored checkpoint.
    ///
    /// Points of deleted and changed files are purged first, then changed
    /// files that are still eligible go through the regular file pipeline.
    /// The checkpoint advances to the head commit observed before the diff,
    /// also when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository path is missing, the diff or head
    /// commit cannot be computed, or the purge or checkpoint write fails.
    pub async fn reindex_repo(&self, repo: &RepoConfig) -> Result<IndexReport> {
        let start = Instant::now();
        ensure_repo_dir(&repo.path)?;

        let since = self.checkpoints.get(&repo.name).await?;
        let head = self.head_commit(repo).await?;

        let scm = Arc::clone(&self.scm);
        let path = repo.path.clone();
        let since_ref = since.clone();
        let ChangeSet { changed, deleted } =
            tokio::task::spawn_blocking(move || scm.changes(&path, since_ref.as_deref())).await??;

        tracing::info!(
            repo = %repo.name,
            since = since.as_deref().unwrap_or("<lookback>"),
            head = %head,
            changed = changed.len(),
            deleted = deleted.len(),
            "incremental reindex started"
        );

        let root = repo.path.clone();
        let candidates = changed.clone();
        let files: Vec<String> = tokio::task::spawn_blocking(move || {
            let rules = IgnoreRules::load(&root);
            candidates
                .into_iter()
                .filter(|rel| is_eligible(rel, &rules) && root.join(rel).is_file())
                .collect()
        })
        .await?;

        // deletions first, then every changed path, each purged once
        let mut scope: Vec<String> = deleted.clone();
        for rel in &changed {
            if !scope.contains(rel) {
                scope.push(rel.clone());
            }
        }

        let mut report = self.run(repo, &files, PurgeScope::Files(scope)).await?;
        report.files_deleted = deleted.len();

        if !report.cancelled {
            self.checkpoints.set(&repo.name, &head).await?;
            if report.files_skipped > 0 {
                // purged and not rewritten; the next diff will not revisit them
                tracing::warn!(
                    repo = %repo.name,
                    checkpoint = %head,
                    lost = ?report.errors,
                    "checkpoint advanced past files that failed to index, run a full index to restore them"
                );
            }
            report.checkpoint = Some(head);
        }

        report.duration_ms = elapsed_ms(start);
        log_summary(&repo.name, "incremental reindex finished", &report);
        Ok(report)
    }
}
