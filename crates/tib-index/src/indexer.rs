//! File indexing pipeline: discover → chunk → contextualize → embed → upsert.
//!
//! A run purges the points in its scope (the whole repository for a full run,
//! individual files for an incremental one) and then feeds its file set
//! through the same per-file pipeline with bounded concurrency.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tib_llm::{Embedder, TextGenerator};
use tib_store::{CheckpointStore, VectorFilter, VectorPoint, VectorStore};
use tokio_util::sync::CancellationToken;

use crate::chunker::{Chunk, MAX_CHUNK_CHARS, chunk_file};
use crate::context::Contextualizer;
use crate::error::{IndexError, Result};
use crate::filter::{IgnoreRules, discover_files};
use crate::git::SourceControl;
use crate::point::{ChunkPayload, point_id};
use crate::redact::redact_secrets;
use crate::retry::{RetryPolicy, with_retry};
use crate::sparse::text_to_sparse;

/// Payload fields that get a keyword index for filtering.
pub const KEYWORD_FIELDS: &[&str] = &["repo", "filePath", "language", "layer"];

/// One repository to index.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub name: String,
    pub path: PathBuf,
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub collection: String,
    /// Files processed at the same time.
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub embed_timeout: Duration,
    pub upsert_timeout: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collection: "code_chunks".into(),
            concurrency: 3,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            embed_timeout: Duration::from_secs(60),
            upsert_timeout: Duration::from_secs(60),
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    pub files_processed: usize,
    pub chunks_indexed: usize,
    pub files_skipped: usize,
    /// Files whose points were purged because they no longer exist.
    pub files_deleted: usize,
    /// Chunks embedded without a situating description.
    pub contexts_skipped: usize,
    pub errors: Vec<String>,
    /// Commit recorded as the new checkpoint.
    pub checkpoint: Option<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Which stored points a run replaces before indexing.
#[derive(Debug, Clone)]
pub(crate) enum PurgeScope {
    Repo,
    Files(Vec<String>),
}

#[derive(Debug)]
enum FileOutcome {
    Indexed { chunks: usize, contexts_skipped: usize },
    Skipped { file: String, error: String },
    Cancelled,
}

pub struct CodeIndexer<E, G> {
    pub(crate) store: Arc<dyn VectorStore>,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) scm: Arc<dyn SourceControl>,
    embedder: Arc<E>,
    contextualizer: Option<Contextualizer<G>>,
    pub(crate) config: IndexerConfig,
    cancel: CancellationToken,
}

impl<E: Embedder, G: TextGenerator> CodeIndexer<E, G> {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        scm: Arc<dyn SourceControl>,
        embedder: Arc<E>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            checkpoints,
            scm,
            embedder,
            contextualizer: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_contextualizer(mut self, contextualizer: Contextualizer<G>) -> Self {
        self.contextualizer = Some(contextualizer);
        self
    }

    /// Share a token that stops new files from being scheduled once cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Full run: replace every point of `repo` with a fresh index of its
    /// eligible files and record the head commit as the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RepoNotFound` when the path is not a directory, or
    /// an error if collection setup or the repository purge fails. Per-file
    /// failures are reported in [`IndexReport`] instead.
    pub async fn index_repo(&self, repo: &RepoConfig) -> Result<IndexReport> {
        let start = Instant::now();
        ensure_repo_dir(&repo.path)?;

        let root = repo.path.clone();
        let files = tokio::task::spawn_blocking(move || {
            let rules = IgnoreRules::load(&root);
            discover_files(&root, &rules)
        })
        .await?;

        if files.is_empty() {
            tracing::info!(repo = %repo.name, "no source files found");
            return Ok(IndexReport {
                duration_ms: elapsed_ms(start),
                ..IndexReport::default()
            });
        }

        let head = match self.head_commit(repo).await {
            Ok(sha) => Some(sha),
            Err(e) => {
                tracing::warn!(
                    repo = %repo.name,
                    error = %e,
                    "head commit unavailable, checkpoint will not advance"
                );
                None
            }
        };

        tracing::info!(repo = %repo.name, files = files.len(), "full index started");
        let mut report = self.run(repo, &files, PurgeScope::Repo).await?;

        if !report.cancelled
            && let Some(sha) = head
        {
            match self.checkpoints.set(&repo.name, &sha).await {
                Ok(()) => report.checkpoint = Some(sha),
                Err(e) => {
                    tracing::warn!(repo = %repo.name, error = %e, "failed to store checkpoint");
                    report.errors.push(format!("checkpoint: {e}"));
                }
            }
        }

        report.duration_ms = elapsed_ms(start);
        log_summary(&repo.name, "full index finished", &report);
        Ok(report)
    }

    pub(crate) async fn head_commit(&self, repo: &RepoConfig) -> Result<String> {
        let scm = Arc::clone(&self.scm);
        let path = repo.path.clone();
        tokio::task::spawn_blocking(move || scm.head_commit(&path)).await?
    }

    /// Purge `scope`, then index `files`. The collection is prepared only when
    /// there is something to write; a purge against a missing collection is a
    /// no-op. A run cancelled before it starts leaves the store untouched.
    pub(crate) async fn run(
        &self,
        repo: &RepoConfig,
        files: &[String],
        scope: PurgeScope,
    ) -> Result<IndexReport> {
        if self.cancel.is_cancelled() {
            return Ok(IndexReport {
                cancelled: true,
                ..IndexReport::default()
            });
        }
        let collection_ready = if files.is_empty() {
            self.store.collection_exists(&self.config.collection).await?
        } else {
            self.prepare_collection().await?;
            true
        };
        if collection_ready {
            self.purge(repo, &scope).await?;
        }

        let outcomes: Vec<FileOutcome> = futures::stream::iter(files.iter())
            .map(|rel| self.process_file(repo, rel))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = IndexReport::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Indexed {
                    chunks,
                    contexts_skipped,
                } => {
                    report.files_processed += 1;
                    report.chunks_indexed += chunks;
                    report.contexts_skipped += contexts_skipped;
                }
                FileOutcome::Skipped { file, error } => {
                    report.files_skipped += 1;
                    report.errors.push(format!("{file}: {error}"));
                }
                FileOutcome::Cancelled => report.cancelled = true,
            }
        }
        Ok(report)
    }

    /// Probe the embedding width, then make sure the hybrid collection and
    /// its keyword indexes exist.
    async fn prepare_collection(&self) -> Result<()> {
        let embedder = &self.embedder;
        let probe = with_retry(self.embed_policy(), "embed", "<probe>", move || async move {
            embedder.embed("probe").await.map_err(IndexError::from)
        })
        .await?;
        let dense_size = u64::try_from(probe.len())?;

        let collection = &self.config.collection;
        self.store
            .ensure_collection(collection, dense_size, true)
            .await?;
        for field in KEYWORD_FIELDS {
            self.store.ensure_keyword_index(collection, field).await?;
        }
        Ok(())
    }

    async fn purge(&self, repo: &RepoConfig, scope: &PurgeScope) -> Result<()> {
        let filters: Vec<(String, VectorFilter)> = match scope {
            PurgeScope::Repo => vec![(repo.name.clone(), VectorFilter::text("repo", &repo.name))],
            PurgeScope::Files(paths) => paths
                .iter()
                .map(|p| {
                    (
                        p.clone(),
                        VectorFilter::text("repo", &repo.name).and_text("filePath", p),
                    )
                })
                .collect(),
        };
        let store = &self.store;
        let collection = self.config.collection.as_str();
        for (label, filter) in filters {
            with_retry(self.upsert_policy(), "delete", &label, move || {
                let filter = filter.clone();
                async move {
                    store
                        .delete_by_filter(collection, filter, true)
                        .await
                        .map_err(IndexError::from)
                }
            })
            .await?;
            tracing::debug!(repo = %repo.name, scope = %label, "purged points");
        }
        Ok(())
    }

    async fn process_file(&self, repo: &RepoConfig, rel: &str) -> FileOutcome {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }
        match self.index_file(repo, rel).await {
            Ok((chunks, contexts_skipped)) => {
                tracing::debug!(repo = %repo.name, file = rel, chunks, "file indexed");
                FileOutcome::Indexed {
                    chunks,
                    contexts_skipped,
                }
            }
            Err(e) => {
                tracing::warn!(repo = %repo.name, file = rel, error = %e, "skipping file");
                FileOutcome::Skipped {
                    file: rel.to_owned(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Index one file; returns `(chunks indexed, chunks without context)`.
    async fn index_file(&self, repo: &RepoConfig, rel: &str) -> Result<(usize, usize)> {
        let content = tokio::fs::read_to_string(repo.path.join(rel)).await?;
        let mut chunks = chunk_file(&content, rel);
        if chunks.is_empty() {
            return Ok((0, 0));
        }

        if let Some(header) = chunks.iter().find(|c| c.is_header()) {
            let header_id = point_id(&repo.name, rel, header.start_line);
            for chunk in chunks.iter_mut().filter(|c| !c.is_header()) {
                chunk.header_chunk_id = Some(header_id.clone());
            }
        }

        let contexts = self.contexts_for(&content, &chunks).await;
        let contexts_skipped = contexts.iter().filter(|c| c.is_empty()).count();

        let redacted: Vec<String> = chunks
            .iter()
            .map(|c| redact_secrets(&c.content).into_owned())
            .collect();
        let texts: Vec<String> = chunks
            .iter()
            .zip(&contexts)
            .zip(&redacted)
            .map(|((chunk, context), content)| embedding_text(chunk, context, content))
            .collect();

        let embedder = &self.embedder;
        let texts_ref = &texts;
        let vectors = with_retry(self.embed_policy(), "embed", rel, move || async move {
            embedder.embed_batch(texts_ref).await.map_err(IndexError::from)
        })
        .await?;
        if vectors.len() != chunks.len() {
            return Err(tib_llm::LlmError::BatchMismatch {
                sent: chunks.len(),
                received: vectors.len(),
            }
            .into());
        }

        let mut points = Vec::with_capacity(chunks.len());
        for (((chunk, context), content), dense) in
            chunks.iter().zip(contexts).zip(redacted).zip(vectors)
        {
            let sparse = text_to_sparse(&sparse_text(chunk, &content));
            let payload = ChunkPayload::new(&repo.name, chunk, content, context).to_map()?;
            points.push(VectorPoint {
                id: point_id(&repo.name, rel, chunk.start_line),
                dense,
                sparse: (!sparse.is_empty()).then_some(sparse),
                payload,
            });
        }
        let count = points.len();

        let store = &self.store;
        let collection = self.config.collection.as_str();
        let points_ref = &points;
        with_retry(self.upsert_policy(), "upsert", rel, move || async move {
            store
                .upsert(collection, points_ref.clone(), true)
                .await
                .map_err(IndexError::from)
        })
        .await?;

        Ok((count, contexts_skipped))
    }

    /// Situating descriptions, one per chunk, generated sequentially. A file
    /// that fits in a single chunk needs none.
    async fn contexts_for(&self, content: &str, chunks: &[Chunk]) -> Vec<String> {
        let single_small = chunks.len() == 1 && chunks[0].char_len() <= MAX_CHUNK_CHARS;
        let Some(contextualizer) = self.contextualizer.as_ref().filter(|_| !single_small) else {
            return vec![String::new(); chunks.len()];
        };
        let mut contexts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let chunk_content = if chunk.is_header() { "" } else { chunk.content.as_str() };
            let context = contextualizer
                .contextualize(content, chunk_content, &chunk.file_path, chunk.language)
                .await;
            contexts.push(context);
        }
        contexts
    }

    fn embed_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_attempts,
            base_delay: self.config.retry_base_delay,
            timeout: self.config.embed_timeout,
        }
    }

    fn upsert_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_attempts,
            base_delay: self.config.retry_base_delay,
            timeout: self.config.upsert_timeout,
        }
    }
}

pub(crate) fn ensure_repo_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(IndexError::RepoNotFound(path.to_path_buf()))
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

pub(crate) fn log_summary(repo: &str, message: &str, report: &IndexReport) {
    tracing::info!(
        repo,
        files = report.files_processed,
        chunks = report.chunks_indexed,
        skipped = report.files_skipped,
        deleted = report.files_deleted,
        contexts_skipped = report.contexts_skipped,
        cancelled = report.cancelled,
        duration_ms = report.duration_ms,
        "{message}"
    );
}

/// `context`, a `<language> <layer> <path>` line and the redacted chunk,
/// separated by blank lines. The context segment is omitted when empty.
fn embedding_text(chunk: &Chunk, context: &str, content: &str) -> String {
    let descriptor = format!("{} {} {}", chunk.language, chunk.layer, chunk.file_path);
    if context.is_empty() {
        format!("{descriptor}\n\n{content}")
    } else {
        format!("{}\n\n{descriptor}\n\n{content}", redact_secrets(context))
    }
}

/// Lexical view of a chunk: its text plus symbol names and annotations.
fn sparse_text(chunk: &Chunk, content: &str) -> String {
    let mut text = content.to_owned();
    for extra in chunk
        .symbol_name
        .iter()
        .chain(chunk.parent_symbol.iter())
        .chain(chunk.annotations.iter())
    {
        text.push('\n');
        text.push_str(extra);
    }
    text
}

#[cfg(test)]
mod tests {
    use tib_llm::mock::MockProvider;
    use tib_store::{InMemoryCheckpointStore, InMemoryVectorStore, StoreOp};

    use super::*;
    use crate::chunker::ChunkType;
    use crate::git::ChangeSet;

    struct NoGit;

    impl SourceControl for NoGit {
        fn changed_files(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn deleted_files(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn head_commit(&self, _: &Path) -> Result<String> {
            Err(IndexError::Other("not a repository".into()))
        }

        fn changes(&self, _: &Path, _: Option<&str>) -> Result<ChangeSet> {
            Ok(ChangeSet::default())
        }
    }

    fn chunk(content: &str) -> Chunk {
        chunk_file(content, "src/service/A.java").remove(0)
    }

    #[test]
    fn embedding_text_omits_empty_context() {
        let c = chunk("class A {}");
        assert_eq!(
            embedding_text(&c, "", "class A {}"),
            "java service src/service/A.java\n\nclass A {}"
        );
        assert_eq!(
            embedding_text(&c, "Defines A.", "class A {}"),
            "Defines A.\n\njava service src/service/A.java\n\nclass A {}"
        );
    }

    #[test]
    fn sparse_text_includes_symbols_and_annotations() {
        let mut c = chunk("class A {}");
        c.symbol_name = Some("refund".into());
        c.parent_symbol = Some("PaymentController".into());
        c.annotations = vec!["@Transactional".into()];
        let text = sparse_text(&c, "body");
        assert_eq!(text, "body\nrefund\nPaymentController\n@Transactional");
    }

    #[test]
    fn missing_directory_is_rejected() {
        let err = ensure_repo_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, IndexError::RepoNotFound(_)));
    }

    #[tokio::test]
    async fn small_file_skips_contextualization_and_has_no_header_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/service")).unwrap();
        std::fs::write(
            dir.path().join("src/service/A.java"),
            "class A { void pay() {} }\n",
        )
        .unwrap();

        let store = Arc::new(InMemoryVectorStore::new());
        let mock = MockProvider::default();
        let indexer: CodeIndexer<MockProvider, MockProvider> = CodeIndexer::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(NoGit),
            Arc::new(mock.clone()),
            IndexerConfig::default(),
        )
        .with_contextualizer(Contextualizer::new(
            Arc::new(mock.clone()),
            Duration::from_secs(5),
        ));
        let repo = RepoConfig {
            name: "shop".into(),
            path: dir.path().to_path_buf(),
            branch: None,
        };

        let report = indexer.index_repo(&repo).await.unwrap();
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(report.contexts_skipped, 1);
        assert!(report.checkpoint.is_none());
        assert!(mock.prompts().is_empty());

        let points = store.points("code_chunks");
        assert_eq!(points.len(), 1);
        let payload = ChunkPayload::from_map(&points[0].payload).unwrap();
        assert_eq!(payload.chunk_type, ChunkType::File);
        assert!(payload.header_chunk_id.is_none());
        assert_eq!(payload.context, "");
        assert_eq!(points[0].id, point_id("shop", "src/service/A.java", 1));

        let ops = store.ops();
        assert_eq!(ops[0], StoreOp::EnsureCollection);
        assert_eq!(
            store.keyword_indexes("code_chunks"),
            vec!["repo", "filePath", "language", "layer"]
        );
        assert!(ops.contains(&StoreOp::DeleteByFilter(vec!["repo=shop".into()])));
    }
}
