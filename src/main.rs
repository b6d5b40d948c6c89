mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tib_index::context::Contextualizer;
use tib_index::expand::QueryExpander;
use tib_index::git::GitSourceControl;
use tib_index::indexer::{CodeIndexer, IndexReport, IndexerConfig, RepoConfig};
use tib_index::retriever::{HybridRetriever, SearchRequest};
use tib_llm::any::AnyProvider;
use tib_llm::ollama::OllamaProvider;
use tib_llm::openai::OpenAiProvider;
use tib_store::{CheckpointStore, QdrantOps, SqliteCheckpointStore, VectorStore};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ProviderKind, RepoEntry};

#[derive(Parser)]
#[command(name = "tib", version, about = "Hybrid semantic + keyword code index")]
struct Cli {
    /// Configuration file (defaults to `TIB_CONFIG`, then `config/default.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index of every configured repository, or just one
    Index {
        #[arg(long)]
        repo: Option<String>,
    },
    /// Re-index files changed since each repository's checkpoint
    Reindex {
        #[arg(long)]
        repo: Option<String>,
    },
    /// Search the index and print hits as JSON lines
    Search {
        query: String,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        layer: Option<String>,
        /// Also search with model-generated rephrasings of the query
        #[arg(long)]
        expand: bool,
    },
}

#[derive(Clone, Copy)]
enum RunMode {
    Full,
    Incremental,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)?;
    config.validate()?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let provider = Arc::new(create_provider(&config));
    let store: Arc<dyn VectorStore> = Arc::new(
        QdrantOps::new(&config.qdrant.url, config.secrets.qdrant_api_key.clone())
            .context("failed to create Qdrant client")?,
    );

    match cli.command {
        Command::Index { repo } => {
            run_indexing(&config, provider, store, repo.as_deref(), RunMode::Full).await
        }
        Command::Reindex { repo } => {
            run_indexing(&config, provider, store, repo.as_deref(), RunMode::Incremental).await
        }
        Command::Search {
            query,
            repo,
            language,
            layer,
            expand,
        } => {
            let request = SearchRequest {
                query,
                repo,
                language,
                layer,
                expand: expand || config.search.expand_queries,
            };
            run_search(&config, provider, store, &request).await
        }
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var("TIB_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn create_provider(config: &Config) -> AnyProvider {
    let llm = &config.llm;
    match llm.provider {
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &llm.base_url,
            llm.model.clone(),
            llm.embedding_model.clone(),
        )),
        ProviderKind::OpenAi => AnyProvider::OpenAi(OpenAiProvider::new(
            config.secrets.llm_api_key.clone().unwrap_or_default(),
            llm.base_url.clone(),
            llm.model.clone(),
            Some(llm.embedding_model.clone()),
        )),
    }
}

fn indexer_config(config: &Config) -> IndexerConfig {
    IndexerConfig {
        collection: config.qdrant.collection.clone(),
        concurrency: config.index.concurrency,
        max_attempts: config.index.max_attempts,
        retry_base_delay: Duration::from_millis(config.index.retry_base_ms),
        embed_timeout: Duration::from_secs(config.index.embed_timeout_secs),
        upsert_timeout: Duration::from_secs(config.index.upsert_timeout_secs),
    }
}

async fn open_checkpoints(path: &str) -> anyhow::Result<SqliteCheckpointStore> {
    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteCheckpointStore::open(path)
        .await
        .with_context(|| format!("failed to open checkpoint database {path}"))
}

/// Cancel `token` on the first Ctrl-C so in-flight files can finish.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight files");
            token.cancel();
        }
    });
}

async fn run_indexing(
    config: &Config,
    provider: Arc<AnyProvider>,
    store: Arc<dyn VectorStore>,
    repo: Option<&str>,
    mode: RunMode,
) -> anyhow::Result<()> {
    let repos = config.select_repos(repo)?;
    if repos.is_empty() {
        bail!("no repositories configured; add [[repos]] entries to the configuration");
    }

    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(open_checkpoints(&config.checkpoint.sqlite_path).await?);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let lookback = Duration::from_secs(config.index.lookback_hours.saturating_mul(3600));

    let mut failed = 0usize;
    for entry in repos {
        if cancel.is_cancelled() {
            break;
        }
        let RepoEntry { name, path, branch } = entry.clone();
        let repo = RepoConfig { name, path, branch };

        let scm = Arc::new(GitSourceControl::new(repo.branch.clone(), lookback));
        let mut indexer: CodeIndexer<AnyProvider, AnyProvider> = CodeIndexer::new(
            Arc::clone(&store),
            Arc::clone(&checkpoints),
            scm,
            Arc::clone(&provider),
            indexer_config(config),
        )
        .with_cancellation(cancel.clone());
        if config.index.contextualize {
            indexer = indexer.with_contextualizer(
                Contextualizer::new(
                    Arc::clone(&provider),
                    Duration::from_secs(config.index.context_timeout_secs),
                )
                .with_max_tokens(config.llm.max_tokens),
            );
        }

        let result = match mode {
            RunMode::Full => indexer.index_repo(&repo).await,
            RunMode::Incremental => indexer.reindex_repo(&repo).await,
        };
        match result {
            Ok(report) => print_report(&repo.name, &report)?,
            Err(e) => {
                tracing::error!(repo = %repo.name, error = %e, "indexing run failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} repository run(s) failed");
    }
    Ok(())
}

fn print_report(repo: &str, report: &IndexReport) -> anyhow::Result<()> {
    let mut line = serde_json::to_value(report)?;
    if let Some(map) = line.as_object_mut() {
        map.insert("repo".into(), serde_json::Value::String(repo.to_owned()));
    }
    println!("{line}");
    Ok(())
}

async fn run_search(
    config: &Config,
    provider: Arc<AnyProvider>,
    store: Arc<dyn VectorStore>,
    request: &SearchRequest,
) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(config.search.timeout_secs);
    let search_config = tib_index::retriever::SearchConfig {
        collection: config.qdrant.collection.clone(),
        prefetch_limit: config.search.prefetch_limit,
        result_limit: config.search.result_limit,
        timeout,
    };
    let retriever = HybridRetriever::new(store, Arc::clone(&provider), search_config)
        .with_expander(QueryExpander::new(provider, timeout));

    let outcome = retriever.search(request).await;
    if let Some(message) = &outcome.message {
        println!("{}", serde_json::json!({ "message": message }));
    }
    for hit in &outcome.hits {
        println!("{}", serde_json::to_string(hit)?);
    }
    Ok(())
}
