use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub repos: Vec<RepoEntry>,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Embedding and generation backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "qwen2.5-coder:7b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_max_tokens() -> u32 {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used for chunk context and query expansion.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "code_chunks".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_context_timeout_secs() -> u64 {
    30
}

fn default_io_timeout_secs() -> u64 {
    60
}

fn default_lookback_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Generate a situating description for every chunk of multi-chunk files.
    #[serde(default = "default_true")]
    pub contextualize: bool,
    #[serde(default = "default_context_timeout_secs")]
    pub context_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub upsert_timeout_secs: u64,
    /// Diff window used when a repository has no checkpoint yet.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            contextualize: true,
            context_timeout_secs: default_context_timeout_secs(),
            embed_timeout_secs: default_io_timeout_secs(),
            upsert_timeout_secs: default_io_timeout_secs(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

fn default_prefetch_limit() -> u64 {
    20
}

fn default_result_limit() -> u64 {
    16
}

fn default_search_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_prefetch_limit")]
    pub prefetch_limit: u64,
    #[serde(default = "default_result_limit")]
    pub result_limit: u64,
    #[serde(default)]
    pub expand_queries: bool,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            prefetch_limit: default_prefetch_limit(),
            result_limit: default_result_limit(),
            expand_queries: false,
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_sqlite_path() -> String {
    "./data/tib.db".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// One `[[repos]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepoEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Credentials read from the environment only, never from the file.
#[derive(Default)]
pub struct ResolvedSecrets {
    pub llm_api_key: Option<String>,
    pub qdrant_api_key: Option<String>,
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ResolvedSecrets")
            .field("llm_api_key", &mask(&self.llm_api_key))
            .field("qdrant_api_key", &mask(&self.qdrant_api_key))
            .finish()
    }
}
