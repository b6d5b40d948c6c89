use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_core();
        self.apply_env_overrides_index();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_core(&mut self) {
        if let Ok(v) = std::env::var("TIB_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid TIB_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("TIB_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("TIB_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("TIB_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("TIB_QDRANT_URL") {
            self.qdrant.url = v;
        }
        if let Ok(v) = std::env::var("TIB_QDRANT_COLLECTION") {
            self.qdrant.collection = v;
        }
        if let Ok(v) = std::env::var("TIB_CHECKPOINT_SQLITE_PATH") {
            self.checkpoint.sqlite_path = v;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("TIB_INDEX_CONCURRENCY") {
            match v.parse::<usize>() {
                Ok(n) => self.index.concurrency = n,
                Err(_) => tracing::warn!("ignoring invalid TIB_INDEX_CONCURRENCY value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("TIB_INDEX_MAX_ATTEMPTS") {
            match v.parse::<u32>() {
                Ok(n) => self.index.max_attempts = n,
                Err(_) => tracing::warn!("ignoring invalid TIB_INDEX_MAX_ATTEMPTS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("TIB_INDEX_CONTEXTUALIZE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.index.contextualize = enabled;
        }
        if let Ok(v) = std::env::var("TIB_INDEX_LOOKBACK_HOURS")
            && let Ok(hours) = v.parse::<u64>()
        {
            self.index.lookback_hours = hours;
        }
        if let Ok(v) = std::env::var("TIB_SEARCH_RESULT_LIMIT")
            && let Ok(limit) = v.parse::<u64>()
        {
            self.search.result_limit = limit;
        }
        if let Ok(v) = std::env::var("TIB_SEARCH_EXPAND")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.search.expand_queries = enabled;
        }
    }

    fn apply_env_secrets(&mut self) {
        if let Ok(v) = std::env::var("TIB_LLM_API_KEY")
            && !v.is_empty()
        {
            self.secrets.llm_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("TIB_QDRANT_API_KEY")
            && !v.is_empty()
        {
            self.secrets.qdrant_api_key = Some(v);
        }
    }
}
