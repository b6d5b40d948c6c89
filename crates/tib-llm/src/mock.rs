//! Test-only mock provider implementing both ports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{Embedder, GenerationParams, TextGenerator};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub dimensions: usize,
    pub fail_generate: bool,
    pub fail_embed: bool,
    /// Number of upcoming embedding calls that fail before calls succeed again.
    embed_failures_left: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
    embedded: Arc<Mutex<Vec<String>>>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock context".into(),
            dimensions: 32,
            fail_generate: false,
            fail_embed: false,
            embed_failures_left: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            embedded: Arc::new(Mutex::new(Vec::new())),
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_generate: true,
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_embed_failures(self, count: usize) -> Self {
        self.embed_failures_left.store(count, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Number of `embed`/`embed_batch` requests received, failed ones included.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Prompts passed to `generate`, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Every text that reached the embedding port.
    #[must_use]
    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Bag-of-words vector: identical texts embed identically and shared
    /// words raise cosine similarity.
    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let n = self.dimensions.max(1);
        let mut vector = vec![0.0f32; n];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % n] += 1.0;
        }
        vector
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn take_embed_failure(&self) -> bool {
        self.embed_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TextGenerator for MockProvider {
    async fn generate(&self, prompt: &str, _params: GenerationParams) -> Result<String, LlmError> {
        self.pause().await;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_owned());
        }
        if self.fail_generate {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self
            .responses
            .lock()
            .map_err(|e| LlmError::Other(e.to_string()))?;
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

impl Embedder for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed_batch(&[text.to_owned()]).await?;
        vectors
            .pop()
            .ok_or(LlmError::EmptyResponse { provider: "mock" })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.pause().await;
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed || self.take_embed_failure() {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        if let Ok(mut embedded) = self.embedded.lock() {
            embedded.extend(texts.iter().cloned());
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
