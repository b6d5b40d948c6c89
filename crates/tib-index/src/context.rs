//! Contextual retrieval: a short LLM-written description that situates a
//! chunk within its file, prepended to the chunk before embedding.

use std::sync::Arc;
use std::time::Duration;

use tib_llm::{GenerationParams, TextGenerator};

use crate::languages::Lang;
use crate::redact::redact_secrets;

/// The whole-file part of the prompt is cut to this many characters.
pub const MAX_DOCUMENT_CHARS: usize = 8000;

const DEFAULT_MAX_TOKENS: u32 = 200;

pub struct Contextualizer<G> {
    generator: Arc<G>,
    timeout: Duration,
    max_tokens: u32,
}

impl<G: TextGenerator> Contextualizer<G> {
    #[must_use]
    pub fn new(generator: Arc<G>, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Describe `chunk_content` in the context of its file.
    ///
    /// Never fails: an empty chunk, a provider error or a timeout all yield an
    /// empty string.
    pub async fn contextualize(
        &self,
        file_content: &str,
        chunk_content: &str,
        file_path: &str,
        language: Lang,
    ) -> String {
        if chunk_content.trim().is_empty() {
            return String::new();
        }

        let document = truncate_chars(file_content, MAX_DOCUMENT_CHARS);
        let prompt = build_prompt(
            &redact_secrets(document),
            &redact_secrets(chunk_content),
            file_path,
            language,
        );
        let params = GenerationParams::deterministic(self.max_tokens);

        match tokio::time::timeout(self.timeout, self.generator.generate(&prompt, params)).await {
            Ok(Ok(text)) => text.trim().to_owned(),
            Ok(Err(e)) => {
                tracing::debug!(file = file_path, error = %e, "contextualization failed");
                String::new()
            }
            Err(_) => {
                tracing::debug!(
                    file = file_path,
                    timeout_secs = self.timeout.as_secs(),
                    "contextualization timed out"
                );
                String::new()
            }
        }
    }
}

fn build_prompt(document: &str, chunk: &str, file_path: &str, language: Lang) -> String {
    format!(
        "<document path=\"{file_path}\" language=\"{language}\">\n{document}\n</document>\n\
         Here is a chunk from the document above:\n\
         <chunk>\n{chunk}\n</chunk>\n\
         In 2-3 sentences, situate this chunk within the file: what it does, \
         what it depends on and what uses it. Answer with the description only."
    )
}

/// Longest prefix of `s` with at most `max` characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use tib_llm::mock::MockProvider;

    use super::*;

    fn contextualizer(mock: MockProvider) -> Contextualizer<MockProvider> {
        Contextualizer::new(Arc::new(mock), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn returns_trimmed_response() {
        let mock = MockProvider::with_responses(vec!["  Validates refunds.\n".into()]);
        let ctx = contextualizer(mock.clone());
        let out = ctx
            .contextualize("class A {}", "void refund() {}", "src/A.java", Lang::Java)
            .await;
        assert_eq!(out, "Validates refunds.");
        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("<chunk>\nvoid refund() {}\n</chunk>"));
        assert!(prompts[0].contains("path=\"src/A.java\""));
    }

    #[tokio::test]
    async fn empty_chunk_short_circuits() {
        let mock = MockProvider::default();
        let ctx = contextualizer(mock.clone());
        assert_eq!(ctx.contextualize("file", "", "a.ts", Lang::TypeScript).await, "");
        assert!(mock.prompts().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_yields_empty() {
        let ctx = contextualizer(MockProvider::failing());
        assert_eq!(ctx.contextualize("file", "x()", "a.ts", Lang::TypeScript).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_empty() {
        let mock = MockProvider::default().with_delay(10_000);
        let ctx = Contextualizer::new(Arc::new(mock), Duration::from_secs(1));
        assert_eq!(ctx.contextualize("file", "x()", "a.ts", Lang::TypeScript).await, "");
    }

    #[tokio::test]
    async fn document_is_truncated_and_redacted() {
        let mock = MockProvider::default();
        let ctx = contextualizer(mock.clone());
        let file = format!("token = \"sk-live1234567\"\n{}", "y".repeat(20_000));
        ctx.contextualize(&file, "fn main() {}", "src/main.rs", Lang::Rust)
            .await;
        let prompt = &mock.prompts()[0];
        assert!(!prompt.contains("sk-live1234567"));
        assert!(prompt.matches('y').count() <= MAX_DOCUMENT_CHARS);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
