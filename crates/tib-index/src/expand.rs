//! Optional query expansion into a few alternative phrasings.

use std::sync::Arc;
use std::time::Duration;

use tib_llm::{GenerationParams, TextGenerator};

/// The original query plus at most two rewrites.
pub const MAX_PHRASINGS: usize = 3;

const EXPANSION_PARAMS: GenerationParams = GenerationParams {
    max_tokens: 256,
    temperature: 0.3,
};

pub struct QueryExpander<G> {
    generator: Arc<G>,
    timeout: Duration,
}

impl<G: TextGenerator> QueryExpander<G> {
    #[must_use]
    pub fn new(generator: Arc<G>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Phrasings to search with, original query first. Falls back to the
    /// original alone when the model fails or answers with something unusable.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let original = query.trim().to_owned();
        let prompt = format!(
            "Rewrite the following code search query into 2-3 semantically different \
             phrasings that a developer might use to find the same code. \
             Respond with a JSON array of strings only.\n\nQuery: {original}"
        );

        let response =
            match tokio::time::timeout(self.timeout, self.generator.generate(&prompt, EXPANSION_PARAMS))
                .await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "query expansion failed");
                    return vec![original];
                }
                Err(_) => {
                    tracing::debug!("query expansion timed out");
                    return vec![original];
                }
            };

        let mut phrasings = vec![original];
        for candidate in parse_phrasings(&response) {
            if phrasings.len() >= MAX_PHRASINGS {
                break;
            }
            if !phrasings.iter().any(|p| p.eq_ignore_ascii_case(&candidate)) {
                phrasings.push(candidate);
            }
        }
        phrasings
    }
}

/// Extract a JSON string array from a reply that may wrap it in prose or a
/// code fence. Non-string and blank entries are dropped.
pub(crate) fn parse_phrasings(response: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (response.find('['), response.rfind(']')) else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(&response[open..=close]) {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_owned()))
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use tib_llm::mock::MockProvider;

    use super::*;

    fn expander(mock: MockProvider) -> QueryExpander<MockProvider> {
        QueryExpander::new(Arc::new(mock), Duration::from_secs(5))
    }

    #[test]
    fn parses_fenced_array_with_prose() {
        let reply = "Sure! Here you go:\n```json\n[\"refund a payment\", \"reverse charge\", 3]\n```";
        assert_eq!(
            parse_phrasings(reply),
            vec!["refund a payment", "reverse charge"]
        );
    }

    #[test]
    fn malformed_reply_yields_nothing() {
        assert!(parse_phrasings("no array here").is_empty());
        assert!(parse_phrasings("] backwards [").is_empty());
        assert!(parse_phrasings("[not json]").is_empty());
    }

    #[tokio::test]
    async fn original_first_then_unique_rewrites() {
        let mock = MockProvider::with_responses(vec![
            r#"["Cancel Order", "abort an order", "stop order processing", "order revoke"]"#
                .into(),
        ]);
        let phrasings = expander(mock).expand(" cancel order ").await;
        assert_eq!(
            phrasings,
            vec!["cancel order", "abort an order", "stop order processing"]
        );
    }

    #[tokio::test]
    async fn failure_falls_back_to_original() {
        let phrasings = expander(MockProvider::failing()).expand("find user").await;
        assert_eq!(phrasings, vec!["find user"]);
    }

    #[tokio::test]
    async fn unusable_reply_falls_back_to_original() {
        let mock = MockProvider::with_responses(vec!["I cannot help with that.".into()]);
        assert_eq!(expander(mock).expand("find user").await, vec!["find user"]);
    }
}
