//! Hybrid retrieval: dense and sparse prefetch per phrasing, fused with RRF,
//! with header chunks reattached as class context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tib_llm::{Embedder, TextGenerator};
use tib_store::{HybridQuery, Prefetch, PrefetchQuery, VectorFilter, VectorStore};

use crate::chunker::ChunkType;
use crate::expand::QueryExpander;
use crate::point::ChunkPayload;
use crate::redact::redact_secrets;
use crate::sparse::text_to_sparse;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub collection: String,
    /// Candidates taken from each dense or sparse list before fusion.
    pub prefetch_limit: u64,
    /// Hits returned after fusion.
    pub result_limit: u64,
    /// Budget for the embedding call and for each store call.
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            collection: "code_chunks".into(),
            prefetch_limit: 20,
            result_limit: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub repo: Option<String>,
    pub language: Option<String>,
    pub layer: Option<String>,
    /// Rewrite the query into several phrasings first.
    pub expand: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    #[serde(flatten)]
    pub payload: ChunkPayload,
    /// Text of the file's header chunk, for hits below the header.
    pub class_context: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// Recovery guidance when the search could not run.
    pub message: Option<String>,
}

impl SearchOutcome {
    fn failed(message: String) -> Self {
        Self {
            hits: Vec::new(),
            message: Some(message),
        }
    }
}

pub struct HybridRetriever<E, G> {
    store: Arc<dyn VectorStore>,
    embedder: Arc<E>,
    expander: Option<QueryExpander<G>>,
    config: SearchConfig,
}

impl<E: Embedder, G: TextGenerator> HybridRetriever<E, G> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<E>, config: SearchConfig) -> Self {
        Self {
            store,
            embedder,
            expander: None,
            config,
        }
    }

    #[must_use]
    pub fn with_expander(mut self, expander: QueryExpander<G>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Run a hybrid search. Never fails: provider errors produce an empty hit
    /// list and a message explaining what to check.
    pub async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        let query = request.query.trim();
        if query.is_empty() {
            return SearchOutcome::failed(
                "Query is empty; describe the code you are looking for.".into(),
            );
        }

        let phrasings = match (&self.expander, request.expand) {
            (Some(expander), true) => expander.expand(query).await,
            _ => vec![query.to_owned()],
        };
        let composites: Vec<String> = phrasings
            .iter()
            .map(|p| {
                redact_secrets(&composite_text(
                    request.language.as_deref(),
                    request.layer.as_deref(),
                    p,
                ))
                .into_owned()
            })
            .collect();

        let dense = match tokio::time::timeout(
            self.config.timeout,
            self.embedder.embed_batch(&composites),
        )
        .await
        {
            Ok(Ok(vectors)) if vectors.len() == composites.len() => vectors,
            Ok(Ok(vectors)) => {
                tracing::warn!(
                    sent = composites.len(),
                    received = vectors.len(),
                    "embedding count mismatch"
                );
                return SearchOutcome::failed(embedding_guidance("unexpected response"));
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "query embedding failed");
                return SearchOutcome::failed(embedding_guidance(&e.to_string()));
            }
            Err(_) => {
                tracing::warn!("query embedding timed out");
                return SearchOutcome::failed(embedding_guidance("timed out"));
            }
        };

        let filter = build_filter(request);
        let mut prefetch = Vec::with_capacity(composites.len() * 2);
        for (text, vector) in composites.iter().zip(dense) {
            prefetch.push(Prefetch {
                query: PrefetchQuery::Dense(vector),
                limit: self.config.prefetch_limit,
                filter: filter.clone(),
            });
            let sparse = text_to_sparse(text);
            if !sparse.is_empty() {
                prefetch.push(Prefetch {
                    query: PrefetchQuery::Sparse(sparse),
                    limit: self.config.prefetch_limit,
                    filter: filter.clone(),
                });
            }
        }
        let hybrid = HybridQuery {
            prefetch,
            limit: self.config.result_limit,
        };

        let scored = match tokio::time::timeout(
            self.config.timeout,
            self.store.hybrid_query(&self.config.collection, hybrid),
        )
        .await
        {
            Ok(Ok(points)) => points,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "hybrid query failed");
                return SearchOutcome::failed(store_guidance(&e.to_string()));
            }
            Err(_) => {
                tracing::warn!("hybrid query timed out");
                return SearchOutcome::failed(store_guidance("timed out"));
            }
        };

        let mut hits: Vec<SearchHit> = scored
            .into_iter()
            .filter_map(|p| match ChunkPayload::from_map(&p.payload) {
                Ok(payload) => Some(SearchHit {
                    id: p.id,
                    score: p.score,
                    payload,
                    class_context: None,
                }),
                Err(e) => {
                    tracing::debug!(id = %p.id, error = %e, "skipping point with unreadable payload");
                    None
                }
            })
            .collect();

        self.attach_class_context(&mut hits).await;
        SearchOutcome {
            hits,
            message: None,
        }
    }

    /// Fetch header chunks referenced by non-header hits, once per header.
    /// A failed fetch leaves the hits without context.
    async fn attach_class_context(&self, hits: &mut [SearchHit]) {
        let mut header_ids: Vec<String> = Vec::new();
        for hit in hits.iter().filter(|h| !is_header(h)) {
            if let Some(id) = &hit.payload.header_chunk_id
                && !header_ids.contains(id)
            {
                header_ids.push(id.clone());
            }
        }
        if header_ids.is_empty() {
            return;
        }

        let records = match tokio::time::timeout(
            self.config.timeout,
            self.store.retrieve(&self.config.collection, header_ids),
        )
        .await
        {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "header chunk fetch failed");
                return;
            }
            Err(_) => {
                tracing::warn!("header chunk fetch timed out");
                return;
            }
        };

        let headers: HashMap<String, String> = records
            .into_iter()
            .filter_map(|r| {
                let content = r.payload.get("content")?.as_str()?.to_owned();
                Some((r.id, content))
            })
            .collect();
        for hit in hits.iter_mut().filter(|h| !is_header(h)) {
            hit.class_context = hit
                .payload
                .header_chunk_id
                .as_ref()
                .and_then(|id| headers.get(id).cloned());
        }
    }
}

/// `"<language> <layer> <phrasing>"` with absent facets left out.
fn composite_text(language: Option<&str>, layer: Option<&str>, phrasing: &str) -> String {
    [language, layer, Some(phrasing)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_filter(request: &SearchRequest) -> Option<VectorFilter> {
    let mut filter = VectorFilter::default();
    for (field, value) in [
        ("repo", &request.repo),
        ("language", &request.language),
        ("layer", &request.layer),
    ] {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            filter = filter.and_text(field, v);
        }
    }
    (!filter.is_empty()).then_some(filter)
}

fn embedding_guidance(detail: &str) -> String {
    format!(
        "Search is unavailable because the embedding provider failed ({detail}). \
         Check that the embedding service is running and reachable, then retry."
    )
}

fn store_guidance(detail: &str) -> String {
    format!(
        "Search is unavailable because the vector store query failed ({detail}). \
         Check that Qdrant is reachable and the repository has been indexed, then retry."
    )
}

fn is_header(hit: &SearchHit) -> bool {
    hit.payload.chunk_type == ChunkType::Header
}

#[cfg(test)]
mod tests {
    use tib_llm::mock::MockProvider;
    use tib_store::{InMemoryVectorStore, VectorPoint};

    use super::*;
    use crate::languages::Lang;

    const COLLECTION: &str = "code_chunks";

    fn payload(repo: &str, chunk_type: ChunkType, content: &str, header: Option<&str>) -> ChunkPayload {
        ChunkPayload {
            repo: repo.into(),
            file_path: "src/controller/PaymentController.java".into(),
            language: Lang::Java,
            layer: "controller".into(),
            start_line: 1,
            end_line: 10,
            symbol_name: None,
            parent_symbol: None,
            chunk_type,
            annotations: Vec::new(),
            chunk_index: 0,
            total_chunks: 2,
            header_chunk_id: header.map(str::to_owned),
            content: content.into(),
            context: String::new(),
        }
    }

    async fn seed(store: &InMemoryVectorStore, mock: &MockProvider, id: &str, p: &ChunkPayload) {
        let text = format!("java controller {}", p.content);
        store
            .upsert(
                COLLECTION,
                vec![VectorPoint {
                    id: id.into(),
                    dense: mock.vector_for(&text),
                    sparse: Some(text_to_sparse(&p.content)),
                    payload: p.to_map().unwrap(),
                }],
                true,
            )
            .await
            .unwrap();
    }

    async fn fixture() -> (Arc<InMemoryVectorStore>, MockProvider) {
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection(COLLECTION, 32, true).await.unwrap();
        let mock = MockProvider::default();
        seed(
            &store,
            &mock,
            "h1",
            &payload("shop", ChunkType::Header, "package shop; import java.util.List; class PaymentController {", None),
        )
        .await;
        seed(
            &store,
            &mock,
            "m1",
            &payload("shop", ChunkType::Method, "void refundPayment(Payment payment) { ledger.refund(payment); }", Some("h1")),
        )
        .await;
        seed(
            &store,
            &mock,
            "x1",
            &payload("other", ChunkType::Method, "void refundPayment(Payment payment) { legacy.refund(payment); }", None),
        )
        .await;
        (store, mock)
    }

    fn retriever(
        store: Arc<InMemoryVectorStore>,
        mock: MockProvider,
    ) -> HybridRetriever<MockProvider, MockProvider> {
        HybridRetriever::new(store, Arc::new(mock), SearchConfig::default())
    }

    #[test]
    fn composite_text_skips_missing_facets() {
        assert_eq!(composite_text(Some("java"), Some("service"), "refund"), "java service refund");
        assert_eq!(composite_text(None, Some(" "), "refund"), "refund");
    }

    #[test]
    fn filter_only_when_facets_given() {
        assert!(build_filter(&SearchRequest::default()).is_none());
        let f = build_filter(&SearchRequest {
            repo: Some("shop".into()),
            layer: Some("service".into()),
            ..SearchRequest::default()
        })
        .unwrap();
        assert_eq!(f.must.len(), 2);
    }

    #[tokio::test]
    async fn method_hit_gets_class_context() {
        let (store, mock) = fixture().await;
        let outcome = retriever(store, mock)
            .search(&SearchRequest {
                query: "refund payment".into(),
                repo: Some("shop".into()),
                ..SearchRequest::default()
            })
            .await;

        assert!(outcome.message.is_none());
        let method = outcome.hits.iter().find(|h| h.id == "m1").unwrap();
        assert_eq!(
            method.class_context.as_deref(),
            Some("package shop; import java.util.List; class PaymentController {")
        );
        assert!(outcome.hits.iter().all(|h| h.payload.repo == "shop"));
        let header = outcome.hits.iter().find(|h| h.id == "h1").unwrap();
        assert!(header.class_context.is_none());
    }

    #[tokio::test]
    async fn one_dense_and_one_sparse_prefetch_per_phrasing() {
        let (store, mock) = fixture().await;
        let expander = QueryExpander::new(
            Arc::new(MockProvider::with_responses(vec![
                r#"["reverse a charge", "issue refund"]"#.into(),
            ])),
            Duration::from_secs(5),
        );
        let r = retriever(store, mock.clone()).with_expander(expander);
        let outcome = r
            .search(&SearchRequest {
                query: "refund payment".into(),
                language: Some("java".into()),
                expand: true,
                ..SearchRequest::default()
            })
            .await;
        assert!(outcome.message.is_none());
        assert_eq!(
            mock.embedded_texts(),
            vec![
                "java refund payment",
                "java reverse a charge",
                "java issue refund"
            ]
        );
        assert_eq!(mock.embed_calls(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_returns_guidance() {
        let (store, _) = fixture().await;
        let outcome = retriever(store, MockProvider::failing())
            .search(&SearchRequest {
                query: "refund".into(),
                ..SearchRequest::default()
            })
            .await;
        assert!(outcome.hits.is_empty());
        assert!(outcome.message.unwrap().contains("embedding provider"));
    }

    #[tokio::test]
    async fn store_failure_returns_guidance() {
        let (store, mock) = fixture().await;
        store.fail_next_queries(1);
        let outcome = retriever(store, mock)
            .search(&SearchRequest {
                query: "refund".into(),
                ..SearchRequest::default()
            })
            .await;
        assert!(outcome.hits.is_empty());
        assert!(outcome.message.unwrap().contains("vector store"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected_with_message() {
        let (store, mock) = fixture().await;
        let outcome = retriever(store, mock.clone())
            .search(&SearchRequest {
                query: "   ".into(),
                ..SearchRequest::default()
            })
            .await;
        assert!(outcome.hits.is_empty());
        assert!(outcome.message.is_some());
        assert_eq!(mock.embed_calls(), 0);
    }
}
