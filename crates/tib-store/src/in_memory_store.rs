use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use crate::vector_store::{
    BoxFuture, HybridQuery, PrefetchQuery, ScoredVectorPoint, SparseVector,
    VectorFilter, VectorPoint, VectorRecord, VectorStore, VectorStoreError,
};

/// RRF smoothing constant.
const RRF_K: f32 = 60.0;

struct StoredPoint {
    dense: Vec<f32>,
    sparse: Option<SparseVector>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    sparse: bool,
    points: HashMap<String, StoredPoint>,
    keyword_indexes: Vec<String>,
}

/// Store operation as observed by [`InMemoryVectorStore`], recorded in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    EnsureCollection,
    KeywordIndex(String),
    /// Ids of the upserted points.
    Upsert(Vec<String>),
    /// `field=value` pairs of the filter's `must` clause.
    DeleteByFilter(Vec<String>),
}

pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
    ops: Mutex<Vec<StoreOp>>,
    upsert_failures_left: AtomicUsize,
    query_failures_left: AtomicUsize,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            upsert_failures_left: AtomicUsize::new(0),
            query_failures_left: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` upserts fail.
    pub fn fail_next_upserts(&self, count: usize) {
        self.upsert_failures_left.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` hybrid queries fail.
    pub fn fail_next_queries(&self, count: usize) {
        self.query_failures_left.store(count, Ordering::SeqCst);
    }

    /// Every operation received so far.
    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn clear_ops(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    /// Snapshot of the points in `collection`, sorted by id.
    #[must_use]
    pub fn points(&self, collection: &str) -> Vec<VectorPoint> {
        let Ok(cols) = self.collections.read() else {
            return Vec::new();
        };
        let Some(col) = cols.get(collection) else {
            return Vec::new();
        };
        let mut points: Vec<VectorPoint> = col
            .points
            .iter()
            .map(|(id, sp)| VectorPoint {
                id: id.clone(),
                dense: sp.dense.clone(),
                sparse: sp.sparse.clone(),
                payload: sp.payload.clone(),
            })
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        points
    }

    /// Keyword indexes created on `collection`.
    #[must_use]
    pub fn keyword_indexes(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .ok()
            .and_then(|cols| cols.get(collection).map(|c| c.keyword_indexes.clone()))
            .unwrap_or_default()
    }

    fn record(&self, op: StoreOp) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &VectorFilter) -> bool {
    for cond in &filter.must {
        let Some(val) = payload.get(&cond.field) else {
            return false;
        };
        if val.as_str() != Some(cond.value.as_str()) {
            return false;
        }
    }
    true
}

fn describe_filter(filter: &VectorFilter) -> Vec<String> {
    filter
        .must
        .iter()
        .map(|c| format!("{}={}", c.field, c.value))
        .collect()
}

/// Reciprocal rank fusion: each list contributes `1 / (k + rank)` per id, rank 1-based.
fn rrf_fuse(lists: Vec<Vec<String>>) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for list in lists {
        for (rank, id) in list.into_iter().enumerate() {
            #[expect(clippy::cast_precision_loss)]
            let contribution = 1.0 / (RRF_K + (rank + 1) as f32);
            *scores.entry(id).or_default() += contribution;
        }
    }
    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _dense_size: u64,
        sparse: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.record(StoreOp::EnsureCollection);
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection)
                .or_insert_with(|| InMemoryCollection {
                    sparse,
                    points: HashMap::new(),
                    keyword_indexes: Vec::new(),
                });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn ensure_keyword_index(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            self.record(StoreOp::KeywordIndex(field.clone()));
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Collection(format!("collection {collection} not found"))
            })?;
            if !col.keyword_indexes.contains(&field) {
                col.keyword_indexes.push(field);
            }
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
        _wait: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if take_failure(&self.upsert_failures_left) {
                return Err(VectorStoreError::Upsert("injected upsert failure".into()));
            }
            self.record(StoreOp::Upsert(points.iter().map(|p| p.id.clone()).collect()));
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            for p in points {
                if p.sparse.is_some() && !col.sparse {
                    return Err(VectorStoreError::Upsert(format!(
                        "collection {collection} has no sparse vector space"
                    )));
                }
                col.points.insert(
                    p.id,
                    StoredPoint {
                        dense: p.dense,
                        sparse: p.sparse,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
        _wait: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if filter.is_empty() {
                return Err(VectorStoreError::Delete(
                    "refusing to delete with an empty filter".into(),
                ));
            }
            self.record(StoreOp::DeleteByFilter(describe_filter(&filter)));
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
            if let Some(col) = cols.get_mut(&collection) {
                col.points
                    .retain(|_, sp| !matches_filter(&sp.payload, &filter));
            }
            Ok(())
        })
    }

    fn retrieve(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<VectorRecord>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Retrieve(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Retrieve(format!("collection {collection} not found"))
            })?;
            Ok(ids
                .into_iter()
                .filter_map(|id| {
                    col.points.get(&id).map(|sp| VectorRecord {
                        payload: sp.payload.clone(),
                        id,
                    })
                })
                .collect())
        })
    }

    fn hybrid_query(
        &self,
        collection: &str,
        query: HybridQuery,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if take_failure(&self.query_failures_left) {
                return Err(VectorStoreError::Query("injected query failure".into()));
            }
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Query(format!("collection {collection} not found"))
            })?;

            let empty_filter = VectorFilter::default();
            let mut lists = Vec::with_capacity(query.prefetch.len());
            for prefetch in &query.prefetch {
                let f = prefetch.filter.as_ref().unwrap_or(&empty_filter);
                let mut scored: Vec<(&String, f32)> = col
                    .points
                    .iter()
                    .filter(|(_, sp)| matches_filter(&sp.payload, f))
                    .filter_map(|(id, sp)| {
                        let score = match &prefetch.query {
                            PrefetchQuery::Dense(v) => cosine_similarity(v, &sp.dense),
                            PrefetchQuery::Sparse(s) => {
                                let score = sp.sparse.as_ref()?.dot(s);
                                if score <= 0.0 {
                                    return None;
                                }
                                score
                            }
                        };
                        Some((id, score))
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(b.0))
                });
                #[expect(clippy::cast_possible_truncation)]
                scored.truncate(prefetch.limit as usize);
                lists.push(scored.into_iter().map(|(id, _)| id.clone()).collect());
            }

            let mut fused = rrf_fuse(lists);
            #[expect(clippy::cast_possible_truncation)]
            fused.truncate(query.limit as usize);
            Ok(fused
                .into_iter()
                .filter_map(|(id, score)| {
                    col.points.get(&id).map(|sp| ScoredVectorPoint {
                        payload: sp.payload.clone(),
                        id,
                        score,
                    })
                })
                .collect())
        })
    }
}
