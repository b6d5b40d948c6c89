//! Qdrant adapter for the hybrid vector store port.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, Fusion, GetPointsBuilder, Modifier, NamedVectors, PointId,
    PointStruct, PrefetchQueryBuilder, Query, QueryPointsBuilder, ScoredPoint,
    SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Vector,
    VectorInput, VectorParamsBuilder, VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
};

use crate::vector_store::{
    BoxFuture, DENSE_VECTOR, FieldCondition, HybridQuery, PrefetchQuery,
    SPARSE_VECTOR, ScoredVectorPoint, VectorFilter, VectorPoint, VectorRecord, VectorStore,
    VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

/// Thin wrapper over [`Qdrant`] encapsulating the collection operations the index needs.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str, api_key: Option<String>) -> QdrantResult<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .map_err(Box::new)?;
        Ok(Self { client })
    }

    /// Ensure a collection exists with a named `dense` cosine space and, optionally,
    /// an IDF-weighted `sparse` space.
    ///
    /// Idempotent: no-op if the collection already exists, including when a
    /// concurrent creator wins the race.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached or collection creation fails.
    pub async fn ensure_collection(
        &self,
        collection: &str,
        dense_size: u64,
        sparse: bool,
    ) -> QdrantResult<()> {
        if self
            .client
            .collection_exists(collection)
            .await
            .map_err(Box::new)?
        {
            return Ok(());
        }

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(dense_size, Distance::Cosine),
        );
        let mut builder = CreateCollectionBuilder::new(collection).vectors_config(vectors);
        if sparse {
            let mut sparse_config = SparseVectorsConfigBuilder::default();
            sparse_config.add_named_vector_params(
                SPARSE_VECTOR,
                SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
            );
            builder = builder.sparse_vectors_config(sparse_config);
        }

        match self.client.create_collection(builder).await {
            Ok(_) => {
                tracing::info!(collection, dense_size, sparse, "created Qdrant collection");
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// Check whether a collection exists.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached.
    pub async fn collection_exists(&self, collection: &str) -> QdrantResult<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(Box::new)
    }

    /// Create a keyword payload index; an existing index is treated as success.
    ///
    /// # Errors
    ///
    /// Returns an error if index creation fails for another reason.
    pub async fn ensure_keyword_index(&self, collection: &str, field: &str) -> QdrantResult<()> {
        match self
            .client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(collection, field, FieldType::Keyword)
                    .wait(true),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// Upsert points into a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(
        &self,
        collection: &str,
        points: Vec<PointStruct>,
        wait: bool,
    ) -> QdrantResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(wait))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Delete every point matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub async fn delete_by_filter(
        &self,
        collection: &str,
        filter: Filter,
        wait: bool,
    ) -> QdrantResult<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(filter)
                    .wait(wait),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Fetch points with payloads by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn retrieve(
        &self,
        collection: &str,
        ids: Vec<PointId>,
    ) -> QdrantResult<Vec<VectorRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .get_points(GetPointsBuilder::new(collection, ids).with_payload(true))
            .await
            .map_err(Box::new)?;
        Ok(response
            .result
            .into_iter()
            .map(|p| VectorRecord {
                id: point_id_to_string(p.id),
                payload: payload_to_json(p.payload),
            })
            .collect())
    }

    /// Run every prefetch and fuse the candidate lists with RRF.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn hybrid_query(
        &self,
        collection: &str,
        query: HybridQuery,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder = QueryPointsBuilder::new(collection);
        for prefetch in query.prefetch {
            let (input, using) = match prefetch.query {
                PrefetchQuery::Dense(v) => (VectorInput::new_dense(v), DENSE_VECTOR),
                PrefetchQuery::Sparse(s) => {
                    (VectorInput::new_sparse(s.indices, s.values), SPARSE_VECTOR)
                }
            };
            let mut p = PrefetchQueryBuilder::default()
                .query(Query::new_nearest(input))
                .using(using)
                .limit(prefetch.limit);
            if let Some(f) = prefetch.filter.filter(|f| !f.is_empty()) {
                p = p.filter(vector_filter_to_qdrant(f));
            }
            builder = builder.add_prefetch(p);
        }
        let builder = builder
            .query(Query::new_fusion(Fusion::Rrf))
            .limit(query.limit)
            .with_payload(true);
        let response = self.client.query(builder).await.map_err(Box::new)?;
        Ok(response.result)
    }
}

impl VectorStore for QdrantOps {
    fn ensure_collection(
        &self,
        collection: &str,
        dense_size: u64,
        sparse: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.ensure_collection(&collection, dense_size, sparse)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
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
            self.ensure_keyword_index(&collection, &field)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
        wait: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_points = points
                .into_iter()
                .map(vector_point_to_qdrant)
                .collect::<Result<Vec<_>, _>>()?;
            self.upsert(&collection, qdrant_points, wait)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
        wait: bool,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if filter.is_empty() {
                return Err(VectorStoreError::Delete(
                    "refusing to delete with an empty filter".into(),
                ));
            }
            self.delete_by_filter(&collection, vector_filter_to_qdrant(filter), wait)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn retrieve(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<VectorRecord>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let point_ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            self.retrieve(&collection, point_ids)
                .await
                .map_err(|e| VectorStoreError::Retrieve(e.to_string()))
        })
    }

    fn hybrid_query(
        &self,
        collection: &str,
        query: HybridQuery,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let results = self
                .hybrid_query(&collection, query)
                .await
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
        })
    }
}

fn vector_point_to_qdrant(point: VectorPoint) -> Result<PointStruct, VectorStoreError> {
    let payload: HashMap<String, qdrant_client::qdrant::Value> = serde_json::from_value(
        serde_json::Value::Object(point.payload.into_iter().collect()),
    )
    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;

    let mut vectors = NamedVectors::default().add_vector(DENSE_VECTOR, Vector::new_dense(point.dense));
    if let Some(sparse) = point.sparse {
        vectors = vectors.add_vector(
            SPARSE_VECTOR,
            Vector::new_sparse(sparse.indices, sparse.values),
        );
    }
    Ok(PointStruct::new(point.id, vectors, payload))
}

fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    Filter::must(
        filter
            .must
            .into_iter()
            .map(|FieldCondition { field, value }| Condition::matches(field, value)),
    )
}

fn point_id_to_string(id: Option<PointId>) -> String {
    match id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> Option<serde_json::Value> {
    let json = match value.kind? {
        Kind::NullValue(_) => serde_json::Value::Null,
        Kind::StringValue(s) => serde_json::Value::String(s),
        Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
        Kind::DoubleValue(d) => serde_json::Number::from_f64(d).map(serde_json::Value::Number)?,
        Kind::BoolValue(b) => serde_json::Value::Bool(b),
        Kind::ListValue(list) => serde_json::Value::Array(
            list.values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect(),
        ),
        Kind::StructValue(s) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .filter_map(|(k, v)| Some((k, qdrant_value_to_json(v)?)))
                .collect(),
        ),
    };
    Some(json)
}

fn payload_to_json(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> HashMap<String, serde_json::Value> {
    payload
        .into_iter()
        .filter_map(|(k, v)| Some((k, qdrant_value_to_json(v)?)))
        .collect()
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    ScoredVectorPoint {
        id: point_id_to_string(point.id),
        score: point.score,
        payload: payload_to_json(point.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::SparseVector;

    #[test]
    fn new_valid_url() {
        let ops = QdrantOps::new("http://localhost:6334", None);
        assert!(ops.is_ok());
    }

    #[test]
    fn debug_format() {
        let ops = QdrantOps::new("http://localhost:6334", Some("secret".into())).unwrap();
        let dbg = format!("{ops:?}");
        assert!(dbg.contains("QdrantOps"));
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn filter_conversion_keeps_must_conditions() {
        let f = vector_filter_to_qdrant(VectorFilter::text("repo", "a").and_text("layer", "service"));
        assert_eq!(f.must.len(), 2);
        assert!(f.must_not.is_empty());
    }

    #[test]
    fn point_conversion_round_trips_list_payload() {
        let point = VectorPoint {
            id: "6ba7b810-9dad-11d1-80b4-00c04fd430c8".into(),
            dense: vec![0.1, 0.2],
            sparse: Some(SparseVector {
                indices: vec![3, 9],
                values: vec![1.0, 2.0],
            }),
            payload: HashMap::from([
                ("repo".into(), serde_json::json!("a")),
                ("annotations".into(), serde_json::json!(["@Get", "@Auth"])),
                ("startLine".into(), serde_json::json!(12)),
            ]),
        };
        let qp = vector_point_to_qdrant(point).unwrap();
        let back = payload_to_json(qp.payload);
        assert_eq!(back["repo"], serde_json::json!("a"));
        assert_eq!(back["annotations"], serde_json::json!(["@Get", "@Auth"]));
        assert_eq!(back["startLine"], serde_json::json!(12));
    }

    #[test]
    fn missing_point_id_is_empty_string() {
        assert!(point_id_to_string(None).is_empty());
        assert_eq!(point_id_to_string(Some(PointId::from(7u64))), "7");
    }
}
