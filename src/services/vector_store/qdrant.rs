//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, ScoredPoint as QdrantScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Number, Value};

use super::{VectorStore, similarity_from_distance};
use crate::error::VectorStoreError;
use crate::models::{CollectionInfo, DistanceMetric, Point, ScoredPoint};

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(url);

        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key.to_string());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self { client })
    }
}

fn to_qdrant_distance(distance: DistanceMetric) -> Distance {
    match distance {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
        DistanceMetric::Euclid => Distance::Euclid,
    }
}

/// Metrics other than cosine, dot and euclid cannot be ranked with the rest.
fn from_qdrant_distance(distance: i32) -> Result<DistanceMetric, VectorStoreError> {
    match Distance::try_from(distance) {
        Ok(Distance::Cosine) => Ok(DistanceMetric::Cosine),
        Ok(Distance::Dot) => Ok(DistanceMetric::Dot),
        Ok(Distance::Euclid) => Ok(DistanceMetric::Euclid),
        Ok(other) => Err(VectorStoreError::CollectionError(format!(
            "unsupported distance metric {:?}",
            other
        ))),
        Err(_) => Err(VectorStoreError::CollectionError(format!(
            "unknown distance metric {}",
            distance
        ))),
    }
}

/// Convert search hits, turning euclid distances into similarities.
pub(super) fn convert_hits(
    collection: &str,
    distance: DistanceMetric,
    hits: Vec<QdrantScoredPoint>,
) -> Vec<ScoredPoint> {
    hits.into_iter()
        .filter_map(|point| {
            let id = match point.id.and_then(|id| id.point_id_options) {
                Some(PointIdOptions::Num(n)) => n,
                other => {
                    tracing::warn!(collection, id = ?other, "skipping point without numeric id");
                    return None;
                }
            };
            let payload = point
                .payload
                .iter()
                .map(|(k, v)| (k.clone(), kind_to_json(v)))
                .collect();
            let score = match distance {
                DistanceMetric::Euclid => similarity_from_distance(point.score),
                DistanceMetric::Cosine | DistanceMetric::Dot => point.score,
            };
            Some(ScoredPoint { id, score, payload })
        })
        .collect()
}

fn to_payload(payload: Map<String, Value>) -> Result<Payload, VectorStoreError> {
    Payload::try_from(Value::Object(payload))
        .map_err(|e| VectorStoreError::UpsertError(format!("invalid payload: {}", e)))
}

fn kind_to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(n)) => Value::from(*n),
        Some(Kind::DoubleValue(d)) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(kind_to_json).collect()),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), kind_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    fn driver(&self) -> &'static str {
        "qdrant"
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn collection_info(
        &self,
        name: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        if !exists {
            return Ok(None);
        }

        let response = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let Some(info) = response.result else {
            return Ok(None);
        };

        let params = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        let (dimension, distance) = match params {
            Some(VectorsConfigKind::Params(p)) => (p.size, from_qdrant_distance(p.distance)?),
            _ => {
                return Err(VectorStoreError::CollectionError(format!(
                    "collection '{}' does not use a single unnamed vector",
                    name
                )));
            }
        };

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            points_count: info.points_count.unwrap_or(0),
            dimension,
            distance,
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        distance: DistanceMetric,
    ) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(name).vectors_config(
            VectorParamsBuilder::new(dimension, to_qdrant_distance(distance)),
        );

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<u64, VectorStoreError> {
        let count = points.len() as u64;
        let points = points
            .into_iter()
            .map(|point| Ok(PointStruct::new(point.id, point.vector, to_payload(point.payload)?)))
            .collect::<Result<Vec<_>, VectorStoreError>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(count)
    }

    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: u64,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let distance = self
            .collection_info(name)
            .await?
            .map(|info| info.distance)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        let search = SearchPointsBuilder::new(name, vector, limit).with_payload(with_payload);
        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

        Ok(convert_hits(name, distance, response.result))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        let response = self
            .client
            .delete_collection(name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        Ok(response.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{ListValue, Struct};
    use serde_json::json;
    use std::collections::HashMap;

    fn value(kind: Kind) -> QdrantValue {
        QdrantValue { kind: Some(kind) }
    }

    #[test]
    fn test_kind_to_json() {
        let mut fields = HashMap::new();
        fields.insert("page".to_string(), value(Kind::IntegerValue(3)));
        let nested = value(Kind::StructValue(Struct { fields }));
        let list = value(Kind::ListValue(ListValue {
            values: vec![value(Kind::StringValue("a".to_string())), value(Kind::BoolValue(true))],
        }));

        assert_eq!(kind_to_json(&nested), json!({"page": 3}));
        assert_eq!(kind_to_json(&list), json!(["a", true]));
        assert_eq!(kind_to_json(&QdrantValue { kind: None }), Value::Null);
    }

    #[test]
    fn test_distance_mapping() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::Dot, DistanceMetric::Euclid] {
            assert_eq!(
                from_qdrant_distance(to_qdrant_distance(metric) as i32).unwrap(),
                metric
            );
        }
        assert!(from_qdrant_distance(Distance::Manhattan as i32).is_err());
        assert!(from_qdrant_distance(99).is_err());
    }
}
