//! Vector store abstraction layer.
//!
//! Backends implement [`VectorStore`]; callers go through [`VectorStoreGateway`],
//! which enforces the embedding width, clamps query limits and orders results.

mod local;
mod qdrant;

pub use local::LocalBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::VectorStoreError;
use crate::models::{
    CollectionInfo, Config, DistanceMetric, Point, RetrievalConfig, ScoredPoint,
    VectorStoreConfig,
};

/// Storage operations every backend provides.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logs and status output.
    fn driver(&self) -> &'static str;

    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Returns `None` if the collection doesn't exist.
    async fn collection_info(&self, name: &str)
    -> Result<Option<CollectionInfo>, VectorStoreError>;

    async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        distance: DistanceMetric,
    ) -> Result<(), VectorStoreError>;

    /// Insert or replace points; returns the number written.
    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<u64, VectorStoreError>;

    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: u64,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;

    /// Returns whether a collection was removed.
    async fn delete_collection(&self, name: &str) -> Result<bool, VectorStoreError>;
}

/// Map a distance to a similarity in `(0, 1]`, so higher is better for every metric.
pub(crate) fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Outcome of `create_collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Created,
    AlreadyExists,
}

/// Acknowledgement of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertAck {
    pub upserted: u64,
}

/// Create the backend selected by configuration: Qdrant when a URL is set,
/// the local on-disk store otherwise.
pub fn create_backend(config: &VectorStoreConfig) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match &config.url {
        Some(url) => Ok(Box::new(QdrantBackend::new(url, config.api_key.as_deref())?)),
        None => Ok(Box::new(LocalBackend::new(&config.local_path)?)),
    }
}

/// Validating front for a backend.
pub struct VectorStoreGateway {
    store: Box<dyn VectorStore>,
    dimension: u64,
    distance: DistanceMetric,
    retrieval: RetrievalConfig,
}

impl VectorStoreGateway {
    pub fn new(
        store: Box<dyn VectorStore>,
        dimension: u64,
        distance: DistanceMetric,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            dimension,
            distance,
            retrieval,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, VectorStoreError> {
        let store = create_backend(&config.vector_store)?;
        Ok(Self::new(
            store,
            config.embedding.dimension,
            config.vector_store.distance,
            config.retrieval.clone(),
        ))
    }

    pub fn driver(&self) -> &'static str {
        self.store.driver()
    }

    pub fn dimension(&self) -> u64 {
        self.dimension
    }

    pub fn distance(&self) -> DistanceMetric {
        self.distance
    }

    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    pub async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.store.health_check().await
    }

    pub async fn collection_info(
        &self,
        name: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        self.store.collection_info(name).await
    }

    /// Create a collection whose width must equal the embedding width.
    ///
    /// An existing collection of the same width is left untouched.
    pub async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        distance: DistanceMetric,
    ) -> Result<CollectionStatus, VectorStoreError> {
        self.check_dimension(name, dimension)?;

        if let Some(info) = self.store.collection_info(name).await? {
            self.check_dimension(name, info.dimension)?;
            tracing::debug!(collection = name, "collection already exists");
            return Ok(CollectionStatus::AlreadyExists);
        }

        self.store.create_collection(name, dimension, distance).await?;
        tracing::info!(collection = name, dimension, %distance, "created collection");
        Ok(CollectionStatus::Created)
    }

    /// Create a collection with the configured width and distance.
    pub async fn ensure_collection(&self, name: &str) -> Result<CollectionStatus, VectorStoreError> {
        self.create_collection(name, self.dimension, self.distance)
            .await
    }

    pub async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<UpsertAck, VectorStoreError> {
        if points.is_empty() {
            return Ok(UpsertAck { upserted: 0 });
        }
        for point in &points {
            self.check_dimension(name, point.vector.len() as u64)?;
        }

        let upserted = self.store.upsert(name, points).await?;
        tracing::debug!(collection = name, upserted, "upserted points");
        Ok(UpsertAck { upserted })
    }

    /// Nearest neighbours of `vector`, best first.
    ///
    /// `limit` is clamped into the configured retrieval bounds.
    pub async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: Option<u64>,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        self.check_dimension(name, vector.len() as u64)?;
        let limit = self.retrieval.clamp_limit(limit);

        let mut results = self.store.query(name, vector, limit, with_payload).await?;
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit as usize);
        Ok(results)
    }

    pub async fn delete_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        self.store.delete_collection(name).await
    }

    fn check_dimension(&self, collection: &str, actual: u64) -> Result<(), VectorStoreError> {
        if actual != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                collection: collection.to_string(),
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Returns canned hits in whatever order they were given.
    #[derive(Default)]
    struct CannedStore {
        hits: Vec<ScoredPoint>,
        existing: Option<CollectionInfo>,
        last_limit: Arc<Mutex<Option<u64>>>,
    }

    #[async_trait]
    impl VectorStore for CannedStore {
        fn driver(&self) -> &'static str {
            "canned"
        }

        async fn health_check(&self) -> Result<bool, VectorStoreError> {
            Ok(true)
        }

        async fn collection_info(
            &self,
            _name: &str,
        ) -> Result<Option<CollectionInfo>, VectorStoreError> {
            Ok(self.existing.clone())
        }

        async fn create_collection(
            &self,
            _name: &str,
            _dimension: u64,
            _distance: DistanceMetric,
        ) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn upsert(&self, _name: &str, points: Vec<Point>) -> Result<u64, VectorStoreError> {
            Ok(points.len() as u64)
        }

        async fn query(
            &self,
            _name: &str,
            _vector: Vec<f32>,
            limit: u64,
            _with_payload: bool,
        ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
            *self.last_limit.lock().unwrap() = Some(limit);
            Ok(self.hits.clone())
        }

        async fn delete_collection(&self, _name: &str) -> Result<bool, VectorStoreError> {
            Ok(true)
        }
    }

    fn hit(id: u64, score: f32) -> ScoredPoint {
        ScoredPoint {
            id,
            score,
            payload: Default::default(),
        }
    }

    fn gateway(store: CannedStore) -> VectorStoreGateway {
        VectorStoreGateway::new(
            Box::new(store),
            2,
            DistanceMetric::Cosine,
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_query_sorts_descending() {
        let gw = gateway(CannedStore {
            hits: vec![hit(1, 0.2), hit(2, 0.9), hit(3, 0.5)],
            ..Default::default()
        });
        let results = gw.query("c", vec![1.0, 0.0], None, true).await.unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_qdrant_euclid_hits_rank_nearest_first() {
        use qdrant_client::qdrant::{PointId, ScoredPoint as QdrantScoredPoint};

        let raw = |id: u64, distance: f32| QdrantScoredPoint {
            id: Some(PointId::from(id)),
            score: distance,
            ..Default::default()
        };
        let hits = qdrant::convert_hits(
            "c",
            DistanceMetric::Euclid,
            vec![raw(1, 2.5), raw(2, 0.1), raw(3, 1.0)],
        );
        let gw = VectorStoreGateway::new(
            Box::new(CannedStore {
                hits,
                ..Default::default()
            }),
            2,
            DistanceMetric::Euclid,
            RetrievalConfig::default(),
        );

        let results = gw.query("c", vec![1.0, 0.0], None, true).await.unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!((results[0].score - 1.0 / 1.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_limit_clamped() {
        let last_limit = Arc::new(Mutex::new(None));
        let gw = gateway(CannedStore {
            last_limit: last_limit.clone(),
            ..Default::default()
        });

        gw.query("c", vec![0.0, 1.0], Some(1), true).await.unwrap();
        assert_eq!(*last_limit.lock().unwrap(), Some(3));

        gw.query("c", vec![0.0, 1.0], Some(1000), true).await.unwrap();
        assert_eq!(*last_limit.lock().unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_create_with_wrong_dimension_fails() {
        let gw = gateway(CannedStore::default());
        let err = gw
            .create_collection("c", 3, DistanceMetric::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_existing_collection_with_other_width_fails() {
        let gw = gateway(CannedStore {
            existing: Some(CollectionInfo {
                name: "c".to_string(),
                points_count: 4,
                dimension: 8,
                distance: DistanceMetric::Cosine,
            }),
            ..Default::default()
        });
        let err = gw.ensure_collection("c").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { actual: 8, .. }));
    }

    #[tokio::test]
    async fn test_existing_collection_same_width() {
        let gw = gateway(CannedStore {
            existing: Some(CollectionInfo {
                name: "c".to_string(),
                points_count: 0,
                dimension: 2,
                distance: DistanceMetric::Cosine,
            }),
            ..Default::default()
        });
        assert_eq!(
            gw.ensure_collection("c").await.unwrap(),
            CollectionStatus::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_width() {
        let gw = gateway(CannedStore::default());
        let err = gw
            .upsert("c", vec![Point::new(0, vec![1.0, 2.0, 3.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));

        let ack = gw
            .upsert("c", vec![Point::new(0, vec![1.0, 2.0])])
            .await
            .unwrap();
        assert_eq!(ack.upserted, 1);
    }
}
