//! Embedded vector store kept as one JSON file per collection.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{VectorStore, similarity_from_distance};
use crate::error::VectorStoreError;
use crate::models::{CollectionInfo, DistanceMetric, Point, ScoredPoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCollection {
    name: String,
    dimension: u64,
    distance: DistanceMetric,
    #[serde(default)]
    points: BTreeMap<u64, Point>,
}

impl StoredCollection {
    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.name.clone(),
            points_count: self.points.len() as u64,
            dimension: self.dimension,
            distance: self.distance,
        }
    }
}

/// Local on-disk backend used when no Qdrant URL is configured.
///
/// All collections are loaded at startup and every mutation rewrites the
/// collection file.
pub struct LocalBackend {
    root: PathBuf,
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl LocalBackend {
    pub fn new(root: &Path) -> Result<Self, VectorStoreError> {
        std::fs::create_dir_all(root)?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let collection: StoredCollection = serde_json::from_str(&content)?;
            collections.insert(collection.name.clone(), collection);
        }

        tracing::debug!(path = %root.display(), collections = collections.len(), "opened local vector store");

        Ok(Self {
            root: root.to_path_buf(),
            collections: RwLock::new(collections),
        })
    }

    fn collection_path(&self, name: &str) -> Result<PathBuf, VectorStoreError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(VectorStoreError::CollectionError(format!(
                "invalid collection name '{}'",
                name
            )));
        }
        Ok(self.root.join(format!("{}.json", name)))
    }

    async fn persist(&self, collection: &StoredCollection) -> Result<(), VectorStoreError> {
        let path = self.collection_path(&collection.name)?;
        let content = serde_json::to_vec(collection)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn score(distance: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        DistanceMetric::Euclid => {
            let d: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt();
            similarity_from_distance(d)
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for LocalBackend {
    fn driver(&self) -> &'static str {
        "local"
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(self.root.is_dir())
    }

    async fn collection_info(
        &self,
        name: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(StoredCollection::info))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        distance: DistanceMetric,
    ) -> Result<(), VectorStoreError> {
        self.collection_path(name)?;

        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(());
        }

        let collection = StoredCollection {
            name: name.to_string(),
            dimension,
            distance,
            points: BTreeMap::new(),
        };
        self.persist(&collection).await?;
        collections.insert(name.to_string(), collection);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<u64, VectorStoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        let count = points.len() as u64;
        for point in points {
            collection.points.insert(point.id, point);
        }
        self.persist(collection).await?;
        Ok(count)
    }

    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: u64,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        let mut scored: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|point| ScoredPoint {
                id: point.id,
                score: score(collection.distance, &point.vector, &vector),
                payload: if with_payload {
                    point.payload.clone()
                } else {
                    Default::default()
                },
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        let path = self.collection_path(name)?;
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_none() {
            return Ok(false);
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn point(id: u64, vector: Vec<f32>) -> Point {
        Point::new(id, vector).with_payload("text", format!("chunk {}", id))
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let dir = TempDir::new().unwrap();
        let store = LocalBackend::new(dir.path()).unwrap();
        store
            .create_collection("docs", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .upsert(
                "docs",
                vec![point(0, vec![0.0, 1.0]), point(1, vec![1.0, 0.0]), point(2, vec![1.0, 1.0])],
            )
            .await
            .unwrap();

        let hits = store.query("docs", vec![1.0, 0.1], 2, true).await.unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hits[0].text(), Some("chunk 1"));
    }

    #[tokio::test]
    async fn test_collections_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalBackend::new(dir.path()).unwrap();
            store
                .create_collection("docs", 2, DistanceMetric::Dot)
                .await
                .unwrap();
            store.upsert("docs", vec![point(7, vec![0.5, 0.5])]).await.unwrap();
        }

        let store = LocalBackend::new(dir.path()).unwrap();
        let info = store.collection_info("docs").await.unwrap().unwrap();
        assert_eq!(info.points_count, 1);
        assert_eq!(info.dimension, 2);
        assert_eq!(info.distance, DistanceMetric::Dot);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let dir = TempDir::new().unwrap();
        let store = LocalBackend::new(dir.path()).unwrap();
        store
            .create_collection("docs", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        store.upsert("docs", vec![point(0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert("docs", vec![point(0, vec![0.0, 1.0])]).await.unwrap();

        let info = store.collection_info("docs").await.unwrap().unwrap();
        assert_eq!(info.points_count, 1);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let dir = TempDir::new().unwrap();
        let store = LocalBackend::new(dir.path()).unwrap();

        assert!(store.collection_info("nope").await.unwrap().is_none());
        assert!(!store.delete_collection("nope").await.unwrap());
        assert!(matches!(
            store.query("nope", vec![1.0], 3, true).await,
            Err(VectorStoreError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalBackend::new(dir.path()).unwrap();
        store
            .create_collection("docs", 2, DistanceMetric::Cosine)
            .await
            .unwrap();
        assert!(dir.path().join("docs.json").exists());

        assert!(store.delete_collection("docs").await.unwrap());
        assert!(!dir.path().join("docs.json").exists());
    }

    #[test]
    fn test_euclid_score_prefers_closer() {
        let near = score(DistanceMetric::Euclid, &[0.0, 0.0], &[0.1, 0.0]);
        let far = score(DistanceMetric::Euclid, &[0.0, 0.0], &[3.0, 4.0]);
        assert!(near > far);
        assert!((far - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let store = LocalBackend::new(dir.path()).unwrap();
        assert!(store.collection_path("../escape").is_err());
        assert!(store.collection_path("ok_name").is_ok());
    }
}
