use crate::error::RagError;
use crate::models::{CollectionInfo, IndexedPoint, RetrievedCandidate};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct MemoryCollection {
    dimension: usize,
    points: Vec<IndexedPoint>,
    /// Position of each point id in `points`.
    positions: HashMap<String, usize>,
}

/// Process-local vector index with cosine scoring.
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|entry| entry.points.len())
            .unwrap_or(0)
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, RagError> {
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(|entry| CollectionInfo {
                dimension: entry.dimension,
                points_count: entry.points.len() as u64,
            }))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<bool, RagError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                points: Vec::new(),
                positions: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<(), RagError> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::Request(format!("collection `{collection}` does not exist")))?;

        if let Some(bad) = points
            .iter()
            .find(|point| point.vector.len() != entry.dimension)
        {
            return Err(RagError::Request(format!(
                "point {} has {} dimensions, collection expects {}",
                bad.point_id,
                bad.vector.len(),
                entry.dimension
            )));
        }

        for point in points {
            match entry.positions.get(&point.point_id) {
                Some(&position) => entry.points[position] = point.clone(),
                None => {
                    entry
                        .positions
                        .insert(point.point_id.clone(), entry.points.len());
                    entry.points.push(point.clone());
                }
            }
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedCandidate>, RagError> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        if query_vector.len() != entry.dimension {
            return Err(RagError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                entry.dimension
            )));
        }

        let mut hits = entry
            .points
            .iter()
            .map(|point| RetrievedCandidate {
                chunk: point.payload.clone(),
                similarity: cosine_similarity(query_vector, &point.vector),
            })
            .filter(|hit| score_threshold.map_or(true, |threshold| hit.similarity >= threshold))
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        hits.truncate(limit);
        Ok(hits)
    }
}
