use crate::error::RagError;
use crate::models::{
    CollectionInfo, CollectionStatus, ConversationTurn, IndexedPoint, RetrievedCandidate,
};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// `None` when the collection does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, RagError>;

    /// Returns `false` when another caller created the collection first.
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<bool, RagError>;

    /// Inserts or overwrites points by id. A batch is applied entirely or not at all.
    async fn upsert(&self, collection: &str, points: &[IndexedPoint]) -> Result<(), RagError>;

    /// Cosine search, best match first. Absent or empty collections yield no hits.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedCandidate>, RagError>;

    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<CollectionStatus, RagError> {
        if let Some(info) = self.collection_info(name).await? {
            check_dimension(name, info, dimension)?;
            return Ok(CollectionStatus::Exists);
        }

        if self.create_collection(name, dimension).await? {
            return Ok(CollectionStatus::Created);
        }

        match self.collection_info(name).await? {
            Some(info) => {
                check_dimension(name, info, dimension)?;
                Ok(CollectionStatus::Exists)
            }
            None => Err(RagError::Request(format!(
                "collection `{name}` vanished while being created"
            ))),
        }
    }
}

pub(crate) fn check_dimension(
    name: &str,
    info: CollectionInfo,
    expected: usize,
) -> Result<(), RagError> {
    if info.dimension != expected {
        return Err(RagError::DimensionMismatch {
            collection: name.to_string(),
            existing: info.dimension,
            expected,
        });
    }
    Ok(())
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The most recent `limit` turns, oldest first.
    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RagError>;

    async fn append_turn(&self, session_id: &str, turn: ConversationTurn) -> Result<(), RagError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports the collection missing on the first lookup, then loses the
    /// create to a writer that used `winner_dimension`.
    struct RacedIndex {
        winner_dimension: usize,
        lookups: AtomicUsize,
    }

    impl RacedIndex {
        fn new(winner_dimension: usize) -> Self {
            Self {
                winner_dimension,
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for RacedIndex {
        async fn collection_info(&self, _name: &str) -> Result<Option<CollectionInfo>, RagError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            Ok(Some(CollectionInfo {
                dimension: self.winner_dimension,
                points_count: 0,
            }))
        }

        async fn create_collection(&self, _name: &str, _dimension: usize) -> Result<bool, RagError> {
            Ok(false)
        }

        async fn upsert(&self, _collection: &str, _points: &[IndexedPoint]) -> Result<(), RagError> {
            Ok(())
        }

        async fn search(
            &self,
            _collection: &str,
            _query_vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
        ) -> Result<Vec<RetrievedCandidate>, RagError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn lost_create_race_with_same_dimension_reuses_collection() {
        let index = RacedIndex::new(4);
        let status = index.ensure_collection("docs", 4).await.expect("ensure");
        assert_eq!(status, CollectionStatus::Exists);
        assert_eq!(index.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lost_create_race_still_checks_dimension() {
        let index = RacedIndex::new(8);
        let result = index.ensure_collection("docs", 4).await;
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                existing: 8,
                expected: 4,
                ..
            })
        ));
    }
}
