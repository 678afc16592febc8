use crate::error::RagError;
use crate::models::ConversationTurn;
use crate::traits::ConversationStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RagError> {
        let sessions = self.sessions.read().await;
        let turns = sessions.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        let skip = turns.len().saturating_sub(limit);
        Ok(turns[skip..].to_vec())
    }

    async fn append_turn(&self, session_id: &str, turn: ConversationTurn) -> Result<(), RagError> {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push(turn);
        turns.sort_by_key(|turn| turn.created_at);
        Ok(())
    }
}
