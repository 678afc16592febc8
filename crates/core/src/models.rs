use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded span of normalized document text with its page provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub doc_id: String,
    pub filename: String,
    pub page_start: u32,
    pub page_end: u32,
    pub chunk_id: String,
    pub text: String,
}

impl Chunk {
    pub fn citation(&self) -> Citation {
        Citation {
            filename: self.filename.clone(),
            page_start: self.page_start,
            page_end: self.page_end,
            chunk_id: self.chunk_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub point_id: String,
    pub vector: Vec<f32>,
    pub payload: Chunk,
}

/// Output of the coarse similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedCandidate {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// A candidate that survived reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub similarity: f32,
    pub rerank_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub filename: String,
    pub page_start: u32,
    pub page_end: u32,
    pub chunk_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    pub citations: Vec<Citation>,
}

impl Answer {
    pub fn uncited(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            citations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(answer: &Answer) -> Self {
        Self {
            role: Role::Assistant,
            content: answer.text.clone(),
            citations: answer.citations.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Exists,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub dimension: usize,
    pub points_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub doc_id: String,
    pub filename: String,
    pub checksum: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// Result of one ingestion request. Always returned for a well-formed
/// request, even when nothing could be indexed.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub doc_ids: Vec<String>,
    pub chunks_indexed: usize,
    pub files_processed: usize,
    pub documents: Vec<IngestedDocument>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    pub target_tokens: usize,
    pub overlap_ratio: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 400,
            overlap_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub collection: String,
    /// Width of the first-stage similarity search.
    pub coarse_limit: usize,
    /// Number of candidates kept after reranking.
    pub rerank_keep: usize,
    pub score_threshold: Option<f32>,
    pub chunking: ChunkingConfig,
    pub history_turns: usize,
    pub use_history: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            collection: "docs".to_string(),
            coarse_limit: 24,
            rerank_keep: 4,
            score_threshold: None,
            chunking: ChunkingConfig::default(),
            history_turns: 6,
            use_history: true,
        }
    }
}
