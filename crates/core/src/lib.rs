pub mod answer;
pub mod chunking;
pub mod context;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod rerank;
pub mod stores;
pub mod traits;

pub use answer::{extractive_answer, AnswerGenerator, ChatClient, ChatConfig, UNKNOWN_ANSWER};
pub use chunking::{build_chunks, chunk_by_tokens, normalize_whitespace};
pub use context::{compose_context, render_history, retrieval_query};
pub use conversation::InMemoryConversationStore;
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingBackend, EmbeddingSettings, LocalEmbedder,
    OpenAiEmbedder, OpenAiEmbeddingConfig, DEFAULT_EMBEDDING_DIMENSIONS, HASHED_TRIGRAM_MODEL,
    MINILM_MODEL,
};
pub use error::{LoadError, RagError};
pub use extractor::{load_document, DocumentKind, LopdfExtractor, PageSpan, PdfExtractor};
pub use ingest::{declared_filename, digest_file, discover_documents, prepare_document};
pub use models::{
    Answer, Chunk, ChunkingConfig, Citation, CollectionInfo, CollectionStatus, ConversationTurn,
    IndexedPoint, IngestOutcome, IngestedDocument, PipelineOptions, RankedResult,
    RetrievedCandidate, Role, SkippedFile,
};
pub use orchestrator::{RagPipeline, NO_DOCUMENTS_ANSWER};
pub use rerank::{CrossEncoder, HttpCrossEncoder, LexicalScorer, Reranker, RerankerEndpointConfig};
pub use stores::{InMemoryIndex, QdrantStore};
pub use traits::{ConversationStore, VectorIndex};

#[cfg(feature = "local-models")]
pub use embeddings::MiniLmEmbedder;
#[cfg(feature = "local-models")]
pub use rerank::BgeCrossEncoder;
