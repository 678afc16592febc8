use crate::answer::AnswerGenerator;
use crate::context::{render_history, retrieval_query};
use crate::embeddings::{EmbeddingBackend, Embedder};
use crate::error::RagError;
use crate::ingest::prepare_document;
use crate::models::{
    Answer, ConversationTurn, IndexedPoint, IngestOutcome, PipelineOptions, RankedResult,
    SkippedFile,
};
use crate::rerank::Reranker;
use crate::traits::{check_dimension, ConversationStore, VectorIndex};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been indexed yet. Upload documents before asking questions.";

/// Ingestion and question answering over one vector collection.
pub struct RagPipeline<V, E = EmbeddingBackend>
where
    V: VectorIndex,
    E: Embedder,
{
    index: V,
    embedder: E,
    reranker: Reranker,
    generator: AnswerGenerator,
    options: PipelineOptions,
}

impl<V, E> RagPipeline<V, E>
where
    V: VectorIndex,
    E: Embedder,
{
    pub fn new(
        index: V,
        embedder: E,
        reranker: Reranker,
        generator: AnswerGenerator,
        options: PipelineOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            reranker,
            generator,
            options,
        }
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Ingests `(path, filename)` pairs. Files that fail to load are skipped and
    /// reported; collection or backend failures abort the whole request before
    /// anything is written.
    pub async fn ingest(&self, files: &[(PathBuf, String)]) -> Result<IngestOutcome, RagError> {
        self.options.chunking.validate()?;
        let collection = &self.options.collection;
        let status = self
            .index
            .ensure_collection(collection, self.embedder.dimensions())
            .await?;
        debug!(collection = %collection, ?status, "collection ready");

        let mut documents = Vec::new();
        let mut skipped = Vec::new();
        let mut chunks = Vec::new();

        for (path, filename) in files {
            match prepare_document(path, filename, self.options.chunking) {
                Ok(prepared) => {
                    if prepared.chunks.is_empty() {
                        warn!(filename = %filename, "document produced no text");
                    }
                    chunks.extend(prepared.chunks);
                    documents.push(prepared.document);
                }
                Err(error) => {
                    warn!(filename = %filename, %error, "skipping unreadable file");
                    skipped.push(SkippedFile {
                        filename: filename.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        let chunks_indexed = chunks.len();
        if !chunks.is_empty() {
            let texts = chunks
                .iter()
                .map(|chunk| chunk.text.clone())
                .collect::<Vec<_>>();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != chunks.len() {
                return Err(RagError::upstream(
                    "embedding service",
                    format!("returned {} vectors for {} chunks", vectors.len(), chunks.len()),
                ));
            }

            let points = chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedPoint {
                    point_id: Uuid::new_v4().to_string(),
                    vector,
                    payload: chunk,
                })
                .collect::<Vec<_>>();

            self.index.upsert(collection, &points).await?;
        }

        info!(
            collection = %collection,
            files = documents.len(),
            skipped = skipped.len(),
            chunks = chunks_indexed,
            embedder = self.embedder.name(),
            "ingestion finished"
        );

        Ok(IngestOutcome {
            doc_ids: documents.iter().map(|doc| doc.doc_id.clone()).collect(),
            chunks_indexed,
            files_processed: documents.len(),
            documents,
            skipped,
        })
    }

    /// Coarse similarity search followed by reranking.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RankedResult>, RagError> {
        let vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::upstream("embedding service", "no vector for query"))?;

        let candidates = self
            .index
            .search(
                &self.options.collection,
                &vector,
                self.options.coarse_limit,
                self.options.score_threshold,
            )
            .await?;
        debug!(candidates = candidates.len(), "coarse search finished");

        self.reranker
            .rerank(query, candidates, self.options.rerank_keep)
            .await
    }

    /// Answers `question`; recent `history` turns only shape retrieval.
    pub async fn query(
        &self,
        question: &str,
        history: Option<&[ConversationTurn]>,
    ) -> Result<Answer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Request("question is empty".to_string()));
        }

        let collection = &self.options.collection;
        let info = match self.index.collection_info(collection).await? {
            Some(info) if info.points_count > 0 => info,
            _ => return Ok(Answer::uncited(NO_DOCUMENTS_ANSWER)),
        };
        check_dimension(collection, info, self.embedder.dimensions())?;

        let history_text = match history {
            Some(turns) if self.options.use_history => {
                render_history(turns, self.options.history_turns)
            }
            _ => String::new(),
        };

        let ranked = self
            .retrieve(&retrieval_query(question, &history_text))
            .await?;
        let answer = self.generator.synthesize(question, &ranked).await?;

        info!(
            citations = answer.citations.len(),
            generative = self.generator.is_generative(),
            "answered question"
        );
        Ok(answer)
    }

    /// Answers within a conversation: reads the recent window before the
    /// question, then records both turns.
    pub async fn ask_in_session<C>(
        &self,
        store: &C,
        session_id: &str,
        question: &str,
    ) -> Result<Answer, RagError>
    where
        C: ConversationStore + ?Sized,
    {
        let history = if self.options.use_history {
            store
                .recent_turns(session_id, self.options.history_turns)
                .await?
        } else {
            Vec::new()
        };

        let answer = self.query(question, Some(&history)).await?;

        store
            .append_turn(session_id, ConversationTurn::user(question))
            .await?;
        store
            .append_turn(session_id, ConversationTurn::assistant(&answer))
            .await?;
        Ok(answer)
    }
}
