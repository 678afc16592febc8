use crate::context::compose_context;
use crate::error::RagError;
use crate::models::{Answer, RankedResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const UNKNOWN_ANSWER: &str = "I don't know based on the provided context.";
pub const OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a careful assistant that answers questions about the user's documents. \
Use only the supplied context passages. If the context does not contain the answer, say that you don't know. \
Do not invent facts, names, numbers or sources.";

const EXTRACTIVE_PREFIX: &str = "Based on the available information: ";
const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl ChatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: OPENAI_CHAT_MODEL.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct ChatClient {
    client: Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.model,
                temperature: 0.0,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: system_prompt,
                    },
                    ChatMessage {
                        role: "user",
                        content: user_prompt,
                    },
                ],
            })
            .send()
            .await
            .map_err(|error| RagError::upstream("generation service", error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::upstream(
                "generation service",
                format!("{status}: {body}"),
            ));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| RagError::upstream("generation service", error))?;

        Ok(first_reply(payload))
    }
}

fn first_reply(payload: ChatResponse) -> String {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// How answers are produced, decided once at startup.
pub enum AnswerGenerator {
    Chat(ChatClient),
    /// Deterministic stand-in used when no generative model is configured.
    Extractive,
}

impl Default for AnswerGenerator {
    fn default() -> Self {
        Self::Extractive
    }
}

impl AnswerGenerator {
    pub fn from_config(config: Option<ChatConfig>) -> Self {
        match config {
            Some(config) => Self::Chat(ChatClient::new(config)),
            None => Self::Extractive,
        }
    }

    pub fn is_generative(&self) -> bool {
        matches!(self, Self::Chat(_))
    }

    /// Citations always mirror `ranked`, whichever path produced the text.
    pub async fn synthesize(
        &self,
        question: &str,
        ranked: &[RankedResult],
    ) -> Result<Answer, RagError> {
        let Some(top) = ranked.first() else {
            return Ok(Answer::uncited(UNKNOWN_ANSWER));
        };

        let text = match self {
            Self::Chat(client) => {
                let context = compose_context(ranked);
                debug!(context_chars = context.len(), "calling generative model");
                client
                    .complete(SYSTEM_PROMPT, &user_prompt(question, &context))
                    .await?
            }
            Self::Extractive => extractive_answer(&top.chunk.text),
        };

        Ok(Answer {
            text,
            citations: ranked.iter().map(|result| result.chunk.citation()).collect(),
        })
    }
}

fn user_prompt(question: &str, context: &str) -> String {
    format!(
        "Answer the user's question using ONLY the following context. \
If the answer isn't contained, say you don't know.\n\nContext:\n{context}\n\nQuestion: {question}"
    )
}

/// Byte offsets just past each `.`, `!` or `?` followed by whitespace. A
/// terminator at the very end of the text does not split anything.
fn sentence_ends(text: &str) -> impl Iterator<Item = usize> + '_ {
    let mut chars = text.char_indices().peekable();
    std::iter::from_fn(move || {
        while let Some((index, c)) = chars.next() {
            let at_boundary = chars.peek().is_some_and(|(_, next)| next.is_whitespace());
            if matches!(c, '.' | '!' | '?') && at_boundary {
                return Some(index + 1);
            }
        }
        None
    })
}

/// Builds a stand-in answer from the top chunk: its first one or two sentences
/// for longer chunks, a truncated snippet when no sentence boundary exists.
pub fn extractive_answer(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= 100 {
        return format!("{EXTRACTIVE_PREFIX}{text}");
    }

    let boundaries = sentence_ends(text).take(2).collect::<Vec<_>>();

    let snippet = match boundaries.as_slice() {
        [] => match text.char_indices().nth(SNIPPET_CHARS) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        },
        [only] => text[..*only].to_string(),
        [_, second, ..] => text[..*second].to_string(),
    };

    format!("{EXTRACTIVE_PREFIX}{snippet}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn ranked(chunk_id: &str, text: &str) -> RankedResult {
        RankedResult {
            chunk: Chunk {
                doc_id: "doc".to_string(),
                filename: "facts.txt".to_string(),
                page_start: 1,
                page_end: 1,
                chunk_id: chunk_id.to_string(),
                text: text.to_string(),
            },
            similarity: 0.4,
            rerank_score: 0.9,
        }
    }

    #[tokio::test]
    async fn no_results_means_unknown_without_citations() {
        let answer = AnswerGenerator::Extractive
            .synthesize("Anything?", &[])
            .await
            .expect("extractive never fails");
        assert_eq!(answer.text, UNKNOWN_ANSWER);
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn extractive_answer_cites_every_ranked_chunk_in_order() {
        let results = vec![
            ranked("doc-0", "Paris is the capital of France."),
            ranked("doc-4", "Lyon is a city in France."),
        ];

        let answer = AnswerGenerator::Extractive
            .synthesize("What is the capital of France?", &results)
            .await
            .expect("extractive never fails");

        assert_eq!(
            answer.text,
            "Based on the available information: Paris is the capital of France."
        );
        let ids = answer
            .citations
            .iter()
            .map(|citation| citation.chunk_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["doc-0", "doc-4"]);
    }

    #[test]
    fn long_chunks_are_cut_to_two_sentences() {
        let text = "The pump must be primed before use. Check the seals every month. \
Replace the filter yearly, or sooner in dusty conditions.";
        assert_eq!(
            extractive_answer(text),
            "Based on the available information: The pump must be primed before use. Check the seals every month."
        );
    }

    #[test]
    fn long_text_without_sentences_is_truncated() {
        let text = "word ".repeat(100);
        let answer = extractive_answer(&text);
        assert!(answer.ends_with("..."));
        assert_eq!(
            answer.chars().count(),
            EXTRACTIVE_PREFIX.chars().count() + SNIPPET_CHARS + 3
        );
    }

    #[test]
    fn long_single_sentence_is_truncated() {
        let text = format!("{}end.", "lorem ".repeat(120));
        let answer = extractive_answer(&text);
        assert!(answer.ends_with("..."));
        assert_eq!(
            answer.chars().count(),
            EXTRACTIVE_PREFIX.chars().count() + SNIPPET_CHARS + 3
        );
    }

    #[test]
    fn trailing_terminator_is_not_a_second_boundary() {
        let text = "The valve opens at two bar of pressure and closes again below one bar. \
It is rated for ten thousand cycles before service.";
        assert_eq!(
            extractive_answer(text),
            "Based on the available information: The valve opens at two bar of pressure and closes again below one bar."
        );
    }

    #[test]
    fn chat_reply_is_trimmed() {
        let payload: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Paris.\n" } }]
        }))
        .expect("valid payload");
        assert_eq!(first_reply(payload), "Paris.");
    }

    #[test]
    fn user_prompt_restricts_to_context() {
        let prompt = user_prompt("Q?", "[a p1-1 | x]\nctx");
        assert!(prompt.starts_with("Answer the user's question using ONLY the following context."));
        assert!(prompt.ends_with("Context:\n[a p1-1 | x]\nctx\n\nQuestion: Q?"));
    }

    #[tokio::test]
    async fn unreachable_generator_is_an_upstream_error() {
        let mut config = ChatConfig::new("sk-test");
        config.base_url = "http://127.0.0.1:9".to_string();
        let generator = AnswerGenerator::from_config(Some(config));
        assert!(generator.is_generative());

        let result = generator
            .synthesize("q", &[ranked("doc-0", "text")])
            .await;
        assert!(matches!(result, Err(RagError::Upstream { .. })));
    }
}
