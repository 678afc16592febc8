use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rag_answer_core::{
    declared_filename, discover_documents, Answer, AnswerGenerator, ChatConfig, ConversationTurn,
    CrossEncoder, EmbeddingBackend, EmbeddingSettings, HttpCrossEncoder,
    InMemoryConversationStore, OpenAiEmbeddingConfig, PipelineOptions, QdrantStore, RagPipeline,
    Reranker, RerankerEndpointConfig,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rag-answer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Qdrant collection
    #[arg(long, env = "COLLECTION_NAME", default_value = "docs")]
    collection: String,

    /// OpenAI API key; enables remote embeddings and generated answers
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Remote embedding model
    #[arg(long, env = "OPENAI_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Remote chat model
    #[arg(long, env = "OPENAI_CHAT_MODEL", default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Local embedding model used without an OpenAI key
    #[arg(long, env = "LOCAL_EMBEDDING_MODEL", default_value = "hashed-trigram")]
    local_embedding_model: String,

    /// Base URL of a `/v1/rerank` cross-encoder endpoint
    #[arg(long, env = "RERANKER_URL")]
    reranker_url: Option<String>,

    /// Model name sent to the rerank endpoint
    #[arg(long, env = "RERANKER_MODEL")]
    reranker_model: Option<String>,

    /// Use the in-process bge-reranker-base cross-encoder
    #[arg(long, default_value_t = false)]
    local_reranker: bool,

    /// Candidates fetched by the similarity search before reranking
    #[arg(long, default_value = "24")]
    coarse_limit: usize,

    /// Candidates kept after reranking
    #[arg(long, default_value = "4")]
    rerank_keep: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files or folders into the collection.
    Ingest {
        /// File or folder (searched recursively); repeatable.
        #[arg(long, required = true)]
        path: Vec<PathBuf>,
    },
    /// Ask one question and print the cited answer.
    Ask {
        #[arg(long)]
        question: String,
        /// JSON array of earlier turns used to steer retrieval.
        #[arg(long)]
        history_file: Option<PathBuf>,
        /// Print the answer as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Interactive session that keeps recent turns as retrieval context.
    Chat {
        /// Ignore earlier turns when retrieving.
        #[arg(long, default_value_t = false)]
        no_history: bool,
    },
}

fn build_reranker(cli: &Cli) -> anyhow::Result<Reranker> {
    if cli.local_reranker {
        #[cfg(feature = "local-models")]
        {
            let encoder = rag_answer_core::BgeCrossEncoder::load()?;
            return Ok(Reranker::new(CrossEncoder::Local(encoder)));
        }
        #[cfg(not(feature = "local-models"))]
        anyhow::bail!("--local-reranker needs a build with the `local-models` feature");
    }

    Ok(match &cli.reranker_url {
        Some(base_url) => Reranker::new(CrossEncoder::Remote(HttpCrossEncoder::new(
            RerankerEndpointConfig {
                base_url: base_url.clone(),
                model: cli.reranker_model.clone(),
                timeout_secs: 10,
            },
        ))),
        None => Reranker::default(),
    })
}

fn build_pipeline(
    cli: &Cli,
    use_history: bool,
) -> anyhow::Result<RagPipeline<QdrantStore, EmbeddingBackend>> {
    let api_key = cli
        .openai_api_key
        .as_ref()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    let embedder = EmbeddingBackend::from_settings(EmbeddingSettings {
        remote: api_key.clone().map(|api_key| OpenAiEmbeddingConfig {
            base_url: cli.openai_base_url.clone(),
            api_key,
            model: cli.embedding_model.clone(),
        }),
        local_model: cli.local_embedding_model.clone(),
    })?;

    let generator = AnswerGenerator::from_config(api_key.map(|api_key| ChatConfig {
        base_url: cli.openai_base_url.clone(),
        api_key,
        model: cli.chat_model.clone(),
    }));
    if !generator.is_generative() {
        warn!("OPENAI_API_KEY not set; answers are extracted from the top passage");
    }

    let index = QdrantStore::new(&cli.qdrant_url, cli.qdrant_api_key.clone())?;
    let options = PipelineOptions {
        collection: cli.collection.clone(),
        coarse_limit: cli.coarse_limit,
        rerank_keep: cli.rerank_keep,
        use_history,
        ..PipelineOptions::default()
    };

    Ok(RagPipeline::new(
        index,
        embedder,
        build_reranker(cli)?,
        generator,
        options,
    ))
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    for (position, citation) in answer.citations.iter().enumerate() {
        println!(
            "  [{}] {} p{}-{} ({})",
            position + 1,
            citation.filename,
            citation.page_start,
            citation.page_end,
            citation.chunk_id
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "rag-answer boot"
    );

    match &cli.command {
        Command::Ingest { path } => {
            let rag = build_pipeline(&cli, true)?;

            let mut files = Vec::new();
            for root in path {
                let found = discover_documents(root);
                if found.is_empty() {
                    warn!(path = %root.display(), "no ingestible files found");
                }
                for file in found {
                    let filename = declared_filename(&file)?;
                    files.push((file, filename));
                }
            }

            let outcome = rag.ingest(&files).await?;
            for document in &outcome.documents {
                println!(
                    "{} doc_id={} chunks={}",
                    document.filename, document.doc_id, document.chunk_count
                );
            }
            for skipped in &outcome.skipped {
                println!("skipped {}: {}", skipped.filename, skipped.reason);
            }
            println!(
                "{} chunks indexed from {} files at {}",
                outcome.chunks_indexed,
                outcome.files_processed,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            question,
            history_file,
            json,
        } => {
            let rag = build_pipeline(&cli, true)?;

            let history = match history_file {
                Some(file) => {
                    let raw = tokio::fs::read_to_string(file)
                        .await
                        .with_context(|| format!("reading {}", file.display()))?;
                    let turns: Vec<ConversationTurn> = serde_json::from_str(&raw)
                        .with_context(|| format!("parsing {}", file.display()))?;
                    Some(turns)
                }
                None => None,
            };

            let answer = rag.query(question, history.as_deref()).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Command::Chat { no_history } => {
            let rag = build_pipeline(&cli, !no_history)?;
            let store = InMemoryConversationStore::new();
            let session_id = format!("cli-{}", Utc::now().timestamp_millis());

            let mut stdout = tokio::io::stdout();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if question == "/quit" || question == "/exit" {
                    break;
                }

                match rag.ask_in_session(&store, &session_id, question).await {
                    Ok(answer) => print_answer(&answer),
                    Err(error) => eprintln!("error: {error}"),
                }
            }
        }
    }

    Ok(())
}
