use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(
        "collection `{collection}` stores {existing}-dimensional vectors but the active embedder produces {expected}"
    )]
    DimensionMismatch {
        collection: String,
        existing: usize,
        expected: usize,
    },

    #[error("{service} is unavailable: {details}")]
    Upstream { service: String, details: String },

    #[error("failed to load model {model}: {details}")]
    ModelLoad { model: String, details: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl RagError {
    pub(crate) fn upstream(service: &str, details: impl ToString) -> Self {
        Self::Upstream {
            service: service.to_string(),
            details: details.to_string(),
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
