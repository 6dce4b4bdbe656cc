//! Error types for the ragpipe pipeline

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the retrieval pipeline
///
/// `Initialization`, `NotReady`, `Embedding` and `Generation` are the kinds a
/// caller of the pipeline can observe. The remaining variants are raised by
/// collaborators and folded into one of those four at the pipeline boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Pipeline not ready: {0}")]
    NotReady(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Document loader error: {0}")]
    DocumentLoader(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Text shown to the end user in place of this error.
    ///
    /// Internal detail never leaks through here; the full error goes to the log.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotReady(_) => "Error: Index is not available.".to_string(),
            Error::Initialization(_) | Error::Configuration(_) => {
                "Error: The pipeline failed to initialize.".to_string()
            }
            Error::Embedding(_) => {
                "Error processing request: the query could not be encoded.".to_string()
            }
            _ => "Error processing request: the language model is unavailable.".to_string(),
        }
    }

    /// Fold a collaborator error raised at startup into `Initialization`.
    pub fn into_initialization(self) -> Error {
        match self {
            Error::Initialization(_) => self,
            other => Error::Initialization(other.to_string()),
        }
    }

    /// Fold a collaborator error raised by the model call into `Generation`.
    pub fn into_generation(self) -> Error {
        match self {
            Error::Generation(_) => self,
            other => Error::Generation(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
