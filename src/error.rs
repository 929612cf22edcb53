use thiserror::Error;

#[derive(Debug, Error)]
pub enum WormError {
   #[error("Git command failed: {0}")]
   GitError(String),

   #[error("Push failed: {0}")]
   GitPushError(String),

   #[error("Push rejected due to conflict: {0}")]
   GitConflictError(String),

   #[error("Nothing to commit in {0}")]
   NothingToCommit(String),

   #[error("Cannot connect to Ollama at {url}: {reason}")]
   OllamaConnection { url: String, reason: String },

   #[error("Ollama request timed out: {0}")]
   OllamaTimeout(String),

   #[error("Model error: {0}")]
   OllamaModel(String),

   #[error("Generation failed after {retries} retries: {source}")]
   RetryExhausted {
      retries: u32,
      #[source]
      source:  Box<Self>,
   },

   #[error("Cycle exceeded deadline of {0} seconds")]
   CycleTimeout(u64),

   #[error("Configuration error: {0}")]
   ConfigError(String),

   #[error("Template rendering failed: {0}")]
   TemplateError(String),

   #[error("State store error: {0}")]
   StateError(#[from] rusqlite::Error),

   #[error("IO error: {0}")]
   IoError(#[from] std::io::Error),

   #[error("HTTP error: {0}")]
   HttpError(#[from] reqwest::Error),

   #[error("JSON error: {0}")]
   JsonError(#[from] serde_json::Error),

   #[error("YAML error: {0}")]
   YamlError(#[from] serde_yaml::Error),

   #[error("{0}")]
   Other(String),
}

impl WormError {
   /// Whether this error represents an Ollama outage (connection-level, not a
   /// single bad request). Outages send the daemon back into the wait
   /// protocol instead of counting as a cycle failure.
   pub const fn is_outage(&self) -> bool {
      matches!(self, Self::OllamaConnection { .. })
   }
}

pub type Result<T> = std::result::Result<T, WormError>;
