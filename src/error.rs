//! Error types for the archiver.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to list messages: {0}")]
    List(String),

    #[error("Failed to fetch message {id}: {reason}")]
    Fetch { id: String, reason: String },

    #[error("Failed to modify labels of message {id}: {reason}")]
    Modify { id: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Completion request failed: {0}")]
    Request(String),

    #[error("Completion provider returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Completion response had no choices")]
    EmptyResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive request failed: {0}")]
    Request(String),

    #[error("Archive store returned status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for ClassifyError {
    fn from(e: reqwest::Error) -> Self {
        ClassifyError::Request(e.to_string())
    }
}

impl From<reqwest::Error> for ArchiveError {
    fn from(e: reqwest::Error) -> Self {
        ArchiveError::Request(e.to_string())
    }
}
