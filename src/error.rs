use thiserror::Error;

#[derive(Error, Debug)]
pub enum CmsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Failed to persist collection: {0}")]
    SaveFailed(String),

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for CmsError {
    fn from(err: anyhow::Error) -> Self {
        CmsError::Unknown(err.to_string())
    }
}

impl From<glob::PatternError> for CmsError {
    fn from(err: glob::PatternError) -> Self {
        CmsError::FileSystem(err.to_string())
    }
}
