use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),
}

pub type Result<T> = std::result::Result<T, Error>;
