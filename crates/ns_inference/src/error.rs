use thiserror::Error;

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Failures raised by the model backends before they reach `ns_core::Error`.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Hub download or cache failure.
    #[error("{0}")]
    Download(String),

    #[error("{0}")]
    Tokenization(String),

    /// Tensor or weight loading failure.
    #[error("{0}")]
    Model(String),

    #[error("Unsupported model: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model config: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(feature = "candle")]
impl From<candle_core::Error> for InferenceError {
    fn from(value: candle_core::Error) -> Self {
        InferenceError::Model(value.to_string())
    }
}

#[cfg(feature = "candle")]
impl From<hf_hub::api::sync::ApiError> for InferenceError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        InferenceError::Download(format!("HuggingFace API error: {}", value))
    }
}

impl From<InferenceError> for ns_core::Error {
    fn from(value: InferenceError) -> Self {
        match value {
            InferenceError::Download(msg) => ns_core::Error::Download(msg),
            InferenceError::Tokenization(msg) => ns_core::Error::Tokenization(msg),
            InferenceError::Model(msg) => ns_core::Error::Inference(msg),
            InferenceError::Unsupported(msg) => ns_core::Error::UnsupportedModel(msg),
            InferenceError::Io(e) => ns_core::Error::Io(e),
            InferenceError::Config(e) => ns_core::Error::Serialization(e),
        }
    }
}
