pub mod error;
pub mod metrics;
pub mod models;
pub mod session;
pub mod types;
pub mod validate;

pub use error::{Error, Result};
pub use metrics::SummaryMetrics;
pub use models::{Encoded, LoadedModel, ModelLoader, Seq2SeqModel, TextTokenizer};
pub use session::{Session, SessionView, SummaryRecord};
pub use types::{GenerationParams, ModelChoice, SummaryParams, SummaryRequest};
pub use validate::validate_article;

/// Longest input handed to a model, in tokens.
pub const MAX_INPUT_TOKENS: usize = 512;

pub mod prelude {
    pub use super::{
        Error, GenerationParams, LoadedModel, ModelChoice, ModelLoader, Result, Seq2SeqModel,
        Session, SummaryMetrics, SummaryParams, SummaryRequest, TextTokenizer,
    };
}
