use std::fmt;
use std::sync::Arc;

use crate::types::{GenerationParams, ModelChoice};
use crate::Result;

/// Token ids produced for one input, with the length before truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub ids: Vec<u32>,
    pub original_len: usize,
}

impl Encoded {
    pub fn truncated(&self) -> bool {
        self.original_len > self.ids.len()
    }
}

pub trait TextTokenizer: Send + Sync {
    /// Encode text with special tokens, keeping at most `max_tokens` ids.
    fn encode(&self, text: &str, max_tokens: usize) -> Result<Encoded>;

    /// Decode generated ids back to text, dropping control tokens.
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

pub trait Seq2SeqModel: Send + Sync {
    fn name(&self) -> &str;

    /// Run the model's generation routine on already-encoded input.
    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>>;
}

/// A tokenizer and model pair ready for inference.
#[derive(Clone)]
pub struct LoadedModel {
    pub tokenizer: Arc<dyn TextTokenizer>,
    pub model: Arc<dyn Seq2SeqModel>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("tokenizer", &"<dyn TextTokenizer>")
            .field("model", &self.model.name())
            .finish()
    }
}

pub trait ModelLoader: Send + Sync {
    /// Materialize the tokenizer and model for `choice`. May hit the network.
    fn load(&self, choice: ModelChoice) -> Result<LoadedModel>;
}
