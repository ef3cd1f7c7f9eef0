use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use ns_core::{
    Encoded, GenerationParams, LoadedModel, ModelChoice, ModelLoader, Result, Seq2SeqModel,
    TextTokenizer,
};

use crate::generation::{beam_search, Decoder, GenerationConfig};

const PAD: u32 = 0;
const EOS: u32 = 1;

/// Whitespace tokenizer that assigns ids to words as it sees them.
///
/// Ids are stable for the tokenizer's lifetime, so the vocabulary only grows.
/// The loader cache keeps one instance per model for the whole process; every
/// distinct word ever submitted stays interned until the process exits.
pub struct DummyTokenizer {
    vocab: Mutex<(HashMap<String, u32>, Vec<String>)>,
}

impl fmt::Debug for DummyTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyTokenizer").finish()
    }
}

impl Default for DummyTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyTokenizer {
    pub fn new() -> Self {
        let words = vec!["<pad>".to_string(), "</s>".to_string()];
        let ids = words
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id as u32))
            .collect();
        Self {
            vocab: Mutex::new((ids, words)),
        }
    }

    /// Number of interned words, control tokens included.
    pub fn vocab_len(&self) -> usize {
        self.vocab.lock().map(|vocab| vocab.1.len()).unwrap_or(0)
    }
}

impl TextTokenizer for DummyTokenizer {
    fn encode(&self, text: &str, max_tokens: usize) -> Result<Encoded> {
        let mut vocab = self
            .vocab
            .lock()
            .map_err(|_| ns_core::Error::Tokenization("Vocabulary lock poisoned".to_string()))?;
        let (ids, words) = &mut *vocab;
        let mut encoded: Vec<u32> = text
            .split_whitespace()
            .map(|word| {
                *ids.entry(word.to_string()).or_insert_with(|| {
                    words.push(word.to_string());
                    (words.len() - 1) as u32
                })
            })
            .collect();
        encoded.push(EOS);

        let original_len = encoded.len();
        if encoded.len() > max_tokens {
            encoded.truncate(max_tokens.saturating_sub(1));
            encoded.push(EOS);
        }
        Ok(Encoded {
            ids: encoded,
            original_len,
        })
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self
            .vocab
            .lock()
            .map_err(|_| ns_core::Error::Tokenization("Vocabulary lock poisoned".to_string()))?;
        let words: Vec<&str> = ids
            .iter()
            .filter(|id| **id != PAD && **id != EOS)
            .filter_map(|id| vocab.1.get(*id as usize).map(String::as_str))
            .collect();
        Ok(words.join(" "))
    }
}

/// Offline stand-in for a pretrained model: copies the lead of the article.
///
/// Runs through the real beam search so length bounds behave as they do for
/// the hub models.
pub struct DummyModel {
    name: String,
    skip_tokens: usize,
    generation: GenerationConfig,
}

impl fmt::Debug for DummyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyModel").field("name", &self.name).finish()
    }
}

impl DummyModel {
    pub fn new(choice: ModelChoice) -> Self {
        Self {
            name: format!("Dummy ({})", choice.id()),
            skip_tokens: choice
                .task_prefix()
                .map(|prefix| prefix.split_whitespace().count())
                .unwrap_or(0),
            generation: GenerationConfig {
                min_length: 0,
                max_length: 20,
                num_beams: 1,
                early_stopping: true,
                length_penalty: 1.0,
                no_repeat_ngram_size: 0,
                decoder_start_token_id: PAD,
                eos_token_id: EOS,
                forced_bos_token_id: None,
                forced_eos_token_id: None,
            },
        }
    }
}

impl Decoder for DummyModel {
    type Memory = Arc<Vec<u32>>;

    fn encode(&self, input_ids: &[u32]) -> crate::error::Result<Self::Memory> {
        let content: Vec<u32> = input_ids
            .iter()
            .copied()
            .filter(|id| *id != EOS)
            .skip(self.skip_tokens)
            .collect();
        Ok(Arc::new(content))
    }

    fn step(
        &self,
        tokens: &[u32],
        memory: &Self::Memory,
    ) -> crate::error::Result<(Vec<f32>, Self::Memory)> {
        let vocab = memory.iter().copied().max().unwrap_or(EOS).max(EOS) as usize + 1;
        let mut logits = vec![0.0; vocab];
        let position = tokens.len() - 1;
        let target = (memory.len() + 2) / 3;

        match memory.get(position) {
            Some(&next) => logits[next as usize] = 4.0,
            None => logits[PAD as usize] = 4.0,
        }
        if position >= target {
            logits[EOS as usize] = 8.0;
        }
        Ok((logits, memory.clone()))
    }
}

impl Seq2SeqModel for DummyModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        let config = self.generation.with_params(params);
        Ok(beam_search(self, input_ids, &config)?)
    }
}

/// Builds dummy tokenizer/model pairs without touching the network.
#[derive(Debug, Default)]
pub struct DummyLoader;

impl DummyLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for DummyLoader {
    fn load(&self, choice: ModelChoice) -> Result<LoadedModel> {
        Ok(LoadedModel {
            tokenizer: Arc::new(DummyTokenizer::new()),
            model: Arc::new(DummyModel::new(choice)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_round_trip_and_truncation() {
        let tokenizer = DummyTokenizer::new();
        let encoded = tokenizer.encode("the cat saw the dog", 512).unwrap();
        assert_eq!(encoded.ids.len(), 6);
        assert_eq!(encoded.ids[0], encoded.ids[3]);
        assert!(!encoded.truncated());
        assert_eq!(tokenizer.decode(&encoded.ids).unwrap(), "the cat saw the dog");

        let truncated = tokenizer.encode("a b c d e f", 4).unwrap();
        assert_eq!(truncated.ids.len(), 4);
        assert_eq!(*truncated.ids.last().unwrap(), EOS);
        assert_eq!(truncated.original_len, 7);
        assert!(truncated.truncated());
        assert_eq!(tokenizer.decode(&truncated.ids).unwrap(), "a b c");
    }

    #[test]
    fn test_vocabulary_grows_only_with_new_words() {
        let tokenizer = DummyTokenizer::new();
        assert_eq!(tokenizer.vocab_len(), 2);

        let first = tokenizer.encode("alpha beta alpha", 512).unwrap();
        assert_eq!(tokenizer.vocab_len(), 4);

        let second = tokenizer.encode("beta alpha", 512).unwrap();
        assert_eq!(tokenizer.vocab_len(), 4);
        assert_eq!(second.ids[0], first.ids[1]);
        assert_eq!(second.ids[1], first.ids[0]);

        tokenizer.encode("gamma", 512).unwrap();
        assert_eq!(tokenizer.vocab_len(), 5);
        assert_eq!(tokenizer.decode(&first.ids).unwrap(), "alpha beta alpha");
    }

    #[test]
    fn test_model_copies_lead_within_bounds() {
        let loaded = DummyLoader::new().load(ModelChoice::BartLargeCnn).unwrap();
        let text = (0..60).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let encoded = loaded.tokenizer.encode(&text, 512).unwrap();
        let params = GenerationParams {
            min_length: 30,
            max_length: 100,
            num_beams: 4,
            early_stopping: true,
        };
        let output = loaded.model.generate(&encoded.ids, &params).unwrap();
        let summary = loaded.tokenizer.decode(&output).unwrap();

        let words: Vec<&str> = summary.split_whitespace().collect();
        assert_eq!(words.len(), 29);
        assert_eq!(words[0], "w0");
        assert_eq!(words[28], "w28");
    }

    #[test]
    fn test_model_skips_task_prefix() {
        let loaded = DummyLoader::new().load(ModelChoice::T5Small).unwrap();
        let text = format!(
            "summarize: {}",
            (0..60).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
        );
        let encoded = loaded.tokenizer.encode(&text, 512).unwrap();
        let params = GenerationParams {
            min_length: 10,
            max_length: 50,
            num_beams: 2,
            early_stopping: true,
        };
        let output = loaded.model.generate(&encoded.ids, &params).unwrap();
        let summary = loaded.tokenizer.decode(&output).unwrap();
        assert!(summary.starts_with("w0 w1"));
        assert!(!summary.contains("summarize:"));
        assert_eq!(summary.split_whitespace().count(), 20);
    }
}
