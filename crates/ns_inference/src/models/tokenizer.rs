use std::path::Path;

use ns_core::{Encoded, Result, TextTokenizer};
use tokenizers::{Encoding, Tokenizer, TruncationParams};

use crate::error::InferenceError;

/// A hub `tokenizer.json` behind the `TextTokenizer` contract.
///
/// Truncation is configured once; requests for a different limit fall back
/// to a reconfigured copy.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
    max_tokens: usize,
}

fn truncation(max_length: usize) -> TruncationParams {
    TruncationParams {
        max_length,
        ..Default::default()
    }
}

/// Tokens of `encoding` that came from the text rather than the template.
fn content_len(encoding: &Encoding) -> usize {
    let mask = encoding.get_special_tokens_mask();
    if mask.len() == encoding.len() {
        mask.iter().filter(|special| **special == 0).count()
    } else {
        encoding.len()
    }
}

impl HfTokenizer {
    pub fn new(
        mut tokenizer: Tokenizer,
        max_tokens: usize,
    ) -> std::result::Result<Self, InferenceError> {
        tokenizer
            .with_truncation(Some(truncation(max_tokens)))
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;
        Ok(Self {
            tokenizer,
            max_tokens,
        })
    }

    pub fn from_file(path: &Path, max_tokens: usize) -> std::result::Result<Self, InferenceError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            InferenceError::Tokenization(format!(
                "Failed to load tokenizer from '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::new(tokenizer, max_tokens)
    }

    fn encode_with(tokenizer: &Tokenizer, text: &str) -> Result<Encoded> {
        let encoding = tokenizer.encode(text, true).map_err(|e| {
            ns_core::Error::Tokenization(format!(
                "Tokenization failed on '{}': {}",
                text.chars().take(50).collect::<String>(),
                e
            ))
        })?;
        let ids = encoding.get_ids().to_vec();
        let dropped: usize = encoding.get_overflowing().iter().map(content_len).sum();
        Ok(Encoded {
            original_len: ids.len() + dropped,
            ids,
        })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str, max_tokens: usize) -> Result<Encoded> {
        if max_tokens == self.max_tokens {
            return Self::encode_with(&self.tokenizer, text);
        }
        let mut tokenizer = self.tokenizer.clone();
        tokenizer
            .with_truncation(Some(truncation(max_tokens)))
            .map_err(|e| ns_core::Error::Tokenization(e.to_string()))?;
        Self::encode_with(&tokenizer, text)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(ids, true)
            .map_err(|e| ns_core::Error::Tokenization(e.to_string()))?;
        Ok(clean_up_tokenization(text.trim()))
    }
}

/// Undo the spaces a word-piece decoder leaves before punctuation and
/// English contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    const REPLACEMENTS: [(&str, &str); 10] = [
        (" .", "."),
        (" ?", "?"),
        (" !", "!"),
        (" ,", ","),
        (" ' ", "'"),
        (" n't", "n't"),
        (" 'm", "'m"),
        (" 's", "'s"),
        (" 've", "'ve"),
        (" 're", "'re"),
    ];
    REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    /// Word-level vocabulary that appends `</s>` like the summarization models do.
    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 1, "content": "</s>", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "</s>", "type_id": 0}}
            ],
            "pair": [
                {"Sequence": {"id": "A", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 1}}
            ],
            "special_tokens": {
                "</s>": {"id": "</s>", "ids": [1], "tokens": ["</s>"]}
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<unk>": 0, "</s>": 1, "a": 2, "b": 3, "c": 4, "d": 5, "e": 6, "f": 7},
            "unk_token": "<unk>"
        }
    }"#;

    fn tokenizer(max_tokens: usize) -> HfTokenizer {
        HfTokenizer::new(Tokenizer::from_str(TOKENIZER_JSON).unwrap(), max_tokens).unwrap()
    }

    #[test]
    fn test_short_input_is_not_truncated() {
        let encoded = tokenizer(8).encode("a b c", 8).unwrap();
        assert_eq!(encoded.ids, vec![2, 3, 4, 1]);
        assert_eq!(encoded.original_len, 4);
        assert!(!encoded.truncated());
    }

    #[test]
    fn test_truncation_reports_original_length() {
        let tok = tokenizer(4);
        let encoded = tok.encode("a b c d e f", 4).unwrap();
        assert_eq!(encoded.ids, vec![2, 3, 4, 1]);
        assert_eq!(encoded.original_len, 7);
        assert!(encoded.truncated());
        assert_eq!(tok.decode(&encoded.ids).unwrap(), "a b c");
    }

    #[test]
    fn test_other_limit_uses_reconfigured_copy() {
        let tok = tokenizer(4);
        let encoded = tok.encode("a b c d e f", 6).unwrap();
        assert_eq!(encoded.ids, vec![2, 3, 4, 5, 6, 1]);
        assert_eq!(encoded.original_len, 7);

        let again = tok.encode("a b c d e f", 4).unwrap();
        assert_eq!(again.ids.len(), 4);
    }

    #[test]
    fn test_clean_up_tokenization() {
        assert_eq!(
            clean_up_tokenization("It was n't late , was it ?"),
            "It wasn't late, was it?"
        );
        assert_eq!(clean_up_tokenization("They 're here ."), "They're here.");
        assert_eq!(clean_up_tokenization("plain text"), "plain text");
    }
}
