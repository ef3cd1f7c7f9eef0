//! The summarization orchestrator: validate, load, encode, generate, decode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ns_core::{
    validate_article, Error, GenerationParams, ModelLoader, SummaryRecord, SummaryRequest,
    MAX_INPUT_TOKENS,
};
use thiserror::Error;

/// Shown under every execution failure.
pub const EXECUTION_HINT: &str =
    "Make sure you have enough memory and internet to download the model.";

/// What the UI distinguishes when a submission fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    /// The user has to change the input.
    #[error("{0}")]
    Validation(String),

    /// Loading, tokenizing or generating failed.
    #[error("Error during summarization: {0}")]
    Execution(String),
}

impl SummarizeError {
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SummarizeError::Validation(_) => None,
            SummarizeError::Execution(_) => Some(EXECUTION_HINT),
        }
    }
}

impl From<Error> for SummarizeError {
    fn from(value: Error) -> Self {
        match value {
            Error::Validation(message) => SummarizeError::Validation(message),
            other => SummarizeError::Execution(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    pub model_name: String,
    /// Tokens actually fed to the model.
    pub input_tokens: usize,
    /// Tokens the input had before truncation.
    pub original_tokens: usize,
    pub elapsed: Duration,
}

impl Summary {
    pub fn truncated(&self) -> bool {
        self.original_tokens > self.input_tokens
    }

    pub fn into_record(self, request: SummaryRequest) -> SummaryRecord {
        SummaryRecord {
            truncated: self.truncated(),
            text: self.text,
            request,
            generated_at: Utc::now(),
            elapsed: self.elapsed,
        }
    }
}

/// Turns articles into summaries through whichever loader it was given.
///
/// Blocking: callers on an async runtime should run it on a blocking thread.
#[derive(Clone)]
pub struct Summarizer {
    loader: Arc<dyn ModelLoader>,
}

impl Summarizer {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self { loader }
    }

    /// Summarize already-validated text.
    pub fn summarize(&self, text: &str, request: &SummaryRequest) -> ns_core::Result<Summary> {
        let start = Instant::now();
        let loaded = self.loader.load(request.model)?;

        let text = text.trim();
        let input = match request.model.task_prefix() {
            Some(prefix) => format!("{}{}", prefix, text),
            None => text.to_string(),
        };

        let encoded = loaded.tokenizer.encode(&input, MAX_INPUT_TOKENS)?;
        if encoded.truncated() {
            tracing::warn!(
                "Article truncated from {} to {} tokens",
                encoded.original_len,
                encoded.ids.len()
            );
        }

        let params = GenerationParams::from(request.params);
        let output = loaded.model.generate(&encoded.ids, &params)?;
        let summary = loaded.tokenizer.decode(&output)?;

        let elapsed = start.elapsed();
        tracing::info!(
            "Summarized {} tokens into {} with {} in {:.2}s",
            encoded.ids.len(),
            output.len(),
            loaded.model.name(),
            elapsed.as_secs_f64()
        );

        Ok(Summary {
            text: summary,
            model_name: loaded.model.name().to_string(),
            input_tokens: encoded.ids.len(),
            original_tokens: encoded.original_len,
            elapsed,
        })
    }

    /// Validate then summarize, folding every failure into the two user-facing kinds.
    pub fn run(&self, raw: &str, request: &SummaryRequest) -> Result<Summary, SummarizeError> {
        let article = validate_article(raw)?;
        request.params.validated()?;
        self.summarize(article, request).map_err(|e| {
            tracing::error!("Summarization with {} failed: {}", request.model, e);
            SummarizeError::Execution(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ns_core::{LoadedModel, ModelChoice, SummaryMetrics, SummaryParams};

    use super::*;
    use crate::cache::ModelCache;
    use crate::models::DummyLoader;

    #[derive(Default)]
    struct RecordingLoader {
        calls: AtomicUsize,
        inner: DummyLoader,
    }

    impl ModelLoader for RecordingLoader {
        fn load(&self, choice: ModelChoice) -> ns_core::Result<LoadedModel> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.load(choice)
        }
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn load(&self, choice: ModelChoice) -> ns_core::Result<LoadedModel> {
            Err(Error::Download(format!("no network for {}", choice.id())))
        }
    }

    fn article(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn request(model: ModelChoice, min: u32, max: u32, beams: u32) -> SummaryRequest {
        SummaryRequest {
            model,
            params: SummaryParams::new(min, max, beams).unwrap(),
        }
    }

    #[test]
    fn test_short_input_never_reaches_loader() {
        let loader = Arc::new(RecordingLoader::default());
        let summarizer = Summarizer::new(loader.clone());

        for raw in ["", "   ", "too short", &"x".repeat(49), &format!("  {}  ", "y".repeat(49))] {
            let err = summarizer.run(raw, &SummaryRequest::default()).unwrap_err();
            assert_eq!(
                err,
                SummarizeError::Validation(ns_core::validate::TOO_SHORT_MESSAGE.to_string())
            );
            assert!(err.hint().is_none());
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_loader_runs_once_per_model() {
        let loader = Arc::new(RecordingLoader::default());
        let summarizer = Summarizer::new(Arc::new(ModelCache::new(loader.clone())));
        let text = article(60);

        for _ in 0..3 {
            summarizer
                .run(&text, &request(ModelChoice::T5Small, 30, 100, 4))
                .unwrap();
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        summarizer
            .run(&text, &request(ModelChoice::BartLargeCnn, 30, 100, 4))
            .unwrap();
        summarizer
            .run(&text, &request(ModelChoice::T5Small, 10, 50, 2))
            .unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sixty_word_article_end_to_end() {
        let summarizer = Summarizer::new(Arc::new(DummyLoader::new()));
        let text = article(60);

        let summary = summarizer
            .run(&text, &request(ModelChoice::T5Small, 30, 100, 4))
            .unwrap();
        assert!(!summary.text.is_empty());
        assert!(!summary.truncated());
        assert!(summary.text.starts_with("word0 word1"));

        let metrics = SummaryMetrics::compute(&text, &summary.text);
        assert_eq!(metrics.original_words, 60);
        assert!(metrics.summary_words > 0);
        assert!(metrics.compression > 0.0 && metrics.compression < 100.0);
    }

    #[test]
    fn test_long_article_is_truncated() {
        let summarizer = Summarizer::new(Arc::new(DummyLoader::new()));
        let summary = summarizer
            .run(&article(700), &request(ModelChoice::BartLargeCnn, 30, 100, 4))
            .unwrap();
        assert!(summary.truncated());
        assert_eq!(summary.input_tokens, MAX_INPUT_TOKENS);
        assert_eq!(summary.original_tokens, 701);

        let record = summary.into_record(SummaryRequest::default());
        assert!(record.truncated);
    }

    #[test]
    fn test_out_of_range_params_are_validation_errors() {
        let loader = Arc::new(RecordingLoader::default());
        let summarizer = Summarizer::new(loader.clone());
        let bad = SummaryRequest {
            model: ModelChoice::T5Small,
            params: SummaryParams {
                min_length: 12,
                max_length: 100,
                num_beams: 4,
            },
        };
        let err = summarizer.run(&article(60), &bad).unwrap_err();
        assert!(matches!(err, SummarizeError::Validation(_)));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_failure_is_execution_error() {
        let summarizer = Summarizer::new(Arc::new(FailingLoader));
        let err = summarizer
            .run(&article(60), &SummaryRequest::default())
            .unwrap_err();
        match &err {
            SummarizeError::Execution(message) => assert!(message.contains("no network")),
            other => panic!("expected execution error, got {:?}", other),
        }
        assert_eq!(err.hint(), Some(EXECUTION_HINT));
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_load_once() {
        let loader = Arc::new(RecordingLoader::default());
        let summarizer = Summarizer::new(Arc::new(ModelCache::new(loader.clone())));
        let text = Arc::new(article(60));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let summarizer = summarizer.clone();
                let text = text.clone();
                tokio::task::spawn_blocking(move || {
                    summarizer.run(&text, &request(ModelChoice::BartLargeCnn, 30, 100, 4))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }
}
