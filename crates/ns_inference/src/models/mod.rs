//! Model backends: the offline dummy, and the hub models behind `candle`.

pub mod dummy;

#[cfg(feature = "candle")]
pub mod bart;
#[cfg(feature = "candle")]
pub mod hub;
#[cfg(feature = "candle")]
pub mod t5;
#[cfg(feature = "candle")]
pub mod tokenizer;

pub use dummy::{DummyLoader, DummyModel, DummyTokenizer};

#[cfg(feature = "candle")]
pub use hub_loader::HubLoader;

#[cfg(feature = "candle")]
mod hub_loader {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Instant;

    use candle_core::Device;
    use ns_core::{LoadedModel, ModelChoice, ModelLoader, Result, Seq2SeqModel};

    use super::bart::BartSummarizer;
    use super::hub::HubFetcher;
    use super::t5::T5Summarizer;
    use super::tokenizer::HfTokenizer;

    /// Downloads pretrained checkpoints and builds them on the CPU.
    #[derive(Debug, Clone)]
    pub struct HubLoader {
        fetcher: HubFetcher,
        device: Device,
    }

    impl HubLoader {
        pub fn new(cache_dir: Option<PathBuf>) -> Self {
            Self {
                fetcher: HubFetcher::new(cache_dir),
                device: Device::Cpu,
            }
        }
    }

    impl ModelLoader for HubLoader {
        fn load(&self, choice: ModelChoice) -> Result<LoadedModel> {
            let start = Instant::now();
            tracing::info!("Downloading {} from the HuggingFace hub", choice.id());
            let files = self.fetcher.fetch(choice.id())?;

            let tokenizer = HfTokenizer::from_file(&files.tokenizer, ns_core::MAX_INPUT_TOKENS)?;
            let model: Arc<dyn Seq2SeqModel> = match choice {
                ModelChoice::T5Small => {
                    Arc::new(T5Summarizer::load(choice.label(), &files, &self.device)?)
                }
                ModelChoice::BartLargeCnn => {
                    Arc::new(BartSummarizer::load(choice.label(), &files, &self.device)?)
                }
            };

            tracing::info!(
                "Built {} in {:.1}s",
                choice.id(),
                start.elapsed().as_secs_f64()
            );
            Ok(LoadedModel {
                tokenizer: Arc::new(tokenizer),
                model,
            })
        }
    }
}
