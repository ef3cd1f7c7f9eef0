pub mod cache;
pub mod error;
pub mod generation;
pub mod models;
pub mod summarizer;

use std::path::PathBuf;
use std::sync::Arc;

use ns_core::ModelLoader;

pub use cache::ModelCache;
pub use error::InferenceError;
pub use summarizer::{Summarizer, Summary, SummarizeError, EXECUTION_HINT};

/// How models are obtained.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Hub cache directory; the standard HuggingFace location when unset.
    pub cache_dir: Option<PathBuf>,
    /// Use the offline dummy backend instead of downloading models.
    pub dummy: bool,
}

/// Build the memoized loader the rest of the process shares.
pub fn create_loader(config: &Config) -> ns_core::Result<Arc<dyn ModelLoader>> {
    let inner: Arc<dyn ModelLoader> = if config.dummy {
        tracing::warn!("Using the offline dummy backend; summaries are lead words only");
        Arc::new(models::DummyLoader::new())
    } else {
        hub_loader(config)?
    };
    Ok(Arc::new(ModelCache::new(inner)))
}

#[cfg(feature = "candle")]
fn hub_loader(config: &Config) -> ns_core::Result<Arc<dyn ModelLoader>> {
    Ok(Arc::new(models::HubLoader::new(config.cache_dir.clone())))
}

#[cfg(not(feature = "candle"))]
fn hub_loader(_config: &Config) -> ns_core::Result<Arc<dyn ModelLoader>> {
    Err(ns_core::Error::UnsupportedModel(
        "built without the `candle` feature; run with --dummy".to_string(),
    ))
}

pub fn create_summarizer(config: &Config) -> ns_core::Result<Summarizer> {
    Ok(Summarizer::new(create_loader(config)?))
}

pub mod prelude {
    pub use super::{
        create_loader, create_summarizer, Config, ModelCache, SummarizeError, Summarizer,
        Summary,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_core::ModelChoice;

    #[test]
    fn test_dummy_config_builds_cached_loader() {
        let loader = create_loader(&Config {
            cache_dir: None,
            dummy: true,
        })
        .unwrap();
        let loaded = loader.load(ModelChoice::T5Small).unwrap();
        assert_eq!(loaded.model.name(), "Dummy (t5-small)");
    }
}
