use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};

use crate::error::{InferenceError, Result};

/// Local paths of everything needed to build one model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub config: PathBuf,
    pub weights: PathBuf,
}

/// Fetches model files from the HuggingFace hub into the local cache.
#[derive(Debug, Clone, Default)]
pub struct HubFetcher {
    cache_dir: Option<PathBuf>,
}

impl HubFetcher {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }

    fn api(&self) -> Result<Api> {
        let api = match &self.cache_dir {
            Some(dir) => ApiBuilder::new().with_cache_dir(dir.clone()).build()?,
            None => Api::new()?,
        };
        Ok(api)
    }

    fn get(repo: &ApiRepo, repo_id: &str, filename: &str) -> Result<PathBuf> {
        repo.get(filename).map_err(|e| {
            InferenceError::Download(format!(
                "Failed to download '{}' from '{}': {}",
                filename, repo_id, e
            ))
        })
    }

    pub fn fetch(&self, repo_id: &str) -> Result<ModelFiles> {
        let api = self.api()?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

        tracing::debug!("Fetching tokenizer, config and weights for {}", repo_id);
        let tokenizer = Self::get(&repo, repo_id, "tokenizer.json")?;
        let config = Self::get(&repo, repo_id, "config.json")?;
        let weights = Self::get(&repo, repo_id, "model.safetensors")?;

        Ok(ModelFiles {
            tokenizer,
            config,
            weights,
        })
    }
}

pub fn read_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn var_builder(weights: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    // SAFETY: the weights file is memory-mapped read-only and is not modified
    // while the model is alive.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };
    Ok(vb)
}
