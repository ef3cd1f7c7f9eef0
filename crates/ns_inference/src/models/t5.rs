use std::sync::{Mutex, MutexGuard};

use candle_core::{Device, Tensor};
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use ns_core::{GenerationParams, Seq2SeqModel};

use super::hub::{read_config, var_builder, ModelFiles};
use crate::error::{InferenceError, Result};
use crate::generation::{beam_search, Decoder, GenerationConfig, ModelGenerationDefaults};

/// T5 through `candle-transformers`.
///
/// The candle model keeps its key/value cache internally, which cannot be
/// forked between beams, so it runs with the cache off and every step
/// re-decodes the beam's whole prefix.
pub struct T5Summarizer {
    name: String,
    model: Mutex<T5ForConditionalGeneration>,
    generation: GenerationConfig,
    device: Device,
}

impl T5Summarizer {
    pub fn load(name: &str, files: &ModelFiles, device: &Device) -> Result<Self> {
        let mut config: t5::Config = read_config(&files.config)?;
        config.use_cache = false;
        let defaults: ModelGenerationDefaults = read_config(&files.config)?;

        let vb = var_builder(&files.weights, device)?;
        let model = T5ForConditionalGeneration::load(vb, &config)?;

        Ok(Self {
            name: name.to_string(),
            model: Mutex::new(model),
            generation: defaults.into_config(),
            device: device.clone(),
        })
    }

    fn model(&self) -> Result<MutexGuard<'_, T5ForConditionalGeneration>> {
        self.model
            .lock()
            .map_err(|_| InferenceError::Model("T5 model lock poisoned".to_string()))
    }
}

impl Decoder for T5Summarizer {
    type Memory = Tensor;

    fn encode(&self, input_ids: &[u32]) -> Result<Tensor> {
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let mut model = self.model()?;
        model.clear_kv_cache();
        Ok(model.encode(&input)?)
    }

    fn step(&self, tokens: &[u32], memory: &Tensor) -> Result<(Vec<f32>, Tensor)> {
        let decoder_input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let logits = self.model()?.decode(&decoder_input, memory)?;
        let logits = logits.squeeze(0)?.to_vec1::<f32>()?;
        Ok((logits, memory.clone()))
    }
}

impl Seq2SeqModel for T5Summarizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> ns_core::Result<Vec<u32>> {
        let config = self.generation.with_params(params);
        tracing::debug!(
            "T5 generation: {} input tokens, {:?}",
            input_ids.len(),
            config
        );
        Ok(beam_search(self, input_ids, &config)?)
    }
}
