//! BART encoder-decoder on `candle-nn`.
//!
//! `candle-transformers` ships no BART, so the architecture lives here. Only
//! the post-layer-norm variant used by the CNN/DailyMail checkpoints is
//! supported. The decoder is stateless: each step takes the previous
//! key/value caches and returns extended ones, so beams can share and fork
//! them freely.

use std::sync::Arc;

use candle_core::{Device, Module, Tensor};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, VarBuilder};
use ns_core::{GenerationParams, Seq2SeqModel};
use serde::Deserialize;

use super::hub::{read_config, var_builder, ModelFiles};
use crate::error::{InferenceError, Result};
use crate::generation::{beam_search, Decoder, GenerationConfig, ModelGenerationDefaults};

/// Learned positional embeddings are stored with two leading padding rows.
const POSITION_OFFSET: usize = 2;
const LAYER_NORM_EPS: f64 = 1e-5;

fn default_activation() -> String {
    "gelu".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BartConfig {
    pub vocab_size: usize,
    pub d_model: usize,
    pub encoder_layers: usize,
    pub decoder_layers: usize,
    pub encoder_attention_heads: usize,
    pub decoder_attention_heads: usize,
    pub encoder_ffn_dim: usize,
    pub decoder_ffn_dim: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "default_activation")]
    pub activation_function: String,
    #[serde(default)]
    pub scale_embedding: bool,
    #[serde(default)]
    pub normalize_before: bool,
}

#[derive(Debug, Clone, Copy)]
enum Activation {
    Gelu,
    GeluNew,
    Relu,
}

impl Activation {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "gelu" => Ok(Activation::Gelu),
            "gelu_new" => Ok(Activation::GeluNew),
            "relu" => Ok(Activation::Relu),
            other => Err(InferenceError::Unsupported(format!(
                "activation function '{}'",
                other
            ))),
        }
    }

    fn apply(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Gelu => xs.gelu_erf(),
            Activation::GeluNew => xs.gelu(),
            Activation::Relu => xs.relu(),
        }
    }
}

#[derive(Debug, Clone)]
struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scaling: f64,
}

impl Attention {
    fn load(d_model: usize, num_heads: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let head_dim = d_model / num_heads;
        Ok(Self {
            q_proj: linear(d_model, d_model, vb.pp("q_proj"))?,
            k_proj: linear(d_model, d_model, vb.pp("k_proj"))?,
            v_proj: linear(d_model, d_model, vb.pp("v_proj"))?,
            out_proj: linear(d_model, d_model, vb.pp("out_proj"))?,
            num_heads,
            head_dim,
            scaling: (head_dim as f64).powf(-0.5),
        })
    }

    /// (batch, seq, d_model) -> (batch, heads, seq, head_dim)
    fn split_heads(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, _) = xs.dims3()?;
        xs.reshape((b, t, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn project_kv(&self, xs: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let k = self.split_heads(&self.k_proj.forward(xs)?)?;
        let v = self.split_heads(&self.v_proj.forward(xs)?)?;
        Ok((k, v))
    }

    fn attend(
        &self,
        xs: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        let (b, t, _) = xs.dims3()?;
        let q = self.split_heads(&(self.q_proj.forward(xs)? * self.scaling)?)?;
        let mut weights = q.matmul(&k.t()?.contiguous()?)?;
        if let Some(mask) = mask {
            weights = weights.broadcast_add(mask)?;
        }
        let weights = candle_nn::ops::softmax_last_dim(&weights)?;
        let out = weights
            .matmul(v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, self.num_heads * self.head_dim))?;
        self.out_proj.forward(&out)
    }
}

#[derive(Debug, Clone)]
struct FeedForward {
    fc1: Linear,
    fc2: Linear,
    activation: Activation,
}

impl FeedForward {
    fn load(
        d_model: usize,
        ffn_dim: usize,
        activation: Activation,
        vb: &VarBuilder,
    ) -> candle_core::Result<Self> {
        Ok(Self {
            fc1: linear(d_model, ffn_dim, vb.pp("fc1"))?,
            fc2: linear(ffn_dim, d_model, vb.pp("fc2"))?,
            activation,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.activation.apply(&self.fc1.forward(xs)?)?;
        self.fc2.forward(&hidden)
    }
}

#[derive(Debug, Clone)]
struct EncoderLayer {
    self_attn: Attention,
    self_attn_layer_norm: LayerNorm,
    ffn: FeedForward,
    final_layer_norm: LayerNorm,
}

impl EncoderLayer {
    fn load(cfg: &BartConfig, activation: Activation, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            self_attn: Attention::load(cfg.d_model, cfg.encoder_attention_heads, vb.pp("self_attn"))?,
            self_attn_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("self_attn_layer_norm"))?,
            ffn: FeedForward::load(cfg.d_model, cfg.encoder_ffn_dim, activation, &vb)?,
            final_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (k, v) = self.self_attn.project_kv(xs)?;
        let attended = self.self_attn.attend(xs, &k, &v, None)?;
        let xs = self.self_attn_layer_norm.forward(&(xs + attended)?)?;
        let hidden = self.ffn.forward(&xs)?;
        self.final_layer_norm.forward(&(&xs + hidden)?)
    }
}

/// (new, past + new) additive mask hiding positions after each new token.
fn causal_mask(new: usize, past: usize, device: &Device) -> candle_core::Result<Tensor> {
    let total = past + new;
    let mask: Vec<f32> = (0..new)
        .flat_map(|i| {
            (0..total).map(move |j| if j > past + i { f32::NEG_INFINITY } else { 0.0 })
        })
        .collect();
    Tensor::from_vec(mask, (new, total), device)
}

/// Keys and values one decoder layer has accumulated so far.
#[derive(Debug, Clone)]
pub struct LayerCache {
    self_kv: Option<(Tensor, Tensor)>,
    cross_kv: (Tensor, Tensor),
}

#[derive(Debug, Clone)]
struct DecoderLayer {
    self_attn: Attention,
    self_attn_layer_norm: LayerNorm,
    encoder_attn: Attention,
    encoder_attn_layer_norm: LayerNorm,
    ffn: FeedForward,
    final_layer_norm: LayerNorm,
}

impl DecoderLayer {
    fn load(cfg: &BartConfig, activation: Activation, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            self_attn: Attention::load(cfg.d_model, cfg.decoder_attention_heads, vb.pp("self_attn"))?,
            self_attn_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("self_attn_layer_norm"))?,
            encoder_attn: Attention::load(
                cfg.d_model,
                cfg.decoder_attention_heads,
                vb.pp("encoder_attn"),
            )?,
            encoder_attn_layer_norm: layer_norm(
                cfg.d_model,
                LAYER_NORM_EPS,
                vb.pp("encoder_attn_layer_norm"),
            )?,
            ffn: FeedForward::load(cfg.d_model, cfg.decoder_ffn_dim, activation, &vb)?,
            final_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
        })
    }

    fn start(&self, encoder_output: &Tensor) -> candle_core::Result<LayerCache> {
        Ok(LayerCache {
            self_kv: None,
            cross_kv: self.encoder_attn.project_kv(encoder_output)?,
        })
    }

    /// New positions attend to the cached ones and causally to each other.
    fn forward(&self, xs: &Tensor, cache: &LayerCache) -> candle_core::Result<(Tensor, LayerCache)> {
        let (_, new, _) = xs.dims3()?;
        let (k_new, v_new) = self.self_attn.project_kv(xs)?;
        let (k, v) = match &cache.self_kv {
            Some((k_past, v_past)) => (
                Tensor::cat(&[k_past, &k_new], 2)?,
                Tensor::cat(&[v_past, &v_new], 2)?,
            ),
            None => (k_new, v_new),
        };

        let mask = if new > 1 {
            let past = k.dim(2)? - new;
            Some(causal_mask(new, past, xs.device())?)
        } else {
            None
        };
        let attended = self.self_attn.attend(xs, &k, &v, mask.as_ref())?;
        let xs = self.self_attn_layer_norm.forward(&(xs + attended)?)?;

        let (cross_k, cross_v) = &cache.cross_kv;
        let attended = self.encoder_attn.attend(&xs, cross_k, cross_v, None)?;
        let xs = self.encoder_attn_layer_norm.forward(&(&xs + attended)?)?;

        let hidden = self.ffn.forward(&xs)?;
        let xs = self.final_layer_norm.forward(&(&xs + hidden)?)?;

        Ok((
            xs,
            LayerCache {
                self_kv: Some((k, v)),
                cross_kv: cache.cross_kv.clone(),
            },
        ))
    }
}

pub struct BartModel {
    shared: Embedding,
    encoder_positions: Embedding,
    decoder_positions: Embedding,
    encoder_layernorm_embedding: LayerNorm,
    decoder_layernorm_embedding: LayerNorm,
    encoder_layers: Vec<EncoderLayer>,
    decoder_layers: Vec<DecoderLayer>,
    lm_head: Linear,
    final_logits_bias: Option<Tensor>,
    embed_scale: f64,
    max_positions: usize,
    device: Device,
}

impl BartModel {
    pub fn load(cfg: &BartConfig, vb: VarBuilder, device: &Device) -> Result<Self> {
        if cfg.normalize_before {
            return Err(InferenceError::Unsupported(
                "pre-layer-norm BART variants".to_string(),
            ));
        }
        let activation = Activation::parse(&cfg.activation_function)?;
        let model = vb.pp("model");
        let positions = cfg.max_position_embeddings + POSITION_OFFSET;

        let shared = embedding(cfg.vocab_size, cfg.d_model, model.pp("shared"))?;
        let encoder = model.pp("encoder");
        let decoder = model.pp("decoder");

        let encoder_layers = (0..cfg.encoder_layers)
            .map(|i| EncoderLayer::load(cfg, activation, encoder.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let decoder_layers = (0..cfg.decoder_layers)
            .map(|i| DecoderLayer::load(cfg, activation, decoder.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let final_logits_bias = vb.get((1, cfg.vocab_size), "final_logits_bias").ok();
        let lm_head = Linear::new(shared.embeddings().clone(), None);

        Ok(Self {
            encoder_positions: embedding(positions, cfg.d_model, encoder.pp("embed_positions"))?,
            decoder_positions: embedding(positions, cfg.d_model, decoder.pp("embed_positions"))?,
            encoder_layernorm_embedding: layer_norm(
                cfg.d_model,
                LAYER_NORM_EPS,
                encoder.pp("layernorm_embedding"),
            )?,
            decoder_layernorm_embedding: layer_norm(
                cfg.d_model,
                LAYER_NORM_EPS,
                decoder.pp("layernorm_embedding"),
            )?,
            shared,
            encoder_layers,
            decoder_layers,
            lm_head,
            final_logits_bias,
            embed_scale: if cfg.scale_embedding {
                (cfg.d_model as f64).sqrt()
            } else {
                1.0
            },
            max_positions: cfg.max_position_embeddings,
            device: device.clone(),
        })
    }

    fn embed(&self, ids: &[u32], table: &Embedding, start: usize) -> Result<Tensor> {
        if start + ids.len() > self.max_positions {
            return Err(InferenceError::Model(format!(
                "Sequence of {} tokens exceeds {} positions",
                start + ids.len(),
                self.max_positions
            )));
        }
        let input = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let tokens = (self.shared.forward(&input)? * self.embed_scale)?;
        let first = (start + POSITION_OFFSET) as u32;
        let positions = Tensor::arange(first, first + ids.len() as u32, &self.device)?;
        let positions = table.forward(&positions)?;
        Ok(tokens.broadcast_add(&positions)?)
    }

    pub fn encode(&self, input_ids: &[u32]) -> Result<Tensor> {
        let xs = self.embed(input_ids, &self.encoder_positions, 0)?;
        let mut xs = self.encoder_layernorm_embedding.forward(&xs)?;
        for layer in &self.encoder_layers {
            xs = layer.forward(&xs)?;
        }
        Ok(xs)
    }

    pub fn start_decoding(&self, encoder_output: &Tensor) -> Result<Vec<LayerCache>> {
        Ok(self
            .decoder_layers
            .iter()
            .map(|layer| layer.start(encoder_output))
            .collect::<candle_core::Result<Vec<_>>>()?)
    }

    /// Logits for the token after `token`, which sits at `position`.
    pub fn decode_step(
        &self,
        token: u32,
        position: usize,
        caches: &[LayerCache],
    ) -> Result<(Vec<f32>, Vec<LayerCache>)> {
        self.decode(&[token], position, caches)
    }

    /// Runs `tokens`, the first of which sits at `position`, on top of
    /// `caches` and returns the logits after the last one.
    pub fn decode(
        &self,
        tokens: &[u32],
        position: usize,
        caches: &[LayerCache],
    ) -> Result<(Vec<f32>, Vec<LayerCache>)> {
        if tokens.is_empty() {
            return Err(InferenceError::Model("Nothing to decode".to_string()));
        }
        let xs = self.embed(tokens, &self.decoder_positions, position)?;
        let mut xs = self.decoder_layernorm_embedding.forward(&xs)?;
        let mut next = Vec::with_capacity(caches.len());
        for (layer, cache) in self.decoder_layers.iter().zip(caches) {
            let (out, cache) = layer.forward(&xs, cache)?;
            xs = out;
            next.push(cache);
        }

        let last = xs.narrow(1, tokens.len() - 1, 1)?;
        let mut logits = self.lm_head.forward(&last)?.squeeze(0)?;
        if let Some(bias) = &self.final_logits_bias {
            logits = logits.broadcast_add(bias)?;
        }
        Ok((logits.flatten_all()?.to_vec1::<f32>()?, next))
    }
}

/// BART wired into beam search.
pub struct BartSummarizer {
    name: String,
    model: BartModel,
    generation: GenerationConfig,
}

impl BartSummarizer {
    pub fn load(name: &str, files: &ModelFiles, device: &Device) -> Result<Self> {
        let config: BartConfig = read_config(&files.config)?;
        let defaults: ModelGenerationDefaults = read_config(&files.config)?;
        let vb = var_builder(&files.weights, device)?;
        Ok(Self {
            name: name.to_string(),
            model: BartModel::load(&config, vb, device)?,
            generation: defaults.into_config(),
        })
    }
}

impl Decoder for BartSummarizer {
    type Memory = Arc<Vec<LayerCache>>;

    fn encode(&self, input_ids: &[u32]) -> Result<Self::Memory> {
        let encoder_output = self.model.encode(input_ids)?;
        Ok(Arc::new(self.model.start_decoding(&encoder_output)?))
    }

    fn step(&self, tokens: &[u32], memory: &Self::Memory) -> Result<(Vec<f32>, Self::Memory)> {
        let position = tokens.len() - 1;
        let (logits, caches) = self.model.decode_step(tokens[position], position, memory)?;
        Ok((logits, Arc::new(caches)))
    }
}

impl Seq2SeqModel for BartSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> ns_core::Result<Vec<u32>> {
        let config = self.generation.with_params(params);
        tracing::debug!(
            "BART generation: {} input tokens, {:?}",
            input_ids.len(),
            config
        );
        Ok(beam_search(self, input_ids, &config)?)
    }
}
