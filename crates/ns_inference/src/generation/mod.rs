//! Beam-search generation shared by every encoder-decoder backend.

pub mod processors;

use ns_core::GenerationParams;
use serde::Deserialize;

use crate::error::{InferenceError, Result};

/// Decoding settings: the user's bounds plus the model's own defaults.
///
/// Lengths count the decoder start token.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub num_beams: usize,
    pub early_stopping: bool,
    /// Exponent applied to the hypothesis length when ranking finished beams.
    pub length_penalty: f64,
    pub no_repeat_ngram_size: usize,
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
    pub forced_bos_token_id: Option<u32>,
    pub forced_eos_token_id: Option<u32>,
}

impl GenerationConfig {
    pub fn with_params(&self, params: &GenerationParams) -> Self {
        Self {
            min_length: params.min_length,
            max_length: params.max_length,
            num_beams: params.num_beams.max(1),
            early_stopping: params.early_stopping,
            ..self.clone()
        }
    }
}

/// Generation defaults as found in a hub `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelGenerationDefaults {
    #[serde(default)]
    pub decoder_start_token_id: Option<u32>,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
    #[serde(default)]
    pub eos_token_id: Option<u32>,
    #[serde(default)]
    pub forced_bos_token_id: Option<u32>,
    #[serde(default)]
    pub forced_eos_token_id: Option<u32>,
    #[serde(default)]
    pub no_repeat_ngram_size: Option<usize>,
    #[serde(default)]
    pub length_penalty: Option<f64>,
}

impl ModelGenerationDefaults {
    pub fn into_config(self) -> GenerationConfig {
        let params = GenerationParams::from(ns_core::SummaryParams::default());
        GenerationConfig {
            min_length: params.min_length,
            max_length: params.max_length,
            num_beams: params.num_beams,
            early_stopping: params.early_stopping,
            length_penalty: self.length_penalty.unwrap_or(1.0),
            no_repeat_ngram_size: self.no_repeat_ngram_size.unwrap_or(0),
            decoder_start_token_id: self
                .decoder_start_token_id
                .or(self.pad_token_id)
                .unwrap_or(0),
            eos_token_id: self.eos_token_id.unwrap_or(1),
            forced_bos_token_id: self.forced_bos_token_id,
            forced_eos_token_id: self.forced_eos_token_id,
        }
    }
}

/// An encoder-decoder model seen one decoding step at a time.
///
/// `Memory` holds whatever the model keeps between steps (encoder output,
/// key/value caches). It is cloned whenever a beam branches, so it should be
/// cheap to clone.
pub trait Decoder {
    type Memory: Clone;

    fn encode(&self, input_ids: &[u32]) -> Result<Self::Memory>;

    /// Logits for the token following `tokens`. `memory` covers every token
    /// but the last one; the returned memory covers all of `tokens`.
    fn step(&self, tokens: &[u32], memory: &Self::Memory) -> Result<(Vec<f32>, Self::Memory)>;
}

struct Beam<M> {
    tokens: Vec<u32>,
    score: f32,
    memory: M,
}

struct Candidate {
    beam: usize,
    token: u32,
    score: f32,
}

/// Best finished hypotheses, ranked by length-normalized score.
struct Hypotheses {
    num_beams: usize,
    length_penalty: f64,
    early_stopping: bool,
    entries: Vec<(f64, Vec<u32>)>,
}

impl Hypotheses {
    fn new(config: &GenerationConfig) -> Self {
        Self {
            num_beams: config.num_beams,
            length_penalty: config.length_penalty,
            early_stopping: config.early_stopping,
            entries: Vec::with_capacity(config.num_beams + 1),
        }
    }

    fn normalize(&self, score: f32, len: usize) -> f64 {
        score as f64 / (len.max(1) as f64).powf(self.length_penalty)
    }

    fn worst(&self) -> f64 {
        self.entries
            .iter()
            .map(|(score, _)| *score)
            .fold(f64::INFINITY, f64::min)
    }

    fn add(&mut self, tokens: Vec<u32>, score: f32) {
        let normalized = self.normalize(score, tokens.len());
        if self.entries.len() < self.num_beams || normalized > self.worst() {
            self.entries.push((normalized, tokens));
            if self.entries.len() > self.num_beams {
                let worst = self
                    .entries
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                    .map(|(index, _)| index);
                if let Some(index) = worst {
                    self.entries.remove(index);
                }
            }
        }
    }

    fn is_done(&self, best_running: f32, cur_len: usize) -> bool {
        if self.entries.len() < self.num_beams {
            return false;
        }
        if self.early_stopping {
            return true;
        }
        self.worst() >= self.normalize(best_running, cur_len)
    }

    fn best(self) -> Option<Vec<u32>> {
        self.entries
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, tokens)| tokens)
    }
}

/// Runs beam search and returns the best sequence, decoder start included.
pub fn beam_search<D: Decoder>(
    decoder: &D,
    input_ids: &[u32],
    config: &GenerationConfig,
) -> Result<Vec<u32>> {
    if input_ids.is_empty() {
        return Err(InferenceError::Tokenization("Cannot generate from empty input".to_string()));
    }
    let num_beams = config.num_beams.max(1);

    let memory = decoder.encode(input_ids)?;
    let mut beams = vec![Beam {
        tokens: vec![config.decoder_start_token_id],
        score: 0.0,
        memory,
    }];
    let mut finished = Hypotheses::new(config);

    while beams[0].tokens.len() < config.max_length {
        let cur_len = beams[0].tokens.len();
        let mut candidates = Vec::with_capacity(beams.len() * num_beams * 2);
        let mut memories = Vec::with_capacity(beams.len());

        for (index, beam) in beams.iter().enumerate() {
            let (logits, memory) = decoder.step(&beam.tokens, &beam.memory)?;
            let mut scores = processors::log_softmax(&logits);
            processors::apply(&mut scores, &beam.tokens, config);
            for (token, score) in processors::top_k(&scores, 2 * num_beams) {
                candidates.push(Candidate {
                    beam: index,
                    token,
                    score: beam.score + score,
                });
            }
            memories.push(memory);
        }

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut next = Vec::with_capacity(num_beams);
        for (rank, candidate) in candidates.into_iter().enumerate() {
            let parent = &beams[candidate.beam];
            if candidate.token == config.eos_token_id {
                if rank < num_beams {
                    finished.add(parent.tokens.clone(), candidate.score);
                }
            } else {
                let mut tokens = parent.tokens.clone();
                tokens.push(candidate.token);
                next.push(Beam {
                    tokens,
                    score: candidate.score,
                    memory: memories[candidate.beam].clone(),
                });
            }
            if next.len() == num_beams {
                break;
            }
        }

        if next.is_empty() {
            tracing::debug!("All beams finished at length {}", cur_len);
            return finished.best().ok_or_else(|| {
                InferenceError::Model("Beam search produced no hypothesis".to_string())
            });
        }

        let best_running = next[0].score;
        beams = next;
        if finished.is_done(best_running, cur_len + 1) {
            tracing::debug!("Early stopping at length {}", cur_len + 1);
            return finished.best().ok_or_else(|| {
                InferenceError::Model("Beam search produced no hypothesis".to_string())
            });
        }
    }

    for beam in beams {
        finished.add(beam.tokens, beam.score);
    }
    finished
        .best()
        .ok_or_else(|| InferenceError::Model("Beam search produced no hypothesis".to_string()))
}
