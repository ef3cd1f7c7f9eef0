//! Score adjustments applied to next-token log-probabilities.

use super::GenerationConfig;

/// Log-softmax over raw logits.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum: f32 = logits.iter().map(|l| (l - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|l| l - log_sum).collect()
}

/// Tokens that would complete an n-gram already present in `tokens`.
pub fn banned_ngram_tokens(tokens: &[u32], ngram_size: usize) -> Vec<u32> {
    if ngram_size == 0 || tokens.len() + 1 < ngram_size {
        return Vec::new();
    }
    let prefix = &tokens[tokens.len() + 1 - ngram_size..];
    tokens
        .windows(ngram_size)
        .filter(|window| &window[..ngram_size - 1] == prefix)
        .map(|window| window[ngram_size - 1])
        .collect()
}

fn force_only(scores: &mut [f32], token: u32) {
    for score in scores.iter_mut() {
        *score = f32::NEG_INFINITY;
    }
    if let Some(score) = scores.get_mut(token as usize) {
        *score = 0.0;
    }
}

/// Applies every configured processor in place. `tokens` is the sequence
/// generated so far, decoder start token included.
pub fn apply(scores: &mut [f32], tokens: &[u32], config: &GenerationConfig) {
    let cur_len = tokens.len();

    for token in banned_ngram_tokens(tokens, config.no_repeat_ngram_size) {
        if let Some(score) = scores.get_mut(token as usize) {
            *score = f32::NEG_INFINITY;
        }
    }

    if cur_len < config.min_length {
        if let Some(score) = scores.get_mut(config.eos_token_id as usize) {
            *score = f32::NEG_INFINITY;
        }
    }

    if let Some(bos) = config.forced_bos_token_id {
        if cur_len == 1 {
            force_only(scores, bos);
        }
    }

    if let Some(eos) = config.forced_eos_token_id {
        if cur_len + 1 == config.max_length {
            force_only(scores, eos);
        }
    }
}

/// The `k` best finite scores as `(token, score)`, best first.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut candidates: Vec<(u32, f32)> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .map(|(token, score)| (token as u32, *score))
        .collect();
    let by_score_desc = |a: &(u32, f32), b: &(u32, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
    if k > 0 && candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, by_score_desc);
        candidates.truncate(k);
    }
    candidates.sort_by(by_score_desc);
    candidates
}
