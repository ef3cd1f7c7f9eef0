use serde::{Deserialize, Serialize};

/// Statistics shown under a summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub original_words: usize,
    pub summary_words: usize,
    /// Percentage of words removed, rounded to one decimal.
    pub compression: f64,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// `round((1 - summary/original) * 100, 1)`; zero original words yields 0.0.
pub fn compression_percent(original_words: usize, summary_words: usize) -> f64 {
    if original_words == 0 {
        return 0.0;
    }
    let ratio = 1.0 - summary_words as f64 / original_words as f64;
    round_to_tenth(ratio * 100.0)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl SummaryMetrics {
    pub fn compute(original: &str, summary: &str) -> Self {
        let original_words = word_count(original);
        let summary_words = word_count(summary);
        Self {
            original_words,
            summary_words,
            compression: compression_percent(original_words, summary_words),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_values() {
        assert_eq!(compression_percent(100, 25), 75.0);
        assert_eq!(compression_percent(3, 3), 0.0);
        assert_eq!(compression_percent(3, 1), 66.7);
        assert_eq!(compression_percent(7, 2), 71.4);
    }

    #[test]
    fn test_longer_summary_gives_negative_compression() {
        assert_eq!(compression_percent(10, 15), -50.0);
    }

    #[test]
    fn test_zero_original_words_is_special_cased() {
        assert_eq!(compression_percent(0, 0), 0.0);
        assert_eq!(compression_percent(0, 12), 0.0);
        let metrics = SummaryMetrics::compute("   \n\t ", "a summary");
        assert_eq!(metrics.original_words, 0);
        assert_eq!(metrics.compression, 0.0);
    }

    #[test]
    fn test_word_count_uses_any_whitespace() {
        assert_eq!(word_count("one  two\tthree\nfour "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_compute_is_pure() {
        let original = "word ".repeat(100);
        let summary = "word ".repeat(25);
        let first = SummaryMetrics::compute(&original, &summary);
        let second = SummaryMetrics::compute(&original, &summary);
        assert_eq!(first, second);
        assert_eq!(first.original_words, 100);
        assert_eq!(first.summary_words, 25);
        assert_eq!(first.compression, 75.0);
    }
}
