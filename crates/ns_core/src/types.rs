use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The two summarization models offered in the configuration panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelChoice {
    /// Small and fast; needs a task prefix.
    #[default]
    T5Small,
    /// Large and more accurate, fine-tuned on CNN/DailyMail.
    BartLargeCnn,
}

impl ModelChoice {
    pub const ALL: [ModelChoice; 2] = [ModelChoice::T5Small, ModelChoice::BartLargeCnn];

    /// Hub identifier of the pretrained checkpoint.
    pub fn id(&self) -> &'static str {
        match self {
            ModelChoice::T5Small => "t5-small",
            ModelChoice::BartLargeCnn => "facebook/bart-large-cnn",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelChoice::T5Small => "T5-small",
            ModelChoice::BartLargeCnn => "BART (Large CNN)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelChoice::T5Small => "faster",
            ModelChoice::BartLargeCnn => "more accurate",
        }
    }

    /// Text prepended to the article so the model knows which task to run.
    pub fn task_prefix(&self) -> Option<&'static str> {
        match self {
            ModelChoice::T5Small => Some("summarize: "),
            ModelChoice::BartLargeCnn => None,
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for ModelChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "t5-small" | "t5" | "t5small" => Ok(ModelChoice::T5Small),
            "facebook/bart-large-cnn" | "bart-large-cnn" | "bart" => Ok(ModelChoice::BartLargeCnn),
            other => Err(Error::UnsupportedModel(other.to_string())),
        }
    }
}

/// Bounds of one slider: inclusive range plus step, anchored at the range start.
#[derive(Debug, Clone)]
pub struct Slider {
    pub name: &'static str,
    pub range: RangeInclusive<u32>,
    pub step: u32,
    pub default: u32,
}

impl Slider {
    pub fn check(&self, value: u32) -> Result<u32> {
        if !self.range.contains(&value) {
            return Err(Error::Validation(format!(
                "{} must be between {} and {} (got {})",
                self.name,
                self.range.start(),
                self.range.end(),
                value
            )));
        }
        if (value - self.range.start()) % self.step != 0 {
            return Err(Error::Validation(format!(
                "{} must move in steps of {} from {} (got {})",
                self.name,
                self.step,
                self.range.start(),
                value
            )));
        }
        Ok(value)
    }
}

pub const MIN_LENGTH: Slider = Slider {
    name: "Minimum summary length",
    range: 10..=50,
    step: 5,
    default: 30,
};

pub const MAX_LENGTH: Slider = Slider {
    name: "Maximum summary length",
    range: 50..=150,
    step: 10,
    default: 100,
};

pub const NUM_BEAMS: Slider = Slider {
    name: "Beam search width",
    range: 2..=8,
    step: 1,
    default: 4,
};

/// User-facing generation parameters. Lengths are counted in model tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryParams {
    pub min_length: u32,
    pub max_length: u32,
    pub num_beams: u32,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            min_length: MIN_LENGTH.default,
            max_length: MAX_LENGTH.default,
            num_beams: NUM_BEAMS.default,
        }
    }
}

impl SummaryParams {
    pub fn new(min_length: u32, max_length: u32, num_beams: u32) -> Result<Self> {
        Self {
            min_length,
            max_length,
            num_beams,
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        MIN_LENGTH.check(self.min_length)?;
        MAX_LENGTH.check(self.max_length)?;
        NUM_BEAMS.check(self.num_beams)?;
        Ok(self)
    }
}

/// Everything the configuration panel captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub model: ModelChoice,
    pub params: SummaryParams,
}

/// Parameters handed to a model's generation routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    pub min_length: usize,
    pub max_length: usize,
    pub num_beams: usize,
    pub early_stopping: bool,
}

impl From<SummaryParams> for GenerationParams {
    fn from(params: SummaryParams) -> Self {
        Self {
            min_length: params.min_length as usize,
            max_length: params.max_length as usize,
            num_beams: params.num_beams as usize,
            early_stopping: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_choice_parsing() {
        assert_eq!("t5-small".parse::<ModelChoice>().unwrap(), ModelChoice::T5Small);
        assert_eq!("BART".parse::<ModelChoice>().unwrap(), ModelChoice::BartLargeCnn);
        assert_eq!(
            "facebook/bart-large-cnn".parse::<ModelChoice>().unwrap(),
            ModelChoice::BartLargeCnn
        );
        assert!(matches!(
            "gpt-2".parse::<ModelChoice>(),
            Err(Error::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_only_t5_has_prefix() {
        assert_eq!(ModelChoice::T5Small.task_prefix(), Some("summarize: "));
        assert_eq!(ModelChoice::BartLargeCnn.task_prefix(), None);
    }

    #[test]
    fn test_default_params() {
        let params = SummaryParams::default();
        assert_eq!(params.min_length, 30);
        assert_eq!(params.max_length, 100);
        assert_eq!(params.num_beams, 4);
        assert!(params.validated().is_ok());
    }

    #[test]
    fn test_param_bounds_and_steps() {
        assert!(SummaryParams::new(10, 150, 8).is_ok());
        assert!(SummaryParams::new(50, 50, 2).is_ok());
        assert!(SummaryParams::new(5, 100, 4).is_err());
        assert!(SummaryParams::new(32, 100, 4).is_err());
        assert!(SummaryParams::new(30, 160, 4).is_err());
        assert!(SummaryParams::new(30, 95, 4).is_err());
        assert!(SummaryParams::new(30, 100, 9).is_err());
    }

    #[test]
    fn test_generation_params_request_early_stopping() {
        let params = GenerationParams::from(SummaryParams::default());
        assert!(params.early_stopping);
        assert_eq!(params.num_beams, 4);
    }
}
