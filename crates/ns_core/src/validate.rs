use crate::{Error, Result};

/// Shortest accepted article, in characters after trimming.
pub const MIN_ARTICLE_CHARS: usize = 50;

pub const TOO_SHORT_MESSAGE: &str = "Please paste an article with at least 50 words.";

/// Returns the trimmed article, or a validation error when it is too short.
///
/// The threshold is a character count, not a word count.
pub fn validate_article(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_ARTICLE_CHARS {
        return Err(Error::Validation(TOO_SHORT_MESSAGE.to_string()));
    }
    Ok(trimmed)
}
