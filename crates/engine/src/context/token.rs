//! Token estimation utilities.
//!
//! Uses a character-based heuristic: one token per `chars_per_token`
//! characters, rounded up. Estimates are counted in `char`s so they agree
//! with the prompt length cap.

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}
