//! Speech synthesis for voice responses.

pub mod azure;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

pub use azure::{AzureSpeechConfig, AzureSpeechSynthesizer};

use crate::error::VaxError;

/// Turns response text into base64-encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn read_text(&self, text: &str) -> Result<String, VaxError>;
}

/// Strip markdown that reads badly aloud: emphasis and heading markers,
/// horizontal rules, links, and `<br>` tags.
pub fn normalize_markdown(text: &str) -> String {
    static PATTERNS: OnceLock<Option<[Regex; 4]>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        Some([
            Regex::new(r"[*#]").ok()?,
            Regex::new(r"-{2,}").ok()?,
            Regex::new(r"\[[^\]]*\]\([^)]*\)").ok()?,
            Regex::new(r"<br>").ok()?,
        ])
    });
    let Some(patterns) = patterns else {
        return text.to_string();
    };
    patterns
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_is_stripped_before_synthesis() {
        assert_eq!(
            normalize_markdown("**Bukit Batok Polyclinic**<br>---\nSee [map](https://maps.example)."),
            "Bukit Batok Polyclinic\nSee ."
        );
    }

    #[test]
    fn single_dashes_survive() {
        assert_eq!(normalize_markdown("2025-06-01 - 10am"), "2025-06-01 - 10am");
    }
}
