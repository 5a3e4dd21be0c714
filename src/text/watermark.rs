use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const TATWEEL: char = '\u{0640}';

/// The decorative word printed on every plate, and its Latin spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    pub word: String,
    pub latin: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            word: "مصر".into(),
            latin: "EGYPT".into(),
        }
    }
}

/// Compiled watermark patterns shared by the normalizer and canonicalizer.
#[derive(Debug, Clone)]
pub struct Watermark {
    word: Option<Regex>,
    latin: Option<Regex>,
    charset: Vec<char>,
}

impl Watermark {
    pub fn new(config: &WatermarkConfig) -> Result<Self> {
        let word_chars: Vec<char> = strip_diacritics(&config.word)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        // Letters may be separated by any run of whitespace or tatweel.
        let word = if word_chars.is_empty() {
            None
        } else {
            let separator = format!(r"[\s{}]*", TATWEEL);
            let body = word_chars
                .iter()
                .map(|c| regex::escape(&c.to_string()))
                .collect::<Vec<_>>()
                .join(&separator);
            Some(
                Regex::new(&format!("(?i){body}"))
                    .with_context(|| format!("invalid watermark word '{}'", config.word))?,
            )
        };

        let latin_trimmed = config.latin.trim();
        let latin = if latin_trimmed.is_empty() {
            None
        } else {
            Some(
                Regex::new(&format!("(?i){}", regex::escape(latin_trimmed)))
                    .with_context(|| format!("invalid watermark transliteration '{}'", config.latin))?,
            )
        };

        let mut charset = word_chars;
        charset.sort_unstable();
        charset.dedup();

        Ok(Self {
            word,
            latin,
            charset,
        })
    }

    /// Whitespace removal, diacritic stripping, then watermark removal.
    pub fn clean(&self, text: &str) -> String {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let plain = strip_diacritics(&compact);
        self.remove(&plain)
    }

    /// Removes every occurrence of the word and its transliteration.
    pub fn remove(&self, text: &str) -> String {
        let mut out = text.to_string();
        if let Some(word) = &self.word {
            out = word.replace_all(&out, "").into_owned();
        }
        if let Some(latin) = &self.latin {
            out = latin.replace_all(&out, "").into_owned();
        }
        out
    }

    pub fn contains_char(&self, ch: char) -> bool {
        self.charset.binary_search(&ch).is_ok()
    }

    pub fn charset(&self) -> &[char] {
        &self.charset
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new(&WatermarkConfig::default()).expect("default watermark patterns compile")
    }
}

/// Canonical decomposition with combining marks dropped.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_contiguous_word() {
        let wm = Watermark::default();
        assert_eq!(wm.clean("مصرسل"), "سل");
    }

    #[test]
    fn test_removes_letter_spaced_word() {
        let wm = Watermark::default();
        assert_eq!(wm.remove("م ص  ر"), "");
        assert_eq!(wm.clean("م   ص ر ب"), "ب");
    }

    #[test]
    fn test_removes_word_with_diacritics_and_tatweel() {
        let wm = Watermark::default();
        // fatha and shadda between letters, tatweel before the last one
        assert_eq!(wm.clean("مَصّـر"), "");
    }

    #[test]
    fn test_removes_transliteration_case_insensitively() {
        let wm = Watermark::default();
        assert_eq!(wm.clean("Egypt"), "");
        assert_eq!(wm.clean("eGyPt123"), "123");
    }

    #[test]
    fn test_charset_membership() {
        let wm = Watermark::default();
        assert!(wm.contains_char('م'));
        assert!(wm.contains_char('ص'));
        assert!(wm.contains_char('ر'));
        assert!(!wm.contains_char('س'));
        assert_eq!(wm.charset().len(), 3);
    }

    #[test]
    fn test_empty_config_removes_nothing() {
        let wm = Watermark::new(&WatermarkConfig {
            word: String::new(),
            latin: " ".into(),
        })
        .unwrap();
        assert_eq!(wm.clean("مصر EGYPT"), "مصرEGYPT");
        assert!(wm.charset().is_empty());
    }

    #[test]
    fn test_strip_diacritics_keeps_base_letters() {
        assert_eq!(strip_diacritics("café"), "cafe");
        assert_eq!(strip_diacritics("سَلِم"), "سلم");
    }
}
