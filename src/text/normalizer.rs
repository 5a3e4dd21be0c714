use serde::{Deserialize, Serialize};

use crate::capabilities::RawToken;

use super::translation::CharTable;
use super::watermark::Watermark;

/// Letter and digit runs in reading order, before any reversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub letters: String,
    pub digits: String,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.letters.is_empty() && self.digits.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    watermark: Watermark,
    table: CharTable,
}

impl TextNormalizer {
    pub fn new(watermark: Watermark, table: CharTable) -> Self {
        Self { watermark, table }
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Splits raw OCR lines into a letter run and a digit run.
    ///
    /// Lines are read top to bottom. Empty lines and lines made only of Latin
    /// letters are skipped, Latin letters left inside other lines are dropped,
    /// and every remaining character goes through the translation table before
    /// it is classified. The watermark is removed per line and once more from
    /// the accumulated letters, which catches a word split across lines.
    pub fn normalize(&self, lines: &[RawToken]) -> NormalizedText {
        let mut ordered: Vec<&RawToken> = lines.iter().collect();
        ordered.sort_by(|a, b| a.top.total_cmp(&b.top));

        let mut letters = String::new();
        let mut digits = String::new();

        for line in ordered {
            let cleaned = self.watermark.clean(&line.text);
            if cleaned.is_empty() || is_latin_word(&cleaned) {
                continue;
            }

            for ch in cleaned.chars() {
                let mapped = self.table.translate(ch);
                if mapped.is_numeric() {
                    digits.push(mapped);
                } else if !mapped.is_whitespace() && !is_latin_letter(mapped) {
                    letters.push(mapped);
                }
            }
        }

        NormalizedText {
            letters: self.watermark.remove(&letters),
            digits,
        }
    }
}

pub(crate) fn is_latin_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic()
}

fn is_latin_word(text: &str) -> bool {
    text.chars().all(is_latin_letter)
}
