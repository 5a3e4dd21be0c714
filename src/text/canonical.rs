use std::fmt;

use serde::{Deserialize, Serialize};

use super::normalizer::NormalizedText;
use super::watermark::Watermark;

const GROUP_SIZE: usize = 3;

/// Canonical identity of a physical plate.
///
/// Both runs are kept in accumulation order. Reversal happens only when the
/// plate is rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlateSignature {
    pub letters: String,
    pub digits: String,
}

impl PlateSignature {
    pub fn new(letters: impl Into<String>, digits: impl Into<String>) -> Self {
        Self {
            letters: letters.into(),
            digits: digits.into(),
        }
    }

    /// Screen form: reversed letters, a space, reversed digits.
    pub fn display(&self) -> String {
        let letters: String = self.letters.chars().rev().collect();
        let digits: String = self.digits.chars().rev().collect();
        format!("{letters} {digits}")
    }
}

impl fmt::Display for PlateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Fixed-size chunks of a character sequence; the last chunk may be shorter.
pub fn chunk(chars: &[char], size: usize) -> Vec<&[char]> {
    if size == 0 {
        return vec![chars];
    }
    chars.chunks(size).collect()
}

/// Drops every group of three that holds any watermark character.
pub fn filter_watermark_groups(letters: &str, watermark: &Watermark) -> String {
    let chars: Vec<char> = letters.chars().collect();
    chunk(&chars, GROUP_SIZE)
        .into_iter()
        .filter(|group| !group.iter().any(|c| watermark.contains_char(*c)))
        .flat_map(|group| group.iter())
        .collect()
}

/// Merges normalized runs into a signature, or `None` when nothing survives.
pub fn canonicalize(text: &NormalizedText, watermark: &Watermark) -> Option<PlateSignature> {
    let joined = format!("{}{}", text.letters, text.digits);
    let cleaned = watermark.clean(&joined);

    let (digits, letters): (String, String) = cleaned.chars().partition(|c| c.is_numeric());
    let letters = filter_watermark_groups(&letters, watermark);

    if letters.is_empty() && digits.is_empty() {
        return None;
    }

    Some(PlateSignature { letters, digits })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(letters: &str, digits: &str) -> NormalizedText {
        NormalizedText {
            letters: letters.into(),
            digits: digits.into(),
        }
    }

    #[test]
    fn test_chunk_keeps_short_tail() {
        let chars: Vec<char> = "abcdefgh".chars().collect();
        let groups = chunk(&chars, 3);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2], &['g', 'h']);
        assert!(chunk(&[], 3).is_empty());
    }

    #[test]
    fn test_middle_watermark_group_is_dropped() {
        let wm = Watermark::default();
        let letters = "ابتمصرثجح";
        assert_eq!(filter_watermark_groups(letters, &wm), "ابتثجح");
    }

    #[test]
    fn test_group_with_single_watermark_char_is_dropped() {
        let wm = Watermark::default();
        assert_eq!(filter_watermark_groups("سلرطق", &wm), "طق");
        assert_eq!(filter_watermark_groups("سلطقر", &wm), "سلط");
    }

    #[test]
    fn test_canonicalize_drops_scrambled_watermark_group() {
        // out-of-order watermark letters survive pattern removal, not grouping
        let wm = Watermark::default();
        let sig = canonicalize(&text("ابترمصثجح", "١٢"), &wm).unwrap();
        assert_eq!(sig.letters, "ابتثجح");
        assert_eq!(sig.digits, "١٢");
    }

    #[test]
    fn test_canonicalize_removes_watermark_formed_by_concatenation() {
        let wm = Watermark::default();
        // "ر" at the head of the digit run completes "مص" once the runs are joined
        let sig = canonicalize(&text("بطمص", "ر٣٤"), &wm).unwrap();
        assert_eq!(sig.letters, "بط");
        assert_eq!(sig.digits, "٣٤");
    }

    #[test]
    fn test_canonicalize_moves_digits_out_of_letters() {
        let wm = Watermark::default();
        let sig = canonicalize(&text("س١ل", "٢"), &wm).unwrap();
        assert_eq!(sig, PlateSignature::new("سل", "١٢"));
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let wm = Watermark::default();
        let input = text("سلط", "٣٤٥");
        let first = canonicalize(&input, &wm);
        let second = canonicalize(&input, &wm);
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_plate_when_everything_filtered() {
        let wm = Watermark::default();
        assert_eq!(canonicalize(&text("مصر", ""), &wm), None);
        assert_eq!(canonicalize(&text("", ""), &wm), None);
    }

    #[test]
    fn test_display_reverses_both_runs() {
        let sig = PlateSignature::new("سلط", "١٢٣");
        assert_eq!(sig.display(), "طلس ٣٢١");
        assert_eq!(sig.to_string(), "طلس ٣٢١");
    }
}
