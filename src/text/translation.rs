use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Single-character translation from OCR output to the plate script.
///
/// Characters without an entry translate to themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharTable {
    entries: HashMap<char, char>,
}

const LATIN_DIGITS: [(char, char); 10] = [
    ('0', '٠'),
    ('1', '١'),
    ('2', '٢'),
    ('3', '٣'),
    ('4', '٤'),
    ('5', '٥'),
    ('6', '٦'),
    ('7', '٧'),
    ('8', '٨'),
    ('9', '٩'),
];

// Single-letter transliterations emitted by the letter classifier.
const SHORT_TRANSLITERATIONS: [(char, char); 14] = [
    ('g', 'ج'),
    ('s', 'س'),
    ('b', 'ب'),
    ('d', 'د'),
    ('t', 'ط'),
    ('h', 'ه'),
    ('k', 'ق'),
    ('f', 'ف'),
    ('n', 'ن'),
    ('l', 'ل'),
    ('m', 'م'),
    ('w', 'و'),
    ('y', 'ي'),
    ('r', 'ر'),
];

impl CharTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (char, char)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Latin digits to Arabic-Indic digits plus the short letter transliterations.
    pub fn egyptian() -> Self {
        Self::with_entries(LATIN_DIGITS.into_iter().chain(SHORT_TRANSLITERATIONS))
    }

    pub fn insert(&mut self, from: char, to: char) -> Option<char> {
        self.entries.insert(from, to)
    }

    pub fn translate(&self, ch: char) -> char {
        self.entries.get(&ch).copied().unwrap_or(ch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CharTable {
    fn default() -> Self {
        Self::egyptian()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_digits_become_arabic_indic() {
        let table = CharTable::egyptian();
        let mapped: String = "2024".chars().map(|c| table.translate(c)).collect();
        assert_eq!(mapped, "٢٠٢٤");
    }

    #[test]
    fn test_unknown_characters_pass_through() {
        let table = CharTable::egyptian();
        assert_eq!(table.translate('س'), 'س');
        assert_eq!(table.translate('X'), 'X');
        assert_eq!(table.translate('٧'), '٧');
    }

    #[test]
    fn test_empty_table_is_identity() {
        let table = CharTable::new();
        assert!(table.is_empty());
        assert_eq!(table.translate('1'), '1');
    }

    #[test]
    fn test_table_round_trips_through_json() {
        let mut table = CharTable::new();
        table.insert('1', '١');
        let json = serde_json::to_string(&table).unwrap();
        let parsed: CharTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.translate('1'), '١');
        assert_eq!(parsed.len(), 1);
    }
}
