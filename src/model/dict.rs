//! Pronunciation dictionary (spec §3, §6).
//!
//! Bulk loading a dictionary *file* is the out-of-scope loader's job;
//! what's in scope is the `Dictionary` data type itself and the
//! `add_word` mutation (spec §6 lifecycle table). We also implement the
//! line-format rules as a pure parsing function — not a file reader —
//! since the text grammar of one dictionary line is part of the data
//! model spec §6 documents, and `Dictionary::load_text` is a thin
//! convenience over repeated `add_word` calls for tests and callers
//! that already have the text in memory.

use crate::error::DecoderError;
use std::collections::HashMap;

/// Words the dictionary must never contain directly; they're inserted
/// implicitly from the filler dictionary (spec §6).
const RESERVED_WORDS: [&str; 3] = ["<s>", "</s>", "<sil>"];

#[derive(Debug, Clone)]
pub struct Pronunciation {
    pub phones: Vec<String>,
}

pub struct Dictionary {
    /// Base word -> list of alternate pronunciations, in the order added.
    entries: HashMap<String, Vec<Pronunciation>>,
    known_phones: Option<std::collections::HashSet<String>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            known_phones: None,
        }
    }

    /// Restrict `add_word` to only accept phones from this set. Without
    /// calling this, any phone string is accepted (useful for tests and
    /// for callers that validate phones elsewhere).
    pub fn set_known_phones(&mut self, phones: impl IntoIterator<Item = String>) {
        self.known_phones = Some(phones.into_iter().collect());
    }

    /// Add a word with a single new pronunciation (spec §6 `add_word`).
    /// Rejects the three reserved words and any phone not in the known
    /// set (if one was configured) with `DecoderError::Lexicon`.
    pub fn add_word(&mut self, word: &str, phones: Vec<String>) -> Result<(), DecoderError> {
        if RESERVED_WORDS.contains(&word) {
            return Err(DecoderError::Lexicon(format!(
                "'{word}' is reserved and inserted implicitly from the filler dictionary"
            )));
        }
        if phones.is_empty() {
            return Err(DecoderError::Lexicon(format!("word '{word}' has no phones")));
        }
        if let Some(known) = &self.known_phones {
            for p in &phones {
                if !known.contains(p) {
                    return Err(DecoderError::Lexicon(format!("unknown phone '{p}' for word '{word}'")));
                }
            }
        }
        self.entries
            .entry(word.to_string())
            .or_default()
            .push(Pronunciation { phones });
        Ok(())
    }

    pub fn pronunciations(&self, word: &str) -> &[Pronunciation] {
        self.entries.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(word)
    }

    pub fn words(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Parse one dictionary line per spec §6: `word  phone1 phone2 ...`.
    /// `word(2)`-style alternates collapse to the base word. Comment
    /// lines (`#`, `;;`) and blank lines yield `None`.
    pub fn parse_line(line: &str) -> Option<(String, Vec<String>)> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(";;") {
            return None;
        }
        let mut parts = trimmed.split_whitespace();
        let raw_word = parts.next()?;
        let base_word = match raw_word.find('(') {
            Some(idx) if raw_word.ends_with(')') => &raw_word[..idx],
            _ => raw_word,
        };
        let phones: Vec<String> = parts.map(|s| s.to_string()).collect();
        if phones.is_empty() {
            return None;
        }
        Some((base_word.to_string(), phones))
    }

    /// Convenience bulk loader over in-memory text (not a file reader).
    pub fn load_text(&mut self, text: &str) -> Result<usize, DecoderError> {
        let mut added = 0;
        for line in text.lines() {
            if let Some((word, phones)) = Self::parse_line(line) {
                self.add_word(&word, phones)?;
                added += 1;
            }
        }
        Ok(added)
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_words() {
        let mut d = Dictionary::new();
        assert!(d.add_word("<s>", vec!["SIL".into()]).is_err());
        assert!(d.add_word("</s>", vec!["SIL".into()]).is_err());
        assert!(d.add_word("<sil>", vec!["SIL".into()]).is_err());
    }

    #[test]
    fn alternate_pronunciation_collapses_to_base_word() {
        let mut d = Dictionary::new();
        d.add_word("READ", vec!["R".into(), "IY".into(), "D".into()]).unwrap();
        let (word, phones) = Dictionary::parse_line("READ(2) R EH D").unwrap();
        assert_eq!(word, "READ");
        d.add_word(&word, phones).unwrap();
        assert_eq!(d.pronunciations("READ").len(), 2);
    }

    #[test]
    fn ignores_comment_and_blank_lines() {
        assert_eq!(Dictionary::parse_line("# a comment"), None);
        assert_eq!(Dictionary::parse_line(";; another comment"), None);
        assert_eq!(Dictionary::parse_line("   "), None);
    }

    #[test]
    fn rejects_unknown_phone_when_restricted() {
        let mut d = Dictionary::new();
        d.set_known_phones(["AA".to_string(), "B".to_string()]);
        assert!(d.add_word("AB", vec!["AA".into(), "B".into()]).is_ok());
        assert!(d.add_word("BAD", vec!["ZZ".into()]).is_err());
    }

    #[test]
    fn load_text_adds_every_valid_line() {
        let mut d = Dictionary::new();
        let text = "FOO F UW\nBAR B AA R\n# comment\nFOO(2) F OW\n";
        let n = d.load_text(text).unwrap();
        assert_eq!(n, 3);
        assert_eq!(d.pronunciations("FOO").len(), 2);
    }
}
