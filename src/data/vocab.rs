//! Character vocabulary: a bijection between the distinct characters of a
//! corpus and dense integer codes `0..len`.

use std::collections::HashMap;

use crate::error::{ChargenError, Result};

/// Immutable char ↔ code mapping.
///
/// Codes follow sorted character order, so the same corpus always yields the
/// same vocabulary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    code_to_char: Vec<char>,
    char_to_code: HashMap<char, usize>,
}

impl Vocabulary {
    /// Build the vocabulary from every distinct character of `text`.
    pub fn from_text(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(ChargenError::InvalidInput(
                "cannot build a vocabulary from an empty corpus".into(),
            ));
        }

        let mut symbols: Vec<char> = text.chars().collect();
        symbols.sort_unstable();
        symbols.dedup();
        Ok(Self::index(symbols))
    }

    /// Rebuild a vocabulary from its code-ordered symbol list (checkpoints).
    pub fn from_symbols(symbols: Vec<char>) -> Result<Self> {
        if symbols.is_empty() {
            return Err(ChargenError::InvalidInput("empty symbol list".into()));
        }
        let vocab = Self::index(symbols);
        if vocab.char_to_code.len() != vocab.code_to_char.len() {
            return Err(ChargenError::InvalidInput(
                "symbol list contains duplicates".into(),
            ));
        }
        Ok(vocab)
    }

    fn index(code_to_char: Vec<char>) -> Self {
        let char_to_code = code_to_char
            .iter()
            .enumerate()
            .map(|(code, &ch)| (ch, code))
            .collect();
        Self {
            code_to_char,
            char_to_code,
        }
    }

    pub fn len(&self) -> usize {
        self.code_to_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_char.is_empty()
    }

    /// Symbols in code order.
    pub fn symbols(&self) -> &[char] {
        &self.code_to_char
    }

    pub fn encode_char(&self, ch: char) -> Result<usize> {
        self.char_to_code
            .get(&ch)
            .copied()
            .ok_or(ChargenError::UnknownCharacter(ch))
    }

    pub fn decode_code(&self, code: usize) -> Result<char> {
        self.code_to_char.get(code).copied().ok_or_else(|| {
            ChargenError::InvalidInput(format!(
                "code {} out of range for vocabulary of {}",
                code,
                self.len()
            ))
        })
    }

    /// Encode a whole string. Fails on the first unseen character.
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars().map(|ch| self.encode_char(ch)).collect()
    }

    pub fn decode(&self, codes: &[usize]) -> Result<String> {
        codes.iter().map(|&code| self.decode_code(code)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_corpus_rejected() {
        let err = Vocabulary::from_text("").unwrap_err();
        assert!(matches!(err, ChargenError::InvalidInput(_)));
    }

    #[test]
    fn test_codes_are_dense_and_sorted() {
        let vocab = Vocabulary::from_text("hello world").unwrap();
        assert_eq!(vocab.len(), 8);
        assert_eq!(vocab.symbols(), &[' ', 'd', 'e', 'h', 'l', 'o', 'r', 'w']);
        for (code, &ch) in vocab.symbols().iter().enumerate() {
            assert_eq!(vocab.encode_char(ch).unwrap(), code);
        }
    }

    #[test]
    fn test_round_trip_every_char() {
        let text = "Happy families are all alike; every unhappy family is unhappy in its own way.";
        let vocab = Vocabulary::from_text(text).unwrap();
        for ch in text.chars() {
            let code = vocab.encode_char(ch).unwrap();
            assert_eq!(vocab.decode_code(code).unwrap(), ch);
        }
        let codes = vocab.encode(text).unwrap();
        assert_eq!(codes.len(), text.chars().count());
        assert_eq!(vocab.decode(&codes).unwrap(), text);
    }

    #[test]
    fn test_unknown_character() {
        let vocab = Vocabulary::from_text("abc").unwrap();
        let err = vocab.encode("abz").unwrap_err();
        assert!(matches!(err, ChargenError::UnknownCharacter('z')));
    }

    #[test]
    fn test_decode_out_of_range() {
        let vocab = Vocabulary::from_text("abc").unwrap();
        assert!(vocab.decode_code(3).is_err());
    }

    #[test]
    fn test_from_symbols() {
        let vocab = Vocabulary::from_text("banana").unwrap();
        let restored = Vocabulary::from_symbols(vocab.symbols().to_vec()).unwrap();
        assert_eq!(vocab, restored);

        assert!(Vocabulary::from_symbols(vec!['a', 'a']).is_err());
        assert!(Vocabulary::from_symbols(Vec::new()).is_err());
    }

    #[test]
    fn test_multibyte_characters() {
        let vocab = Vocabulary::from_text("Анна Каренина").unwrap();
        let codes = vocab.encode("Анна").unwrap();
        assert_eq!(vocab.decode(&codes).unwrap(), "Анна");
    }
}
