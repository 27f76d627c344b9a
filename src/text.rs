use std::ops::Index;
use std::sync::LazyLock;

use regex::Regex;

/// Markup tags, parenthesised asides and separator characters that never
/// reach the reader.
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]+>|\([^)]*\)|[\[\]{};:,<>/\\|_\-+=]").expect("noise pattern is valid")
});

/// Immutable, ordered words of an exercise text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordSequence {
    words: Vec<String>,
}

impl WordSequence {
    /// Cleans raw exercise text and splits it on whitespace.
    pub fn from_text(text: &str) -> Self {
        let cleaned = NOISE.replace_all(text, "");
        Self {
            words: cleaned.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.words.get(idx).map(String::as_str)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Words of the chunk that contains `cursor`. Chunks are aligned to
    /// multiples of `chunk_size`.
    pub fn chunk_at(&self, cursor: usize, chunk_size: usize) -> &[String] {
        let size = chunk_size.max(1);
        let start = (cursor / size) * size;
        let end = (start + size).min(self.words.len());
        self.words.get(start..end).unwrap_or(&[])
    }
}

impl From<Vec<String>> for WordSequence {
    fn from(words: Vec<String>) -> Self {
        Self { words }
    }
}

impl<'a> From<Vec<&'a str>> for WordSequence {
    fn from(words: Vec<&'a str>) -> Self {
        Self {
            words: words.into_iter().map(str::to_owned).collect(),
        }
    }
}

impl Index<usize> for WordSequence {
    type Output = str;

    fn index(&self, idx: usize) -> &str {
        &self.words[idx]
    }
}

/// Index of the letter the eye should fixate on when a word is flashed.
pub fn orp_index(word: &str) -> usize {
    match word.chars().count() {
        0..=1 => 0,
        2..=5 => 1,
        6..=9 => 2,
        10..=13 => 3,
        _ => 4,
    }
}

/// Splits a word into (before, pivot, after) around its recognition point.
pub fn split_at_orp(word: &str) -> (&str, &str, &str) {
    let pivot = orp_index(word);
    let mut bounds = word.char_indices().map(|(i, _)| i).skip(pivot);
    match bounds.next() {
        Some(start) => {
            let end = bounds.next().unwrap_or(word.len());
            (&word[..start], &word[start..end], &word[end..])
        }
        None => (word, "", ""),
    }
}
