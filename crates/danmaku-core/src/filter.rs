//! Banned-word set and the substring filter applied to every message.

use serde::{Deserialize, Serialize};

/// Whether `text` contains any of `words` as a case-sensitive substring.
///
/// Empty words never match, and empty text is never banned.
pub fn is_banned(text: &str, words: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }
    words
        .iter()
        .any(|word| !word.is_empty() && text.contains(word.as_str()))
}

/// Ordered set of banned words.
///
/// Entries are trimmed, non-empty and unique. Insertion order is kept so
/// clients can display the list the way the admin built it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BannedWords {
    words: Vec<String>,
}

impl BannedWords {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a word. Returns `true` if the set changed.
    ///
    /// The word is trimmed first; blank words and duplicates are ignored.
    pub fn add(&mut self, word: &str) -> bool {
        let word = word.trim();
        if word.is_empty() || self.contains(word) {
            return false;
        }
        self.words.push(word.to_owned());
        true
    }

    /// Remove a word. Returns `true` if it was present.
    pub fn remove(&mut self, word: &str) -> bool {
        let word = word.trim();
        match self.words.iter().position(|w| w == word) {
            Some(idx) => {
                let _ = self.words.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether the exact (trimmed) word is in the set.
    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    /// Whether `text` contains any banned word.
    pub fn is_banned(&self, text: &str) -> bool {
        is_banned(text, &self.words)
    }

    /// The words in insertion order.
    pub fn as_slice(&self) -> &[String] {
        &self.words
    }

    /// Number of banned words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for BannedWords {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for word in iter {
            let _ = set.add(word.as_ref());
        }
        set
    }
}
