use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tokenizer::words;

pub type ArticleId = String;

/// Positional index for a single article, built from one tokenizer pass.
/// Counts are always read off the positions lists, never tracked separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordOccurrences {
    positions: HashMap<String, Vec<usize>>,
}

impl WordOccurrences {
    pub fn from_text(text: &str) -> Self {
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (word, offset) in words(text) {
            positions.entry(word).or_default().push(offset);
        }
        Self { positions }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn distinct_words(&self) -> usize {
        self.positions.len()
    }

    pub fn total_occurrences(&self) -> usize {
        self.positions.values().map(Vec::len).sum()
    }

    pub fn positions(&self, word: &str) -> Option<&[usize]> {
        self.positions.get(word).map(Vec::as_slice)
    }

    pub fn count(&self, word: &str) -> usize {
        self.positions.get(word).map_or(0, Vec::len)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// `(word, positions, count)` for every word in the article.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[usize], usize)> {
        self.positions
            .iter()
            .map(|(w, p)| (w.as_str(), p.as_slice(), p.len()))
    }
}

/// Stored positions of one word in one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordIndexRow {
    pub article_id: ArticleId,
    pub word: String,
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordArticleCount {
    pub article_id: ArticleId,
    pub word: String,
    pub count: u64,
}

/// One article's hits for a queried word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleOffsets {
    pub article_id: ArticleId,
    pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MostCommonArticle {
    pub article_id: ArticleId,
    pub count: u64,
}

/// Total occurrences of a word across every article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTotal {
    pub word: String,
    pub count: u64,
}
