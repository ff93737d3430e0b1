use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cache::{ResilientCache, CACHE_TTL_SECS};
use crate::index::{ArticleOffsets, MostCommonArticle, WordTotal};
use crate::persist::IndexStore;
use crate::retry::RetryPolicy;
use crate::Result;

pub type FindWordsResult = BTreeMap<String, Vec<ArticleOffsets>>;

pub const FIND_WORDS_PREFIX: &str = "find-words:";
pub const MOST_COMMON_PREFIX: &str = "most-common-word:";
pub const TOP_WORDS_PREFIX: &str = "top-words:";
pub const TOP_WORDS_PATTERN: &str = "top-words:*";

pub const DEFAULT_TOP_WORDS: usize = 10;
pub const MAX_TOP_WORDS: usize = 100;

/// Lowercase, trim, drop empties and duplicates. The set is sorted, which
/// makes the derived cache key independent of input order.
pub fn normalize_words<I, S>(words: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| w.as_ref().trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

const KEY_SEPARATOR: char = ',';

/// Cache key for a normalized word set, or `None` when a word contains the
/// key separator and the joined key would be ambiguous. Such words can never
/// match an indexed token, so those queries skip the cache.
pub fn find_words_key(words: &BTreeSet<String>) -> Option<String> {
    if words.iter().any(|w| w.contains(KEY_SEPARATOR)) {
        return None;
    }
    let joined: Vec<&str> = words.iter().map(String::as_str).collect();
    Some(format!("{FIND_WORDS_PREFIX}{}", joined.join(",")))
}

pub fn most_common_key(word: &str) -> String {
    format!("{MOST_COMMON_PREFIX}{word}")
}

pub fn top_words_key(limit: usize) -> String {
    format!("{TOP_WORDS_PREFIX}{limit}")
}

/// Cache-aside reads over an [`IndexStore`].
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn IndexStore>,
    cache: ResilientCache,
    retry: RetryPolicy,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn IndexStore>, cache: ResilientCache, retry: RetryPolicy) -> Self {
        Self { store, cache, retry }
    }

    /// Every article and offset for each queried word. Words with no hits map
    /// to an empty list rather than being left out.
    pub async fn find_words<S: AsRef<str>>(&self, words: &[S]) -> Result<FindWordsResult> {
        let words = normalize_words(words);
        let key = find_words_key(&words);
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get_json::<FindWordsResult>(key).await {
                tracing::debug!(%key, "cache hit");
                return Ok(hit);
            }
        }

        let store = &self.store;
        let query = &words;
        let rows = self
            .retry
            .run("find_word_indexes", move || store.find_word_indexes(query))
            .await
            .map_err(|err| {
                tracing::error!(words = ?query, error = %err, "word index lookup failed");
                err
            })?;

        let mut result: FindWordsResult = words.iter().map(|w| (w.clone(), Vec::new())).collect();
        for row in rows {
            if let Some(hits) = result.get_mut(&row.word) {
                hits.push(ArticleOffsets { article_id: row.article_id, offsets: row.positions });
            }
        }

        if let Some(key) = &key {
            self.cache.set_json(key, &result, CACHE_TTL_SECS).await;
        }
        Ok(result)
    }

    /// Article holding the most occurrences of `word`. Misses are not cached.
    pub async fn most_common_word_article(&self, word: &str) -> Result<Option<MostCommonArticle>> {
        let word = word.trim().to_lowercase();
        let key = most_common_key(&word);
        if let Some(hit) = self.cache.get_json::<MostCommonArticle>(&key).await {
            tracing::debug!(%key, "cache hit");
            return Ok(Some(hit));
        }

        let store = &self.store;
        let query = word.as_str();
        let top = self
            .retry
            .run("find_top_count_for_word", move || store.find_top_count_for_word(query))
            .await
            .map_err(|err| {
                tracing::error!(%word, error = %err, "top count lookup failed");
                err
            })?;

        let Some(top) = top else {
            return Ok(None);
        };
        let found = MostCommonArticle { article_id: top.article_id, count: top.count };
        self.cache.set_json(&key, &found, CACHE_TTL_SECS).await;
        Ok(Some(found))
    }

    /// Globally most frequent words. `limit` is clamped to `1..=MAX_TOP_WORDS`.
    pub async fn top_words(&self, limit: usize) -> Result<Vec<WordTotal>> {
        let limit = limit.clamp(1, MAX_TOP_WORDS);
        let key = top_words_key(limit);
        if let Some(hit) = self.cache.get_json::<Vec<WordTotal>>(&key).await {
            tracing::debug!(%key, "cache hit");
            return Ok(hit);
        }

        let store = &self.store;
        let ranked = self
            .retry
            .run("find_top_words", move || store.find_top_words(limit))
            .await
            .map_err(|err| {
                tracing::error!(limit, error = %err, "top words lookup failed");
                err
            })?;

        self.cache.set_json(&key, &ranked, CACHE_TTL_SECS).await;
        Ok(ranked)
    }
}
