use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::ResilientCache;
use crate::index::WordOccurrences;
use crate::persist::IndexStore;
use crate::query::{most_common_key, TOP_WORDS_PATTERN};
use crate::retry::RetryPolicy;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedArticle {
    pub article_id: String,
    pub distinct_words: usize,
    pub occurrences: usize,
}

/// Rebuilds an article's word index and clears the cache entries it may
/// have made stale.
#[derive(Clone)]
pub struct ArticleIndexer {
    store: Arc<dyn IndexStore>,
    cache: ResilientCache,
    retry: RetryPolicy,
}

impl ArticleIndexer {
    pub fn new(store: Arc<dyn IndexStore>, cache: ResilientCache, retry: RetryPolicy) -> Self {
        Self { store, cache, retry }
    }

    /// Tokenize, aggregate and replace the stored index for `article_id`.
    /// A failed attempt starts over from tokenization. Only the indexing
    /// result is returned to the caller; invalidation errors are logged.
    pub async fn process_article(&self, article_id: &str, content: &str) -> Result<IndexedArticle> {
        let store = &self.store;
        let (occurrences, prior_words) = self
            .retry
            .run("process_article", move || async move {
                let occurrences = WordOccurrences::from_text(content);
                let prior_words = store.replace_article_index(article_id, &occurrences).await?;
                Ok::<_, Error>((occurrences, prior_words))
            })
            .await
            .map_err(|err| {
                tracing::error!(article_id, error = %err, "indexing failed, prior index left intact");
                err
            })?;

        self.invalidate(&occurrences, &prior_words).await;

        let summary = IndexedArticle {
            article_id: article_id.to_string(),
            distinct_words: occurrences.distinct_words(),
            occurrences: occurrences.total_occurrences(),
        };
        tracing::info!(
            article_id,
            distinct_words = summary.distinct_words,
            occurrences = summary.occurrences,
            "article indexed"
        );
        Ok(summary)
    }

    // Words the article lost can change their top article as much as the
    // words it gained.
    async fn invalidate(&self, occurrences: &WordOccurrences, prior_words: &[String]) {
        let touched: BTreeSet<&str> = occurrences
            .words()
            .chain(prior_words.iter().map(String::as_str))
            .collect();
        for word in touched {
            self.cache.delete(&most_common_key(word)).await;
        }
        self.cache.delete_pattern(TOP_WORDS_PATTERN).await;
    }
}
