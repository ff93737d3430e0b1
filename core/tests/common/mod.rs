#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use wordex_core::{
    Cache, Error, IndexStore, MemoryCache, Result, WordArticleCount, WordIndexRow, WordOccurrences, WordTotal,
};

/// Cache that records every write and can be told to fail.
#[derive(Default)]
pub struct RecordingCache {
    pub inner: MemoryCache,
    pub sets: Mutex<Vec<(String, String, u64)>>,
    pub deletes: Mutex<Vec<String>>,
    pub patterns: Mutex<Vec<String>>,
    pub get_calls: AtomicU32,
    pub fail_gets: AtomicU32,
    pub fail_writes: AtomicU32,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` reads.
    pub fn fail_gets(&self, n: u32) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` sets, deletes and pattern deletes.
    pub fn fail_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn set_keys(&self) -> Vec<String> {
        self.sets.lock().iter().map(|(k, _, _)| k.clone()).collect()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Cache for RecordingCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_gets) {
            return Err(Error::Backend("cache read refused".into()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        if Self::take_failure(&self.fail_writes) {
            return Err(Error::Backend("cache write refused".into()));
        }
        self.sets.lock().push((key.to_string(), value.to_string(), ttl_secs));
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if Self::take_failure(&self.fail_writes) {
            return Err(Error::Backend("cache delete refused".into()));
        }
        self.deletes.lock().push(key.to_string());
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        if Self::take_failure(&self.fail_writes) {
            return Err(Error::Backend("cache delete refused".into()));
        }
        self.patterns.lock().push(pattern.to_string());
        self.inner.delete_pattern(pattern).await
    }
}

/// Store wrapper that fails a configurable number of calls before delegating.
pub struct FlakyStore<S> {
    pub inner: S,
    pub failures: AtomicU32,
    pub calls: AtomicU32,
}

impl<S: IndexStore> FlakyStore<S> {
    pub fn new(inner: S, failures: u32) -> Arc<Self> {
        Arc::new(Self { inner, failures: AtomicU32::new(failures), calls: AtomicU32::new(0) })
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(Error::Backend("store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: IndexStore> IndexStore for FlakyStore<S> {
    async fn replace_article_index(&self, article_id: &str, occurrences: &WordOccurrences) -> Result<Vec<String>> {
        self.check()?;
        self.inner.replace_article_index(article_id, occurrences).await
    }

    async fn find_word_indexes(&self, words: &BTreeSet<String>) -> Result<Vec<WordIndexRow>> {
        self.check()?;
        self.inner.find_word_indexes(words).await
    }

    async fn find_top_count_for_word(&self, word: &str) -> Result<Option<WordArticleCount>> {
        self.check()?;
        self.inner.find_top_count_for_word(word).await
    }

    async fn find_top_words(&self, limit: usize) -> Result<Vec<WordTotal>> {
        self.check()?;
        self.inner.find_top_words(limit).await
    }
}

/// Fixed rows, for checking how the query engine shapes store output.
#[derive(Default)]
pub struct FixedStore {
    pub rows: Vec<WordIndexRow>,
    pub top: Option<WordArticleCount>,
}

#[async_trait]
impl IndexStore for FixedStore {
    async fn replace_article_index(&self, _article_id: &str, _occurrences: &WordOccurrences) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn find_word_indexes(&self, words: &BTreeSet<String>) -> Result<Vec<WordIndexRow>> {
        Ok(self.rows.iter().filter(|r| words.contains(&r.word)).cloned().collect())
    }

    async fn find_top_count_for_word(&self, word: &str) -> Result<Option<WordArticleCount>> {
        Ok(self.top.clone().filter(|t| t.word == word))
    }

    async fn find_top_words(&self, _limit: usize) -> Result<Vec<WordTotal>> {
        Ok(Vec::new())
    }
}
