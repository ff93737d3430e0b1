use async_trait::async_trait;
use sled::transaction::ConflictableTransactionError;
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::index::{WordArticleCount, WordIndexRow, WordOccurrences, WordTotal};
use crate::{Error, Result};

/// Authoritative storage for the positional index and per-article counts.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Atomically drop every row for `article_id` and write `occurrences` in
    /// its place. Readers see either the old rows or the new ones. Returns the
    /// words the article was indexed under before the call.
    async fn replace_article_index(&self, article_id: &str, occurrences: &WordOccurrences) -> Result<Vec<String>>;

    /// All rows whose word is in `words`, across every article.
    async fn find_word_indexes(&self, words: &BTreeSet<String>) -> Result<Vec<WordIndexRow>>;

    /// Highest count for `word`; ties go to the lowest article id.
    async fn find_top_count_for_word(&self, word: &str) -> Result<Option<WordArticleCount>>;

    /// Words ranked by count summed over all articles.
    async fn find_top_words(&self, limit: usize) -> Result<Vec<WordTotal>>;
}

const SEP: u8 = 0;

fn word_key(word: &str, article_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(word.len() + 1 + article_id.len());
    key.extend_from_slice(word.as_bytes());
    key.push(SEP);
    key.extend_from_slice(article_id.as_bytes());
    key
}

fn word_prefix(word: &str) -> Vec<u8> {
    let mut key = word.as_bytes().to_vec();
    key.push(SEP);
    key
}

// Counts are inverted so a forward prefix scan yields the largest first.
fn rank_key(word: &str, count: u64, article_id: &str) -> Vec<u8> {
    let mut key = word_prefix(word);
    key.extend_from_slice(&(u64::MAX - count).to_be_bytes());
    key.extend_from_slice(article_id.as_bytes());
    key
}

fn split_word_key(key: &[u8]) -> Result<(String, String)> {
    let sep = key
        .iter()
        .position(|b| *b == SEP)
        .ok_or_else(|| Error::CorruptKey(String::from_utf8_lossy(key).into_owned()))?;
    let word = String::from_utf8_lossy(&key[..sep]).into_owned();
    let article_id = String::from_utf8_lossy(&key[sep + 1..]).into_owned();
    Ok((word, article_id))
}

fn decode_count(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::CorruptKey(format!("count value of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn abort<E: Into<Error>>(err: E) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(err.into())
}

/// sled-backed [`IndexStore`]. Four trees are written in one transaction per
/// article:
///
/// - `word_index`:    `word\0article` -> bincode positions
/// - `word_counts`:   `word\0article` -> count (u64 BE)
/// - `count_rank`:    `word\0(MAX - count)article` -> ()
/// - `article_words`: `article` -> bincode `[(word, count)]`
#[derive(Clone)]
pub struct SledIndexStore {
    db: Db,
    word_index: Tree,
    word_counts: Tree,
    count_rank: Tree,
    article_words: Tree,
}

impl SledIndexStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Throwaway store removed on drop, for tests and dry runs.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    pub fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            word_index: db.open_tree("word_index")?,
            word_counts: db.open_tree("word_counts")?,
            count_rank: db.open_tree("count_rank")?,
            article_words: db.open_tree("article_words")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    // Point reads against a single tree. These are part of the public API for
    // tooling that inspects an index directly (the bulk indexer, operators);
    // they block on sled and should not be called from request handlers.

    /// Words currently indexed for an article with their counts, sorted by word.
    /// Empty for an unknown article.
    pub fn article_words(&self, article_id: &str) -> Result<Vec<(String, u64)>> {
        match self.article_words.get(article_id.as_bytes())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Occurrence count of `word` in one article, `None` if it does not occur.
    pub fn count_for(&self, word: &str, article_id: &str) -> Result<Option<u64>> {
        self.word_counts
            .get(word_key(word, article_id))?
            .map(|v| decode_count(&v))
            .transpose()
    }

    /// Character offsets of `word` in one article, `None` if it does not occur.
    pub fn positions_for(&self, word: &str, article_id: &str) -> Result<Option<Vec<usize>>> {
        match self.word_index.get(word_key(word, article_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn replace_blocking(&self, article_id: &str, occurrences: &WordOccurrences) -> Result<Vec<String>> {
        let mut listing: Vec<(String, u64)> = occurrences
            .entries()
            .map(|(w, _, count)| (w.to_string(), count as u64))
            .collect();
        listing.sort();
        let encoded_listing = bincode::serialize(&listing)?;
        let mut encoded_positions = Vec::with_capacity(listing.len());
        for (word, positions, _) in occurrences.entries() {
            encoded_positions.push((word, bincode::serialize(positions)?, positions.len() as u64));
        }

        let prior_words = (&self.word_index, &self.word_counts, &self.count_rank, &self.article_words)
            .transaction(|(wi, wc, cr, aw)| {
                let mut prior_words = Vec::new();
                if let Some(prior) = aw.get(article_id.as_bytes())? {
                    let prior: Vec<(String, u64)> = bincode::deserialize(&prior).map_err(abort)?;
                    for (word, count) in prior {
                        let key = word_key(&word, article_id);
                        wi.remove(key.as_slice())?;
                        wc.remove(key)?;
                        cr.remove(rank_key(&word, count, article_id))?;
                        prior_words.push(word);
                    }
                }
                for (word, positions, count) in &encoded_positions {
                    let key = word_key(word, article_id);
                    wi.insert(key.as_slice(), positions.as_slice())?;
                    wc.insert(key, count.to_be_bytes().to_vec())?;
                    cr.insert(rank_key(word, *count, article_id), &b""[..])?;
                }
                if listing.is_empty() {
                    aw.remove(article_id.as_bytes())?;
                } else {
                    aw.insert(article_id.as_bytes(), encoded_listing.as_slice())?;
                }
                Ok(prior_words)
            })?;
        Ok(prior_words)
    }

    fn find_word_indexes_blocking(&self, words: &BTreeSet<String>) -> Result<Vec<WordIndexRow>> {
        let mut rows = Vec::new();
        for word in words {
            for item in self.word_index.scan_prefix(word_prefix(word)) {
                let (key, value) = item?;
                let (word, article_id) = split_word_key(&key)?;
                let positions: Vec<usize> = bincode::deserialize(&value)?;
                rows.push(WordIndexRow { article_id, word, positions });
            }
        }
        Ok(rows)
    }

    fn find_top_count_blocking(&self, word: &str) -> Result<Option<WordArticleCount>> {
        let prefix = word_prefix(word);
        let Some(item) = self.count_rank.scan_prefix(&prefix).next() else {
            return Ok(None);
        };
        let (key, _) = item?;
        let rest = &key[prefix.len()..];
        if rest.len() < 8 {
            return Err(Error::CorruptKey(String::from_utf8_lossy(&key).into_owned()));
        }
        let count = u64::MAX - decode_count(&rest[..8])?;
        let article_id = String::from_utf8_lossy(&rest[8..]).into_owned();
        Ok(Some(WordArticleCount { article_id, word: word.to_string(), count }))
    }

    fn find_top_words_blocking(&self, limit: usize) -> Result<Vec<WordTotal>> {
        let mut totals: HashMap<String, u64> = HashMap::new();
        for item in self.word_counts.iter() {
            let (key, value) = item?;
            let (word, _) = split_word_key(&key)?;
            *totals.entry(word).or_insert(0) += decode_count(&value)?;
        }
        let mut ranked: Vec<WordTotal> = totals
            .into_iter()
            .map(|(word, count)| WordTotal { word, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

// sled calls block on disk I/O, so they run on the blocking pool.
#[async_trait]
impl IndexStore for SledIndexStore {
    async fn replace_article_index(&self, article_id: &str, occurrences: &WordOccurrences) -> Result<Vec<String>> {
        let store = self.clone();
        let article_id = article_id.to_string();
        let occurrences = occurrences.clone();
        tokio::task::spawn_blocking(move || store.replace_blocking(&article_id, &occurrences)).await?
    }

    async fn find_word_indexes(&self, words: &BTreeSet<String>) -> Result<Vec<WordIndexRow>> {
        let store = self.clone();
        let words = words.clone();
        tokio::task::spawn_blocking(move || store.find_word_indexes_blocking(&words)).await?
    }

    async fn find_top_count_for_word(&self, word: &str) -> Result<Option<WordArticleCount>> {
        let store = self.clone();
        let word = word.to_string();
        tokio::task::spawn_blocking(move || store.find_top_count_blocking(&word)).await?
    }

    async fn find_top_words(&self, limit: usize) -> Result<Vec<WordTotal>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.find_top_words_blocking(limit)).await?
    }
}
