mod common;

use common::{FlakyStore, RecordingCache};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use wordex_core::{
    ArticleIndexer, Cache, IndexStore, QueryEngine, ResilientCache, RetryPolicy, SledIndexStore,
};

fn indexer(store: Arc<dyn IndexStore>, cache: Arc<RecordingCache>) -> ArticleIndexer {
    let retry = RetryPolicy::default();
    ArticleIndexer::new(store, ResilientCache::new(cache, retry), retry)
}

#[tokio::test]
async fn indexing_writes_rows_and_invalidates_touched_words() {
    let store = Arc::new(SledIndexStore::temporary().unwrap());
    let cache = RecordingCache::new();
    for key in ["most-common-word:hello", "most-common-word:world", "most-common-word:other", "top-words:10", "top-words:50"] {
        cache.inner.set(key, "{}", 600).await.unwrap();
    }

    let summary = indexer(store.clone(), cache.clone())
        .process_article("1", "Hello world! Hello again.")
        .await
        .unwrap();
    assert_eq!((summary.distinct_words, summary.occurrences), (3, 4));

    assert_eq!(store.positions_for("hello", "1").unwrap().map(|p| p.len()), Some(2));
    assert_eq!(store.count_for("hello", "1").unwrap(), Some(2));
    assert_eq!(store.count_for("world", "1").unwrap(), Some(1));
    assert_eq!(store.count_for("again", "1").unwrap(), Some(1));

    let deleted: BTreeSet<String> = cache.deletes.lock().iter().cloned().collect();
    let expected: BTreeSet<String> = ["most-common-word:hello", "most-common-word:world", "most-common-word:again"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(deleted, expected);
    assert_eq!(cache.patterns.lock().clone(), vec!["top-words:*".to_string()]);
    assert_eq!(cache.inner.get("top-words:10").await.unwrap(), None);
    assert_eq!(cache.inner.get("top-words:50").await.unwrap(), None);
    assert!(cache.inner.get("most-common-word:other").await.unwrap().is_some());
}

#[tokio::test]
async fn wordless_content_removes_prior_rows() {
    let store = Arc::new(SledIndexStore::temporary().unwrap());
    let indexer = indexer(store.clone(), RecordingCache::new());

    for content in ["", "!@#$%^&*()"] {
        indexer.process_article("id", "stale words").await.unwrap();
        let summary = indexer.process_article("id", content).await.unwrap();
        assert_eq!(summary.occurrences, 0);
        assert!(store.article_words("id").unwrap().is_empty());
        assert_eq!(store.count_for("stale", "id").unwrap(), None);
    }
}

#[tokio::test]
async fn dropped_words_are_invalidated_too() {
    let store = Arc::new(SledIndexStore::temporary().unwrap());
    let cache = RecordingCache::new();
    let indexer = indexer(store, cache.clone());

    indexer.process_article("1", "alpha beta").await.unwrap();
    cache.deletes.lock().clear();
    indexer.process_article("1", "gamma").await.unwrap();

    let deleted: BTreeSet<String> = cache.deletes.lock().iter().cloned().collect();
    assert!(deleted.contains("most-common-word:alpha"));
    assert!(deleted.contains("most-common-word:beta"));
    assert!(deleted.contains("most-common-word:gamma"));
}

#[tokio::test]
async fn reindexing_same_content_is_idempotent() {
    let store = Arc::new(SledIndexStore::temporary().unwrap());
    let indexer = indexer(store.clone(), RecordingCache::new());

    indexer.process_article("7", "to be or not to be").await.unwrap();
    let first = store.article_words("7").unwrap();
    indexer.process_article("7", "to be or not to be").await.unwrap();
    assert_eq!(store.article_words("7").unwrap(), first);
    assert_eq!(store.positions_for("be", "7").unwrap(), Some(vec![3, 16]));
}

#[tokio::test(start_paused = true)]
async fn transient_store_failures_restart_indexing() {
    let flaky = FlakyStore::new(SledIndexStore::temporary().unwrap(), 2);
    let indexer = indexer(flaky.clone(), RecordingCache::new());

    indexer.process_article("1", "retry me").await.unwrap();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert_eq!(flaky.inner.count_for("retry", "1").unwrap(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_prior_index_intact() {
    let flaky = FlakyStore::new(SledIndexStore::temporary().unwrap(), 0);
    let cache = RecordingCache::new();
    let indexer = indexer(flaky.clone(), cache.clone());
    indexer.process_article("1", "original text").await.unwrap();
    cache.deletes.lock().clear();

    flaky.failures.store(u32::MAX, Ordering::SeqCst);
    assert!(indexer.process_article("1", "replacement").await.is_err());
    assert_eq!(flaky.inner.count_for("original", "1").unwrap(), Some(1));
    assert_eq!(flaky.inner.count_for("replacement", "1").unwrap(), None);
    assert!(cache.deletes.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalidation_failures_are_swallowed() {
    let store = Arc::new(SledIndexStore::temporary().unwrap());
    let cache = RecordingCache::new();
    cache.fail_writes(u32::MAX);

    let summary = indexer(store.clone(), cache).process_article("1", "still indexed").await;
    assert!(summary.is_ok());
    assert_eq!(store.count_for("still", "1").unwrap(), Some(1));
}

#[tokio::test]
async fn queries_see_new_content_after_reindex() {
    let store = Arc::new(SledIndexStore::temporary().unwrap());
    let cache = RecordingCache::new();
    let retry = RetryPolicy::default();
    let resilient = ResilientCache::new(cache.clone(), retry);
    let indexer = ArticleIndexer::new(store.clone(), resilient.clone(), retry);
    let queries = QueryEngine::new(store, resilient, retry);

    indexer.process_article("a", "fox fox").await.unwrap();
    indexer.process_article("b", "fox").await.unwrap();
    let top = queries.most_common_word_article("fox").await.unwrap().unwrap();
    assert_eq!((top.article_id.as_str(), top.count), ("a", 2));
    let words = queries.top_words(10).await.unwrap();
    assert_eq!(words[0].count, 3);

    indexer.process_article("b", "fox fox fox").await.unwrap();
    let top = queries.most_common_word_article("fox").await.unwrap().unwrap();
    assert_eq!((top.article_id.as_str(), top.count), ("b", 3));
    let words = queries.top_words(10).await.unwrap();
    assert_eq!(words[0].count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reindex_of_one_article_leaves_one_writers_rows() {
    let first = vec![("alpha".to_string(), 2), ("beta".to_string(), 1)];
    let second = vec![("delta".to_string(), 3), ("gamma".to_string(), 1)];

    for round in 0..20 {
        let store = Arc::new(SledIndexStore::temporary().unwrap());
        let indexer = indexer(store.clone(), RecordingCache::new());
        let a = indexer.clone();
        let b = indexer.clone();
        let left = tokio::spawn(async move { a.process_article("same", "alpha alpha beta").await });
        let right = tokio::spawn(async move { b.process_article("same", "gamma delta delta delta").await });
        left.await.unwrap().unwrap();
        right.await.unwrap().unwrap();

        let listing = store.article_words("same").unwrap();
        let (kept, lost) = if listing == first {
            (&first, &second)
        } else {
            assert_eq!(listing, second, "round {round}: rows from both writers");
            (&second, &first)
        };
        for (word, count) in kept {
            assert_eq!(store.count_for(word, "same").unwrap(), Some(*count));
            assert_eq!(store.positions_for(word, "same").unwrap().map(|p| p.len() as u64), Some(*count));
        }
        for (word, _) in lost {
            assert_eq!(store.count_for(word, "same").unwrap(), None);
            assert_eq!(store.positions_for(word, "same").unwrap(), None);
            assert!(store.find_top_count_for_word(word).await.unwrap().is_none());
        }
    }
}
