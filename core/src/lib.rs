//! Word-level positional index over articles, with a cache-aside query path.
//!
//! - [`tokenizer`] splits text into lowercased words with character offsets.
//! - [`index`] aggregates one article's words into positions and counts.
//! - [`persist`] is the authoritative store (sled-backed by default).
//! - [`cache`] holds the cache trait, an in-memory TTL cache and the
//!   retrying wrapper that never fails a request.
//! - [`query`] answers word lookups through the cache.
//! - [`indexing`] rebuilds an article's index and invalidates stale entries.

pub mod cache;
pub mod error;
pub mod index;
pub mod indexing;
pub mod persist;
pub mod query;
pub mod retry;
pub mod tokenizer;

pub use cache::{Cache, MemoryCache, ResilientCache, CACHE_TTL_SECS, DEFAULT_CACHE_CAPACITY};
pub use error::{Error, Result};
pub use index::*;
pub use indexing::{ArticleIndexer, IndexedArticle};
pub use persist::{IndexStore, SledIndexStore};
pub use query::{FindWordsResult, QueryEngine};
pub use retry::RetryPolicy;
