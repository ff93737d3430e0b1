use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wordex_core::query::DEFAULT_TOP_WORDS;
use wordex_core::{
    ArticleIndexer, Cache, FindWordsResult, IndexStore, IndexedArticle, MemoryCache, MostCommonArticle,
    QueryEngine, ResilientCache, RetryPolicy, SledIndexStore, WordTotal,
};

pub struct AppConfig {
    pub db_path: PathBuf,
    pub retry: RetryPolicy,
    /// Upper bound on live query cache entries.
    pub cache_capacity: u64,
    /// Required in `X-ADMIN-TOKEN` to reindex articles.
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub queries: QueryEngine,
    pub indexer: ArticleIndexer,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn IndexStore>, cache: Arc<dyn Cache>, retry: RetryPolicy, admin_token: Option<String>) -> Self {
        let cache = ResilientCache::new(cache, retry);
        Self {
            queries: QueryEngine::new(store.clone(), cache.clone(), retry),
            indexer: ArticleIndexer::new(store, cache, retry),
            admin_token,
        }
    }
}

#[derive(Deserialize)]
pub struct FindWordsRequest {
    pub words: Vec<String>,
}

#[derive(Deserialize)]
pub struct TopWordsParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { DEFAULT_TOP_WORDS }

#[derive(Deserialize)]
pub struct ArticleBody {
    pub content: String,
}

pub fn build_app(config: AppConfig) -> Result<Router> {
    let store = SledIndexStore::open(&config.db_path)?;
    tracing::info!(db = %config.db_path.display(), "opened word index");
    let state = AppState::new(Arc::new(store), Arc::new(MemoryCache::with_capacity(config.cache_capacity)), config.retry, config.admin_token);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/words/find", post(find_words_handler))
        .route("/words/top", get(top_words_handler))
        .route("/words/:word/most-common", get(most_common_handler))
        .route("/articles/:id", put(index_article_handler))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

// CORS_ALLOW_ORIGIN is a comma-separated origin list; any origin when unset.
fn cors_layer() -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let origins: Vec<_> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
    }
}

fn internal_error(err: wordex_core::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub async fn find_words_handler(
    State(state): State<AppState>,
    Json(req): Json<FindWordsRequest>,
) -> Result<Json<FindWordsResult>, (StatusCode, String)> {
    state.queries.find_words(req.words.as_slice()).await.map(Json).map_err(internal_error)
}

pub async fn most_common_handler(
    State(state): State<AppState>,
    Path(word): Path<String>,
) -> Result<Json<Option<MostCommonArticle>>, (StatusCode, String)> {
    state.queries.most_common_word_article(&word).await.map(Json).map_err(internal_error)
}

pub async fn top_words_handler(
    State(state): State<AppState>,
    Query(params): Query<TopWordsParams>,
) -> Result<Json<Vec<WordTotal>>, (StatusCode, String)> {
    state.queries.top_words(params.limit).await.map(Json).map_err(internal_error)
}

pub async fn index_article_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ArticleBody>,
) -> Result<Json<IndexedArticle>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    state.indexer.process_article(&id, &body.content).await.map(Json).map_err(internal_error)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
