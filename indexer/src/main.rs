use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;
use wordex_core::{ArticleIndexer, MemoryCache, ResilientCache, RetryPolicy, SledIndexStore};

#[derive(Debug, Deserialize)]
struct InputArticle {
    id: String,
    #[serde(alias = "body")]
    content: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Bulk-load articles into the word index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index articles from JSON/JSONL files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// sled database directory
        #[arg(long, default_value = "./wordex-db")]
        db: String,
    },
}

#[derive(Default)]
struct Totals {
    articles: usize,
    occurrences: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, db } => {
            let store = SledIndexStore::open(&db).with_context(|| format!("opening {db}"))?;
            build_index(&input, store).await
        }
    }
}

async fn build_index(input: &str, store: SledIndexStore) -> Result<()> {
    let retry = RetryPolicy::default();
    // No server shares this process, so invalidations land in a private cache.
    let cache = ResilientCache::new(Arc::new(MemoryCache::new()), retry);
    let indexer = ArticleIndexer::new(Arc::new(store.clone()), cache, retry);

    let mut totals = Totals::default();
    for file in input_files(Path::new(input)) {
        for article in read_articles(&file).with_context(|| format!("reading {}", file.display()))? {
            let indexed = indexer.process_article(&article.id, &article.content).await?;
            totals.articles += 1;
            totals.occurrences += indexed.occurrences;
        }
    }
    store.flush().await?;

    tracing::info!(articles = totals.articles, occurrences = totals.occurrences, "index build complete");
    Ok(())
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn read_articles(file: &Path) -> Result<Vec<InputArticle>> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut articles = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            articles.push(serde_json::from_str(&line)?);
        }
        return Ok(articles);
    }
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect(),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => Ok(Vec::new()),
    }
}
