use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use henmeta_core::VideoRecord;
use henmeta_metadata::cache::CachingTransport;
use henmeta_metadata::tags::{MemoryTagResolver, SqliteTagResolver, TagResolver};
use henmeta_metadata::transport::{FixtureTransport, HttpTransport, Transport};
use henmeta_metadata::{SearchConfig, SearchEngine, SearchOptions, SearchOutcome};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let code = std::env::args()
        .nth(1)
        .context("usage: henmeta-lookup <CODE>")?;

    let config = SearchConfig::from_env().context("invalid configuration")?;
    let options = SearchOptions {
        top_n: env_or("HENMETA_TOP_N", 5)?,
        return_multi: env_or("HENMETA_RETURN_MULTI", false)?,
        exact_match_only: env_or("HENMETA_EXACT_MATCH", true)?,
    };

    // Fixture replay for offline runs, otherwise live HTTP behind the cache
    let transport: Arc<dyn Transport> = match std::env::var("HENMETA_FIXTURES") {
        Ok(dir) => {
            info!(dir = %dir, "replaying fixtures");
            Arc::new(FixtureTransport::from_dir(Path::new(&dir)).context("failed to load fixtures")?)
        }
        Err(_) => {
            let http = HttpTransport::new(&config.http).context("failed to build http client")?;
            Arc::new(CachingTransport::new(http, &config.cache))
        }
    };

    let pool = match std::env::var("HENMETA_DB") {
        Ok(db_path) => {
            info!(db_path = %db_path, "connecting to database");
            let pool = henmeta_db::connect(&db_path)
                .await
                .context("failed to connect to database")?;
            henmeta_db::migrate::run(&pool)
                .await
                .context("failed to run migrations")?;
            Some(pool)
        }
        Err(_) => None,
    };

    let resolver: Arc<dyn TagResolver> = match &pool {
        Some(pool) => Arc::new(SqliteTagResolver::new(pool.clone())),
        None => Arc::new(MemoryTagResolver::new()),
    };

    let engine = SearchEngine::new(config, transport, resolver).context("invalid configuration")?;
    info!(
        code = %code,
        languages = ?engine.config().languages,
        max_concurrency = engine.config().max_concurrency,
        "searching"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling search");
                cancel.cancel();
            }
        });
    }

    let outcome = engine
        .search(&code, &options, &cancel)
        .await
        .with_context(|| format!("search for {code} failed"))?;

    if let Some(pool) = &pool {
        for record in records(&outcome) {
            let id = henmeta_db::repo::videos::save(pool, record)
                .await
                .with_context(|| format!("failed to save {}", record.code))?;
            info!(code = %record.code, id, "saved record");
        }
    }

    println!("{}", serde_json::to_string_pretty(&render(&outcome))?);
    Ok(())
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().with_context(|| format!("invalid {key}: {v:?}")),
        Err(_) => Ok(default),
    }
}

fn records(outcome: &SearchOutcome) -> Vec<&VideoRecord> {
    match outcome {
        SearchOutcome::Record(record) => vec![record],
        SearchOutcome::Records(bulk) => bulk.records.iter().collect(),
        SearchOutcome::NoMatch | SearchOutcome::Ambiguous(_) => Vec::new(),
    }
}

fn render(outcome: &SearchOutcome) -> serde_json::Value {
    match outcome {
        SearchOutcome::Record(record) => json!({ "outcome": "record", "record": record }),
        SearchOutcome::Records(bulk) => json!({
            "outcome": "records",
            "records": bulk.records,
            "failures": bulk.failure_summary(),
        }),
        SearchOutcome::NoMatch => json!({ "outcome": "no_match" }),
        SearchOutcome::Ambiguous(candidates) => {
            json!({ "outcome": "ambiguous", "candidates": candidates })
        }
    }
}
