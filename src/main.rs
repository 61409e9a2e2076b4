use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wenku::analytics::{MemoryTrendStore, RedisTrendStore, TrendStore};
use wenku::config::Config;
use wenku::lock::{MemorySyncLock, RedisSyncLock, SyncLock};
use wenku::models::QueryParams;
use wenku::scheduler::Scheduler;
use wenku::service::{NovelSrv, SyncPolicy};
use wenku::sources::{BiQuGe, QiDian, SourceClient};
use wenku::storage::Database;
use wenku::tasks::TaskPool;

#[derive(Parser)]
#[command(
    name = "wenku",
    version,
    about = "Novel catalog ingestion and synchronization backend",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (TOML); environment variables apply otherwise
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the primary source's id space and stage new titles
    Discover,

    /// Publish a staged novel by name and author
    Publish {
        /// Novel name
        name: String,

        /// Novel author
        author: String,
    },

    /// Sync new chapter headers for a published novel
    SyncChapters {
        /// Novel id
        id: i64,
    },

    /// Fetch chapter content (one chapter, or all stored chapters)
    Content {
        /// Novel id
        id: i64,

        /// Chapter number (0-based); omit to fetch every stored chapter
        #[arg(short, long)]
        no: Option<i64>,
    },

    /// Run the periodic job cadences until interrupted
    Jobs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(std::path::Path::new(path))?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;

    if let Err(e) = wenku::metrics::init_metrics() {
        tracing::warn!(error = %e, "metrics initialization failed, continuing without");
    }

    let (srv, tasks) = build_service(&config).await?;

    match cli.command {
        Commands::Discover => {
            tracing::info!("starting source discovery");
            srv.sync_source().await?;
        }

        Commands::Publish { name, author } => {
            let novel = srv.publish(QueryParams::new(&name, &author)).await?;
            println!("published #{}: {} by {}", novel.id, novel.name, novel.author);
        }

        Commands::SyncChapters { id } => {
            srv.update_chapters(id).await?;
            println!("chapters synced for novel {id}");
        }

        Commands::Content { id, no } => match no {
            Some(no) => {
                let chapter = srv.get_chapter_detail(id, no).await?;
                println!(
                    "chapter {} \"{}\": {} words",
                    chapter.no, chapter.title, chapter.word_count
                );
            }
            None => {
                srv.fetch_all_chapter_content(id).await?;
                println!("all chapter content fetched for novel {id}");
            }
        },

        Commands::Jobs => {
            tracing::info!("starting scheduled jobs");
            let scheduler = Scheduler::start(Arc::clone(&srv));
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            scheduler.shutdown();
        }
    }

    // Let queued best-effort jobs (status flips and the like) drain
    drop(srv);
    if let Ok(pool) = Arc::try_unwrap(tasks) {
        pool.shutdown().await;
    }

    Ok(())
}

/// Wire the service from configuration
///
/// Redis backs the lock and the trend store; when it is unreachable the
/// in-memory implementations take over so a single-node setup still works.
async fn build_service(config: &Config) -> Result<(Arc<NovelSrv>, Arc<TaskPool>)> {
    let db = Database::new(
        &config.database.sqlite_path,
        Duration::from_secs(config.database.busy_timeout_secs),
    )?
    .shared();

    let biquge_client = SourceClient::with_config(
        &config.sources.biquge.base_url,
        config.client.rate_limit,
        config.client.max_retries,
        config.client.max_concurrent_requests,
        config.request_timeout(),
    )?;
    let biquge = Arc::new(BiQuGe::new(
        biquge_client,
        config.sync.detail_cache_capacity,
        config.detail_cache_ttl(),
    ));

    let qidian_client = SourceClient::with_config(
        &config.sources.qidian.base_url,
        config.client.rate_limit,
        config.client.max_retries,
        config.client.max_concurrent_requests,
        config.request_timeout(),
    )?;
    let qidian = Arc::new(QiDian::new(qidian_client));

    let (lock, trends) = connect_redis(config).await;

    let tasks = Arc::new(TaskPool::new(4, 64));

    let srv = NovelSrv::new(
        db.clone(),
        db.clone(),
        db,
        biquge,
        qidian,
        lock,
        trends,
        Arc::clone(&tasks),
        SyncPolicy::from(&config.sync),
    );

    Ok((Arc::new(srv), tasks))
}

async fn connect_redis(config: &Config) -> (Arc<dyn SyncLock>, Arc<dyn TrendStore>) {
    let pool = deadpool_redis::Config::from_url(&config.redis.url)
        .builder()
        .ok()
        .and_then(|builder| {
            builder
                .max_size(config.redis.pool_size)
                .runtime(deadpool_redis::Runtime::Tokio1)
                .build()
                .ok()
        });

    if let Some(pool) = pool {
        // Make sure the server is actually there before committing to it
        let ping = async {
            let mut conn = pool.get().await.ok()?;
            let reply: Result<String, _> = redis::cmd("PING").query_async(&mut *conn).await;
            reply.ok()
        };
        if ping.await.is_some() {
            tracing::info!(url = %config.redis.url, "connected to Redis");
            return (
                Arc::new(RedisSyncLock::new(pool.clone(), &config.redis.key_prefix)),
                Arc::new(RedisTrendStore::new(pool, &config.redis.key_prefix)),
            );
        }
    }

    tracing::warn!("Redis unavailable, using in-process lock and trend store");
    (
        Arc::new(MemorySyncLock::new()),
        Arc::new(MemoryTrendStore::new()),
    )
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("wenku=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("wenku=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
