//! Bookcast Worker
//!
//! 启动后台流水线：领取队列中的工作项，切分稿件、合成片段、组装成品。

use std::sync::Arc;
use std::time::Duration;

use bookcast::application::ports::{AudioProcessorPort, TtsEnginePort};
use bookcast::config::{load_config, print_config, AppConfig};
use bookcast::domain::ChunkLimits;
use bookcast::infrastructure::adapters::{
    FileObjectStorage, HttpTtsClient, HttpTtsClientConfig, PresignConfig, WavProcessor,
};
use bookcast::infrastructure::events::EventPublisher;
use bookcast::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository, SqliteSegmentRepository,
    SqliteTrackRepository,
};
use bookcast::infrastructure::persistence::SledJobQueue;
use bookcast::infrastructure::worker::{JobWorker, JobWorkerConfig, RetryPolicy};
use tokio_util::sync::CancellationToken;

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},bookcast={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn worker_config(config: &AppConfig) -> JobWorkerConfig {
    JobWorkerConfig {
        max_concurrent_segments: config.worker.max_concurrent_segments,
        poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
        chunk_limits: ChunkLimits {
            max_words: config.chunking.max_words,
            max_chars: config.chunking.max_chars,
        },
        retry: RetryPolicy {
            base_delay: Duration::from_secs(config.retry.base_delay_secs),
            max_delay: Duration::from_secs(config.retry.max_delay_secs),
            max_retries: config.retry.max_retries,
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("Bookcast - audiobook production worker");
    print_config(&config);

    // 确保数据目录存在
    tokio::fs::create_dir_all(&config.storage.root_dir).await?;
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 初始化数据库
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
    let segment_repo = Arc::new(SqliteSegmentRepository::new(pool.clone()));
    let track_repo = Arc::new(SqliteTrackRepository::new(pool));

    let storage = Arc::new(
        FileObjectStorage::new(
            &config.storage.root_dir,
            PresignConfig {
                base_url: config.storage.presign_base_url.clone(),
                secret: config.storage.presign_secret.clone(),
            },
        )
        .await?,
    );

    let queue = SledJobQueue::open(&config.queue.path)?.arc();

    let tts_engine = Arc::new(HttpTtsClient::new(
        HttpTtsClientConfig::new(&config.tts.url).with_timeout(config.tts.timeout_secs),
    )?);
    if !tts_engine.health_check().await {
        tracing::warn!(url = %config.tts.url, "Synthesis service is not reachable yet");
    }

    let audio = Arc::new(WavProcessor::new());
    if audio.extension() != config.storage.audio_extension {
        anyhow::bail!(
            "storage.audio_extension is {}, but the audio processor writes {}",
            config.storage.audio_extension,
            audio.extension()
        );
    }

    let event_publisher = EventPublisher::new().arc();
    let worker = JobWorker::new(
        worker_config(&config),
        queue.clone(),
        job_repo,
        segment_repo,
        track_repo,
        storage,
        tts_engine,
        audio,
        event_publisher,
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");
    shutdown.cancel();

    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Worker task ended abnormally");
    }
    queue.flush()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
