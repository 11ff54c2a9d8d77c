//! SQLite Database - 数据库连接和迁移

use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite, SqliteConnection};
use std::path::Path;
use uuid::Uuid;

use crate::application::ports::RepositoryError;
use crate::domain::{JobStatus, SegmentType};

/// 数据库配置
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    pub database_url: String,
    /// 最大连接数
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/bookcast.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            max_connections: 5,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

/// 数据库连接池
pub type DbPool = Pool<Sqlite>;

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    // 启用 WAL 模式，允许并发读写
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&pool)
        .await?;

    // 设置 busy_timeout=5000ms，遇到锁时等待而不是立即失败
    sqlx::query("PRAGMA busy_timeout=5000")
        .execute(&pool)
        .await?;

    // 设置同步模式为 NORMAL（平衡性能和安全性）
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(&pool)
        .await?;

    tracing::info!("SQLite pool created with WAL mode and busy_timeout=5000ms");

    Ok(pool)
}

/// segment_order 的区间约束，由 SegmentType 的保留区间生成
fn segment_order_check() -> String {
    let arms: Vec<String> = SegmentType::ALL
        .iter()
        .map(|ty| {
            let range = ty.range();
            format!(
                "WHEN '{}' THEN segment_order BETWEEN {} AND {}",
                ty.as_str(),
                range.start(),
                range.end()
            )
        })
        .collect();
    format!(
        "CHECK (segment_order IS NULL OR CASE segment_type {} ELSE 0 END)",
        arms.join(" ")
    )
}

/// 运行数据库迁移
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    // 创建 jobs 表
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT,
            narrator TEXT,
            voice_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            manuscript_key TEXT NOT NULL,
            detection_mode TEXT NOT NULL DEFAULT 'standard',
            sample_mode TEXT NOT NULL DEFAULT 'standard',
            segment_count INTEGER NOT NULL DEFAULT 0,
            track_count INTEGER NOT NULL DEFAULT 0,
            manifest_key TEXT,
            failure_classification TEXT,
            failure_reference TEXT,
            failure_guidance TEXT,
            failure_message TEXT,
            failure_phase TEXT,
            failure_segment_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 创建 segments 表
    // segment_order 仅在审批重排的事务内短暂为 NULL
    let segments_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS segments (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            source_order INTEGER NOT NULL,
            chapter_index INTEGER NOT NULL,
            segment_type TEXT NOT NULL,
            segment_order INTEGER,
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            word_count INTEGER NOT NULL,
            char_count INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_review',
            audio_key TEXT,
            duration_ms INTEGER,
            size_bytes INTEGER,
            attempts INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (job_id) REFERENCES jobs(id) ON DELETE CASCADE,
            UNIQUE (job_id, segment_order),
            {}
        )
        "#,
        segment_order_check()
    );
    sqlx::query(&segments_ddl).execute(pool).await?;

    // 创建 tracks 表
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            segment_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            segment_type TEXT NOT NULL,
            segment_order INTEGER NOT NULL,
            filename TEXT NOT NULL,
            title TEXT NOT NULL,
            audio_key TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (job_id) REFERENCES jobs(id) ON DELETE CASCADE,
            UNIQUE (job_id, position),
            UNIQUE (job_id, segment_order)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 创建 retail_samples 表
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS retail_samples (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            segment_id TEXT NOT NULL,
            segment_order INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            edited_text TEXT,
            word_count INTEGER NOT NULL,
            engagement REAL NOT NULL,
            emotional_intensity REAL NOT NULL,
            spoiler_risk REAL NOT NULL,
            romantic_tension REAL NOT NULL DEFAULT 0,
            overall_score REAL NOT NULL,
            mode TEXT NOT NULL,
            rank INTEGER NOT NULL,
            is_final INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            confirmed_at TEXT,
            FOREIGN KEY (job_id) REFERENCES jobs(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 创建索引
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_segments_job_id
        ON segments(job_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_jobs_status
        ON jobs(status)
        "#,
    )
    .execute(pool)
    .await?;

    // 每个 Job 至多一个最终样章
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_retail_samples_final
        ON retail_samples(job_id) WHERE is_final = 1
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed");
    Ok(())
}

pub(crate) fn db_err(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Duplicate(db.message().to_string())
        }
        _ => RepositoryError::DatabaseError(e.to_string()),
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

pub(crate) fn parse_time(s: &str) -> Result<chrono::DateTime<Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

/// 事务内锁定 Job 行并返回当前状态
///
/// 以写操作开启事务，立即取得写锁，后续读-改-写不会与其他写事务交错。
pub(crate) async fn lock_job(
    conn: &mut SqliteConnection,
    job_id: Uuid,
) -> Result<JobStatus, RepositoryError> {
    let status: Option<String> =
        sqlx::query_scalar("UPDATE jobs SET updated_at = ? WHERE id = ? RETURNING status")
            .bind(Utc::now().to_rfc3339())
            .bind(job_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;

    let status = status.ok_or_else(|| RepositoryError::NotFound(format!("job {}", job_id)))?;
    JobStatus::from_str(&status)
        .ok_or_else(|| RepositoryError::SerializationError(format!("unknown job status {}", status)))
}

/// 要求 Job 处于指定状态
pub(crate) async fn lock_job_in(
    conn: &mut SqliteConnection,
    job_id: Uuid,
    expected: JobStatus,
) -> Result<(), RepositoryError> {
    let status = lock_job(conn, job_id).await?;
    if status != expected {
        return Err(RepositoryError::Conflict(format!(
            "job {} is {}, expected {}",
            job_id, status, expected
        )));
    }
    Ok(())
}
