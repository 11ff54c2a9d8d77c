//! SQLite Persistence - SQLite 数据库持久化实现

mod database;
pub(crate) mod job_repo;
mod retail_sample_repo;
mod segment_repo;
mod track_repo;

pub use database::{create_pool, run_migrations, DatabaseConfig, DbPool};
pub use job_repo::SqliteJobRepository;
pub use retail_sample_repo::SqliteRetailSampleRepository;
pub use segment_repo::SqliteSegmentRepository;
pub use track_repo::SqliteTrackRepository;
