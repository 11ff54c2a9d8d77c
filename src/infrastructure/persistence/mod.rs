//! Persistence Layer - 数据持久化
//!
//! SQLite 存储 Job/片段/曲目/样章，Sled 存储持久化任务队列

pub mod sled;
pub mod sqlite;

pub use self::sled::SledJobQueue;
