//! Bookcast - 有声书生产引擎
//!
//! 把一部稿件变成按分发顺序编号的有声书曲目。
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Segment Context: 片段类型、保留区间、顺序号分配
//! - Job Context: 任务状态机
//! - 稿件分割、合成分块、试听样章选择、成品组装
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Repositories, JobQueue, TtsEngine, ObjectStorage, AudioProcessor, ExcerptScorer）
//! - Commands: 导入、审核、审批、样章、取消、重试、组装
//! - Queries: Job 状态与候选样章
//!
//! 基础设施层 (infrastructure/):
//! - Persistence: SQLite（Job/片段/曲目/样章）+ Sled（持久化任务队列）
//! - Adapters: 合成服务客户端、WAV 处理、文件对象存储、启发式评分
//! - Worker: 后台流水线与重试
//! - Events: 进度事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
