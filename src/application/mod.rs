//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Repositories、TtsEngine、ObjectStorage、JobQueue 等）
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    ApproveChapters, AssembleJob, CancelJob, ConfirmRetailSample, IngestManuscript, ParseJob,
    ReorderSegments, RetryJob, SelectRetailSample, SetSegmentIncluded, SetSegmentType,
    // Handlers
    handlers::{
        ApproveChaptersHandler, AssembleJobHandler, CancelJobHandler, ConfirmRetailSampleHandler,
        ConfirmedSample, IngestManuscriptHandler, IngestResponse, JobDefaults, ParseJobHandler,
        ReorderSegmentsHandler, RetryJobHandler, SelectRetailSampleHandler,
        SetSegmentIncludedHandler, SetSegmentTypeHandler,
    },
};

pub use error::{ApplicationError, ErrorContext, UserFacingError};

pub use queries::{
    GetJob, GetOrderedSegments, ListRetailSamples,
    // Handlers
    handlers::{
        GetJobHandler, GetOrderedSegmentsHandler, JobView, ListRetailSamplesHandler,
        OrderedSegment,
    },
};
