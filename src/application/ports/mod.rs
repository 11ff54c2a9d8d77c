//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_processor;
mod excerpt_scorer;
mod job_queue;
mod object_storage;
mod repositories;
mod tts_engine;

pub use audio_processor::{AudioInfo, AudioProcessingError, AudioProcessorPort, MergedAudio};
pub use excerpt_scorer::{ExcerptScorerPort, ScoringError};
pub use job_queue::{JobQueuePort, QueueError, WorkItem, WorkStage};
pub use object_storage::{keys, ObjectStoragePort, StorageError};
pub use repositories::{
    ApprovalSummary, JobFailure, JobRecord, JobRepositoryPort, RepositoryError,
    RetailSampleRecord, RetailSampleRepositoryPort, SegmentAudio, SegmentRecord,
    SegmentRepositoryPort, TrackRecord, TrackRepositoryPort,
};
pub use tts_engine::{
    SynthesisRequest, SynthesizedAudio, TransientKind, TtsEnginePort, TtsError,
};
