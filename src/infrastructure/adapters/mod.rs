//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod audio;
pub mod scoring;
pub mod storage;
pub mod tts;

pub use audio::WavProcessor;
pub use scoring::KeywordScorer;
pub use storage::{FileObjectStorage, PresignConfig};
pub use tts::{FakeTtsClient, FakeTtsClientConfig, HttpTtsClient, HttpTtsClientConfig};
