//! Audio Adapter - 音频处理实现

mod wav_processor;

pub use wav_processor::{encode_pcm16, silent_wav, WavProcessor};
