//! WAV Processor - 基于 symphonia 的音频处理
//!
//! 支持：
//! - WAV 头解析和信息提取
//! - 多段 WAV 合并（解码为 PCM 后拼接，重新写头）
//!
//! 合并要求各段采样率和声道数一致。

use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{
    AudioInfo, AudioProcessingError, AudioProcessorPort, MergedAudio,
};

const BITS_PER_SAMPLE: u16 = 16;

/// WAV 处理器
#[derive(Debug, Default, Clone)]
pub struct WavProcessor;

#[derive(Debug)]
struct FmtChunk {
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

#[derive(Debug)]
struct WavHeader {
    fmt: FmtChunk,
    data_size: usize,
}

#[derive(Debug)]
struct DecodedAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u8,
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

impl WavProcessor {
    pub fn new() -> Self {
        Self
    }

    /// 解析 WAV 文件头
    fn parse_header(&self, data: &[u8]) -> Result<WavHeader, AudioProcessingError> {
        if data.len() < 44 {
            return Err(AudioProcessingError::InvalidInput(
                "WAV data too short".to_string(),
            ));
        }
        if &data[0..4] != b"RIFF" {
            return Err(AudioProcessingError::InvalidInput(
                "Invalid WAV: missing RIFF header".to_string(),
            ));
        }
        if &data[8..12] != b"WAVE" {
            return Err(AudioProcessingError::InvalidInput(
                "Invalid WAV: missing WAVE identifier".to_string(),
            ));
        }

        let mut pos = 12;
        let mut fmt: Option<FmtChunk> = None;

        while pos + 8 <= data.len() {
            let chunk_id = &data[pos..pos + 4];
            let chunk_size = read_u32(data, pos + 4) as usize;
            let body = pos + 8;

            match chunk_id {
                b"fmt " => {
                    if chunk_size < 16 || body + 16 > data.len() {
                        return Err(AudioProcessingError::InvalidInput(
                            "Invalid fmt chunk size".to_string(),
                        ));
                    }
                    fmt = Some(FmtChunk {
                        num_channels: read_u16(data, body + 2),
                        sample_rate: read_u32(data, body + 4),
                        bits_per_sample: read_u16(data, body + 14),
                    });
                }
                b"data" => {
                    let fmt = fmt.ok_or_else(|| {
                        AudioProcessingError::InvalidInput(
                            "Invalid WAV: data chunk before fmt chunk".to_string(),
                        )
                    })?;
                    // 流式写出的 WAV 可能带占位长度
                    let data_size = chunk_size.min(data.len() - body);
                    return Ok(WavHeader { fmt, data_size });
                }
                _ => {}
            }

            pos = body + chunk_size + chunk_size % 2;
        }

        Err(AudioProcessingError::InvalidInput(
            "Invalid WAV: missing data chunk".to_string(),
        ))
    }

    /// 使用 symphonia 解码为交错的 i16 PCM
    fn decode(&self, data: &[u8]) -> Result<DecodedAudio, AudioProcessingError> {
        let cursor = Cursor::new(data.to_vec());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("wav");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioProcessingError::DecodingError(format!("Probe failed: {}", e)))?;

        let mut format = probed.format;
        let track = format.default_track().ok_or_else(|| {
            AudioProcessingError::DecodingError("No audio track found".to_string())
        })?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            AudioProcessingError::DecodingError("Unknown sample rate".to_string())
        })?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u8)
            .ok_or_else(|| {
                AudioProcessingError::DecodingError("Unknown channel count".to_string())
            })?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                AudioProcessingError::DecodingError(format!("Decoder creation failed: {}", e))
            })?;
        let track_id = track.id;

        let mut samples: Vec<i16> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(AudioProcessingError::DecodingError(format!(
                        "Packet read error: {}",
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, "Decode error (skipping packet)");
                    continue;
                }
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();
            let mut sample_buf = SampleBuffer::<i16>::new(num_frames as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            let actual = num_frames * spec.channels.count();
            samples.extend_from_slice(&sample_buf.samples()[..actual]);
        }

        Ok(DecodedAudio {
            samples,
            sample_rate,
            channels,
        })
    }
}

fn duration_ms(sample_count: usize, sample_rate: u32, channels: u8) -> u64 {
    if sample_rate == 0 || channels == 0 {
        return 0;
    }
    (sample_count as u64 * 1000) / (sample_rate as u64 * channels as u64)
}

/// 将 16 位 PCM 样本写为 WAV
pub fn encode_pcm16(samples: &[i16], sample_rate: u32, channels: u8) -> Vec<u8> {
    let num_channels = channels as u16;
    let byte_rate = sample_rate * num_channels as u32 * (BITS_PER_SAMPLE / 8) as u32;
    let block_align = num_channels * (BITS_PER_SAMPLE / 8);
    let data_size = samples.len() * 2;

    let mut wav = Vec::with_capacity(44 + data_size);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&((36 + data_size) as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_size as u32).to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// 生成指定时长的单声道静音 WAV
pub fn silent_wav(duration_ms: u64, sample_rate: u32) -> Vec<u8> {
    let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
    encode_pcm16(&vec![0i16; frames], sample_rate, 1)
}

impl AudioProcessorPort for WavProcessor {
    fn extension(&self) -> &str {
        "wav"
    }

    fn probe(&self, data: &[u8]) -> Result<AudioInfo, AudioProcessingError> {
        let header = self.parse_header(data)?;
        let fmt = &header.fmt;

        let bytes_per_sample = (fmt.bits_per_sample as usize / 8).max(1);
        let sample_count = header.data_size / bytes_per_sample;

        Ok(AudioInfo {
            duration_ms: duration_ms(sample_count, fmt.sample_rate, fmt.num_channels as u8),
            sample_rate: fmt.sample_rate,
            channels: fmt.num_channels as u8,
            bits_per_sample: fmt.bits_per_sample,
        })
    }

    fn merge(&self, parts: &[Vec<u8>]) -> Result<MergedAudio, AudioProcessingError> {
        match parts {
            [] => Err(AudioProcessingError::InvalidInput(
                "nothing to merge".to_string(),
            )),
            [single] => {
                let info = self.probe(single)?;
                Ok(MergedAudio {
                    data: single.clone(),
                    info,
                })
            }
            _ => {
                let mut merged: Option<DecodedAudio> = None;

                for (index, part) in parts.iter().enumerate() {
                    let decoded = self.decode(part)?;
                    match merged.as_mut() {
                        None => merged = Some(decoded),
                        Some(acc) => {
                            if acc.sample_rate != decoded.sample_rate
                                || acc.channels != decoded.channels
                            {
                                return Err(AudioProcessingError::IncompatibleFormats(format!(
                                    "part {} is {} Hz/{} ch, expected {} Hz/{} ch",
                                    index,
                                    decoded.sample_rate,
                                    decoded.channels,
                                    acc.sample_rate,
                                    acc.channels
                                )));
                            }
                            acc.samples.extend_from_slice(&decoded.samples);
                        }
                    }
                }

                let audio = merged.ok_or_else(|| {
                    AudioProcessingError::InvalidInput("nothing to merge".to_string())
                })?;
                let data = encode_pcm16(&audio.samples, audio.sample_rate, audio.channels);

                tracing::debug!(
                    parts = parts.len(),
                    merged_size = data.len(),
                    "Merged audio parts"
                );

                Ok(MergedAudio {
                    data,
                    info: AudioInfo {
                        duration_ms: duration_ms(
                            audio.samples.len(),
                            audio.sample_rate,
                            audio.channels,
                        ),
                        sample_rate: audio.sample_rate,
                        channels: audio.channels,
                        bits_per_sample: BITS_PER_SAMPLE,
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_silent_wav() {
        let processor = WavProcessor::new();
        let wav = silent_wav(1000, 16000);

        let info = processor.probe(&wav).unwrap();
        assert_eq!(info.sample_rate, 16000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.duration_ms, 1000);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let processor = WavProcessor::new();
        assert!(processor.probe(b"not a wav").is_err());
        assert!(processor.probe(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_merge_concatenates_pcm() {
        let processor = WavProcessor::new();
        let first = encode_pcm16(&[1, 2, 3, 4], 8000, 1);
        let second = encode_pcm16(&[5, 6], 8000, 1);

        let merged = processor.merge(&[first, second]).unwrap();
        let expected = encode_pcm16(&[1, 2, 3, 4, 5, 6], 8000, 1);
        assert_eq!(merged.data, expected);
        assert_eq!(merged.info.channels, 1);
    }

    #[test]
    fn test_merge_durations_add_up() {
        let processor = WavProcessor::new();
        let parts = vec![silent_wav(500, 22050), silent_wav(1500, 22050)];

        let merged = processor.merge(&parts).unwrap();
        assert_eq!(merged.info.duration_ms, 2000);
        assert_eq!(processor.probe(&merged.data).unwrap().duration_ms, 2000);
    }

    #[test]
    fn test_merge_rejects_mismatched_rates() {
        let processor = WavProcessor::new();
        let parts = vec![silent_wav(100, 16000), silent_wav(100, 22050)];

        assert!(matches!(
            processor.merge(&parts),
            Err(AudioProcessingError::IncompatibleFormats(_))
        ));
    }

    #[test]
    fn test_merge_single_part_passthrough() {
        let processor = WavProcessor::new();
        let wav = silent_wav(250, 16000);
        let merged = processor.merge(&[wav.clone()]).unwrap();
        assert_eq!(merged.data, wav);
        assert!(processor.merge(&[]).is_err());
    }
}
