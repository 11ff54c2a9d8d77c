//! 试听样章选择
//!
//! 从 Job 的前 N 个内容片段中按句子边界切出候选窗口（400–900 词），
//! 打分交给外部评分器，这里只负责窗口划分、加权和排序。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunker::sentence_spans;
use super::segment::word_count;

pub const DEFAULT_SEGMENT_LIMIT: usize = 3;
pub const DEFAULT_MIN_WORDS: usize = 400;
pub const DEFAULT_MAX_WORDS: usize = 900;

/// 窗口参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 只取前 N 个片段，限制剧透范围
    pub segment_limit: usize,
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            segment_limit: DEFAULT_SEGMENT_LIMIT,
            min_words: DEFAULT_MIN_WORDS,
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

/// 候选窗口，start/end 为片段文本内的字节偏移
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptWindow {
    pub segment_id: Uuid,
    pub segment_order: u8,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub word_count: usize,
}

/// 切出一个片段的候选窗口
///
/// 窗口互不重叠，首尾都在句子边界上。累加句子直到达到 min_words；
/// 若追加下一句会超过 max_words，则丢弃当前累积从该句重新开始。
/// 单句超过 max_words 时直接跳过。
pub fn excerpt_windows(
    segment_id: Uuid,
    segment_order: u8,
    text: &str,
    config: &WindowConfig,
) -> Vec<ExcerptWindow> {
    let mut windows = Vec::new();
    let mut current: Option<(usize, usize, usize)> = None;

    for (start, end) in sentence_spans(text) {
        let words = word_count(&text[start..end]);
        if words > config.max_words {
            current = None;
            continue;
        }

        let (window_start, window_words) = match current {
            Some((s, _, w)) if w + words <= config.max_words => (s, w + words),
            _ => (start, words),
        };

        if window_words >= config.min_words {
            windows.push(ExcerptWindow {
                segment_id,
                segment_order,
                start: window_start,
                end,
                text: text[window_start..end].to_string(),
                word_count: window_words,
            });
            current = None;
        } else {
            current = Some((window_start, end, window_words));
        }
    }

    windows
}

/// 评分器输出，各项取值 [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcerptScores {
    pub engagement: f64,
    pub emotional_intensity: f64,
    pub spoiler_risk: f64,
    /// 仅 romance 模式参与加权
    #[serde(default)]
    pub romantic_tension: f64,
}

impl ExcerptScores {
    pub fn clamped(self) -> Self {
        Self {
            engagement: clamp_unit(self.engagement),
            emotional_intensity: clamp_unit(self.emotional_intensity),
            spoiler_risk: clamp_unit(self.spoiler_risk),
            romantic_tension: clamp_unit(self.romantic_tension),
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// 样章选择模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    #[default]
    Standard,
    /// 提高情感张力信号的权重
    Romance,
}

impl SampleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleMode::Standard => "standard",
            SampleMode::Romance => "romance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(SampleMode::Standard),
            "romance" => Some(SampleMode::Romance),
            _ => None,
        }
    }

    pub fn weights(&self) -> WeightProfile {
        match self {
            SampleMode::Standard => WeightProfile {
                engagement: 0.45,
                emotional_intensity: 0.35,
                spoiler_safety: 0.20,
                romantic_tension: 0.0,
            },
            SampleMode::Romance => WeightProfile {
                engagement: 0.30,
                emotional_intensity: 0.30,
                spoiler_safety: 0.20,
                romantic_tension: 0.20,
            },
        }
    }
}

/// 加权配置，各权重之和为 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightProfile {
    pub engagement: f64,
    pub emotional_intensity: f64,
    /// 作用于 (1 - spoiler_risk)
    pub spoiler_safety: f64,
    pub romantic_tension: f64,
}

impl WeightProfile {
    pub fn overall(&self, scores: &ExcerptScores) -> f64 {
        let s = scores.clamped();
        clamp_unit(
            self.engagement * s.engagement
                + self.emotional_intensity * s.emotional_intensity
                + self.spoiler_safety * (1.0 - s.spoiler_risk)
                + self.romantic_tension * s.romantic_tension,
        )
    }
}

/// 已评分候选
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredExcerpt {
    pub window: ExcerptWindow,
    pub scores: ExcerptScores,
    pub overall: f64,
}

impl ScoredExcerpt {
    pub fn new(window: ExcerptWindow, scores: ExcerptScores, mode: SampleMode) -> Self {
        let scores = scores.clamped();
        let overall = mode.weights().overall(&scores);
        Self {
            window,
            scores,
            overall,
        }
    }
}

/// 排序：总分降序，同分时按片段顺序号、窗口起点升序
pub fn rank(candidates: &mut [ScoredExcerpt]) {
    candidates.sort_by(|a, b| {
        b.overall
            .total_cmp(&a.overall)
            .then(a.window.segment_order.cmp(&b.window.segment_order))
            .then(a.window.start.cmp(&b.window.start))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(count: usize, words_each: usize) -> String {
        (0..count)
            .map(|i| format!("{} end{}.", vec!["word"; words_each - 1].join(" "), i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn small_config() -> WindowConfig {
        WindowConfig {
            segment_limit: 3,
            min_words: 20,
            max_words: 30,
        }
    }

    #[test]
    fn test_windows_are_sentence_aligned_and_disjoint() {
        let text = sentences(10, 10);
        let windows = excerpt_windows(Uuid::new_v4(), 10, &text, &small_config());

        assert_eq!(windows.len(), 5);
        for pair in windows.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for w in &windows {
            assert_eq!(w.word_count, 20);
            assert!(w.text.ends_with('.'));
            assert_eq!(&text[w.start..w.end], w.text);
        }
    }

    #[test]
    fn test_long_sentence_restarts_window() {
        let text = format!("{} {} {}", sentences(1, 15), sentences(1, 25), sentences(2, 12));
        let windows = excerpt_windows(Uuid::new_v4(), 10, &text, &small_config());

        // 15 + 25 > 30，从 25 词的句子重新开始并立即成窗
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].word_count, 25);
        assert_eq!(windows[1].word_count, 24);
    }

    #[test]
    fn test_short_segment_has_no_window() {
        let windows = excerpt_windows(Uuid::new_v4(), 10, "Too short.", &WindowConfig::default());
        assert!(windows.is_empty());
    }

    #[test]
    fn test_weighting_profiles() {
        let scores = ExcerptScores {
            engagement: 1.0,
            emotional_intensity: 0.5,
            spoiler_risk: 0.5,
            romantic_tension: 1.0,
        };
        let standard = SampleMode::Standard.weights().overall(&scores);
        let romance = SampleMode::Romance.weights().overall(&scores);
        assert!((standard - (0.45 + 0.175 + 0.10)).abs() < 1e-9);
        assert!((romance - (0.30 + 0.15 + 0.10 + 0.20)).abs() < 1e-9);
    }

    #[test]
    fn test_spoiler_risk_lowers_score() {
        let safe = ExcerptScores {
            engagement: 0.6,
            emotional_intensity: 0.6,
            spoiler_risk: 0.0,
            romantic_tension: 0.0,
        };
        let risky = ExcerptScores {
            spoiler_risk: 1.0,
            ..safe
        };
        let weights = SampleMode::Standard.weights();
        assert!(weights.overall(&safe) > weights.overall(&risky));
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        let scores = ExcerptScores {
            engagement: 7.0,
            emotional_intensity: -1.0,
            spoiler_risk: f64::NAN,
            romantic_tension: 0.0,
        };
        let overall = SampleMode::Standard.weights().overall(&scores);
        assert!((0.0..=1.0).contains(&overall));
        assert!((overall - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_by_score_then_position() {
        let window = |order: u8, start: usize| ExcerptWindow {
            segment_id: Uuid::nil(),
            segment_order: order,
            start,
            end: start + 1,
            text: String::new(),
            word_count: 0,
        };
        let scores = |e: f64| ExcerptScores {
            engagement: e,
            ..Default::default()
        };

        let mut candidates = vec![
            ScoredExcerpt::new(window(11, 0), scores(0.5), SampleMode::Standard),
            ScoredExcerpt::new(window(10, 50), scores(0.5), SampleMode::Standard),
            ScoredExcerpt::new(window(12, 0), scores(0.9), SampleMode::Standard),
            ScoredExcerpt::new(window(10, 10), scores(0.5), SampleMode::Standard),
        ];
        rank(&mut candidates);

        let positions: Vec<(u8, usize)> = candidates
            .iter()
            .map(|c| (c.window.segment_order, c.window.start))
            .collect();
        assert_eq!(positions, vec![(12, 0), (10, 10), (10, 50), (11, 0)]);
    }
}
