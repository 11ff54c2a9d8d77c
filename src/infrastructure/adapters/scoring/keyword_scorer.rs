//! Keyword Scorer - 启发式样章评分
//!
//! 信号：对白密度、标点能量、情绪/剧透/情感关键词出现率。
//! 每项先换算为比率，再按饱和点线性映射到 [0, 1]。

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::application::ports::{ExcerptScorerPort, ScoringError};
use crate::domain::retail_sample::ExcerptScores;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}']+").expect("word pattern"));

static DIALOGUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“”][^"“”]{2,}["“”]"#).expect("dialogue pattern"));

const EMOTION_WORDS: &[&str] = &[
    "afraid", "anger", "angry", "cried", "cry", "desperate", "dread", "fear", "furious",
    "grief", "hate", "heart", "hope", "panic", "pain", "rage", "scream", "screamed", "shaking",
    "sob", "sobbed", "tears", "terrified", "trembling", "wept",
];

const SPOILER_WORDS: &[&str] = &[
    "aftermath", "betrayal", "culprit", "died", "ending", "epilogue", "finally", "funeral",
    "killer", "murderer", "revealed", "secret", "truth", "wedding",
];

const ROMANCE_WORDS: &[&str] = &[
    "blush", "breath", "caress", "desire", "embrace", "gaze", "kiss", "kissed", "lips", "longing",
    "love", "touch", "touched", "want", "whispered",
];

/// 饱和点：达到该比率即记满分
#[derive(Debug, Clone, Copy)]
pub struct ScorerThresholds {
    /// 含对白的句子比例
    pub dialogue_ratio: f64,
    /// `!`/`?` 占句子数的比例
    pub punctuation_ratio: f64,
    /// 每 100 词的关键词数
    pub emotion_per_100: f64,
    pub spoiler_per_100: f64,
    pub romance_per_100: f64,
}

impl Default for ScorerThresholds {
    fn default() -> Self {
        Self {
            dialogue_ratio: 0.5,
            punctuation_ratio: 0.3,
            emotion_per_100: 3.0,
            spoiler_per_100: 1.5,
            romance_per_100: 2.5,
        }
    }
}

/// 启发式评分器
pub struct KeywordScorer {
    thresholds: ScorerThresholds,
    emotion: HashSet<&'static str>,
    spoiler: HashSet<&'static str>,
    romance: HashSet<&'static str>,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new(ScorerThresholds::default())
    }
}

fn saturate(value: f64, at: f64) -> f64 {
    if at <= 0.0 {
        return 0.0;
    }
    (value / at).clamp(0.0, 1.0)
}

impl KeywordScorer {
    pub fn new(thresholds: ScorerThresholds) -> Self {
        Self {
            thresholds,
            emotion: EMOTION_WORDS.iter().copied().collect(),
            spoiler: SPOILER_WORDS.iter().copied().collect(),
            romance: ROMANCE_WORDS.iter().copied().collect(),
        }
    }

    pub fn score_text(&self, text: &str) -> ExcerptScores {
        let words: Vec<String> = WORD
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if words.is_empty() {
            return ExcerptScores::default();
        }

        let per_100 = |set: &HashSet<&'static str>| {
            let hits = words.iter().filter(|w| set.contains(w.as_str())).count();
            hits as f64 * 100.0 / words.len() as f64
        };

        let sentences = crate::domain::chunker::split_sentences(text);
        let sentence_count = sentences.len().max(1) as f64;
        let dialogue = sentences
            .iter()
            .filter(|s| DIALOGUE.is_match(s) || s.starts_with('"') || s.starts_with('“'))
            .count() as f64
            / sentence_count;
        let energetic = text.chars().filter(|c| matches!(c, '!' | '?')).count() as f64
            / sentence_count;

        let t = &self.thresholds;
        let dialogue_score = saturate(dialogue, t.dialogue_ratio);
        let punctuation_score = saturate(energetic, t.punctuation_ratio);
        let emotion_score = saturate(per_100(&self.emotion), t.emotion_per_100);

        ExcerptScores {
            engagement: 0.6 * dialogue_score + 0.4 * punctuation_score,
            emotional_intensity: 0.7 * emotion_score + 0.3 * punctuation_score,
            spoiler_risk: saturate(per_100(&self.spoiler), t.spoiler_per_100),
            romantic_tension: saturate(per_100(&self.romance), t.romance_per_100),
        }
        .clamped()
    }
}

#[async_trait]
impl ExcerptScorerPort for KeywordScorer {
    async fn score(&self, text: &str) -> Result<ExcerptScores, ScoringError> {
        Ok(self.score_text(text))
    }
}
