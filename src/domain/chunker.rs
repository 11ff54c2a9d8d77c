//! 合成分块器
//!
//! 把片段文本切成适合语音合成的块，同时受词数和字符数两个上限约束，
//! 先触达的上限生效。分块只发生在句子边界，绝不切断句子。

use serde::{Deserialize, Serialize};

use super::segment::{char_count, word_count};

/// 默认单块最大词数
pub const DEFAULT_MAX_WORDS: usize = 750;

/// 默认单块最大字符数
pub const DEFAULT_MAX_CHARS: usize = 4500;

/// 分块上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLimits {
    pub max_words: usize,
    pub max_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// 合成块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub word_count: usize,
    pub char_count: usize,
    /// 单句本身超出上限时整句成块，不截断
    pub oversized: bool,
}

/// 句末标点（后面需跟空白才算句子结束）
#[inline]
fn is_terminal(ch: char) -> bool {
    matches!(ch, '.' | '?' | '!' | '…')
}

/// 全角句末标点（总是分割）
#[inline]
fn is_full_width_terminal(ch: char) -> bool {
    matches!(ch, '。' | '？' | '！')
}

/// 句末标点后可以紧跟的收尾符号
#[inline]
fn is_closer(ch: char) -> bool {
    matches!(
        ch,
        '"' | '\'' | ')' | ']' | '»' | '\u{201D}' | '\u{2019}' | '」' | '』'
    )
}

/// 换行后（忽略行内空白）又是换行，即空行分段
fn is_paragraph_break(rest: &str) -> bool {
    rest.trim_start_matches([' ', '\t', '\r']).starts_with('\n')
}

/// 按句子切分，返回去除首尾空白后的字节区间
pub fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];

        if is_terminal(ch) || is_full_width_terminal(ch) {
            let mut j = i + 1;
            while j < chars.len() && is_closer(chars[j].1) {
                j += 1;
            }
            let followed_by_space = chars.get(j).map_or(true, |(_, c)| c.is_whitespace());
            if is_full_width_terminal(ch) || followed_by_space {
                let end = chars.get(j).map_or(text.len(), |(p, _)| *p);
                push_trimmed(text, start, end, &mut spans);
                start = end;
                i = j;
                continue;
            }
        } else if ch == '\n' && is_paragraph_break(&text[pos + 1..]) {
            push_trimmed(text, start, pos, &mut spans);
            start = pos;
        }

        i += 1;
    }

    push_trimmed(text, start, text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing < slice.len() {
        spans.push((start + leading, end - trailing));
    }
}

/// 按句子切分
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_spans(text)
        .into_iter()
        .map(|(s, e)| &text[s..e])
        .collect()
}

/// 分块
///
/// 逐句贪心累加：追加下一句前检查 (当前词数 + 下一句词数 > max_words) 或
/// 追加后字符数 > max_chars，任一成立则关闭当前块，下一句开启新块。
/// 所有块按顺序拼接（忽略块间空白）即还原原文。
pub fn chunk_text(text: &str, limits: &ChunkLimits) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    // (块起始, 块结束, 词数)
    let mut current: Option<(usize, usize, usize)> = None;

    for (start, end) in sentence_spans(text) {
        let words = word_count(&text[start..end]);

        current = match current {
            None => Some((start, end, words)),
            Some((chunk_start, chunk_end, chunk_words)) => {
                let next_chars = char_count(&text[chunk_start..end]);
                if chunk_words + words > limits.max_words || next_chars > limits.max_chars {
                    chunks.push(make_chunk(&text[chunk_start..chunk_end], limits));
                    Some((start, end, words))
                } else {
                    Some((chunk_start, end, chunk_words + words))
                }
            }
        };
    }

    if let Some((chunk_start, chunk_end, _)) = current {
        chunks.push(make_chunk(&text[chunk_start..chunk_end], limits));
    }

    chunks
}

fn make_chunk(text: &str, limits: &ChunkLimits) -> Chunk {
    let words = word_count(text);
    let chars = char_count(text);
    let oversized = words > limits.max_words || chars > limits.max_chars;

    if oversized {
        tracing::warn!(
            words = words,
            chars = chars,
            max_words = limits.max_words,
            max_chars = limits.max_chars,
            "Single sentence exceeds chunk limits, emitting as its own chunk"
        );
    }

    Chunk {
        text: text.to_string(),
        word_count: words,
        char_count: chars,
        oversized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_ws(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn joined(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_split_sentences() {
        let text = "He ran. \"Stop!\" she cried.  Why? Because.";
        assert_eq!(
            split_sentences(text),
            vec!["He ran.", "\"Stop!\"", "she cried.", "Why?", "Because."]
        );
    }

    #[test]
    fn test_no_split_inside_numbers_or_ellipsis() {
        let text = "It cost 3.50 dollars... Then more.";
        assert_eq!(
            split_sentences(text),
            vec!["It cost 3.50 dollars...", "Then more."]
        );
    }

    #[test]
    fn test_full_width_terminals_always_split() {
        assert_eq!(split_sentences("第一句。第二句！"), vec!["第一句。", "第二句！"]);
    }

    #[test]
    fn test_paragraph_break_is_boundary() {
        let text = "Heading without period\n\nBody starts here.";
        assert_eq!(
            split_sentences(text),
            vec!["Heading without period", "Body starts here."]
        );
    }

    #[test]
    fn test_word_limit_binds() {
        let text = "One two three. Four five six. Seven eight nine.";
        let limits = ChunkLimits {
            max_words: 6,
            max_chars: 1000,
        };
        let chunks = chunk_text(text, &limits);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "One two three. Four five six.");
        assert_eq!(chunks[1].text, "Seven eight nine.");
        assert!(chunks.iter().all(|c| !c.oversized));
    }

    #[test]
    fn test_char_limit_binds() {
        let text = "Aaaaaaaaaa. Bbbbbbbbbb. Cccccccccc.";
        let limits = ChunkLimits {
            max_words: 100,
            max_chars: 23,
        };
        let chunks = chunk_text(text, &limits);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Aaaaaaaaaa. Bbbbbbbbbb.");
        assert!(chunks.iter().all(|c| c.char_count <= 23));
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "word ".repeat(20).trim_end().to_string() + ".";
        let text = format!("Short one. {} Short two.", long);
        let limits = ChunkLimits {
            max_words: 5,
            max_chars: 1000,
        };
        let chunks = chunk_text(&text, &limits);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].oversized);
        assert_eq!(chunks[1].text, long);
        assert_eq!(chunks[1].word_count, 20);
    }

    #[test]
    fn test_concatenation_reproduces_text() {
        let text = "The night was long.\n\nShe waited, listening. \"Is anyone there?\" No answer came!\n\
                    Outside, the wind... it howled. Morning came at last.";
        for (max_words, max_chars) in [(3, 1000), (8, 40), (1000, 1000), (1, 1)] {
            let chunks = chunk_text(text, &ChunkLimits { max_words, max_chars });
            assert_eq!(normalize_ws(&joined(&chunks)), normalize_ws(text));
            for chunk in &chunks {
                let within = chunk.word_count <= max_words && chunk.char_count <= max_chars;
                assert!(within || (chunk.oversized && split_sentences(&chunk.text).len() == 1));
            }
        }
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("   \n ", &ChunkLimits::default()).is_empty());
    }
}
