//! 稿件分割器
//!
//! 按章节标题把整部稿件切分为有序单元，并根据标题关键字归类:
//! - 前置内容（序言、献词、前言...）-> front_matter
//! - 后置内容（尾声、后记、附录...）-> back_matter
//! - 其他 -> body_chapter

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use super::errors::DomainError;
use super::segment::SegmentType;

/// 标题行最大字符数，超过则视为正文
pub const MAX_HEADING_CHARS: usize = 80;

/// 前置内容关键字
const FRONT_MATTER_KEYWORDS: &[&str] = &[
    "preface",
    "prologue",
    "dedication",
    "foreword",
    "introduction",
    "author's note",
    "author’s note",
];

/// 后置内容关键字
const BACK_MATTER_KEYWORDS: &[&str] = &[
    "epilogue",
    "afterword",
    "appendix",
    "acknowledgments",
    "acknowledgements",
    "glossary",
    "about the author",
];

static CHAPTER_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:chapter|ch\.)\s+(.+)$").expect("chapter heading pattern"));

static NAMED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(preface|prologue|dedication|foreword|introduction|author['’]s\s+note|epilogue|afterword|appendix|acknowledge?ments|glossary|about\s+the\s+author)\b(.*)$",
    )
    .expect("named heading pattern")
});

static BARE_NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]{1,3}|[IVXLC]+)\.?$").expect("bare numeral pattern"));

/// 标题识别模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// `Chapter N` 形式及具名标题
    #[default]
    Standard,
    /// 额外把独占一行的数字/大写罗马数字视为章节标题
    Extended,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Standard => "standard",
            DetectionMode::Extended => "extended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(DetectionMode::Standard),
            "extended" => Some(DetectionMode::Extended),
            _ => None,
        }
    }
}

/// 分割结果单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    pub title: String,
    pub text: String,
    /// 原始出现顺序，从 0 开始
    pub source_order: usize,
    pub segment_type: SegmentType,
}

/// 根据标题关键字归类
pub fn classify_title(title: &str) -> SegmentType {
    let normalized = normalize(title);
    let normalized = normalized.trim_start_matches(|c: char| !c.is_alphanumeric());

    if FRONT_MATTER_KEYWORDS.iter().any(|k| normalized.starts_with(k)) {
        SegmentType::FrontMatter
    } else if BACK_MATTER_KEYWORDS.iter().any(|k| normalized.starts_with(k)) {
        SegmentType::BackMatter
    } else {
        SegmentType::BodyChapter
    }
}

/// 切分稿件
///
/// - 未识别到任何标题时，整部稿件作为一个 body_chapter
/// - 重复的标题文本只有第一次出现被视为标题，之后作为正文
/// - 第一个标题之前的非空内容作为 front_matter 单元
pub fn parse_manuscript(text: &str, mode: DetectionMode) -> Result<Vec<ParsedUnit>, DomainError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyManuscript);
    }

    // (标题, 标题行起始偏移, 标题行结束偏移)
    let mut headings: Vec<(String, usize, usize)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        if let Some(title) = detect_heading(line.trim(), mode) {
            if seen.insert(normalize(&title)) {
                headings.push((title, start, offset));
            }
        }
    }

    if headings.is_empty() {
        return Ok(vec![ParsedUnit {
            title: "Chapter 1".to_string(),
            text: trimmed.to_string(),
            source_order: 0,
            segment_type: SegmentType::BodyChapter,
        }]);
    }

    let mut units = Vec::with_capacity(headings.len() + 1);

    let preamble = text[..headings[0].1].trim();
    if !preamble.is_empty() {
        units.push(ParsedUnit {
            title: "Front Matter".to_string(),
            text: preamble.to_string(),
            source_order: 0,
            segment_type: SegmentType::FrontMatter,
        });
    }

    for (i, (title, _, body_start)) in headings.iter().enumerate() {
        let body_end = headings
            .get(i + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(text.len());

        units.push(ParsedUnit {
            segment_type: classify_title(title),
            title: title.clone(),
            text: text[*body_start..body_end].trim().to_string(),
            source_order: units.len(),
        });
    }

    Ok(units)
}

/// 判断一行是否为标题，返回标题文本
fn detect_heading(line: &str, mode: DetectionMode) -> Option<String> {
    if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS {
        return None;
    }

    if let Some(caps) = CHAPTER_HEADING.captures(line) {
        let rest = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some((_, tail, separated)) = split_numeral(rest) {
            if separated || is_heading_tail(tail) {
                return Some(line.to_string());
            }
        }
    }

    if let Some(caps) = NAMED_HEADING.captures(line) {
        let tail = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if is_heading_tail(tail) {
            return Some(line.to_string());
        }
    }

    if mode == DetectionMode::Extended && BARE_NUMERAL.is_match(line) {
        let numeral = line.trim_end_matches('.');
        if let Some(n) = parse_number(numeral) {
            return Some(format!("Chapter {}", n));
        }
    }

    None
}

/// 标题尾部（副标题）校验：空、以分隔符开头、或是不超过 5 个词且不以句末标点结尾的短语
fn is_heading_tail(tail: &str) -> bool {
    let tail = tail.trim();
    if tail.is_empty() {
        return true;
    }
    if tail.starts_with([':', '.', '-', '–', '—']) {
        return true;
    }
    tail.split_whitespace().count() <= 5 && !tail.ends_with(['.', ',', ';', '!', '?'])
}

const SEPARATORS: [char; 6] = [':', '.', ',', '-', '–', '—'];

/// 拆出开头的章节序号（数字、罗马数字或英文数词）
///
/// 返回 (序号, 剩余部分, 序号后是否紧跟分隔符)，如 "1: The Return" 的分隔符粘在序号上。
fn split_numeral(rest: &str) -> Option<(u32, &str, bool)> {
    let (first, after_first) = split_word(rest);
    let first_clean = first.trim_end_matches(SEPARATORS);

    // 两个词组成的数词，如 "Forty Two"
    if first_clean.len() == first.len() {
        let (second, after_second) = split_word(after_first);
        let second_clean = second.trim_end_matches(SEPARATORS);
        if let Some(n) = parse_compound_word(first_clean, second_clean) {
            return Some((n, after_second, second_clean.len() < second.len()));
        }
    }

    let n = parse_number(first_clean)?;
    Some((n, after_first, first_clean.len() < first.len()))
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn parse_number(token: &str) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return (n > 0 && n < 1000).then_some(n);
    }
    parse_roman(token).or_else(|| parse_number_word(token))
}

fn parse_roman(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 12 {
        return None;
    }
    let value_of = |c: char| match c.to_ascii_uppercase() {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };

    let values: Vec<i64> = token.chars().map(value_of).collect::<Option<_>>()?;
    let total = values
        .iter()
        .enumerate()
        .fold(0i64, |acc, (i, v)| match values.get(i + 1) {
            Some(next) if next > v => acc - v,
            _ => acc + v,
        });

    // 只接受规范写法（重新编码后一致），避免把普通单词当作罗马数字
    if total <= 0 || total >= 4000 {
        return None;
    }
    let total = total as u32;
    (to_roman(total).eq_ignore_ascii_case(token)).then_some(total)
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while n >= *value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

fn parse_number_word(token: &str) -> Option<u32> {
    let lower = token.to_lowercase();
    if let Some((tens, ones)) = lower.split_once('-') {
        return parse_compound_word(tens, ones);
    }
    unit_word(&lower).or_else(|| tens_word(&lower))
}

fn parse_compound_word(tens: &str, ones: &str) -> Option<u32> {
    let tens = tens_word(&tens.to_lowercase())?;
    let ones = unit_word(&ones.to_lowercase()).filter(|n| *n < 10)?;
    Some(tens + ones)
}

fn unit_word(word: &str) -> Option<u32> {
    const UNITS: &[&str] = &[
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
        "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen",
    ];
    UNITS.iter().position(|w| *w == word).map(|i| i as u32 + 1)
}

fn tens_word(word: &str) -> Option<u32> {
    const TENS: &[&str] = &[
        "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    TENS.iter()
        .position(|w| *w == word)
        .map(|i| (i as u32 + 2) * 10)
}

/// 标题去重用的规范化形式
fn normalize(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(units: &[ParsedUnit]) -> Vec<&str> {
        units.iter().map(|u| u.title.as_str()).collect()
    }

    #[test]
    fn test_empty_manuscript_fails() {
        assert_eq!(
            parse_manuscript("  \n\t \n", DetectionMode::Standard),
            Err(DomainError::EmptyManuscript)
        );
    }

    #[test]
    fn test_no_headings_single_body_chapter() {
        let units = parse_manuscript("It was a dark night.\nNothing happened.", DetectionMode::Standard)
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].segment_type, SegmentType::BodyChapter);
        assert_eq!(units[0].text, "It was a dark night.\nNothing happened.");
    }

    #[test]
    fn test_prologue_chapters_epilogue() {
        let text = "Prologue\nThe storm came.\n\nChapter 1\nMorning.\n\nChapter 2\nNoon.\n\nEpilogue\nAfter.";
        let units = parse_manuscript(text, DetectionMode::Standard).unwrap();

        assert_eq!(titles(&units), vec!["Prologue", "Chapter 1", "Chapter 2", "Epilogue"]);
        let types: Vec<SegmentType> = units.iter().map(|u| u.segment_type).collect();
        assert_eq!(
            types,
            vec![
                SegmentType::FrontMatter,
                SegmentType::BodyChapter,
                SegmentType::BodyChapter,
                SegmentType::BackMatter
            ]
        );
        assert_eq!(units[1].text, "Morning.");
        assert_eq!(units[3].text, "After.");
    }

    #[test]
    fn test_source_order_strictly_increasing() {
        let mut text = String::new();
        for i in 1..=12 {
            text.push_str(&format!("Chapter {}\nBody of chapter {}.\n\n", i, i));
        }
        let units = parse_manuscript(&text, DetectionMode::Standard).unwrap();
        assert_eq!(units.len(), 12);
        assert!(units.iter().all(|u| u.segment_type == SegmentType::BodyChapter));
        for pair in units.windows(2) {
            assert!(pair[0].source_order < pair[1].source_order);
        }
    }

    #[test]
    fn test_worded_and_roman_headings() {
        let text = "CHAPTER ONE\na\nChapter Twenty-One: The Return\nb\nChapter IV\nc\nChapter Forty Two\nd";
        let units = parse_manuscript(text, DetectionMode::Standard).unwrap();
        assert_eq!(
            titles(&units),
            vec![
                "CHAPTER ONE",
                "Chapter Twenty-One: The Return",
                "Chapter IV",
                "Chapter Forty Two"
            ]
        );
    }

    #[test]
    fn test_duplicate_heading_is_body_text() {
        let text = "Chapter 1\nFirst.\nChapter 1\nStill first.\nChapter 2\nSecond.";
        let units = parse_manuscript(text, DetectionMode::Standard).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "First.\nChapter 1\nStill first.");
    }

    #[test]
    fn test_prose_starting_with_keyword_is_not_heading() {
        let text = "Chapter 1\nChapter two was shorter than the first one, she said.\nMore.";
        let units = parse_manuscript(text, DetectionMode::Standard).unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_preamble_becomes_front_matter() {
        let text = "The Long Road\nby A. Writer\n\nChapter 1\nStart.";
        let units = parse_manuscript(text, DetectionMode::Standard).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].segment_type, SegmentType::FrontMatter);
        assert_eq!(units[0].source_order, 0);
        assert_eq!(units[1].source_order, 1);
    }

    #[test]
    fn test_extended_mode_bare_numerals() {
        let text = "1\nFirst.\n\nII\nSecond.";
        let standard = parse_manuscript(text, DetectionMode::Standard).unwrap();
        assert_eq!(standard.len(), 1);

        let extended = parse_manuscript(text, DetectionMode::Extended).unwrap();
        assert_eq!(titles(&extended), vec!["Chapter 1", "Chapter 2"]);
    }

    #[test]
    fn test_classify_title() {
        assert_eq!(classify_title("Author's Note"), SegmentType::FrontMatter);
        assert_eq!(classify_title("  DEDICATION"), SegmentType::FrontMatter);
        assert_eq!(classify_title("About the Author"), SegmentType::BackMatter);
        assert_eq!(classify_title("Appendix B: Maps"), SegmentType::BackMatter);
        assert_eq!(classify_title("Chapter 3: The Prologue of War"), SegmentType::BodyChapter);
    }

    #[test]
    fn test_roman_parsing() {
        assert_eq!(parse_roman("XIV"), Some(14));
        assert_eq!(parse_roman("iv"), Some(4));
        assert_eq!(parse_roman("IIII"), None);
        assert_eq!(parse_roman("did"), None);
        assert_eq!(parse_number("twelve"), Some(12));
        assert_eq!(parse_number("ninety-nine"), Some(99));
        assert_eq!(parse_number("and"), None);
        assert_eq!(split_numeral("1: The Return"), Some((1, " The Return", true)));
        assert_eq!(split_numeral("Forty Two"), Some((42, "", false)));
    }
}
