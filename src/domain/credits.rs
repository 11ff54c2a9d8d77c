//! 片头片尾文本
//!
//! 片头 (order 0) 和片尾 (order 98) 不来自稿件，由 Job 元数据生成。

pub const OPENING_TITLE: &str = "Opening Credits";
pub const CLOSING_TITLE: &str = "Closing Credits";

fn byline(author: Option<&str>, narrator: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(author) = author.filter(|a| !a.trim().is_empty()) {
        parts.push(format!("Written by {}.", author.trim()));
    }
    if let Some(narrator) = narrator.filter(|n| !n.trim().is_empty()) {
        parts.push(format!("Narrated by {}.", narrator.trim()));
    }
    parts.join(" ")
}

pub fn opening_text(title: &str, author: Option<&str>, narrator: Option<&str>) -> String {
    let byline = byline(author, narrator);
    if byline.is_empty() {
        format!("{}.", title.trim())
    } else {
        format!("{}. {}", title.trim(), byline)
    }
}

pub fn closing_text(title: &str, author: Option<&str>, narrator: Option<&str>) -> String {
    let byline = byline(author, narrator);
    if byline.is_empty() {
        format!("This has been {}. The end.", title.trim())
    } else {
        format!("This has been {}. {} The end.", title.trim(), byline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits_text() {
        assert_eq!(
            opening_text("The Long Road", Some("A. Writer"), Some("N. Voice")),
            "The Long Road. Written by A. Writer. Narrated by N. Voice."
        );
        assert_eq!(
            closing_text("The Long Road", None, Some(" ")),
            "This has been The Long Road. The end."
        );
    }
}
