//! Model-output parsing.
//!
//! The prompts ask for `{"natural_text": "..."}`. Models mostly comply, but
//! some wrap the object in a ```json fence and some ignore the instruction
//! and answer with bare Markdown. Anything that does not parse is used as
//! the page text verbatim; a malformed answer is still an answer.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*\n(.*?)\n?```\s*$").expect("valid regex")
});

static FIGURE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?figure>").expect("valid regex"));

/// Page text extracted from one model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub text: String,
    /// True when the answer was the structured JSON form.
    pub structured: bool,
}

/// Extract the page text from a raw model answer.
pub fn parse_model_output(raw: &str) -> ParsedOutput {
    match natural_text(raw) {
        Some(text) => ParsedOutput {
            text: FIGURE_TAG.replace_all(&text, "").trim().to_string(),
            structured: true,
        },
        None => {
            debug!(
                "Model output is not structured JSON; using raw text ({} chars)",
                raw.len()
            );
            ParsedOutput {
                text: raw.to_string(),
                structured: false,
            }
        }
    }
}

fn natural_text(raw: &str) -> Option<String> {
    let candidate = JSON_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let value: serde_json::Value = serde_json::from_str(candidate.trim()).ok()?;
    match value.get("natural_text")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_answer_is_unwrapped() {
        let p = parse_model_output(r##"{"natural_text": "# Title\n\nBody"}"##);
        assert!(p.structured);
        assert_eq!(p.text, "# Title\n\nBody");
    }

    #[test]
    fn fenced_json_is_accepted() {
        let p = parse_model_output("```json\n{\"natural_text\": \"Hello\"}\n```");
        assert!(p.structured);
        assert_eq!(p.text, "Hello");
    }

    #[test]
    fn figure_tags_are_stripped_from_structured_text() {
        let p = parse_model_output(
            r#"{"natural_text": "  Intro\n<figure>A bar chart of sales</figure>\n"}"#,
        );
        assert_eq!(p.text, "Intro\nA bar chart of sales");
    }

    #[test]
    fn null_text_is_empty() {
        let p = parse_model_output(r#"{"natural_text": null}"#);
        assert!(p.structured);
        assert_eq!(p.text, "");
    }

    #[test]
    fn plain_markdown_is_kept_verbatim() {
        let raw = "  # Not JSON\n\n<figure>x</figure>\n";
        let p = parse_model_output(raw);
        assert!(!p.structured);
        assert_eq!(p.text, raw);
    }

    #[test]
    fn json_without_the_key_falls_back() {
        let raw = r#"{"text": "wrong key"}"#;
        let p = parse_model_output(raw);
        assert!(!p.structured);
        assert_eq!(p.text, raw);
    }

    #[test]
    fn truncated_json_falls_back() {
        let raw = r#"{"natural_text": "cut off mid"#;
        assert_eq!(parse_model_output(raw).text, raw);
    }
}
