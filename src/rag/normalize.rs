use std::sync::OnceLock;

use regex::Regex;

/// Generator output after cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAnswer {
    pub text: String,
    pub insufficient: bool,
}

static ANSWER_LABEL: OnceLock<Option<Regex>> = OnceLock::new();
static BLANK_LINES: OnceLock<Option<Regex>> = OnceLock::new();

fn answer_label() -> Option<&'static Regex> {
    ANSWER_LABEL
        .get_or_init(|| Regex::new(r"(?i)^\s*(answer|response)\s*:\s*").ok())
        .as_ref()
}

fn blank_lines() -> Option<&'static Regex> {
    BLANK_LINES
        .get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").ok())
        .as_ref()
}

/// Cleans raw model output and detects the insufficiency sentence.
///
/// Returns `None` when nothing is left after cleanup.
pub fn normalize_answer(raw: &str, insufficient_message: &str) -> Option<NormalizedAnswer> {
    let raw = raw.trim();
    let stripped = match answer_label() {
        Some(re) => re.replace(raw, ""),
        None => raw.into(),
    };
    let collapsed = match blank_lines() {
        Some(re) => re.replace_all(stripped.trim(), "\n\n"),
        None => stripped.trim().into(),
    };
    let text = unwrap_quotes(collapsed.trim()).trim().to_string();

    if text.is_empty() {
        return None;
    }

    let message = insufficient_message.trim();
    let insufficient = !message.is_empty() && sentence_key(&text) == sentence_key(message);

    if insufficient {
        return Some(NormalizedAnswer {
            text: message.to_string(),
            insufficient: true,
        });
    }

    Some(NormalizedAnswer {
        text,
        insufficient: false,
    })
}

/// Drops one pair of double quotes wrapping the whole text.
fn unwrap_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .filter(|inner| !inner.contains('"'))
        .unwrap_or(text)
}

/// Case-, quote- and punctuation-insensitive form of a single sentence.
fn sentence_key(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '.' | '!'))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
