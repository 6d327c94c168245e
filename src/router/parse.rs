//! Tolerant parsing of classifier output
//!
//! Models asked for JSON still wrap it in code fences, answer with Python dict
//! literals or reply with a bare label. The parser repairs the common cases before
//! giving up.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("not a JSON object: {0}")]
    NotJson(String),

    #[error("missing route label")]
    MissingLabel,

    #[error("unknown route label '{0}'")]
    UnknownLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLabel {
    Chat,
    ProductSearch,
}

impl RouteLabel {
    /// Current labels plus the legacy `retrieval`/`rag` spellings
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "chat" => Some(RouteLabel::Chat),
            "product_search" | "product-search" | "retrieval" | "rag" => Some(RouteLabel::ProductSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: RouteLabel,
    /// Normalized query, if the model provided a non-blank one
    pub query: Option<String>,
}

/// Compiled repair rules
pub struct ResponseParser {
    fence: Regex,
    object: Regex,
    py_none: Regex,
    py_true: Regex,
    py_false: Regex,
    quoted_key: Regex,
    quoted_value: Regex,
    quoted_item: Regex,
    trailing_comma: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            fence: Regex::new(r"(?i)```(?:json|python)?\n?")?,
            // first {...} block, allowing one level of nesting
            object: Regex::new(r"(?s)\{(?:[^{}]|\{[^{}]*\})*\}")?,
            py_none: Regex::new(r"\bNone\b")?,
            py_true: Regex::new(r"\bTrue\b")?,
            py_false: Regex::new(r"\bFalse\b")?,
            quoted_key: Regex::new(r"'([^']*)'\s*:")?,
            quoted_value: Regex::new(r":\s*'([^']*)'")?,
            quoted_item: Regex::new(r"([\[,]\s*)'([^']*)'")?,
            trailing_comma: Regex::new(r",\s*([}\]])")?,
        })
    }

    pub fn parse(&self, raw: &str) -> Result<Classification, ParseError> {
        let text = self.fence.replace_all(raw, "");
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        let Some(object) = self.object.find(text) else {
            return bare_label(text);
        };

        let value = self.load(object.as_str())?;
        let Value::Object(map) = value else {
            return Err(ParseError::NotJson(object.as_str().to_string()));
        };

        let label = map
            .get("route")
            .or_else(|| map.get("router"))
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingLabel)?;
        let label = RouteLabel::parse(label).ok_or_else(|| ParseError::UnknownLabel(label.to_string()))?;

        let query = map
            .get("query")
            .or_else(|| map.get("infor"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        Ok(Classification { label, query })
    }

    /// Strict JSON first, then again after repairing Python-literal quirks
    fn load(&self, candidate: &str) -> Result<Value, ParseError> {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }

        let repaired = self.py_none.replace_all(candidate.trim(), "null");
        let repaired = self.py_true.replace_all(&repaired, "true");
        let repaired = self.py_false.replace_all(&repaired, "false");
        let repaired = self.quoted_key.replace_all(&repaired, "\"$1\":");
        let repaired = self.quoted_value.replace_all(&repaired, ": \"$1\"");
        let repaired = self.quoted_item.replace_all(&repaired, "$1\"$2\"");
        let repaired = self.trailing_comma.replace_all(&repaired, "$1");

        serde_json::from_str(&repaired).map_err(|e| ParseError::NotJson(e.to_string()))
    }
}

fn bare_label(text: &str) -> Result<Classification, ParseError> {
    let word = text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '.' | '`'));
    match RouteLabel::parse(word) {
        Some(label) => Ok(Classification { label, query: None }),
        None => Err(ParseError::NotJson(text.chars().take(80).collect())),
    }
}
