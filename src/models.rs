//! Core data models used throughout ragdesk.
//!
//! These types represent the pages, chunks, retrieved passages, and chat
//! turns that flow through the ingestion and question-answering pipeline.

use serde_json::Value;

/// One page of text produced by a [`DocumentLoader`](crate::loader::DocumentLoader).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    /// Source path with `/` separators.
    pub source: String,
    /// 0-based page index within the source file.
    pub page: u64,
}

/// A bounded slice of a document's text; the unit stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: u64,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Page number attached to a retrieved passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageNumber {
    Known(u64),
    Unknown,
}

impl PageNumber {
    /// Coerce raw metadata into a page number.
    ///
    /// Non-negative JSON numbers (integral or float) and numeric strings
    /// become [`PageNumber::Known`]; everything else is `Unknown`.
    pub fn from_json(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Number(n)) => {
                if let Some(u) = n.as_u64() {
                    PageNumber::Known(u)
                } else {
                    match n.as_f64() {
                        Some(f) if f.is_finite() && f >= 0.0 => PageNumber::Known(f.trunc() as u64),
                        _ => PageNumber::Unknown,
                    }
                }
            }
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() && f >= 0.0 => PageNumber::Known(f.trunc() as u64),
                _ => PageNumber::Unknown,
            },
            _ => PageNumber::Unknown,
        }
    }

    pub fn known(self) -> Option<u64> {
        match self {
            PageNumber::Known(n) => Some(n),
            PageNumber::Unknown => None,
        }
    }
}

impl std::fmt::Display for PageNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageNumber::Known(n) => write!(f, "{}", n),
            PageNumber::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One chunk of source text returned by retrieval for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    /// Source path, `None` when the metadata carried none.
    pub source: Option<String>,
    pub page: PageNumber,
    pub content: String,
    pub score: Option<f32>,
}

impl RetrievedPassage {
    pub fn new(source: Option<&str>, page: PageNumber, content: impl Into<String>) -> Self {
        Self {
            source: normalize_source(source),
            page,
            content: content.into(),
            score: None,
        }
    }

    /// Build a passage from vector-store metadata (`source`, `page`, `text`).
    pub fn from_metadata(metadata: &Value, score: Option<f32>) -> Self {
        let source = metadata.get("source").and_then(|v| v.as_str());
        let content = metadata
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Self {
            source: normalize_source(source),
            page: PageNumber::from_json(metadata.get("page")),
            content: content.to_string(),
            score,
        }
    }
}

/// Rewrite backslash separators so one file never appears under two spellings.
pub fn normalize_source(source: Option<&str>) -> Option<String> {
    source
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.replace('\\', "/"))
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Ai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            text: text.into(),
        }
    }
}
