//! Citation deduplication for chat answers.
//!
//! Retrieval usually returns several chunks from the same page. This module
//! collapses them into one citation per `(source, page)` pair, keeping the
//! first-seen (most relevant) order. Passages missing either piece of
//! metadata fall back to an excerpt-prefix key so distinct unknown passages
//! are never merged.

use std::collections::HashSet;

use crate::models::{PageNumber, RetrievedPassage};

/// Characters of the excerpt used to tell apart passages with missing metadata.
pub const FALLBACK_PREFIX_CHARS: usize = 50;
/// Characters of the excerpt shown under a citation.
pub const SNIPPET_CHARS: usize = 200;

const UNKNOWN: &str = "Unknown";

/// Deduplication identity of a retrieved passage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CitationKey {
    Known {
        source: String,
        page: u64,
    },
    Fallback {
        source: Option<String>,
        page: Option<u64>,
        excerpt_prefix: String,
    },
}

impl CitationKey {
    pub fn for_passage(passage: &RetrievedPassage) -> Self {
        match (&passage.source, passage.page) {
            (Some(source), PageNumber::Known(page)) => CitationKey::Known {
                source: source.clone(),
                page,
            },
            (source, page) => CitationKey::Fallback {
                source: source.clone(),
                page: page.known(),
                excerpt_prefix: passage.content.chars().take(FALLBACK_PREFIX_CHARS).collect(),
            },
        }
    }
}

/// One rendered source reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub source: Option<String>,
    pub page: PageNumber,
    pub snippet: String,
}

impl Citation {
    pub fn render(&self) -> String {
        format!(
            "Source: {} (Page {})\n  \"{}\"",
            self.source.as_deref().unwrap_or(UNKNOWN),
            self.page,
            self.snippet
        )
    }
}

/// Collapse passages into unique citations, preserving first-seen order.
pub fn dedupe_citations(passages: &[RetrievedPassage]) -> Vec<Citation> {
    let mut seen: HashSet<CitationKey> = HashSet::new();
    let mut citations = Vec::new();

    for passage in passages {
        // Passages built by hand may skip normalization.
        let normalized = RetrievedPassage {
            source: crate::models::normalize_source(passage.source.as_deref()),
            ..passage.clone()
        };
        if !seen.insert(CitationKey::for_passage(&normalized)) {
            continue;
        }
        citations.push(Citation {
            snippet: snippet(&normalized.content),
            source: normalized.source,
            page: normalized.page,
        });
    }

    citations
}

/// Render the deduplicated citation list, one block per citation.
///
/// Returns an empty string when there is nothing to cite.
pub fn render_citations(passages: &[RetrievedPassage]) -> String {
    dedupe_citations(passages)
        .iter()
        .map(Citation::render)
        .collect::<Vec<_>>()
        .join("\n")
}

fn snippet(content: &str) -> String {
    let head: String = content.chars().take(SNIPPET_CHARS).collect();
    let flat = head.replace("\r\n", " ").replace(['\n', '\r'], " ");
    format!("{}...", flat)
}
