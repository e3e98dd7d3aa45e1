//! PDF discovery and per-page text extraction.
//!
//! [`scan_pdfs`] finds ingestion candidates in the data directory;
//! [`PdfLoader`] turns one file into a [`Document`] per page. Extraction
//! failures never panic out of this module: they become
//! [`PipelineError::LoaderFailure`] and the orchestrator skips the file.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::models::Document;

/// Name of the archive subdirectory inside the data directory.
pub const PROCESSED_DIR: &str = "processed";

/// Loads a source file into page documents.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Document>, PipelineError>;
}

/// Extracts page text from PDF files via `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, PipelineError> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::loader(path, e))?;
        let pages = extract_pages(&bytes).map_err(|reason| PipelineError::loader(path, reason))?;

        let source = path.to_string_lossy().replace('\\', "/");
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Document {
                text,
                source: source.clone(),
                page: i as u64,
            })
            .collect())
    }
}

fn extract_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    // The extractor can panic on malformed input.
    match catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(format!("PDF extraction failed: {}", e)),
        Err(_) => Err("PDF extraction panicked on malformed input".to_string()),
    }
}

/// List `*.pdf` files (case-insensitive) directly inside `dir`, sorted by name.
///
/// Subdirectories, including `processed/`, are not descended into.
pub fn scan_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let matcher = pdf_matcher()?;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn pdf_matcher() -> Result<GlobMatcher> {
    Ok(GlobBuilder::new("*.pdf")
        .case_insensitive(true)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}
