//! Ingestion orchestration.
//!
//! One run walks the data directory and, per candidate PDF:
//!
//! 1. hashes the content (a file that cannot be hashed is skipped),
//! 2. skips it if the hash is already recorded, or if an earlier candidate in
//!    the same run has identical content,
//! 3. loads its pages (a corrupt file is skipped, the rest continue).
//!
//! Only after the whole scan are the loaded pages split into chunks, then
//! embedded and upserted in fixed-size batches. A file is archived into
//! `processed/` and recorded in the state tracker strictly after its last
//! chunk has been uploaded. The first failed batch aborts the run; files not
//! yet committed stay where they are and are retried next time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::chunk::TextSplitter;
use crate::config::{Config, IngestConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::PipelineError;
use crate::loader::{scan_pdfs, DocumentLoader, PdfLoader, PROCESSED_DIR};
use crate::models::Chunk;
use crate::progress::{FileOutcome, IngestEvent, IngestProgressReporter, NoProgress, ProgressMode};
use crate::state::{compute_content_hash, LoadStatus, StateTracker};
use crate::vector_store::{PineconeStore, VectorStore};

/// Counts and outcomes of one ingestion run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    pub scanned: usize,
    pub skipped: usize,
    /// Same content as an earlier candidate in this run; left in place.
    pub duplicates: usize,
    pub hash_failures: usize,
    pub load_failures: usize,
    /// Loaded but produced no text chunks.
    pub empty: usize,
    pub documents: usize,
    pub chunks: usize,
    pub uploaded_chunks: usize,
    /// Original filenames archived and recorded this run.
    pub archived: Vec<String>,
    pub archive_failures: Vec<String>,
    /// Files uploaded and archived whose record could not be persisted.
    pub state_errors: Vec<String>,
}

impl IngestReport {
    /// True when every uploaded file was archived and recorded.
    pub fn is_clean(&self) -> bool {
        self.archive_failures.is_empty() && self.state_errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub hash_algorithm: String,
    pub hash_chunk_size: usize,
}

impl From<&IngestConfig> for IngestSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            batch_size: config.batch_size,
            hash_algorithm: config.hash_algorithm.clone(),
            hash_chunk_size: config.hash_chunk_size,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

/// A new file; its chunks end (exclusive) at `chunk_end` in the batch.
#[derive(Debug, Clone)]
struct PendingFile {
    path: PathBuf,
    name: String,
    hash: String,
    chunk_end: usize,
}

/// Output of the scan phase: everything needed to upload and commit.
#[derive(Debug)]
pub struct PreparedBatch {
    pub report: IngestReport,
    pub chunks: Vec<Chunk>,
    files: Vec<PendingFile>,
}

impl PreparedBatch {
    /// Names of the files that would be archived if every batch uploads.
    pub fn pending_files(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }
}

pub struct IngestPipeline<'a> {
    loader: &'a dyn DocumentLoader,
    settings: IngestSettings,
    progress: Box<dyn IngestProgressReporter>,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(loader: &'a dyn DocumentLoader, settings: IngestSettings) -> Self {
        Self {
            loader,
            settings,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Hash, filter, load, and split the candidates. No side effects.
    pub fn prepare(&self, candidates: &[PathBuf], tracker: &StateTracker) -> PreparedBatch {
        let mut report = IngestReport {
            scanned: candidates.len(),
            ..IngestReport::default()
        };
        self.progress.report(IngestEvent::Scanned {
            files: candidates.len() as u64,
        });

        let mut loaded = Vec::new();
        let mut accepted: HashMap<String, String> = HashMap::new();
        for path in candidates {
            let name = file_name(path);
            let hash = match compute_content_hash(
                path,
                &self.settings.hash_algorithm,
                self.settings.hash_chunk_size,
            ) {
                Ok(hash) => hash,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "hashing failed; skipping file");
                    report.hash_failures += 1;
                    self.report_file(&name, FileOutcome::HashFailed(e.to_string()));
                    continue;
                }
            };

            if tracker.is_processed(&hash) {
                tracing::debug!(file = %name, "already processed");
                report.skipped += 1;
                self.report_file(&name, FileOutcome::Skipped);
                continue;
            }

            if let Some(first) = accepted.get(&hash) {
                tracing::info!(file = %name, same_as = %first, "duplicate content in this run");
                report.duplicates += 1;
                self.report_file(&name, FileOutcome::Duplicate { of: first.clone() });
                continue;
            }
            accepted.insert(hash.clone(), name.clone());

            match self.loader.load(path) {
                Ok(documents) => loaded.push((path.clone(), name, hash, documents)),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "load failed; skipping file");
                    report.load_failures += 1;
                    self.report_file(&name, FileOutcome::LoadFailed(e.to_string()));
                }
            }
        }

        // Splitting starts only once every candidate has been loaded.
        let splitter = TextSplitter::new(self.settings.chunk_size, self.settings.chunk_overlap);
        let mut chunks = Vec::new();
        let mut files = Vec::new();
        for (path, name, hash, documents) in loaded {
            let before = chunks.len();
            for doc in &documents {
                chunks.extend(splitter.split_document(doc));
            }
            if chunks.len() == before {
                tracing::warn!(file = %name, "no extractable text; possibly a scanned image");
                report.empty += 1;
                self.report_file(&name, FileOutcome::Empty);
                continue;
            }
            report.documents += documents.len();
            self.report_file(
                &name,
                FileOutcome::Loaded {
                    pages: documents.len(),
                },
            );
            files.push(PendingFile {
                path,
                name,
                hash,
                chunk_end: chunks.len(),
            });
        }
        report.chunks = chunks.len();

        PreparedBatch {
            report,
            chunks,
            files,
        }
    }

    /// Embed and upsert `batch.chunks`, committing each file once all of its
    /// chunks are stored.
    ///
    /// Returns [`PipelineError::UploadFailure`] (wrapped) for the first batch
    /// that fails; files committed before it stay committed.
    pub async fn upload(
        &self,
        batch: PreparedBatch,
        data_dir: &Path,
        embedder: &dyn Embedder,
        store: &dyn VectorStore,
        tracker: &mut StateTracker,
    ) -> Result<IngestReport> {
        let PreparedBatch {
            mut report,
            chunks,
            files,
        } = batch;
        let total = chunks.len();
        let batch_size = self.settings.batch_size.max(1);
        let mut next_file = 0usize;

        for (i, group) in chunks.chunks(batch_size).enumerate() {
            let start = i * batch_size;
            let end = start + group.len();

            let texts: Vec<String> = group.iter().map(|c| c.text.clone()).collect();
            let stored = match embedder.embed(&texts).await {
                Ok(vectors) => store.upsert(group, &vectors).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                tracing::error!(start, end, error = %e, "batch upload failed; aborting run");
                return Err(PipelineError::UploadFailure {
                    start,
                    end,
                    reason: format!("{:#}", e),
                }
                .into());
            }

            report.uploaded_chunks = end;
            self.progress.report(IngestEvent::Uploading {
                n: end as u64,
                total: total as u64,
            });

            while next_file < files.len() && files[next_file].chunk_end <= end {
                self.commit(&files[next_file], data_dir, tracker, &mut report);
                next_file += 1;
            }
        }

        Ok(report)
    }

    /// Prepare then upload in one go.
    pub async fn run(
        &self,
        data_dir: &Path,
        candidates: &[PathBuf],
        embedder: &dyn Embedder,
        store: &dyn VectorStore,
        tracker: &mut StateTracker,
    ) -> Result<IngestReport> {
        let batch = self.prepare(candidates, tracker);
        self.upload(batch, data_dir, embedder, store, tracker).await
    }

    /// Archive first, then record. A file that cannot be archived is not
    /// recorded, so it stays eligible for the next run.
    fn commit(
        &self,
        file: &PendingFile,
        data_dir: &Path,
        tracker: &mut StateTracker,
        report: &mut IngestReport,
    ) {
        if let Err(e) = archive_file(&file.path, data_dir, &file.hash) {
            tracing::error!(file = %file.name, error = %e, "failed to archive uploaded file");
            report.archive_failures.push(file.name.clone());
            self.progress.report(IngestEvent::CommitFailed {
                name: file.name.clone(),
                reason: format!("{:#}", e),
            });
            return;
        }

        if let Err(e) = tracker.record_processed(&file.hash, &file.name) {
            tracing::error!(file = %file.name, error = %e, "failed to persist ingestion state");
            report.state_errors.push(file.name.clone());
            self.progress.report(IngestEvent::CommitFailed {
                name: file.name.clone(),
                reason: e.to_string(),
            });
            return;
        }

        report.archived.push(file.name.clone());
        self.progress.report(IngestEvent::Committed {
            name: file.name.clone(),
        });
    }

    fn report_file(&self, name: &str, outcome: FileOutcome) {
        self.progress.report(IngestEvent::File {
            name: name.to_string(),
            outcome,
        });
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Move `path` into `<data_dir>/processed/`, returning the archived location.
///
/// An existing archive entry with the same name is never overwritten: the new
/// file gets `-<first 8 hash chars>` inserted before its extension, plus a
/// counter (`-2`, `-3`, ...) if that name is taken too.
pub fn archive_file(path: &Path, data_dir: &Path, hash: &str) -> Result<PathBuf> {
    let processed = data_dir.join(PROCESSED_DIR);
    std::fs::create_dir_all(&processed)?;

    let name = file_name(path);
    let mut target = processed.join(&name);
    let mut attempt = 0u32;
    while target.exists() {
        target = processed.join(suffixed_name(&name, hash, attempt));
        attempt += 1;
    }

    std::fs::rename(path, &target)?;
    tracing::debug!(from = %path.display(), to = %target.display(), "archived");
    Ok(target)
}

fn suffixed_name(name: &str, hash: &str, attempt: u32) -> String {
    let mut short: String = hash.chars().take(8).collect();
    if attempt > 0 {
        short.push_str(&format!("-{}", attempt + 1));
    }
    let as_path = Path::new(name);
    match (
        as_path.file_stem().and_then(|s| s.to_str()),
        as_path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{}-{}.{}", stem, short, ext),
        _ => format!("{}-{}", name, short),
    }
}

/// `ragdesk ingest`.
pub async fn run_ingest(
    config: &Config,
    dry_run: bool,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let data_dir = &config.ingest.data_dir;

    if !data_dir.is_dir() {
        std::fs::create_dir_all(data_dir)?;
        println!(
            "PDF folder {}/ did not exist and has been created. Add PDFs and run again.",
            data_dir.display()
        );
        return Ok(());
    }

    let mut candidates = scan_pdfs(data_dir)?;
    if candidates.is_empty() {
        println!("Warning: no PDFs found in {}/.", data_dir.display());
        return Ok(());
    }
    if let Some(lim) = limit {
        candidates.truncate(lim);
    }

    if !dry_run {
        config.require_retrieval()?;
    }

    let mut tracker = StateTracker::open(config.state_path());
    match tracker.load_status() {
        LoadStatus::Corrupt(reason) | LoadStatus::Unreadable(reason) => eprintln!(
            "Warning: state file {} could not be used ({}); starting with an empty record.",
            tracker.path().display(),
            reason
        ),
        _ => {}
    }

    let loader = PdfLoader;
    let pipeline = IngestPipeline::new(&loader, IngestSettings::from(&config.ingest))
        .with_progress(progress.reporter());

    if dry_run {
        let batch = pipeline.prepare(&candidates, &tracker);
        let report = &batch.report;
        println!("ingest {} (dry-run)", data_dir.display());
        println!("  candidates: {}", report.scanned);
        println!("  already processed: {}", report.skipped);
        println!("  duplicates: {}", report.duplicates);
        println!("  failed: {}", report.hash_failures + report.load_failures);
        println!("  empty: {}", report.empty);
        println!("  new files: {}", batch.pending_files().len());
        println!("  pages: {}", report.documents);
        println!("  chunks: {}", report.chunks);
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding, config.secrets.openai_api_key.as_deref())?;
    let store = PineconeStore::new(
        config.require_index_name()?,
        config.require_pinecone_key()?,
        config.vector_store.timeout_secs,
    )?;

    let report = pipeline
        .run(
            data_dir,
            &candidates,
            embedder.as_ref(),
            &store,
            &mut tracker,
        )
        .await?;

    print_summary(data_dir, &report);

    if !report.is_clean() {
        anyhow::bail!(
            "{} file(s) uploaded but not committed: {}",
            report.archive_failures.len() + report.state_errors.len(),
            report
                .archive_failures
                .iter()
                .chain(&report.state_errors)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("ok");
    Ok(())
}

fn print_summary(data_dir: &Path, report: &IngestReport) {
    println!("ingest {}", data_dir.display());
    println!("  scanned: {}", report.scanned);
    println!("  skipped (already processed): {}", report.skipped);
    println!("  duplicates: {}", report.duplicates);
    println!("  hash failures: {}", report.hash_failures);
    println!("  load failures: {}", report.load_failures);
    println!("  empty: {}", report.empty);
    println!("  pages: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  uploaded chunks: {}", report.uploaded_chunks);
    println!("  archived: {}", report.archived.len());
}
