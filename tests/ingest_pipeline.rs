//! End-to-end ingestion runs against in-process collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use ragdesk::embedding::Embedder;
use ragdesk::error::PipelineError;
use ragdesk::ingest::{IngestPipeline, IngestSettings};
use ragdesk::loader::{scan_pdfs, DocumentLoader, PROCESSED_DIR};
use ragdesk::models::{Chunk, Document, RetrievedPassage};
use ragdesk::state::{sha256_file, StateTracker};
use ragdesk::vector_store::{InMemoryStore, VectorStore};

/// Treats each file as UTF-8 text with pages separated by form feeds.
/// Files starting with `CORRUPT` fail to load.
struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::loader(path, e))?;
        if text.starts_with("CORRUPT") {
            return Err(PipelineError::loader(path, "invalid xref table"));
        }
        Ok(text
            .split('\u{c}')
            .enumerate()
            .map(|(i, page)| Document {
                text: page.to_string(),
                source: path.to_string_lossy().replace('\\', "/"),
                page: i as u64,
            })
            .collect())
    }
}

struct CountingEmbedder;

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0])
            .collect())
    }
}

/// In-memory store whose `fail_on`-th upsert call (1-based) errors.
struct FlakyStore {
    inner: InMemoryStore,
    calls: AtomicUsize,
    fail_on: Option<usize>,
}

impl FlakyStore {
    fn new(fail_on: Option<usize>) -> Self {
        Self {
            inner: InMemoryStore::new(),
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(call) == self.fail_on {
            anyhow::bail!("HTTP 503 from index");
        }
        self.inner.upsert(chunks, vectors).await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        self.inner.query(vector, top_k).await
    }
}

struct Workspace {
    _tmp: TempDir,
    data: PathBuf,
    state: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        let state = tmp.path().join("state").join("state.json");
        Self {
            _tmp: tmp,
            data,
            state,
        }
    }

    fn add(&self, name: &str, content: &str) -> PathBuf {
        let path = self.data.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn archived(&self, name: &str) -> bool {
        self.data.join(PROCESSED_DIR).join(name).exists()
    }

    fn pending(&self, name: &str) -> bool {
        self.data.join(name).exists()
    }
}

fn settings(batch_size: usize) -> IngestSettings {
    IngestSettings {
        batch_size,
        ..IngestSettings::default()
    }
}

async fn ingest(
    ws: &Workspace,
    batch_size: usize,
    store: &dyn VectorStore,
    tracker: &mut StateTracker,
) -> Result<ragdesk::ingest::IngestReport> {
    let candidates = scan_pdfs(&ws.data)?;
    IngestPipeline::new(&TextLoader, settings(batch_size))
        .run(&ws.data, &candidates, &CountingEmbedder, store, tracker)
        .await
}

#[tokio::test]
async fn second_run_skips_already_ingested_content() {
    let ws = Workspace::new();
    let a = ws.add("a.pdf", "Alpha policy text.");
    let a_hash = sha256_file(&a).unwrap();
    ws.add("b.pdf", "Beta manual text.");
    let store = FlakyStore::new(None);

    let mut tracker = StateTracker::open(&ws.state);
    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.uploaded_chunks, 2);
    assert_eq!(report.archived, vec!["a.pdf", "b.pdf"]);
    assert!(report.is_clean());
    assert!(ws.archived("a.pdf") && ws.archived("b.pdf"));

    // A restarted process sees the same records.
    let mut tracker = StateTracker::open(&ws.state);
    assert_eq!(tracker.len(), 2);
    assert_eq!(tracker.filename_for(&a_hash), Some("a.pdf"));

    // Same bytes under a new name are recognized by content.
    ws.add("a-copy.pdf", "Alpha policy text.");
    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.uploaded_chunks, 0);
    assert!(report.archived.is_empty());
    assert!(ws.pending("a-copy.pdf"));
    assert_eq!(store.inner.len(), 2);
}

#[tokio::test]
async fn identical_files_in_one_run_are_uploaded_once() {
    let ws = Workspace::new();
    let a = ws.add("a.pdf", "Shared policy text.");
    ws.add("a-copy.pdf", "Shared policy text.");
    let hash = sha256_file(&a).unwrap();
    let store = FlakyStore::new(None);
    let mut tracker = StateTracker::open(&ws.state);

    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    // Candidates are sorted, so a-copy.pdf is the one accepted.
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.archived, vec!["a-copy.pdf"]);
    assert_eq!(report.uploaded_chunks, 1);
    assert_eq!(store.inner.len(), 1);
    assert!(ws.pending("a.pdf"));
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.filename_for(&hash), Some("a-copy.pdf"));

    // The leftover copy is recognized as processed next time.
    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.uploaded_chunks, 0);
}

#[tokio::test]
async fn corrupt_file_does_not_block_the_others() {
    let ws = Workspace::new();
    ws.add("bad.pdf", "CORRUPT bytes");
    ws.add("good.pdf", "Readable content.");
    let store = FlakyStore::new(None);
    let mut tracker = StateTracker::open(&ws.state);

    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    assert_eq!(report.load_failures, 1);
    assert_eq!(report.archived, vec!["good.pdf"]);
    assert!(ws.pending("bad.pdf"));
    assert!(ws.archived("good.pdf"));
    assert_eq!(tracker.len(), 1);
}

#[tokio::test]
async fn failed_batch_leaves_later_files_unmarked() {
    let ws = Workspace::new();
    ws.add("a.pdf", "first");
    let b = ws.add("b.pdf", "second");
    let c = ws.add("c.pdf", "third");
    let store = FlakyStore::new(Some(2));
    let mut tracker = StateTracker::open(&ws.state);

    let err = ingest(&ws, 1, &store, &mut tracker).await.unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::UploadFailure { start, end, reason }) => {
            assert_eq!((*start, *end), (1, 2));
            assert!(reason.contains("503"));
        }
        other => panic!("expected upload failure, got {:?}", other),
    }

    assert!(ws.archived("a.pdf"));
    assert!(ws.pending("b.pdf") && ws.pending("c.pdf"));

    let reopened = StateTracker::open(&ws.state);
    assert_eq!(reopened.len(), 1);
    assert!(!reopened.is_processed(&sha256_file(&b).unwrap()));
    assert!(!reopened.is_processed(&sha256_file(&c).unwrap()));
}

#[tokio::test]
async fn file_straddling_a_failed_batch_is_not_committed() {
    let ws = Workspace::new();
    ws.add("long.pdf", "page one\u{c}page two\u{c}page three");
    let store = FlakyStore::new(Some(2));
    let mut tracker = StateTracker::open(&ws.state);

    assert!(ingest(&ws, 2, &store, &mut tracker).await.is_err());
    assert!(ws.pending("long.pdf"));
    assert!(tracker.is_empty());
    assert_eq!(store.inner.len(), 2);
}

#[tokio::test]
async fn file_without_text_is_neither_archived_nor_recorded() {
    let ws = Workspace::new();
    ws.add("scan.pdf", "   \n\n  ");
    let store = FlakyStore::new(None);
    let mut tracker = StateTracker::open(&ws.state);

    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    assert_eq!(report.empty, 1);
    assert_eq!(report.chunks, 0);
    assert!(ws.pending("scan.pdf"));
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn unhashable_candidate_is_skipped() {
    let ws = Workspace::new();
    ws.add("ok.pdf", "fine");
    let store = FlakyStore::new(None);
    let mut tracker = StateTracker::open(&ws.state);

    let candidates = vec![ws.data.join("vanished.pdf"), ws.data.join("ok.pdf")];
    let report = IngestPipeline::new(&TextLoader, settings(50))
        .run(&ws.data, &candidates, &CountingEmbedder, &store, &mut tracker)
        .await
        .unwrap();
    assert_eq!(report.hash_failures, 1);
    assert_eq!(report.archived, vec!["ok.pdf"]);
}

#[tokio::test]
async fn dry_run_has_no_side_effects() {
    let ws = Workspace::new();
    ws.add("a.pdf", "page one\u{c}page two");
    ws.add("bad.pdf", "CORRUPT");
    let tracker = StateTracker::open(&ws.state);

    let candidates = scan_pdfs(&ws.data).unwrap();
    let batch = IngestPipeline::new(&TextLoader, settings(50)).prepare(&candidates, &tracker);
    assert_eq!(batch.report.documents, 2);
    assert_eq!(batch.report.chunks, 2);
    assert_eq!(batch.report.load_failures, 1);
    assert_eq!(batch.pending_files(), vec!["a.pdf"]);

    assert!(ws.pending("a.pdf"));
    assert!(!ws.data.join(PROCESSED_DIR).exists());
    assert!(!ws.state.exists());
}

#[tokio::test]
async fn persistence_failure_is_reported() {
    let ws = Workspace::new();
    ws.add("a.pdf", "content");
    // State path whose parent is a regular file cannot be written.
    let blocker = ws.data.parent().unwrap().join("blocker");
    fs::write(&blocker, b"x").unwrap();
    let mut tracker = StateTracker::open(blocker.join("state.json"));
    let store = FlakyStore::new(None);

    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();
    assert_eq!(report.state_errors, vec!["a.pdf"]);
    assert!(report.archived.is_empty());
    assert!(!report.is_clean());
}

#[tokio::test]
async fn archive_name_collision_keeps_both_files() {
    let ws = Workspace::new();
    let processed = ws.data.join(PROCESSED_DIR);
    fs::create_dir_all(&processed).unwrap();
    fs::write(processed.join("report.pdf"), "last year's report").unwrap();
    let new = ws.add("report.pdf", "this year's report");
    let hash = sha256_file(&new).unwrap();

    let store = FlakyStore::new(None);
    let mut tracker = StateTracker::open(&ws.state);
    let report = ingest(&ws, 50, &store, &mut tracker).await.unwrap();

    assert_eq!(report.archived, vec!["report.pdf"]);
    assert_eq!(
        fs::read_to_string(processed.join("report.pdf")).unwrap(),
        "last year's report"
    );
    let suffixed = processed.join(format!("report-{}.pdf", &hash[..8]));
    assert_eq!(fs::read_to_string(suffixed).unwrap(), "this year's report");
    assert_eq!(tracker.filename_for(&hash), Some("report.pdf"));
}
