//! Ingestion state tracking.
//!
//! Records which file contents have already been vectorized so repeated
//! ingestion runs are idempotent. Identity is the hex digest of the file's
//! bytes; the stored filename is informational only.
//!
//! The backing store is a flat JSON object (`{ "<hex digest>": "<filename>" }`)
//! in a single file. Loading is fail-open: a missing, empty, corrupt, or
//! unreadable file yields an empty state with a warning, never an error.
//! Every successful addition rewrites the whole file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use thiserror::Error;
use tracing::{info, warn};

/// Default read size for [`compute_content_hash`].
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to persist state to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Digest algorithms accepted by [`compute_content_hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(HashError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Hash a file's full byte content, reading `chunk_size` bytes at a time.
///
/// Returns the lowercase hex digest. The algorithm name is validated before
/// the file is opened.
pub fn compute_content_hash(
    path: &Path,
    algorithm: &str,
    chunk_size: usize,
) -> Result<String, HashError> {
    let algorithm: HashAlgorithm = algorithm.parse()?;
    match algorithm {
        HashAlgorithm::Sha224 => stream_digest::<Sha224>(path, chunk_size),
        HashAlgorithm::Sha256 => stream_digest::<Sha256>(path, chunk_size),
        HashAlgorithm::Sha384 => stream_digest::<Sha384>(path, chunk_size),
        HashAlgorithm::Sha512 => stream_digest::<Sha512>(path, chunk_size),
    }
}

/// SHA-256 with the default read size.
pub fn sha256_file(path: &Path) -> Result<String, HashError> {
    compute_content_hash(path, "sha256", DEFAULT_HASH_CHUNK_SIZE)
}

fn stream_digest<D: Digest>(path: &Path, chunk_size: usize) -> Result<String, HashError> {
    let io_err = |source: std::io::Error| {
        if source.kind() == ErrorKind::NotFound {
            HashError::NotFound(path.to_path_buf())
        } else {
            HashError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// What [`StateTracker::open`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// No state file yet (first run).
    Fresh,
    /// Zero-length file.
    Empty,
    /// Parsed successfully with this many records.
    Loaded(usize),
    /// Present but not a JSON object of strings.
    Corrupt(String),
    /// Present but could not be read.
    Unreadable(String),
}

/// Persistent `content hash → filename` mapping.
///
/// One instance owns the backing file for the lifetime of the process; no
/// concurrent writers are expected.
#[derive(Debug)]
pub struct StateTracker {
    path: PathBuf,
    records: BTreeMap<String, String>,
    load_status: LoadStatus,
}

impl StateTracker {
    /// Load the tracker from `path`. Never fails; see [`LoadStatus`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (records, load_status) = load_records(&path);
        Self {
            path,
            records,
            load_status,
        }
    }

    pub fn is_processed(&self, digest: &str) -> bool {
        self.records.contains_key(digest)
    }

    /// Record `digest` as ingested and persist the whole mapping before returning.
    ///
    /// On error the in-memory entry is kept, but the record is not durable.
    pub fn record_processed(&mut self, digest: &str, filename: &str) -> Result<(), StateError> {
        self.records.insert(digest.to_string(), filename.to_string());
        self.persist()?;
        info!(filename, "tracked processed file");
        Ok(())
    }

    pub fn filename_for(&self, digest: &str) -> Option<&str> {
        self.records.get(digest).map(String::as_str)
    }

    /// All records, sorted by digest.
    pub fn records(&self) -> impl Iterator<Item = (&str, &str)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    fn persist(&self) -> Result<(), StateError> {
        let body = serde_json::to_vec_pretty(&self.records)?;
        let persistence = |source| StateError::Persistence {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persistence)?;
        }

        // Full rewrite through a sibling file so a crash leaves old or new, never half.
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &body).map_err(persistence)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            persistence(e)
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn load_records(path: &Path) -> (BTreeMap<String, String>, LoadStatus) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no state file found, starting with empty state");
            return (BTreeMap::new(), LoadStatus::Fresh);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file unreadable, defaulting to empty state");
            return (BTreeMap::new(), LoadStatus::Unreadable(e.to_string()));
        }
    };

    if bytes.is_empty() {
        warn!(path = %path.display(), "state file is empty, resetting state");
        return (BTreeMap::new(), LoadStatus::Empty);
    }

    match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
        Ok(records) => {
            let n = records.len();
            (records, LoadStatus::Loaded(n))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file is corrupt, defaulting to empty state");
            (BTreeMap::new(), LoadStatus::Corrupt(e.to_string()))
        }
    }
}
