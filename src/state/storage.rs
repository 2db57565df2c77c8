// Output storage
// Directory layout of a run and content hashes of its source file

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Create a directory and its parents, returning the path
pub fn ensure_dir(path: &Path) -> StorageResult<PathBuf> {
    fs::create_dir_all(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA256 of a file's contents, streamed
pub fn file_sha256(path: &Path) -> StorageResult<String> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(io_err)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Paths used by one processing run rooted at `root`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OutputLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Temporary decoded segment, unique per run
    pub fn segment_wav(&self, run_id: &Uuid) -> PathBuf {
        let short = run_id.simple().to_string();
        self.root.join(format!("__segment__{}.wav", &short[..8]))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    /// Drum hit fragments live next to the stems
    pub fn drum_hits_dir(stems_dir: &Path) -> PathBuf {
        stems_dir.join("drum_hits")
    }

    /// Tonal event fragments of one stem
    pub fn note_events_dir(stems_dir: &Path, stem: &str) -> PathBuf {
        stems_dir.join(format!("{}_events", stem))
    }
}
