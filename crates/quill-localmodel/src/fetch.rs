//! Artifact fetching and verification primitives.
//!
//! Fetching is a blocking-I/O seam so the manager can drive it from
//! `spawn_blocking` and tests can substitute a local fake.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ModelError, Result};

/// Fetches one model artifact into a destination directory. Blocking.
pub trait ArtifactFetcher: Send + Sync {
    /// Download `file_name` from `repo` into `dest_dir`, returning the
    /// written file's path.
    fn fetch(&self, repo: &str, file_name: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Fetcher backed by the Hugging Face hub.
///
/// The hub client keeps its own content-addressed cache; artifacts are
/// copied from there into the staging directory so verification and the
/// atomic commit happen on files this manager owns.
pub struct HubFetcher {
    hub_cache_dir: PathBuf,
}

impl HubFetcher {
    /// Create a fetcher with the hub cache rooted at `hub_cache_dir`.
    pub fn new(hub_cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            hub_cache_dir: hub_cache_dir.into(),
        }
    }
}

impl ArtifactFetcher for HubFetcher {
    fn fetch(&self, repo: &str, file_name: &str, dest_dir: &Path) -> Result<PathBuf> {
        debug!(repo, file_name, "fetching artifact via hub");
        let api = hf_hub::api::sync::ApiBuilder::new()
            .with_cache_dir(self.hub_cache_dir.clone())
            .build()
            .map_err(|e| ModelError::Download(e.to_string()))?;
        let repo = api.model(repo.to_string());
        let cached = repo
            .get(file_name)
            .map_err(|e| ModelError::Download(e.to_string()))?;

        let dest = dest_dir.join(file_name);
        let _ = std::fs::copy(&cached, &dest)?;
        Ok(dest)
    }
}

/// SHA-256 of a file's contents, lowercase hex. Streams in chunks so large
/// artifacts never sit in memory whole.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let digest = hasher.finalize();
    use std::fmt::Write;
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}
