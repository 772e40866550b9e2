//! Record of the files a run produced, with explicit release and TTL eviction.

use crate::types::{VegError, VegResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Output folder the run wrote into
    pub root: PathBuf,
    pub old_id: String,
    pub new_id: String,
    /// Paths relative to `root`
    pub files: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl ArtifactManifest {
    pub fn new(root: impl Into<PathBuf>, old_id: &str, new_id: &str) -> Self {
        Self {
            root: root.into(),
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
            files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Register a produced file. Paths under `root` are stored relative.
    pub fn record(&mut self, path: &Path) {
        let rel = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();
        self.files.push(rel);
    }

    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files.iter().map(move |f| self.root.join(f))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn save(&self) -> VegResult<()> {
        let path = self.manifest_path();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| VegError::io(&path, e))
    }

    pub fn load<P: AsRef<Path>>(output_folder: P) -> VegResult<Self> {
        let path = output_folder.as_ref().join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| VegError::io(&path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at >= ttl,
            // TTL too large to represent never expires
            Err(_) => false,
        }
    }

    /// Delete every recorded file, the manifest, and any per-time-point
    /// directories left empty. Returns the number of files removed.
    pub fn release(self) -> VegResult<usize> {
        let mut removed = 0;
        for path in self.paths() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("Artifact already gone: {}", path.display());
                }
                Err(e) => return Err(VegError::io(&path, e)),
            }
        }

        let manifest = self.manifest_path();
        if let Err(e) = std::fs::remove_file(&manifest) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(VegError::io(&manifest, e));
            }
        }

        for id in [&self.old_id, &self.new_id] {
            // Non-empty directories hold files this run did not create
            let _ = std::fs::remove_dir(self.root.join(id));
        }

        log::info!("Released {} artifacts under {}", removed, self.root.display());
        Ok(removed)
    }
}

/// Release the run recorded in `output_folder` if it is older than `ttl`.
/// Returns the number of files removed, or `None` when nothing was evicted.
pub fn evict_expired<P: AsRef<Path>>(
    output_folder: P,
    ttl: Duration,
    now: DateTime<Utc>,
) -> VegResult<Option<usize>> {
    let output_folder = output_folder.as_ref();
    if !output_folder.join(MANIFEST_FILE).exists() {
        log::debug!("No manifest in {}", output_folder.display());
        return Ok(None);
    }

    let manifest = ArtifactManifest::load(output_folder)?;
    if manifest.is_expired(ttl, now) {
        log::info!(
            "Evicting artifacts created at {} (ttl {:?})",
            manifest.created_at,
            ttl
        );
        manifest.release().map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path) -> ArtifactManifest {
        std::fs::create_dir_all(root.join("2020")).unwrap();
        let mut manifest = ArtifactManifest::new(root, "2020", "2024");
        for name in ["2020/ndvi.TIF", "ndvi_change.TIF"] {
            let path = root.join(name);
            std::fs::write(&path, b"x").unwrap();
            manifest.record(&path);
        }
        manifest.save().unwrap();
        manifest
    }

    #[test]
    fn test_record_stores_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = populate(dir.path());
        assert_eq!(
            manifest.files,
            vec![PathBuf::from("2020/ndvi.TIF"), PathBuf::from("ndvi_change.TIF")]
        );
    }

    #[test]
    fn test_release_removes_files_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = populate(dir.path());

        assert_eq!(manifest.release().unwrap(), 2);
        assert!(!dir.path().join("ndvi_change.TIF").exists());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
        assert!(!dir.path().join("2020").exists());
    }

    #[test]
    fn test_evict_respects_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = populate(dir.path());
        let ttl = Duration::from_secs(3600);

        let fresh = manifest.created_at + chrono::Duration::seconds(10);
        assert_eq!(evict_expired(dir.path(), ttl, fresh).unwrap(), None);
        assert!(dir.path().join("ndvi_change.TIF").exists());

        let stale = manifest.created_at + chrono::Duration::seconds(3600);
        assert_eq!(evict_expired(dir.path(), ttl, stale).unwrap(), Some(2));
        assert!(!dir.path().join("ndvi_change.TIF").exists());
    }

    #[test]
    fn test_evict_without_manifest_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            evict_expired(dir.path(), Duration::from_secs(1), Utc::now()).unwrap(),
            None
        );
    }
}
