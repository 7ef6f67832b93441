//! File operations scoped to one flat namespace directory
//!
//! Every visible regular file in the directory is a cache entry; there is no
//! manifest. Hidden files hold write temporaries and permanence markers and
//! are never reported as entries.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::types::EntryStat;

const PERMANENT_MARKER_SUFFIX: &str = ".permanent";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute location of `filename` inside the namespace
    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io_at("creating", &self.dir, e))
    }

    pub async fn exists(&self, filename: &str) -> bool {
        if validate_filename(filename).is_err() {
            return false;
        }
        fs::metadata(self.path(filename))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        validate_filename(filename)?;
        let path = self.path(filename);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CacheError::NotFound(filename.to_string()))
            }
            Err(e) => Err(CacheError::io_at("reading", &path, e)),
        }
    }

    /// Create or overwrite `filename`.
    ///
    /// Bytes land in a hidden temporary first and are renamed into place, so
    /// readers see either the old content or the complete new content.
    pub async fn write(&self, filename: &str, data: &[u8]) -> Result<()> {
        validate_filename(filename)?;
        self.ensure_dir().await?;

        let temp = self.dir.join(format!(
            ".{}.{}{}",
            filename,
            Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ));
        let path = self.path(filename);

        if let Err(e) = fs::write(&temp, data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::io_at("writing", &temp, e));
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::io_at("renaming into", &path, e));
        }

        debug!(filename, size = data.len(), "Wrote cache file");
        Ok(())
    }

    /// Remove `filename` and its permanence marker. Absence is not an error.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        let path = self.path(filename);
        remove_if_present(&path).await?;
        remove_if_present(&self.marker_path(filename)).await?;
        Ok(())
    }

    /// Record that `filename` must survive every prune pass
    pub async fn mark_permanent(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        self.ensure_dir().await?;
        let marker = self.marker_path(filename);
        fs::write(&marker, b"")
            .await
            .map_err(|e| CacheError::io_at("writing", &marker, e))
    }

    /// Drop the permanence marker of `filename`, leaving the entry itself
    pub async fn clear_permanent(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        remove_if_present(&self.marker_path(filename)).await
    }

    pub async fn is_permanent(&self, filename: &str) -> bool {
        if validate_filename(filename).is_err() {
            return false;
        }
        fs::metadata(self.marker_path(filename)).await.is_ok()
    }

    /// Overwrite the recorded access time of `filename`
    pub async fn touch(&self, filename: &str, time: DateTime<Utc>) -> Result<()> {
        validate_filename(filename)?;
        let path = self.path(filename);
        let modified = SystemTime::from(time);

        let blocking_path = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&blocking_path)?
                .set_modified(modified)
        })
        .await
        .map_err(|e| CacheError::io_at("touching", &path, std::io::Error::other(e)))?
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::NotFound(filename.to_string()),
            _ => CacheError::io_at("touching", &path, e),
        })
    }

    /// Metadata for every entry in the namespace, sorted by filename.
    ///
    /// A missing namespace directory lists as empty. Files that vanish
    /// between listing and stat are skipped.
    pub async fn stat_all(&self) -> Result<Vec<EntryStat>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io_at("listing", &self.dir, e)),
        };

        let mut entries = Vec::new();
        let mut markers = HashSet::new();

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io_at("listing", &self.dir, e))?
        {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };

            if let Some(hidden) = name.strip_prefix('.') {
                if let Some(target) = hidden.strip_suffix(PERMANENT_MARKER_SUFFIX) {
                    markers.insert(target.to_string());
                }
                continue;
            }

            let meta = match item.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(filename = %name, error = %e, "Failed to stat cache file");
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            let last_access = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH));

            entries.push(EntryStat {
                filename: name,
                size_bytes: meta.len(),
                last_access,
                permanent: false,
            });
        }

        for entry in &mut entries {
            entry.permanent = markers.contains(&entry.filename);
        }
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));

        Ok(entries)
    }

    /// Combined size of every entry, permanent and ephemeral
    pub async fn total_size(&self) -> Result<u64> {
        Ok(self
            .stat_all()
            .await?
            .iter()
            .map(|entry| entry.size_bytes)
            .sum())
    }

    /// Remove write temporaries and markers whose entry no longer exists.
    ///
    /// Only safe while no write is in flight on this namespace, so it runs
    /// at startup. Returns the number of files removed.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io_at("listing", &self.dir, e)),
        };

        let mut orphans = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io_at("listing", &self.dir, e))?
        {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            let Some(hidden) = name.strip_prefix('.') else {
                continue;
            };

            if hidden.ends_with(TEMP_SUFFIX) {
                orphans.push(item.path());
            } else if let Some(target) = hidden.strip_suffix(PERMANENT_MARKER_SUFFIX) {
                if !self.exists(target).await {
                    orphans.push(item.path());
                }
            }
        }

        let mut removed = 0;
        for path in orphans {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove orphaned cache file"),
            }
        }
        if removed > 0 {
            debug!(removed, "Swept orphaned cache files");
        }

        Ok(removed)
    }

    fn marker_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!(".{}{}", filename, PERMANENT_MARKER_SUFFIX))
    }
}

/// Entry filenames are flat, visible names: no separators, no leading dot.
fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() || filename.starts_with('.') || filename.contains(['/', '\\']) {
        return Err(CacheError::InvalidInput(format!(
            "invalid cache filename: {:?}",
            filename
        )));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io_at("deleting", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn storage_in(dir: &tempfile::TempDir) -> Storage {
        Storage::new(dir.path().join("images"))
    }

    #[tokio::test]
    async fn test_write_read_exists() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        assert!(!storage.exists("abc.png").await);
        storage.write("abc.png", b"png bytes").await.unwrap();

        assert!(storage.exists("abc.png").await);
        assert_eq!(storage.read("abc.png").await.unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn test_write_creates_namespace_dir() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);
        assert!(!storage.dir().exists());

        storage.write("abc.png", b"x").await.unwrap();
        assert!(storage.dir().is_dir());
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_temporaries() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        storage.write("abc.png", b"first").await.unwrap();
        storage.write("abc.png", b"second").await.unwrap();
        assert_eq!(storage.read("abc.png").await.unwrap(), b"second");

        let names: Vec<_> = std::fs::read_dir(storage.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["abc.png".to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        let err = storage.read("missing.png").await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound(name) if name == "missing.png"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        storage.delete("never-written.png").await.unwrap();

        storage.write("abc.png", b"x").await.unwrap();
        storage.delete("abc.png").await.unwrap();
        storage.delete("abc.png").await.unwrap();
        assert!(!storage.exists("abc.png").await);
    }

    #[tokio::test]
    async fn test_rejects_path_like_filenames() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        for name in ["", "../escape.png", "a/b.png", ".hidden"] {
            let err = storage.write(name, b"x").await.unwrap_err();
            assert!(matches!(err, CacheError::InvalidInput(_)), "{:?}", name);
            assert!(!storage.exists(name).await);
        }
    }

    #[tokio::test]
    async fn test_stat_all_on_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        assert!(storage.stat_all().await.unwrap().is_empty());
        assert_eq!(storage.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stat_all_reports_sizes_and_permanence() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        storage.write("b.png", b"12345").await.unwrap();
        storage.write("a.png", b"123").await.unwrap();
        storage.mark_permanent("b.png").await.unwrap();

        let entries = storage.stat_all().await.unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].filename, "a.png");
        assert_eq!(entries[0].size_bytes, 3);
        assert!(!entries[0].permanent);

        assert_eq!(entries[1].filename, "b.png");
        assert_eq!(entries[1].size_bytes, 5);
        assert!(entries[1].permanent);

        assert_eq!(storage.total_size().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_delete_removes_permanence_marker() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        storage.write("abc.png", b"x").await.unwrap();
        storage.mark_permanent("abc.png").await.unwrap();
        assert!(storage.is_permanent("abc.png").await);

        storage.delete("abc.png").await.unwrap();
        assert!(!storage.is_permanent("abc.png").await);

        storage.write("abc.png", b"y").await.unwrap();
        assert!(!storage.stat_all().await.unwrap()[0].permanent);
    }

    #[tokio::test]
    async fn test_clear_permanent_keeps_entry() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        storage.write("abc.png", b"x").await.unwrap();
        storage.mark_permanent("abc.png").await.unwrap();
        storage.clear_permanent("abc.png").await.unwrap();

        assert!(!storage.is_permanent("abc.png").await);
        assert!(storage.exists("abc.png").await);

        // Clearing an absent marker is a no-op
        storage.clear_permanent("abc.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_temporaries_and_orphaned_markers() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);

        storage.write("kept.png", b"x").await.unwrap();
        storage.mark_permanent("kept.png").await.unwrap();
        storage.mark_permanent("gone.png").await.unwrap();
        std::fs::write(storage.dir().join(".crashed.png.0123abcd.tmp"), b"partial").unwrap();

        assert_eq!(storage.sweep_orphans().await.unwrap(), 2);

        let mut names: Vec<_> = std::fs::read_dir(storage.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec![".kept.png.permanent", "kept.png"]);
        assert!(storage.is_permanent("kept.png").await);

        assert_eq!(storage.sweep_orphans().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_on_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(storage_in(&dir).sweep_orphans().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_touch_sets_last_access() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);
        let when = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();

        storage.write("abc.png", b"x").await.unwrap();
        storage.touch("abc.png", when).await.unwrap();

        let entries = storage.stat_all().await.unwrap();
        assert_eq!(entries[0].last_access, when);
    }

    #[tokio::test]
    async fn test_touch_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage_in(&dir);
        storage.ensure_dir().await.unwrap();

        let err = storage.touch("missing.png", Utc::now()).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
    }
}
