use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// The directory the HTTP server reads segments and playlists from
///
/// Only the active transcode writes here. The directory itself is never
/// removed, so a server bound to it keeps working across resyncs.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    path: PathBuf,
}

impl OutputDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory (and parents) if missing
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.path)
            .with_context(|| format!("Failed to create output directory: {:?}", self.path))
    }

    /// Empty the directory ahead of a new transcode
    ///
    /// Best effort: entries that cannot be removed are logged and skipped.
    /// Returns the number of entries removed.
    pub fn prepare(&self) -> usize {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Err(e) = self.ensure_exists() {
                    tracing::warn!("{:#}", e);
                }
                return 0;
            }
            Err(e) => {
                tracing::warn!("Failed to list output directory {:?}: {}", self.path, e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read entry in {:?}: {}", self.path, e);
                    continue;
                }
            };
            let path = entry.path();

            // file_type() does not follow symlinks, so a link to a directory is unlinked
            let result = match entry.file_type() {
                Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove stale output {:?}: {}", path, e),
            }
        }

        tracing::debug!("Cleared {} entries from {:?}", removed, self.path);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = OutputDirectory::new(tmp.path().join("a").join("hls"));

        assert_eq!(dir.prepare(), 0);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_prepare_empties_but_keeps_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = OutputDirectory::new(tmp.path());

        fs::write(tmp.path().join("live.m3u8"), "#EXTM3U\n").unwrap();
        fs::write(tmp.path().join("live0.ts"), [0u8; 16]).unwrap();
        fs::create_dir_all(tmp.path().join("nested").join("deeper")).unwrap();
        fs::write(tmp.path().join("nested").join("deeper").join("x"), "x").unwrap();

        assert_eq!(dir.prepare(), 3);
        assert!(tmp.path().is_dir());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = OutputDirectory::new(tmp.path());
        fs::write(tmp.path().join("live.m3u8"), "#EXTM3U\n").unwrap();

        dir.prepare();
        assert_eq!(dir.prepare(), 0);
        assert!(tmp.path().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_unlinks_symlinks_without_following() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("keep.txt"), "keep").unwrap();

        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        std::os::unix::fs::symlink(outside.path(), out.join("link")).unwrap();

        let dir = OutputDirectory::new(&out);
        assert_eq!(dir.prepare(), 1);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
        assert!(outside.path().join("keep.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_skips_entries_it_cannot_remove() {
        use std::os::unix::fs::PermissionsExt;

        // Root ignores directory permissions
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let tmp = tempfile::tempdir().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("stuck.ts"), [0u8; 4]).unwrap();
        fs::write(tmp.path().join("live.m3u8"), "#EXTM3U\n").unwrap();
        fs::write(tmp.path().join("live0.ts"), [0u8; 16]).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        let dir = OutputDirectory::new(tmp.path());
        let removed = dir.prepare();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();

        assert_eq!(removed, 2);
        assert!(tmp.path().is_dir());
        assert!(!tmp.path().join("live.m3u8").exists());
        assert!(!tmp.path().join("live0.ts").exists());
        assert!(locked.join("stuck.ts").exists());
    }
}
