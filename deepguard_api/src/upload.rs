//! Uploaded videos live in a private temporary directory for exactly as long
//! as their [`UploadedVideo`] value.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const DEFAULT_EXTENSION: &str = "mp4";

/// A video written to a fresh temporary directory. The directory and file are
/// removed when this is dropped or [`cleanup`](Self::cleanup)ed, whichever
/// comes first.
#[derive(Debug)]
pub struct UploadedVideo {
    dir: TempDir,
    path: PathBuf,
    size_bytes: usize,
}

impl UploadedVideo {
    /// Writes `bytes` to a new directory under `root`, keeping the extension
    /// of `filename` so the demuxer can use it as a format hint.
    pub fn persist(root: &Path, filename: Option<&str>, bytes: &[u8]) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("deepguard-")
            .tempdir_in(root)?;
        let path = dir.path().join(format!("upload.{}", extension(filename)));
        std::fs::write(&path, bytes)?;
        tracing::debug!("Upload saved to {}", path.display());
        Ok(Self {
            dir,
            path,
            size_bytes: bytes.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Removes the directory now, reporting failures instead of ignoring them.
    pub fn cleanup(self) -> io::Result<()> {
        self.dir.close()
    }
}

fn extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_a_safe_extension() {
        assert_eq!(extension(Some("Holiday.MOV")), "mov");
        assert_eq!(extension(Some("clip")), "mp4");
        assert_eq!(extension(Some("evil.m$4")), "mp4");
        assert_eq!(extension(None), "mp4");
    }

    #[test]
    fn cleanup_removes_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let upload = UploadedVideo::persist(root.path(), Some("a.webm"), b"1234").unwrap();
        let dir = upload.dir().to_path_buf();
        assert!(dir.starts_with(root.path()));
        assert!(upload.path().ends_with("upload.webm"));
        assert_eq!(std::fs::read(upload.path()).unwrap(), b"1234");
        upload.cleanup().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn drop_removes_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let upload = UploadedVideo::persist(root.path(), None, &[0u8; 2048]).unwrap();
        let dir = upload.dir().to_path_buf();
        assert!((upload.size_mb() - 2048.0 / 1048576.0).abs() < 1e-12);
        drop(upload);
        assert!(!dir.exists());
    }
}
