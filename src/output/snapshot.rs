use crate::output::{OutputResult, SnapshotSink};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Writes debug snapshots as HTML files under one directory
///
/// File names are `<task-slug>-<url-hash>.html`, so refetching a page overwrites its
/// previous snapshot.
pub struct DirectorySnapshotSink {
    dir: PathBuf,
}

impl DirectorySnapshotSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path a snapshot for `label` and `url` is written to
    pub fn snapshot_path(&self, label: &str, url: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.html", slug(label), url_hash(url)))
    }
}

#[async_trait]
impl SnapshotSink for DirectorySnapshotSink {
    async fn save(&self, label: &str, url: &str, body: &str) -> OutputResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.snapshot_path(label, url);
        tokio::fs::write(&path, body).await?;
        tracing::debug!(url, path = %path.display(), "Saved snapshot");
        Ok(())
    }
}

/// First 16 hex characters of the URL's SHA-256
fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Lowercase ASCII alphanumerics joined by single dashes, at most 48 characters
fn slug(label: &str) -> String {
    let mut out = String::new();
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed: String = out.trim_end_matches('-').chars().take(48).collect();
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slug() {
        assert_eq!(slug("plumbers @ Austin, TX"), "plumbers-austin-tx");
        assert_eq!(slug("!!!"), "task");
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(url_hash("https://a.example/"), url_hash("https://a.example/"));
        assert_ne!(url_hash("https://a.example/"), url_hash("https://b.example/"));
        assert_eq!(url_hash("x").len(), 16);
    }

    #[tokio::test]
    async fn test_save_writes_file() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySnapshotSink::new(dir.path().join("snaps"));

        sink.save("cafe @ Austin", "https://www.yelp.com/biz/x", "<h1>X</h1>")
            .await
            .unwrap();

        let path = sink.snapshot_path("cafe @ Austin", "https://www.yelp.com/biz/x");
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("cafe-austin-"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<h1>X</h1>");
    }
}
