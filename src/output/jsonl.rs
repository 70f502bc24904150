use crate::output::{OutputResult, RecordSink};
use crate::record::Record;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends records to a JSON Lines file, one object per line
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Opens (or creates) the dataset file in append mode
    ///
    /// Parent directories are created as needed.
    pub async fn open(path: impl AsRef<Path>) -> OutputResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn push(&self, record: &Record) -> OutputResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&self) -> OutputResult<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Keeps records in memory; used by dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: StdMutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records pushed so far, in push order
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn push(&self, record: &Record) -> OutputResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_jsonl_appends_lines_with_all_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("dataset.jsonl");

        let sink = JsonlSink::open(&path).await.unwrap();
        let mut first = Record::new("Blue Door Cafe");
        first.rating = Some(4.5);
        sink.push(&first).await.unwrap();
        sink.push(&Record::new("Acme Plumbing")).await.unwrap();
        sink.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        assert!(obj["email"].is_null());
        assert_eq!(obj["business_name"], "Acme Plumbing");
    }

    #[tokio::test]
    async fn test_jsonl_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.jsonl");

        for name in ["One", "Two"] {
            let sink = JsonlSink::open(&path).await.unwrap();
            sink.push(&Record::new(name)).await.unwrap();
            sink.flush().await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.push(&Record::new("One")).await.unwrap();
        assert_eq!(sink.records()[0].business_name, "One");
    }
}
