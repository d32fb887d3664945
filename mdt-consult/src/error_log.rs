use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context as _;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only log of cases that failed for good.
///
/// Each entry is written with a single `write_all` while holding the lock, so
/// concurrent workers never interleave their entries.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
    entries: AtomicUsize,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            entries: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the log, creating it if needed.
    pub async fn reset(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, b"")
            .await
            .with_context(|| format!("cannot truncate error log {}", self.path.display()))?;
        self.entries.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub async fn record(&self, case: &str, detail: &str) -> anyhow::Result<()> {
        let entry = format_entry(&chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), case, detail);

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("cannot open error log {}", self.path.display()))?;
        file.write_all(entry.as_bytes())
            .await
            .with_context(|| format!("cannot append to error log {}", self.path.display()))?;
        file.flush().await?;
        self.entries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Entries written through this handle since the last reset.
    pub fn entry_count(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    /// Whether the file on disk is empty (or missing).
    pub async fn is_empty(&self) -> anyhow::Result<bool> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Ok(metadata.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e).with_context(|| format!("cannot inspect {}", self.path.display())),
        }
    }
}

fn format_entry(timestamp: &str, case: &str, detail: &str) -> String {
    format!("[{timestamp}] File: {case}\nError: {detail}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn entry_layout() {
        assert_eq!(
            format_entry("2024-01-01 10:00:00", "c1.json", "boom"),
            "[2024-01-01 10:00:00] File: c1.json\nError: boom\n\n"
        );
    }

    #[tokio::test]
    async fn reset_truncates_previous_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("error_log.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale entry\n").unwrap();

        let log = ErrorLog::new(&path);
        log.reset().await.unwrap();
        assert!(log.is_empty().await.unwrap());

        log.record("c1.json", "retrieval failed").await.unwrap();
        assert!(!log.is_empty().await.unwrap());
        assert_eq!(log.entry_count(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.contains("] File: c1.json\nError: retrieval failed\n\n"));
    }

    #[tokio::test]
    async fn concurrent_entries_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ErrorLog::new(dir.path().join("errors.txt")));
        log.reset().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.record(&format!("case{i}.json"), &"x".repeat(4096)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(log.entry_count(), 16);
        assert_eq!(text.matches("] File: case").count(), 16);
        for entry in text.split_terminator("\n\n") {
            assert!(entry.starts_with('['));
            assert!(entry.ends_with(&"x".repeat(4096)));
        }
    }
}
