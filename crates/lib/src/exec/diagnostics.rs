//! Optional append-only log of failed executions.

use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::exec::{FailureKind, Prompt};

const PROMPT_PREVIEW_CHARS: usize = 200;

/// Appends one entry per failure. Entries are serialized so concurrent writers do not interleave.
#[derive(Debug)]
pub struct DiagnosticLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DiagnosticLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry. Write failures are logged and otherwise ignored.
    pub async fn record(&self, kind: FailureKind, prompt: &Prompt, detail: &str) {
        let entry = format_entry(
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            kind,
            prompt,
            detail,
        );
        let _guard = self.lock.lock().await;
        if let Err(e) = self.append(entry.as_bytes()).await {
            log::debug!("diagnostic log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

fn format_entry(timestamp: &str, kind: FailureKind, prompt: &Prompt, detail: &str) -> String {
    format!(
        "[{}] [ERROR] Type: {}, User: {}\nPrompt: {}...\nError: {}\n{}\n",
        timestamp,
        kind.tag(),
        prompt.key(),
        prompt.preview(PROMPT_PREVIEW_CHARS),
        detail,
        "-".repeat(40)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_layout() {
        let prompt = Prompt::new(7, "说点什么");
        let entry = format_entry(
            "2026-01-02 03:04:05",
            FailureKind::Timeout,
            &prompt,
            "Command timeout",
        );
        let lines: Vec<&str> = entry.lines().collect();
        assert_eq!(lines[0], "[2026-01-02 03:04:05] [ERROR] Type: TIMEOUT, User: 7");
        assert_eq!(lines[1], "Prompt: 说点什么...");
        assert_eq!(lines[2], "Error: Command timeout");
        assert_eq!(lines[3], "-".repeat(40));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn prompt_is_truncated_to_200_chars() {
        let prompt = Prompt::new("user_1", "字".repeat(500));
        let entry = format_entry("t", FailureKind::Exception, &prompt, "boom");
        let prompt_line = entry.lines().nth(1).unwrap();
        assert_eq!(prompt_line.chars().count(), "Prompt: ".len() + 200 + 3);
    }

    #[tokio::test]
    async fn record_appends() {
        let path = std::env::temp_dir()
            .join(format!("chatbridge-diag-{}.log", uuid::Uuid::new_v4()));
        let log = DiagnosticLog::new(&path);
        let prompt = Prompt::new(1, "hi");
        log.record(FailureKind::EmptyOutput, &prompt, "No output").await;
        log.record(FailureKind::ShortOutput, &prompt, "ok").await;
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("[ERROR]").count(), 2);
        assert!(text.contains("Type: EMPTY_OUTPUT"));
        assert!(text.contains("Type: SHORT_OUTPUT"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn concurrent_records_do_not_interleave() {
        let path = std::env::temp_dir()
            .join(format!("chatbridge-diag-{}.log", uuid::Uuid::new_v4()));
        let log = std::sync::Arc::new(DiagnosticLog::new(&path));
        let mut tasks = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                let prompt = Prompt::new(i as i64, format!("prompt {}", i));
                log.record(FailureKind::Timeout, &prompt, "Command timeout").await;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<&str> = text
            .split_terminator(&format!("{}\n", "-".repeat(40)))
            .collect();
        assert_eq!(entries.len(), 20);
        for entry in entries {
            let lines: Vec<&str> = entry.lines().collect();
            assert_eq!(lines.len(), 3, "{:?}", entry);
            assert!(lines[0].contains("Type: TIMEOUT"));
            assert!(lines[1].starts_with("Prompt: prompt "));
        }
        let _ = std::fs::remove_file(path);
    }
}
