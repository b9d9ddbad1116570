//! Conversation history: one flat text file per conversation key, trimmed to the last N lines.
//!
//! The file content is fed back to the backend verbatim as context, so it is plain text
//! (`用户: ...` / `AI: ...` lines) rather than structured records.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// File-backed history store. One lock serializes all writes.
pub struct ChatHistory {
    dir: PathBuf,
    max_lines: usize,
    lock: Mutex<()>,
}

impl ChatHistory {
    /// Create the store, creating `dir` if it does not exist. Called once at startup.
    pub fn open(dir: impl Into<PathBuf>, max_lines: usize) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating history directory {}", dir.display()))?;
        Ok(Self {
            dir,
            max_lines,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// History text for `key`; empty when there is none or it cannot be read.
    pub async fn get(&self, key: &str) -> String {
        tokio::fs::read_to_string(self.path_for(key))
            .await
            .unwrap_or_default()
    }

    /// Append one exchange on a new line, then keep only the last `max_lines` lines.
    pub async fn append(&self, key: &str, exchange: &str) {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key);
        if let Err(e) = self.append_locked(&path, exchange).await {
            log::warn!("history: saving {} failed: {:#}", path.display(), e);
        }
    }

    /// Remove the history for `key`. True when nothing is left on disk.
    pub async fn clear(&self, key: &str) -> bool {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                log::warn!("history: clearing {} failed: {}", key, e);
                false
            }
        }
    }

    /// Number of non-blank lines currently kept for `key`.
    pub async fn line_count(&self, key: &str) -> usize {
        let history = self.get(key).await;
        let trimmed = history.trim();
        if trimmed.is_empty() {
            0
        } else {
            trimmed.split('\n').count()
        }
    }

    async fn append_locked(&self, path: &Path, exchange: &str) -> Result<()> {
        let mut content = match tokio::fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        content.push('\n');
        content.push_str(exchange);
        let kept = keep_last_lines(&content, self.max_lines);
        tokio::fs::write(path, kept)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", file_stem(key)))
    }
}

/// Last `max` lines of `content`, line terminators preserved.
fn keep_last_lines(content: &str, max: usize) -> &str {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if lines.len() <= max {
        return content;
    }
    let dropped: usize = lines[..lines.len() - max].iter().map(|l| l.len()).sum();
    &content[dropped..]
}

/// Keys come from chat ids and the command line; anything outside `[A-Za-z0-9_-]` becomes `_`.
fn file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "default".to_string()
    } else {
        stem
    }
}
