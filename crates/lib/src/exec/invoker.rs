//! Process invoker: run the external AI command once, with a hard deadline.
//! No shell is used; the prompt is passed as a single argument to avoid injection.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ExecutorConfig;
use crate::exec::FailureKind;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("command timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("exec failed: {0}")]
    Io(#[from] std::io::Error),
}

impl InvokeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InvokeError::Timeout(_) => FailureKind::Timeout,
            InvokeError::NotFound(_) => FailureKind::NotFound,
            InvokeError::Io(_) => FailureKind::Exception,
        }
    }
}

/// Captured output of one backend run. Only stdout is classified; stderr is kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct InvokeOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Something that turns a prompt into raw backend output.
///
/// Implementations must give up once `deadline` has passed and report `InvokeError::Timeout`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, prompt: &str, deadline: Duration) -> Result<InvokeOutput, InvokeError>;
}

/// Runs `<program> <args...> <prompt>` as a child process.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: None,
        }
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
            .with_work_dir(config.work_dir.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Backend for CommandBackend {
    async fn invoke(&self, prompt: &str, deadline: Duration) -> Result<InvokeOutput, InvokeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.work_dir {
            cmd.current_dir(dir);
        }
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InvokeError::NotFound(self.program.clone())
            } else {
                InvokeError::Io(e)
            }
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(res) => res?,
            Err(_) => return Err(InvokeError::Timeout(deadline)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            log::debug!(
                "backend {} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(InvokeOutput {
            stdout,
            stderr,
            success: output.status.success(),
        })
    }
}
