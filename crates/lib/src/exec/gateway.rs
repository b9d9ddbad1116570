//! Execution gateway: turn a prompt into a displayable reply, synchronously or on a bounded
//! worker pool. No failure escapes; every path ends in a reply or a fallback string.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};

use crate::config::ExecutorConfig;
use crate::exec::{
    Backend, CommandBackend, CorrelationKey, DiagnosticLog, ExecutionResult, FailureKind,
    OutputClassifier, Prompt,
};

/// Gateway tuning: deadline per prompt, pool size, optional diagnostic log file.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub deadline: Duration,
    pub max_workers: usize,
    pub debug_log: Option<PathBuf>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for GatewayOptions {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            deadline: config.timeout(),
            max_workers: config.max_workers,
            debug_log: config.debug_log.clone(),
        }
    }
}

/// Cheap to clone; all clones share one worker pool.
#[derive(Clone)]
pub struct ExecutionGateway {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    classifier: OutputClassifier,
    diagnostics: Option<DiagnosticLog>,
    deadline: Duration,
    workers: Arc<Semaphore>,
    accepting: AtomicBool,
}

impl ExecutionGateway {
    pub fn new(backend: Arc<dyn Backend>, options: GatewayOptions) -> Self {
        let max_workers = options.max_workers.max(1);
        Self {
            inner: Arc::new(Inner {
                backend,
                classifier: OutputClassifier::default(),
                diagnostics: options.debug_log.map(DiagnosticLog::new),
                deadline: options.deadline,
                workers: Arc::new(Semaphore::new(max_workers)),
                accepting: AtomicBool::new(true),
            }),
        }
    }

    /// Gateway running the configured external command.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(Arc::new(CommandBackend::from_config(config)), GatewayOptions::from(config))
    }

    pub fn deadline(&self) -> Duration {
        self.inner.deadline
    }

    /// Run one prompt on the calling task. Returns within the deadline (plus process teardown).
    pub async fn run(&self, prompt: &Prompt) -> ExecutionResult {
        let inner = &self.inner;
        log::debug!(
            "exec: running prompt for {} ({} chars)",
            prompt.key(),
            prompt.text().chars().count()
        );
        match inner.backend.invoke(prompt.text(), inner.deadline).await {
            Ok(output) => {
                let cleaned = inner.classifier.scrub(&output.stdout);
                let result = inner.classifier.judge(&cleaned);
                if let Some(kind) = result.failure() {
                    let mut detail = if cleaned.is_empty() {
                        "No output".to_string()
                    } else {
                        cleaned
                    };
                    let stderr = output.stderr.trim();
                    if !stderr.is_empty() {
                        detail.push_str("\nstderr: ");
                        detail.push_str(stderr);
                    }
                    self.record(kind, prompt, &detail).await;
                }
                result
            }
            Err(e) => {
                let kind = e.kind();
                self.record(kind, prompt, &e.to_string()).await;
                ExecutionResult::Fallback(kind)
            }
        }
    }

    /// Queue a prompt on the worker pool. Submissions beyond the pool size wait for a slot.
    pub fn submit(&self, prompt: Prompt) -> PendingReply {
        let key = prompt.key().clone();
        let expires = tokio::time::Instant::now() + self.inner.deadline;
        if !self.inner.accepting.load(Ordering::SeqCst) {
            log::warn!("exec: gateway is shut down, rejecting prompt for {}", key);
            return PendingReply {
                key,
                rx: None,
                expires,
            };
        }
        let (tx, rx) = oneshot::channel();
        let gateway = self.clone();
        let workers = self.inner.workers.clone();
        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            let result = gateway.run(&prompt).await;
            let _ = tx.send(result);
        });
        PendingReply {
            key,
            rx: Some(rx),
            expires,
        }
    }

    /// Queue a prompt and return immediately; `callback` is invoked exactly once from a pool task.
    pub fn run_async<F>(&self, prompt: Prompt, callback: F)
    where
        F: FnOnce(ExecutionResult, CorrelationKey) + Send + 'static,
    {
        let pending = self.submit(prompt);
        tokio::spawn(async move {
            let key = pending.key().clone();
            let result = pending.wait().await;
            callback(result, key);
        });
    }

    /// Stop accepting new work. Work already submitted still runs; this does not wait for it.
    pub fn shutdown(&self) {
        if self.inner.accepting.swap(false, Ordering::SeqCst) {
            log::info!("exec: gateway shutting down, no new work accepted");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    async fn record(&self, kind: FailureKind, prompt: &Prompt, detail: &str) {
        log::warn!("exec: {} for {}: {}", kind, prompt.key(), detail);
        if let Some(ref diagnostics) = self.inner.diagnostics {
            diagnostics.record(kind, prompt, detail).await;
        }
    }
}

/// A queued prompt. `wait` resolves under its own deadline, measured from submission.
pub struct PendingReply {
    key: CorrelationKey,
    rx: Option<oneshot::Receiver<ExecutionResult>>,
    expires: tokio::time::Instant,
}

impl PendingReply {
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    pub async fn wait(self) -> ExecutionResult {
        let PendingReply { key, rx, expires } = self;
        let Some(rx) = rx else {
            return ExecutionResult::Fallback(FailureKind::InternalAsyncFailure);
        };
        match tokio::time::timeout_at(expires, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                log::warn!("exec: worker for {} ended without a result", key);
                ExecutionResult::Fallback(FailureKind::InternalAsyncFailure)
            }
            Err(_) => {
                log::warn!("exec: result for {} not ready by its deadline", key);
                ExecutionResult::Fallback(FailureKind::AsyncTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{InvokeError, InvokeOutput};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tokio::sync::mpsc;

    struct Fixed(&'static str);

    #[async_trait]
    impl Backend for Fixed {
        async fn invoke(
            &self,
            _prompt: &str,
            _deadline: Duration,
        ) -> Result<InvokeOutput, InvokeError> {
            Ok(InvokeOutput {
                stdout: self.0.to_string(),
                stderr: String::new(),
                success: true,
            })
        }
    }

    /// Sleeps `delay` per call and tracks the highest number of concurrent calls.
    #[derive(Default)]
    struct Tracking {
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Backend for Tracking {
        async fn invoke(
            &self,
            prompt: &str,
            _deadline: Duration,
        ) -> Result<InvokeOutput, InvokeError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(InvokeOutput {
                stdout: format!("reply to {}", prompt),
                stderr: String::new(),
                success: true,
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl Backend for Panicking {
        async fn invoke(
            &self,
            _prompt: &str,
            _deadline: Duration,
        ) -> Result<InvokeOutput, InvokeError> {
            panic!("backend bug");
        }
    }

    fn options(deadline: Duration, max_workers: usize) -> GatewayOptions {
        GatewayOptions {
            deadline,
            max_workers,
            debug_log: None,
        }
    }

    fn sh(script: &str, deadline: Duration) -> ExecutionGateway {
        let backend = CommandBackend::new("sh", vec!["-c".to_string(), script.to_string()]);
        ExecutionGateway::new(Arc::new(backend), options(deadline, 2))
    }

    #[tokio::test]
    async fn run_returns_scrubbed_reply() {
        let gw = ExecutionGateway::new(
            Arc::new(Fixed("OAuth2 令牌刷新成功\n当然可以，我们开始吧。")),
            GatewayOptions::default(),
        );
        let result = gw.run(&Prompt::new(1, "来玩个游戏")).await;
        assert_eq!(result, ExecutionResult::Reply("当然可以，我们开始吧。".to_string()));
    }

    #[tokio::test]
    async fn run_through_stub_command_keeps_reply() {
        let gw = sh("printf '%s' '你好呀！'", Duration::from_secs(10));
        let result = gw.run(&Prompt::new("user_1", "你好")).await;
        assert_eq!(result, ExecutionResult::Reply("你好呀！".to_string()));
    }

    #[tokio::test]
    async fn run_times_out_with_fallback() {
        let gw = sh("exec sleep 10", Duration::from_millis(300));
        let started = Instant::now();
        let result = gw.run(&Prompt::new(1, "hi")).await;
        assert_eq!(result, ExecutionResult::Fallback(FailureKind::Timeout));
        assert_eq!(result.text(), FailureKind::Timeout.fallback_message());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn run_reports_missing_command() {
        let backend = CommandBackend::new("chatbridge-no-such-binary-7f3a", vec!["-p".to_string()]);
        let gw = ExecutionGateway::new(Arc::new(backend), GatewayOptions::default());
        let result = gw.run(&Prompt::new(1, "hi")).await;
        assert_eq!(result.text(), "AI命令未安装，请检查配置。");
    }

    #[tokio::test]
    async fn failures_are_written_to_diagnostic_log() {
        let path = std::env::temp_dir().join(format!("chatbridge-gw-{}.log", uuid::Uuid::new_v4()));
        let gw = ExecutionGateway::new(
            Arc::new(Fixed("   ")),
            GatewayOptions {
                debug_log: Some(path.clone()),
                ..GatewayOptions::default()
            },
        );
        let result = gw.run(&Prompt::new("user_9", "在吗")).await;
        assert_eq!(result, ExecutionResult::Fallback(FailureKind::EmptyOutput));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Type: EMPTY_OUTPUT, User: user_9"));
        assert!(text.contains("Prompt: 在吗..."));
        assert!(text.contains("Error: No output"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn run_async_completes_every_callback_once() {
        let backend = Arc::new(Tracking {
            delay: Duration::from_millis(20),
            ..Tracking::default()
        });
        let gw = ExecutionGateway::new(backend.clone(), options(Duration::from_secs(30), 3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let n = 25;
        for i in 0..n {
            let tx = tx.clone();
            gw.run_async(Prompt::new(i as i64, format!("prompt {}", i)), move |result, key| {
                let _ = tx.send((key, result));
            });
        }
        drop(tx);

        let mut seen = HashSet::new();
        while let Some((key, result)) = rx.recv().await {
            assert!(result.is_reply(), "{:?}", result);
            assert!(seen.insert(key), "callback fired twice");
        }
        assert_eq!(seen.len(), n);
        assert_eq!(backend.calls.load(Ordering::SeqCst), n);
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn run_async_returns_before_work_finishes() {
        let backend = Arc::new(Tracking {
            delay: Duration::from_millis(300),
            ..Tracking::default()
        });
        let gw = ExecutionGateway::new(backend, options(Duration::from_secs(30), 1));
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        gw.run_async(Prompt::new(5, "slow"), move |result, key| {
            let _ = tx.send((result, key));
        });
        assert!(started.elapsed() < Duration::from_millis(100));
        let (result, key) = rx.await.unwrap();
        assert_eq!(key, CorrelationKey::Id(5));
        assert_eq!(result.text(), "reply to slow");
    }

    #[tokio::test]
    async fn wait_has_its_own_deadline() {
        // Backend ignores its deadline; the result wait still gives up.
        let backend = Arc::new(Tracking {
            delay: Duration::from_secs(5),
            ..Tracking::default()
        });
        let gw = ExecutionGateway::new(backend, options(Duration::from_millis(100), 1));
        let started = Instant::now();
        let result = gw.submit(Prompt::new(1, "hang")).wait().await;
        assert_eq!(result, ExecutionResult::Fallback(FailureKind::AsyncTimeout));
        assert_eq!(result.text(), "处理超时，请稍后再试。");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn worker_fault_becomes_internal_failure() {
        let gw = ExecutionGateway::new(Arc::new(Panicking), GatewayOptions::default());
        let result = gw.submit(Prompt::new(1, "boom")).wait().await;
        assert_eq!(result, ExecutionResult::Fallback(FailureKind::InternalAsyncFailure));
        assert_eq!(result.text(), "抱歉，出了点问题，请重试。");
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work_but_finishes_queued() {
        let backend = Arc::new(Tracking {
            delay: Duration::from_millis(100),
            ..Tracking::default()
        });
        let gw = ExecutionGateway::new(backend, options(Duration::from_secs(30), 1));
        let queued = gw.submit(Prompt::new(1, "before"));
        gw.shutdown();
        assert!(!gw.is_accepting());
        let rejected = gw.submit(Prompt::new(2, "after")).wait().await;
        assert_eq!(rejected, ExecutionResult::Fallback(FailureKind::InternalAsyncFailure));
        assert_eq!(queued.wait().await.text(), "reply to before");
    }
}
