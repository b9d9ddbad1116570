//! Execution layer: run the external AI command for a prompt and turn whatever happens into a
//! displayable reply.
//!
//! `Backend` runs one invocation under a deadline, `OutputClassifier` scrubs and judges the
//! output, and `ExecutionGateway` ties them together with a bounded worker pool for async use.

mod classify;
mod diagnostics;
mod gateway;
mod invoker;
mod result;

pub use classify::{OutputClassifier, ScrubRule, MIN_REPLY_LEN};
pub use diagnostics::DiagnosticLog;
pub use gateway::{ExecutionGateway, GatewayOptions, PendingReply};
pub use invoker::{Backend, CommandBackend, InvokeError, InvokeOutput};
pub use result::{CorrelationKey, ExecutionResult, FailureKind, Prompt};
