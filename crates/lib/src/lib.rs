//! chatbridge core library: the execution gateway around an external AI command, the
//! OneBot WebSocket session, and the chat bot that joins them. Used by the CLI.

pub mod agent;
pub mod bot;
pub mod channels;
pub mod config;
pub mod exec;
pub mod history;
pub mod init;
pub mod modes;
pub mod prompts;
