//! Connection state: the live sink exists only while connected.

use std::fmt;

use crate::channels::transport::FrameSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Always accessed under the session's single mutex.
#[derive(Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(FrameSink),
}

impl ConnectionState {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting => ConnectionStatus::Connecting,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
        }
    }

    /// Move to Disconnected, handing back the sink if there was one.
    pub fn take_sink(&mut self) -> Option<FrameSink> {
        match std::mem::take(self) {
            ConnectionState::Connected(sink) => Some(sink),
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.status(), f)
    }
}
