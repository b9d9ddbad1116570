//! Chat gateway channel (OneBot v11 over WebSocket, e.g. NapCat).
//!
//! `SessionManager` owns the connection and reconnect loop, parses inbound frames into
//! `InboundEvent`s for a `MessageHandler`, and sends replies as action frames.

mod inbound;
mod session;
mod state;
mod transport;

pub use inbound::{
    encode_action, ActionFrame, ChatMessage, InboundEvent, ReplyTarget, SEND_GROUP_MSG,
    SEND_PRIVATE_MSG,
};
pub use session::{MessageHandler, SessionManager, SessionOptions};
pub use state::{ConnectionState, ConnectionStatus};
pub use transport::{
    build_request, Connector, FrameSink, FrameStream, Handshake, SessionError, WsConnector,
};
