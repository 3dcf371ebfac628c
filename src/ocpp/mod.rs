//! OCPP gateway: WebSocket server, session registry, message router and
//! action handlers for OCPP 1.6 and 2.0.1.

pub mod commands;
pub mod handlers;
pub mod reaper;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use commands::CommandDispatcher;
pub use registry::{SessionRegistry, SessionStats, SharedSessionRegistry};
pub use router::MessageRouter;
pub use session::OcppSession;

/// Failure modes of a server-initiated CALL.
#[derive(Debug, Clone)]
pub enum CommandError {
    /// The station has no live session.
    NotConnected(String),
    SendFailed(String),
    /// No response within the pending-message timeout.
    Timeout,
    /// The session closed while the CALL was outstanding.
    Cancelled,
    /// The station answered with a CALLERROR.
    CallError { code: String, description: String },
    InvalidResponse(String),
    UnsupportedVersion(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected(id) => write!(f, "Station not connected: {}", id),
            Self::SendFailed(msg) => write!(f, "Failed to send: {}", msg),
            Self::Timeout => write!(f, "Response timeout"),
            Self::Cancelled => write!(f, "Session closed while awaiting response"),
            Self::CallError { code, description } => {
                write!(f, "CallError {}: {}", code, description)
            }
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Self::UnsupportedVersion(msg) => write!(f, "Unsupported version: {}", msg),
        }
    }
}

impl std::error::Error for CommandError {}
