//! Actor message definitions.
//!
//! ```text
//! FsActor --Changed--> BuildActor --Reload/Error--> WsActor
//! ```

use std::net::TcpStream;
use std::path::PathBuf;

/// Messages to the build actor.
#[derive(Debug)]
pub enum BuildMsg {
    /// One debounced batch of changed source paths.
    Changed(Vec<PathBuf>),
    Shutdown,
}

/// Messages to the WebSocket actor.
#[derive(Debug)]
pub enum WsMsg {
    /// Every triggered stage finished; refresh all clients.
    Reload { reason: String },
    /// A watch cycle failed (display overlay, no reload).
    Error { stage: String, error: String },
    /// A later cycle succeeded after a failure.
    ClearError,
    /// Freshly accepted connection, handshake pending.
    AddClient(TcpStream),
    Shutdown,
}
