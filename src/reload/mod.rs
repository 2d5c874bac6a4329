//! Live reload.
//!
//! - `message` - JSON protocol between the dev server and the browser
//! - `server` - WebSocket listener feeding the WebSocket actor

pub mod message;
pub mod server;
