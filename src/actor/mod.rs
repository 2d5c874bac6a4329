//! Watch mode actors.
//!
//! ```text
//! FsActor --> BuildActor --> WsActor
//! (notify)    (stages)       (broadcast)
//! ```
//!
//! - `messages` - message types between actors
//! - `fs` - filesystem watcher with debouncing
//! - `builder` - maps change batches to stages and runs them
//! - `ws` - WebSocket clients and broadcast
//! - `coordinator` - wires up and runs the actors

pub mod builder;
pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod ws;

pub use coordinator::Coordinator;
