//! Core types shared across the codebase.

mod mode;
mod state;

pub use mode::{Mode, resolve_mode};
pub use state::{is_shutdown, register_server, setup_shutdown_handler};
