//! Configuration sections of `sapl.toml`.

mod assets;
mod paths;
mod serve;

pub use assets::{ImagesConfig, SassConfig};
pub use paths::PathsConfig;
pub use serve::ServeConfig;
