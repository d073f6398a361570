//! Configuration for the terrain patch renderer.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line via clap.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, DemoConfig, PatchRenderConfig};
pub use error::ConfigError;
