//! Configuration for the voicereader engine daemon.
//!
//! Three layers, lowest to highest priority: CLI flags, environment
//! variables, and (when `--bootstrap-stdin` is passed) a JSON object read
//! from standard input that overrides `token`, `port` and `data_dir`. There
//! is no on-disk settings file — this engine is a short-lived local daemon
//! launched by its caller, not a long-running service with its own config
//! tree.

pub mod cli;
pub mod settings;

pub use cli::CliArgs;
pub use settings::{resolve_config, BootstrapPayload, ConfigError, EngineConfig};
