//! Command-line surface of the engine daemon.

use clap::Parser;

pub const DEFAULT_TOKEN_ENV: &str = "SPEAK_SELECTION_ENGINE_TOKEN";

/// Speak Selection engine daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "voicereader", about = "Speak Selection engine daemon")]
pub struct CliArgs {
    /// Run the local HTTP/WS engine server.
    #[arg(long)]
    pub server: bool,

    /// Bind host (loopback only recommended).
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8765)]
    pub port: u16,

    /// Session token (Bearer auth).
    #[arg(long)]
    pub token: Option<String>,

    /// Environment variable name for the token.
    #[arg(long, default_value = DEFAULT_TOKEN_ENV)]
    pub token_env: String,

    /// Engine data directory.
    #[arg(long = "data-dir")]
    pub data_dir: Option<String>,

    /// Read a JSON bootstrap payload from stdin: `{token, port, data_dir}`.
    #[arg(long)]
    pub bootstrap_stdin: bool,
}
