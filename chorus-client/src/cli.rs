//! Command-line arguments for the `chorus` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "chorus", about = "Chorus clients, sessions and comment suggestions")]
pub struct Cli {
    /// Config file (falls back to CHORUS_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Create a client with this name after loading
    #[arg(long, value_name = "NAME")]
    pub add_client: Option<String>,

    /// Suggest comments for this post
    #[arg(long, value_name = "TEXT")]
    pub post: Option<String>,

    /// Client to comment as (default: first active client)
    #[arg(long, value_name = "NAME", requires = "post")]
    pub client: Option<String>,

    /// Number of comments to suggest
    #[arg(long, default_value_t = 3)]
    pub count: usize,
}
