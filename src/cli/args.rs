use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Gemini model to chat with (overrides the config file)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Wait for the full reply instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Path to a config file (defaults to ./config.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also append log events to this CSV file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, default_value = "false")]
    pub debug: bool,
}
