use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "safetyd",
    version,
    about = "Observatory weather-safety daemon"
)]
pub struct Args {
    /// Path to the declarative configuration file.
    #[arg(long, default_value = "safety.toml")]
    pub config: PathBuf,
    /// Override the listen host from the [server] section.
    #[arg(long)]
    pub host: Option<String>,
    /// Override the listen port from the [server] section.
    #[arg(long)]
    pub port: Option<u16>,
}
