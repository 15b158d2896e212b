use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediabox")]
#[command(about = "MediaBox media download service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides `server.bind_addr`)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Path to the TOML configuration file (falls back to `MEDIABOX_CONFIG`)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file (falls back to `MEDIABOX_CONFIG`)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
