mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mediabox::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    mediabox::observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = Config::load_with(args.config)
                .map_err(|e| format!("Failed to load config: {}", e))?;
            mediabox::api::run(config, args.address).await?
        }
        Commands::Config(args) => {
            let config = Config::load_with(args.config)?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
