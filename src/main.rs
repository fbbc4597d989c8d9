mod commands;
mod config;
mod export;
mod gemini;
mod pipeline;
mod state;
mod table;

pub const USER_AGENT: &str = concat!("rowscout/", env!("CARGO_PKG_VERSION"));

use clap::Parser;
use commands::Cli;
use tracing::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rowscout=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = commands::dispatch(cli).await {
        error!("{e}");
        if let Some(hint) = e.hint() {
            error!("hint: {hint}");
        }
        return Err(e.into());
    }
    Ok(())
}
