use clap::Parser;
use dotenvy::dotenv;
use lectern::cli::Cli;
use lectern::config::Settings;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    init_logging();

    let cli = Cli::parse();
    let settings = init_settings();
    info!("Configuration loaded successfully.");

    cli.run(&settings).await
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
