mod api;
mod cli;
mod commands;
mod editor;
mod error;
mod jobs;
mod session;
mod video;

use anyhow::Result;
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    commands::run(args).await?;

    Ok(())
}
