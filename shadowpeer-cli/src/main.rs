//! ShadowPeer CLI - Command-line interface
//!
//! Runs announce sessions against HTTP trackers and inspects torrent files.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "shadowpeer")]
#[command(about = "BitTorrent tracker announce client with simulated upload")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await
}
