//! ## grindvakt-cli
//! **Operator entry point**
//!
//! `run` starts live enforcement until Ctrl-C. `block` and `unblock` drive
//! the firewall directly. `rules` and `check-config` inspect configuration.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
