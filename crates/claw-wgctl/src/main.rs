//! `claw-wgctl` binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use claw_wgctl::cli::{Cli, Commands};
use claw_wgctl::client::DeviceClient;
use claw_wgctl::commands::{ApplyCommand, CheckCommand, KeyCommand, PeerCommand, ShowCommand};
use claw_wgctl::output::OutputFormat;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();
    let client = DeviceClient::new(&cli.socket_dir, cli.timeout());

    match &cli.command {
        Commands::Check { path } => {
            CheckCommand::new(path)
                .execute(&mut stdout, &format)
                .await
                .with_context(|| format!("checking {}", path.display()))?;
        }
        Commands::Genkey => {
            KeyCommand::new().genkey(&mut stdout, &format)?;
        }
        Commands::Pubkey => {
            let mut stdin = io::stdin().lock();
            KeyCommand::new().pubkey(&mut stdin, &mut stdout, &format)?;
        }
        Commands::Show { interface } => {
            ShowCommand::new(&client)
                .execute(&mut stdout, &format, interface)
                .await?;
        }
        Commands::Apply(args) => {
            ApplyCommand::new(&client)
                .execute(&mut stdout, &format, args)
                .await
                .with_context(|| format!("applying {} to {}", args.path.display(), args.interface))?;
        }
        Commands::Peer { command } => {
            PeerCommand::new(&client)
                .execute(&mut stdout, &format, command)
                .await?;
        }
    }

    Ok(())
}
