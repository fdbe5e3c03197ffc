mod config;
mod render;

use anyhow::Context;
use ax_api_types::CheckoutInfo;
use ax_session_core::{Command, Orchestrator, ResumeOutcome, SessionOutcome};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Cli, Mode};
use crate::render::TerminalRenderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Both reqwest and tungstenite pull in rustls; pick the provider once.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let config = cli.client.resolve()?;
    let (api, connector) = ax_gateway_http::gateway(config.endpoints.clone(), config.connect_timeout)
        .context("failed to build invoice gateway")?;
    let renderer = Arc::new(TerminalRenderer::stdout());
    let mut orchestrator = Orchestrator::new(api, connector, renderer, config.timings);
    info!("invoice-watch following {}", config.endpoints.page);

    let (commands_tx, mut commands) = mpsc::channel(8);
    spawn_stdin_reader(commands_tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = commands_tx.send(Command::Unload).await;
        }
    });

    match cli.mode.unwrap_or(Mode::Resume) {
        Mode::Resume => {
            if orchestrator.resume_if_present().await? == ResumeOutcome::NoSession {
                println!("No invoice for this visitor yet. Type `new [message]` to create one.");
            }
        }
        Mode::New(args) => orchestrator.create_invoice(args.checkout_info()).await?,
    }

    loop {
        match orchestrator.run(&mut commands).await? {
            SessionOutcome::Expired => {
                println!("Invoice expired. Type `new` for a new address.");
            }
            outcome => {
                info!(?outcome, "invoice-watch done");
                return Ok(());
            }
        }
    }
}

/// Stdin reads block, so they get their own thread rather than a runtime task.
fn spawn_stdin_reader(commands: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if commands.blocking_send(command).is_err() {
                        break;
                    }
                }
                None => warn!("unknown command {:?}; try `new [message]` or `quit`", line.trim()),
            }
        }
    });
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    match word {
        "new" => Some(Command::NewInvoice(CheckoutInfo::new(Some(rest), None))),
        "quit" | "exit" => Some(Command::Unload),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_with_optional_message() {
        assert_eq!(
            parse_command("new"),
            Some(Command::NewInvoice(CheckoutInfo::default()))
        );
        assert_eq!(
            parse_command("  new  two coffees "),
            Some(Command::NewInvoice(CheckoutInfo::new(Some("two coffees"), None)))
        );
    }

    #[test]
    fn parses_quit_and_rejects_unknown_words() {
        assert_eq!(parse_command("quit"), Some(Command::Unload));
        assert_eq!(parse_command("exit"), Some(Command::Unload));
        assert_eq!(parse_command("refresh"), None);
        assert_eq!(parse_command(""), None);
    }
}
