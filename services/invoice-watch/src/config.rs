use anyhow::{Context, Result, ensure};
use ax_api_types::CheckoutInfo;
use ax_gateway_http::Endpoints;
use ax_session_core::SessionTimings;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "invoice-watch")]
#[command(about = "Follow a Monero invoice session from the terminal")]
pub struct Cli {
    #[command(flatten)]
    pub client: ClientArgs,
    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    /// Origin of the page hosting the widget. Its scheme picks ws or wss.
    #[arg(long, env = "INVOICE_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,
    #[arg(long, env = "INVOICE_CLOSE_WAIT_MS", default_value_t = 1000)]
    pub close_wait_ms: u64,
    #[arg(long, env = "INVOICE_READY_POLL_MS", default_value_t = 100)]
    pub ready_poll_ms: u64,
    #[arg(long, env = "INVOICE_READY_TIMEOUT_MS", default_value_t = 10_000)]
    pub ready_timeout_ms: u64,
    #[arg(long, env = "INVOICE_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Mode {
    /// Pick up the invoice the server holds for this visitor.
    Resume,
    /// Create a new invoice.
    New(NewArgs),
}

#[derive(Debug, Clone, Args)]
pub struct NewArgs {
    #[arg(long)]
    pub message: Option<String>,
    #[arg(long)]
    pub contact: Option<String>,
}

impl NewArgs {
    pub fn checkout_info(&self) -> CheckoutInfo {
        CheckoutInfo::new(self.message.as_deref(), self.contact.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub timings: SessionTimings,
    pub connect_timeout: Duration,
}

impl ClientArgs {
    pub fn resolve(&self) -> Result<ClientConfig> {
        let endpoints = Endpoints::from_page(&self.base_url)
            .with_context(|| format!("invalid INVOICE_BASE_URL {:?}", self.base_url))?;
        ensure!(self.ready_poll_ms > 0, "INVOICE_READY_POLL_MS must be positive");
        ensure!(
            self.ready_timeout_ms >= self.ready_poll_ms,
            "INVOICE_READY_TIMEOUT_MS must not be shorter than the poll interval"
        );

        Ok(ClientConfig {
            endpoints,
            timings: SessionTimings {
                close_wait: Duration::from_millis(self.close_wait_ms),
                ready_poll_interval: Duration::from_millis(self.ready_poll_ms),
                ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        })
    }
}
