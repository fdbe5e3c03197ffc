use ax_session_core::RenderingBridge;
use ax_update_model::DisplayState;
use std::io::Write;
use std::sync::Mutex;
use tracing::{info, warn};

/// Prints each display state as one status line.
pub struct TerminalRenderer {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalRenderer {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn line(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if let Err(err) = writeln!(out, "{text}").and_then(|_| out.flush()) {
            warn!("failed to write to terminal: {}", err);
        }
    }
}

pub fn status_line(state: &DisplayState) -> String {
    let marker = if state.status.is_warning() { "!" } else { "*" };
    let mut line = format!(
        "{marker} {} | paid {} / {} XMR | confirmations {}/{}",
        state.instruction(),
        state.paid_xmr(),
        state.due_xmr(),
        state.confirmations,
        state.confirmations_required,
    );
    let address = state.address_text();
    if !address.is_empty() {
        line.push_str(" | ");
        line.push_str(address);
    }
    if state.new_address_offered() {
        line.push_str(" | type `new` for a new address");
    }
    line
}

impl RenderingBridge for TerminalRenderer {
    fn enter_payment_mode(&self) {
        info!("payment mode");
    }

    fn render(&self, state: &DisplayState) {
        self.line(&status_line(state));
        if let Some(uri) = &state.payment_uri {
            self.line(&format!("  {uri}"));
        }
    }

    fn set_pending_indicator(&self, visible: bool) {
        if visible {
            self.line("  waiting for payment...");
        }
    }

    fn clear_payment_details(&self) {
        self.line("  address withdrawn");
    }

    fn notify_connection_lost(&self) {
        self.line(
            "Lost connection to the payment server. A payment you already sent is still being processed.",
        );
    }
}
