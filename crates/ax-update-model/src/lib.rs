//! Derives what the payment widget should show from a raw invoice snapshot.
//!
//! Everything here is pure: no I/O, no clocks. The connection layer feeds each
//! inbound [`InvoiceSnapshot`] through [`classify`] and hands the resulting
//! [`DisplayState`] to whatever renders it.

use ax_api_types::{ClosureReason, InvoiceSnapshot};

pub const PICONERO_PER_XMR: u64 = 1_000_000_000_000;

/// An invoice with this many seconds left (or fewer) is about to expire.
const EXPIRING_SOON_SECONDS: i64 = 2;

const HIDDEN_ADDRESS_TEXT: &str = "Expiring or expired...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Loading,
    AwaitingPayment,
    ExpiringSoon,
    PaymentDetected,
    Confirmed,
    Expired,
}

impl InvoiceStatus {
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Loading => "Loading...",
            Self::AwaitingPayment => "Send Monero to Address Below",
            Self::ExpiringSoon => "Address Expiring Soon",
            Self::PaymentDetected => "Paid! Waiting for Confirmation...",
            Self::Confirmed => "Paid! Thank you",
            Self::Expired => "Address Expired!",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ExpiringSoon)
    }

    /// Near or past expiry: the address must not be offered for payment.
    pub fn is_expiring_or_expired(&self) -> bool {
        matches!(self, Self::ExpiringSoon | Self::Expired)
    }
}

/// Everything a renderer needs for one frame of the payment widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub status: InvoiceStatus,
    pub amount_paid: u64,
    pub amount_requested: u64,
    /// Never negative, even while the chain has not seen the payment yet.
    pub confirmations: u64,
    pub confirmations_required: u64,
    pub address_visible: bool,
    /// `None` whenever the address is hidden.
    pub address: Option<String>,
    /// QR payload; `None` whenever the address is hidden.
    pub payment_uri: Option<String>,
}

impl DisplayState {
    /// Placeholder shown as soon as the widget switches into payment mode.
    pub fn loading() -> Self {
        Self {
            status: InvoiceStatus::Loading,
            amount_paid: 0,
            amount_requested: 0,
            confirmations: 0,
            confirmations_required: 0,
            address_visible: false,
            address: None,
            payment_uri: None,
        }
    }

    pub fn instruction(&self) -> &'static str {
        self.status.instruction()
    }

    pub fn copy_enabled(&self) -> bool {
        self.address_visible
    }

    pub fn new_address_offered(&self) -> bool {
        self.status.is_expiring_or_expired()
    }

    pub fn address_text(&self) -> &str {
        match (&self.address, self.status) {
            (Some(address), _) => address,
            (None, InvoiceStatus::Loading) => "",
            (None, _) => HIDDEN_ADDRESS_TEXT,
        }
    }

    pub fn paid_xmr(&self) -> String {
        format_xmr(self.amount_paid)
    }

    pub fn due_xmr(&self) -> String {
        format_xmr(self.amount_requested)
    }
}

/// Classify a snapshot. The first matching rule wins:
///
/// 1. enough confirmations: `Confirmed`, closes the stream
/// 2. paid in full: `PaymentDetected`
/// 3. more than two seconds left: `AwaitingPayment`
/// 4. one or two seconds left: `ExpiringSoon`
/// 5. otherwise `Expired`, closes the stream
pub fn classify(snapshot: &InvoiceSnapshot) -> (DisplayState, Option<ClosureReason>) {
    let (status, closure) = if is_confirmed(snapshot) {
        (InvoiceStatus::Confirmed, Some(ClosureReason::Confirmed))
    } else if snapshot.amount_paid >= snapshot.amount_requested {
        (InvoiceStatus::PaymentDetected, None)
    } else if snapshot.expiration_in_seconds > EXPIRING_SOON_SECONDS {
        (InvoiceStatus::AwaitingPayment, None)
    } else if snapshot.expiration_in_seconds > 0 {
        (InvoiceStatus::ExpiringSoon, None)
    } else {
        (InvoiceStatus::Expired, Some(ClosureReason::Expired))
    };

    let address_visible = !status.is_expiring_or_expired();
    let state = DisplayState {
        status,
        amount_paid: snapshot.amount_paid,
        amount_requested: snapshot.amount_requested,
        confirmations: snapshot
            .confirmations
            .map_or(0, |c| u64::try_from(c).unwrap_or(0)),
        confirmations_required: snapshot.confirmations_required,
        address_visible,
        address: address_visible.then(|| snapshot.address.clone()),
        payment_uri: address_visible.then(|| snapshot.payment_uri.clone()),
    };

    (state, closure)
}

fn is_confirmed(snapshot: &InvoiceSnapshot) -> bool {
    snapshot
        .confirmations
        .is_some_and(|c| i128::from(c) >= i128::from(snapshot.confirmations_required))
}

/// Render piconero as a decimal XMR amount, e.g. `1_500_000_000_000` -> `"1.5"`.
pub fn format_xmr(piconero: u64) -> String {
    let whole = piconero / PICONERO_PER_XMR;
    let fraction = piconero % PICONERO_PER_XMR;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:012}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
