use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Close code for a deliberate, orderly shutdown of the invoice stream.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the page (or process) goes away.
pub const GOING_AWAY: u16 = 1001;
/// Close code reported when a stream dies without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

pub const UPDATE_PATH: &str = "/update";
pub const CHECKOUT_PATH: &str = "/checkout";
pub const STREAM_PATH: &str = "/ws/";

/// Close reason sent when an open stream is replaced by a fresh invoice.
pub const NEW_ADDRESS_REASON: &str = "New Address";

/// One point-in-time statement of an invoice, as streamed by the server.
///
/// Amounts are piconero. `confirmations` is `None` until the payment has been
/// seen on chain at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvoiceSnapshot {
    pub amount_paid: u64,
    pub amount_requested: u64,
    #[serde(default)]
    pub confirmations: Option<i64>,
    pub confirmations_required: u64,
    #[serde(rename = "expiration_in")]
    pub expiration_in_seconds: i64,
    pub address: String,
    #[serde(rename = "uri", default)]
    pub payment_uri: String,
}

impl InvoiceSnapshot {
    pub fn parse(payload: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed invoice snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Why the client deliberately ends the invoice stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClosureReason {
    Confirmed,
    Expired,
}

impl ClosureReason {
    /// The close-frame reason string the server expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional buyer metadata submitted with `POST /checkout`.
///
/// Blank fields are never sent; when both are blank the request carries no
/// body at all (see [`CheckoutInfo::into_body`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl CheckoutInfo {
    pub fn new(message: Option<&str>, contact: Option<&str>) -> Self {
        Self {
            message: non_blank(message),
            contact: non_blank(contact),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.contact.is_none()
    }

    pub fn into_body(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_uses_wire_field_names() -> anyhow::Result<()> {
        let snapshot = InvoiceSnapshot::parse(
            r#"{
                "amount_paid": 0,
                "amount_requested": 1000,
                "confirmations": null,
                "confirmations_required": 10,
                "expiration_in": 120,
                "address": "4Aexample",
                "uri": "monero:4Aexample?tx_amount=0.000000001"
            }"#,
        )?;

        assert_eq!(snapshot.amount_requested, 1000);
        assert_eq!(snapshot.confirmations, None);
        assert_eq!(snapshot.expiration_in_seconds, 120);
        assert_eq!(snapshot.payment_uri, "monero:4Aexample?tx_amount=0.000000001");
        Ok(())
    }

    #[test]
    fn snapshot_accepts_negative_expiry_and_missing_confirmations() -> anyhow::Result<()> {
        let snapshot = InvoiceSnapshot::parse(
            r#"{"amount_paid":5,"amount_requested":5,"confirmations_required":0,
                "expiration_in":-5,"address":"a","uri":"u"}"#,
        )?;
        assert_eq!(snapshot.expiration_in_seconds, -5);
        assert_eq!(snapshot.confirmations, None);
        Ok(())
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        let err = InvoiceSnapshot::parse(r#"{"amount_paid":"lots"}"#).unwrap_err();
        assert!(err.to_string().starts_with("malformed invoice snapshot"));
        assert!(InvoiceSnapshot::parse("not json").is_err());
    }

    #[test]
    fn blank_checkout_fields_are_omitted() -> anyhow::Result<()> {
        assert_eq!(CheckoutInfo::new(Some(""), Some("   ")).into_body(), None);
        assert_eq!(CheckoutInfo::new(None, None).into_body(), None);

        let body = CheckoutInfo::new(Some("thanks!"), Some("")).into_body();
        let json = serde_json::to_value(body)?;
        assert_eq!(json, serde_json::json!({ "message": "thanks!" }));
        Ok(())
    }

    #[test]
    fn closure_reasons_match_close_frame_text() {
        assert_eq!(ClosureReason::Confirmed.as_str(), "Confirmed");
        assert_eq!(ClosureReason::Expired.to_string(), "Expired");
    }
}
