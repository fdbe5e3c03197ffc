//! Network adapters for the invoice gateway.
//!
//! [`HttpInvoiceApi`] talks to the request/response endpoints with `reqwest`;
//! [`WsConnector`] opens the invoice stream with `tokio-tungstenite`. Both share
//! one cookie jar because the server binds the invoice to the visitor's
//! session cookie.

pub mod endpoints;
pub mod http;
pub mod ws;

pub use endpoints::Endpoints;
pub use http::HttpInvoiceApi;
pub use ws::WsConnector;

use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported page scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Build the HTTP client and stream connector for one page origin, sharing a
/// cookie jar between them.
pub fn gateway(
    endpoints: Endpoints,
    connect_timeout: Duration,
) -> anyhow::Result<(HttpInvoiceApi, WsConnector)> {
    let jar = Arc::new(Jar::default());
    let api = HttpInvoiceApi::new(endpoints.clone(), jar.clone())?;
    let connector = WsConnector::new(endpoints, jar, connect_timeout);
    Ok((api, connector))
}
