use ax_api_types::{CHECKOUT_PATH, STREAM_PATH, UPDATE_PATH};
use url::Url;

use crate::GatewayError;

/// Absolute URLs for every gateway endpoint, derived from the page origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub page: Url,
    pub update: Url,
    pub checkout: Url,
    pub stream: Url,
}

impl Endpoints {
    /// The stream scheme mirrors the page: `https` pages stream over `wss`,
    /// `http` pages over `ws`.
    pub fn from_page(page: &str) -> Result<Self, GatewayError> {
        let page = Url::parse(page)?;
        let stream_scheme = match page.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(GatewayError::UnsupportedScheme(other.to_owned())),
        };

        let update = page.join(UPDATE_PATH)?;
        let checkout = page.join(CHECKOUT_PATH)?;
        let mut stream = page.join(STREAM_PATH)?;
        stream
            .set_scheme(stream_scheme)
            .map_err(|_| GatewayError::UnsupportedScheme(page.scheme().to_owned()))?;

        Ok(Self {
            page,
            update,
            checkout,
            stream,
        })
    }
}
