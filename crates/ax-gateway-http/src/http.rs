use anyhow::{Context, Result};
use async_trait::async_trait;
use ax_api_types::{CheckoutInfo, InvoiceSnapshot};
use ax_gateway_client::InvoiceApi;
use reqwest::StatusCode;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use tracing::debug;

use crate::{Endpoints, GatewayError};

/// `reqwest` client for `GET /update` and `POST /checkout`.
pub struct HttpInvoiceApi {
    endpoints: Endpoints,
    http: reqwest::Client,
}

impl HttpInvoiceApi {
    pub fn new(endpoints: Endpoints, jar: Arc<Jar>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .build()
            .context("failed to build invoice HTTP client")?;
        Ok(Self { endpoints, http })
    }
}

#[async_trait]
impl InvoiceApi for HttpInvoiceApi {
    async fn fetch_update(&self) -> Result<Option<InvoiceSnapshot>> {
        let response = self
            .http
            .get(self.endpoints.update.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .context("invoice update transport")?;

        let status = response.status();
        if status == StatusCode::GONE {
            debug!("no invoice session for this visitor");
            return Ok(None);
        }

        let text = response.text().await.context("invoice update body")?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                endpoint: "update",
                status,
                body: text,
            }
            .into());
        }

        let snapshot = InvoiceSnapshot::parse(&text)?;
        Ok(Some(snapshot))
    }

    async fn checkout(&self, info: Option<&CheckoutInfo>) -> Result<()> {
        let mut request = self
            .http
            .post(self.endpoints.checkout.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(info) = info {
            request = request.json(info);
        }

        let response = request.send().await.context("checkout transport")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                endpoint: "checkout",
                status,
                body,
            }
            .into());
        }

        debug!(%status, "invoice created");
        Ok(())
    }
}
