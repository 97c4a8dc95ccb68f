//! HTTP client for the WirePact PKI
//!
//! The PKI exposes two endpoints: an unauthenticated GET returning its CA
//! certificate, and a POST accepting a PEM CSR and returning the signed
//! certificate. Requests are not retried; a PKI outage at boot is fatal.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PkiError, Result};

/// Request timeout for PKI calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Content type of a PEM encoded PKCS#10 request
const PKCS10_CONTENT_TYPE: &str = "application/pkcs10";

/// Client for the PKI's CA and CSR endpoints
#[derive(Debug, Clone)]
pub struct PkiClient {
    client: reqwest::Client,
}

impl PkiClient {
    /// Create a PKI client with the default timeout
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PkiError::http("", format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetch the PEM encoded CA certificate
    pub async fn fetch_ca(&self, url: &str) -> Result<String> {
        info!(url = %url, "Fetching CA certificate from PKI");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PkiError::http(url, format!("request failed: {}", e)))?;

        read_body(url, response).await
    }

    /// Submit a PEM encoded CSR and return the PEM encoded certificate
    pub async fn submit_csr(&self, url: &str, csr_pem: &str) -> Result<String> {
        info!(url = %url, "Submitting CSR to PKI");

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, PKCS10_CONTENT_TYPE)
            .body(csr_pem.to_string())
            .send()
            .await
            .map_err(|e| PkiError::http(url, format!("request failed: {}", e)))?;

        read_body(url, response).await
    }
}

async fn read_body(url: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PkiError::http(url, format!("{} - {}", status, body)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| PkiError::http(url, format!("failed to read body: {}", e)))?;
    debug!(url = %url, bytes = body.len(), "PKI response received");
    Ok(body)
}
