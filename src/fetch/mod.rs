//! Thin HTTP layer used by the weather provider client.
//!
//! [`HttpClient`] is the seam tests and auth wrappers plug into; [`BasicClient`]
//! is the plain reqwest implementation.

mod basic;
pub mod auth;

pub use basic::BasicClient;

use async_trait::async_trait;
use reqwest::{Request, Response};
use tracing::debug;

use crate::error::ProviderError;

/// Executes a prepared request. Wrappers such as [`auth::PathKey`] decorate
/// the request and delegate to an inner client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Issues a GET for `url` through `client` and returns the body bytes.
///
/// Non-success statuses are errors carrying the status and response body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, ProviderError> {
    let url = reqwest::Url::parse(url).map_err(|e| ProviderError::InvalidUrl(format!("{url}: {e}")))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Status { status, body });
    }

    let bytes = resp.bytes().await?.to_vec();
    debug!(bytes = bytes.len(), "Response body received");
    Ok(bytes)
}
