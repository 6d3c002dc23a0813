//! ip-api.com client
//!
//! Free JSON endpoint, no key required:
//! `GET http://ip-api.com/json/{ip}?fields=status,message,countryCode`

use super::traits::{GeoError, GeoLookup, GeoResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "http://ip-api.com/json/";

const USER_AGENT: &str = concat!("originbind/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country_code: Option<String>,
}

/// `GeoLookup` backed by the ip-api.com JSON API.
#[derive(Debug, Clone)]
pub struct IpApiLookup {
    client: Client,
    base_url: String,
}

impl IpApiLookup {
    /// Build a client with connect and request timeouts set to `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GeoResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GeoError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, origin: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{origin}?fields=status,message,countryCode")
    }
}

#[async_trait]
impl GeoLookup for IpApiLookup {
    async fn country_code(&self, origin: &str) -> GeoResult<String> {
        let response = self
            .client
            .get(self.url_for(origin))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeoError::Timeout
                } else {
                    GeoError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| GeoError::Network(e.to_string()))?;
        let body: IpApiResponse =
            serde_json::from_str(&text).map_err(|e| GeoError::Malformed(e.to_string()))?;

        parse_response(body)
    }
}

fn parse_response(body: IpApiResponse) -> GeoResult<String> {
    if body.status != "success" {
        return Err(GeoError::Api(
            body.message.unwrap_or_else(|| body.status.clone()),
        ));
    }

    match body.country_code {
        Some(code) if !code.trim().is_empty() => Ok(code),
        _ => Err(GeoError::Malformed("missing countryCode".to_string())),
    }
}
