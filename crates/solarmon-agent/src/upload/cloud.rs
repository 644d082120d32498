//! InfluxDB 2.x / Cloud backend.

use super::{UploadError, Uploader};
use crate::config::CloudConfig;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Writes points to InfluxDB Cloud over the v2 write API.
pub struct CloudInflux {
    client: Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl CloudInflux {
    /// Validates credentials and builds the HTTP client.
    pub fn new(config: &CloudConfig) -> Result<Self, UploadError> {
        let token = config.resolved_token();
        for (name, value) in [
            ("bucket", &config.bucket),
            ("org", &config.org),
            ("url", &config.url),
            ("token", &token),
        ] {
            if value.is_empty() {
                return Err(UploadError::MissingCredential(name));
            }
        }
        if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
            return Err(UploadError::InvalidUrl(config.url.clone()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(5))
            .build()?;
        let write_url = format!("{}/api/v2/write", config.url.trim_end_matches('/'));
        info!(
            "Cloud InfluxDB backend: {} (org {}, bucket {})",
            write_url, config.org, config.bucket
        );

        Ok(Self {
            client,
            write_url,
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token,
        })
    }

    /// Host and port of the API endpoint.
    pub fn endpoint(&self) -> Option<(String, u16)> {
        let url = reqwest::Url::parse(&self.write_url).ok()?;
        Some((url.host_str()?.to_string(), url.port_or_known_default()?))
    }
}

impl Uploader for CloudInflux {
    async fn write(&self, body: String) -> Result<(), UploadError> {
        debug!("Writing to {}: {}", self.write_url, body);
        let response = self
            .client
            .post(&self.write_url)
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .body(body)
            .send()
            .await?;
        UploadError::check(response).await
    }
}
