//! InfluxDB 1.x backend.

use super::{UploadError, Uploader};
use crate::config::LocalConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Writes points to a self-hosted InfluxDB 1.x over its HTTP `/write` endpoint.
pub struct LocalInflux {
    client: Client,
    write_url: String,
    host: String,
    port: u16,
    db: String,
    user: String,
    pass: String,
}

impl LocalInflux {
    /// Validates credentials and builds the HTTP client.
    pub fn new(config: &LocalConfig) -> Result<Self, UploadError> {
        for (name, value) in [
            ("user", &config.user),
            ("pass", &config.pass),
            ("db", &config.db),
            ("host", &config.host),
        ] {
            if value.is_empty() {
                return Err(UploadError::MissingCredential(name));
            }
        }
        if config.port == 0 {
            return Err(UploadError::MissingCredential("port"));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()?;
        let write_url = format!("http://{}:{}/write", config.host, config.port);
        info!("Local InfluxDB backend: {} (db {})", write_url, config.db);

        Ok(Self {
            client,
            write_url,
            host: config.host.clone(),
            port: config.port,
            db: config.db.clone(),
            user: config.user.clone(),
            pass: config.pass.clone(),
        })
    }

    /// Host and port of the database.
    pub fn endpoint(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

impl Uploader for LocalInflux {
    async fn write(&self, body: String) -> Result<(), UploadError> {
        debug!("Writing to {}: {}", self.write_url, body);
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("db", self.db.as_str()),
                ("u", self.user.as_str()),
                ("p", self.pass.as_str()),
                ("precision", "ns"),
            ])
            .body(body)
            .send()
            .await?;
        UploadError::check(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LocalConfig {
        LocalConfig {
            user: "grafana".to_string(),
            pass: "secret".to_string(),
            db: "solar".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8086,
        }
    }

    #[test]
    fn test_missing_credentials() {
        let mut cfg = config();
        cfg.pass.clear();
        assert!(matches!(
            LocalInflux::new(&cfg),
            Err(UploadError::MissingCredential("pass"))
        ));

        let mut cfg = config();
        cfg.port = 0;
        assert!(matches!(
            LocalInflux::new(&cfg),
            Err(UploadError::MissingCredential("port"))
        ));
    }

    #[test]
    fn test_endpoint() {
        let backend = LocalInflux::new(&config()).unwrap();
        assert_eq!(backend.endpoint(), ("127.0.0.1".to_string(), 8086));
        assert_eq!(backend.write_url, "http://127.0.0.1:8086/write");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let mut cfg = config();
        // Port 9 (discard) is closed on test hosts
        cfg.port = 9;
        let backend = LocalInflux::new(&cfg).unwrap();
        assert!(backend.write("m v=1.0 0".to_string()).await.is_err());
    }
}
