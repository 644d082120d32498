//! Time-series uploads.
//!
//! Backends only implement [`Uploader::write`]; the point-building methods
//! are shared and turn every backend failure into a Sending fault, so no raw
//! HTTP error reaches the loop.

mod cloud;
pub mod line_protocol;
mod local;

pub use cloud::CloudInflux;
pub use local::LocalInflux;

use crate::config::Config;
use crate::fault::Fault;
use crate::sensors::TaggedGroup;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Tag key carrying the machine id on scalar points.
pub const MACHINE_TAG: &str = "Machine";

/// A named point with exactly two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarPair {
    pub name: &'static str,
    pub fields: [&'static str; 2],
}

/// CPU percent and RAM bytes.
pub const CPU_RAM: ScalarPair = ScalarPair {
    name: "local_performance",
    fields: ["cpu", "ram"],
};

/// Network MiB in and out over the last interval.
pub const NET_RATE: ScalarPair = ScalarPair {
    name: "network",
    fields: ["net_in", "net_out"],
};

/// Errors raised by backends.
#[derive(Error, Debug)]
pub enum UploadError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the write.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A required credential was empty.
    #[error("missing {0} in backend configuration")]
    MissingCredential(&'static str),

    /// The backend URL is not an http(s) URL.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl UploadError {
    /// Converts a non-success response into an error.
    pub(crate) async fn check(response: reqwest::Response) -> Result<(), UploadError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

/// Nanoseconds since the epoch, the precision every backend writes with.
fn timestamp_ns(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_nanos_opt().unwrap_or_default()
}

/// A time-series sink.
pub trait Uploader {
    /// Writes line-protocol encoded points.
    async fn write(&self, body: String) -> Result<(), UploadError>;

    /// Sends one point with two fields tagged with the machine id.
    async fn send_scalar_pair(
        &self,
        pair: &ScalarPair,
        machine_id: &str,
        value_a: f64,
        value_b: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Fault> {
        let line = line_protocol::point(
            pair.name,
            &[(MACHINE_TAG, machine_id)],
            &[(pair.fields[0], value_a), (pair.fields[1], value_b)],
            timestamp_ns(timestamp),
        )
        .ok_or_else(|| Fault::sending(format!("{} point has no finite values", pair.name)))?;

        self.write(line)
            .await
            .map_err(|e| Fault::sending(format!("{} point was not sent: {}", pair.name, e)))
    }

    /// Sends one point per tag, each carrying that tag's fields.
    async fn send_tagged_group(
        &self,
        point_name: &str,
        tag_key: &str,
        group: &TaggedGroup,
        timestamp: DateTime<Utc>,
    ) -> Result<(), Fault> {
        let ts = timestamp_ns(timestamp);
        let lines: Vec<String> = group
            .iter()
            .filter_map(|(tag, fields)| {
                let fields: Vec<(&str, f64)> =
                    fields.iter().map(|(k, v)| (k.as_str(), *v)).collect();
                line_protocol::point(point_name, &[(tag_key, tag.as_str())], &fields, ts)
            })
            .collect();
        if lines.is_empty() {
            return Err(Fault::sending(format!(
                "{} group has no finite values",
                point_name
            )));
        }

        self.write(lines.join("\n")).await.map_err(|e| {
            Fault::sending(format!(
                "{} group ({} {}) was not sent: {}",
                point_name,
                lines.len(),
                tag_key,
                e
            ))
        })
    }
}

/// Backend selected once at startup.
pub enum Backend {
    Local(LocalInflux),
    Cloud(CloudInflux),
}

impl Backend {
    /// Builds the backend chosen by `[method] cloud`.
    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        if config.method.cloud {
            Ok(Backend::Cloud(CloudInflux::new(&config.cloud)?))
        } else {
            Ok(Backend::Local(LocalInflux::new(&config.local)?))
        }
    }

    /// Host and port the backend talks to.
    pub fn endpoint(&self) -> Option<(String, u16)> {
        match self {
            Backend::Local(b) => Some(b.endpoint()),
            Backend::Cloud(b) => b.endpoint(),
        }
    }
}

impl Uploader for Backend {
    async fn write(&self, body: String) -> Result<(), UploadError> {
        match self {
            Backend::Local(b) => b.write(body).await,
            Backend::Cloud(b) => b.write(body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Severity;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Backend keeping every body it is asked to write.
    #[derive(Default)]
    struct Capture {
        bodies: Mutex<Vec<String>>,
        reject: bool,
    }

    impl Uploader for Capture {
        async fn write(&self, body: String) -> Result<(), UploadError> {
            if self.reject {
                return Err(UploadError::Status {
                    status: 401,
                    body: "unauthorized".to_string(),
                });
            }
            self.bodies.lock().unwrap().push(body);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scalar_pair_line() {
        let capture = Capture::default();
        let timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        capture
            .send_scalar_pair(&CPU_RAM, "solar-pi", 12.5, 1024.0, timestamp)
            .await
            .unwrap();

        let bodies = capture.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(
            bodies[0],
            "local_performance,Machine=solar-pi cpu=12.5,ram=1024.0 1717243200000000000"
        );
    }

    #[tokio::test]
    async fn test_tagged_group_one_line_per_tag() {
        let capture = Capture::default();
        let group: TaggedGroup = BTreeMap::from([
            (
                "blue_house".to_string(),
                BTreeMap::from([("voltage".to_string(), 1.0)]),
            ),
            (
                "red_house".to_string(),
                BTreeMap::from([("voltage".to_string(), 2.0)]),
            ),
        ]);

        let timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 3).unwrap();
        capture
            .send_tagged_group("Electricity Gen", "House", &group, timestamp)
            .await
            .unwrap();

        let bodies = capture.bodies.lock().unwrap();
        let lines: Vec<&str> = bodies[0].lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r"Electricity\ Gen,House=blue_house voltage=1.0 1717243203000000000"
        );
        assert_eq!(
            lines[1],
            r"Electricity\ Gen,House=red_house voltage=2.0 1717243203000000000"
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_sending_fault() {
        let capture = Capture {
            reject: true,
            ..Default::default()
        };

        let fault = capture
            .send_scalar_pair(&NET_RATE, "solar-pi", 0.5, 0.1, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(fault.severity, Severity::Sending);
        assert!(fault.message.contains("401"));
    }

    #[test]
    fn test_backend_from_config() {
        let mut config = Config::default();
        config.method.cloud = true;
        config.cloud.token = "t".to_string();
        assert!(matches!(
            Backend::from_config(&config),
            Err(UploadError::MissingCredential("bucket"))
        ));

        config.method.cloud = false;
        config.local.user = "u".to_string();
        config.local.pass = "p".to_string();
        assert!(matches!(
            Backend::from_config(&config),
            Ok(Backend::Local(_))
        ));
    }
}
