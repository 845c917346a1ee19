//! HEAD probes against the HTTP origin.
//!
//! Kernels and boot images live behind plain HTTP URLs, so their sizes
//! (and, for boot images, the existence of the `.md5` sidecar) are
//! discovered with metadata-only requests. The trait exists so selection
//! tests can run without a network.

use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised by HEAD probes.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The request failed.
    #[error("head request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The origin answered with something other than 200 OK.
    #[error("head request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The response carried no usable Content-Length header.
    #[error("no content-length in head response from {url}")]
    MissingLength { url: String },

    /// The probe was cancelled by process shutdown.
    #[error("probe cancelled")]
    Cancelled,
}

/// Metadata-only size lookup for an HTTP URL.
pub trait SizeProber: Send + Sync {
    /// The Content-Length reported by a HEAD request to `url`.
    fn content_length(&self, url: &str) -> Result<u64, ProbeError>;
}

/// Default timeout for probe requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Probe implementation over blocking reqwest.
pub struct HttpProber {
    client: reqwest::blocking::Client,
    cancel: CancellationToken,
}

impl HttpProber {
    pub fn new(cancel: CancellationToken) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self { client, cancel }
    }
}

impl SizeProber for HttpProber {
    fn content_length(&self, url: &str) -> Result<u64, ProbeError> {
        if self.cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        let response = self
            .client
            .head(url)
            .send()
            .map_err(|e| ProbeError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| ProbeError::MissingLength {
                url: url.to_string(),
            })
    }
}
