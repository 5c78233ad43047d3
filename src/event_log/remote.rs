//! Optional remote mirror for the event log.
//!
//! The remote side of the sink is modeled as a capability with two variants
//! selected once at startup: [`RemoteTarget::LocalOnly`] (no mirroring) and
//! [`RemoteTarget::Http`] (append-blob style REST target). Callers never
//! branch on which variant is active.

use log::{debug, info};
use reqwest::Client;
use reqwest::StatusCode;

use crate::configuration::types::RemoteSinkConfig;
use crate::error_handling::types::SinkError;

/// Append-only blob target reached over HTTP.
///
/// Speaks the append-blob REST surface: the blob is created once with
/// `x-ms-blob-type: AppendBlob` (a 409 means it already exists) and each
/// record is appended with `?comp=appendblock`. Credentials travel as a
/// pre-signed query string so no vendor SDK is involved.
pub struct HttpAppendTarget {
    client: Client,
    blob_url: String,
    credential: Option<String>,
}

impl HttpAppendTarget {
    pub fn new(config: &RemoteSinkConfig) -> Self {
        let blob_url = format!(
            "{}/{}/{}",
            config.url.trim_end_matches('/'),
            config.container,
            config.blob
        );
        Self {
            client: Client::new(),
            blob_url,
            credential: config.credential.clone(),
        }
    }

    fn url_with_query(&self, query: &str) -> String {
        match (&self.credential, query.is_empty()) {
            (Some(cred), true) => format!("{}?{}", self.blob_url, cred),
            (Some(cred), false) => format!("{}?{}&{}", self.blob_url, query, cred),
            (None, true) => self.blob_url.clone(),
            (None, false) => format!("{}?{}", self.blob_url, query),
        }
    }

    /// Create the append blob if it does not exist yet.
    pub async fn ensure_exists(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .put(self.url_with_query(""))
            .header("x-ms-blob-type", "AppendBlob")
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| SinkError::RemoteUnreachable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                info!("Created remote log target {}", self.blob_url);
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("Remote log target {} already exists", self.blob_url);
                Ok(())
            }
            status => Err(SinkError::RemoteRejected(status.as_u16())),
        }
    }

    /// Append one record's bytes as a new block.
    pub async fn append(&self, record: &[u8]) -> Result<(), SinkError> {
        let response = self
            .client
            .put(self.url_with_query("comp=appendblock"))
            .body(record.to_vec())
            .send()
            .await
            .map_err(|e| SinkError::RemoteUnreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::RemoteRejected(status.as_u16()))
        }
    }
}

/// Remote side of the event sink, fixed at startup.
pub enum RemoteTarget {
    /// Events stay on the local store only.
    LocalOnly,
    /// Events are mirrored to an HTTP append target.
    Http(HttpAppendTarget),
}

impl RemoteTarget {
    pub fn from_config(config: Option<&RemoteSinkConfig>) -> Self {
        match config {
            Some(cfg) => RemoteTarget::Http(HttpAppendTarget::new(cfg)),
            None => RemoteTarget::LocalOnly,
        }
    }

    /// Create the remote target if configured and absent. No-op when local-only.
    pub async fn ensure_exists(&self) -> Result<(), SinkError> {
        match self {
            RemoteTarget::LocalOnly => Ok(()),
            RemoteTarget::Http(target) => target.ensure_exists().await,
        }
    }

    /// Mirror one record. No-op when local-only.
    pub async fn append(&self, record: &[u8]) -> Result<(), SinkError> {
        match self {
            RemoteTarget::LocalOnly => Ok(()),
            RemoteTarget::Http(target) => target.append(record).await,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(self, RemoteTarget::Http(_))
    }
}
