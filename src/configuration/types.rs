use serde::Deserialize;

/// One listening socket worth of configuration. Immutable for the process
/// lifetime.
#[derive(Debug, PartialEq, Clone)]
pub struct ListenerConfig {
    pub port: u16,
    /// Value advertised in the `Server:` response header, used to make the
    /// decoy resemble a specific real server build.
    pub server_header: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            server_header: String::from("Apache/2.4.1"),
        }
    }
}

/// Remote append-only log target.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct RemoteSinkConfig {
    /// Base URL of the blob service, e.g. `https://account.blob.example.net`.
    pub url: String,
    /// Container holding the log blob.
    pub container: String,
    /// Blob name records are appended to.
    pub blob: String,
    /// Pre-signed credential query string (SAS-style), if the target needs one.
    pub credential: Option<String>,
}
