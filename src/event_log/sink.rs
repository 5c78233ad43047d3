//! Durable, append-only event log shared by every connection handler.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, info, warn};
use uuid::Uuid;

use super::remote::RemoteTarget;
use super::types::{Event, Headers};
use crate::error_handling::types::SinkError;

/// Process-wide event log target.
///
/// Every event is serialized once to a single JSON line and appended to the
/// local store before [`log`](Self::log) returns; that file is the
/// durability floor. If a remote mirror is configured the same bytes are
/// then appended there, and a remote failure is itself recorded locally as
/// an `exception` event and abandoned for that record only.
///
/// Concurrent writers serialize through the internal mutex: each record is
/// written and flushed whole, so records never interleave. The guarded
/// section never awaits.
pub struct EventSink {
    local: Mutex<File>,
    remote: RemoteTarget,
    path: PathBuf,
    /// Exception raised before the first event may be written (remote
    /// startup failure). Held back so the store still opens with `start`.
    deferred: Mutex<Option<Event>>,
}

impl EventSink {
    /// Open (or create) the local store in append mode and, when a remote
    /// target is configured, create the remote blob if it is absent.
    ///
    /// A remote target that cannot be reached at startup degrades the sink
    /// to local-only; the failure is recorded as an `exception` event
    /// emitted right after the next logged event, keeping the `start`
    /// record first in the store.
    pub async fn open<P: AsRef<Path>>(path: P, remote: RemoteTarget) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(SinkError::OpenFailed)?;
        info!("Event log opened at {}", path.display());

        let sink = Self {
            local: Mutex::new(file),
            remote,
            path,
            deferred: Mutex::new(None),
        };

        if let Err(e) = sink.remote.ensure_exists().await {
            warn!("Remote log target unavailable, continuing local-only: {}", e);
            *sink.deferred.lock().unwrap() = Some(Event::exception(&e));
            return Ok(Self {
                remote: RemoteTarget::LocalOnly,
                ..sink
            });
        }

        Ok(sink)
    }

    /// Record one event. Never surfaces a failure to the caller.
    ///
    /// The local append happens first and completes before this returns;
    /// a remote mirror failure is converted into a local `exception` event
    /// and dropped (no retry).
    pub async fn log(&self, event: &Event) {
        let line = match self.write_local(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to record {} event: {}", event.kind(), e);
                return;
            }
        };
        self.flush_deferred();

        if let Err(e) = self.remote.append(&line).await {
            warn!("Remote append failed, event kept local-only: {}", e);
            if let Err(write_err) = self.write_local(&Event::exception(&e)) {
                error!("Failed to record exception event: {}", write_err);
            }
        }
    }

    /// Serialize and append one record to the local store, returning the
    /// record bytes for remote mirroring.
    fn write_local(&self, event: &Event) -> Result<Vec<u8>, SinkError> {
        let mut line =
            serde_json::to_vec(event).map_err(|e| SinkError::SerializeFailed(e.to_string()))?;
        line.push(b'\n');

        let mut file = self.local.lock().unwrap();
        file.write_all(&line)
            .and_then(|_| file.flush())
            .map_err(SinkError::WriteFailed)?;
        Ok(line)
    }

    /// Write the held-back startup exception, if one is pending.
    fn flush_deferred(&self) {
        let deferred = self.deferred.lock().unwrap().take();
        if let Some(event) = deferred {
            if let Err(e) = self.write_local(&event) {
                error!("Failed to record deferred exception event: {}", e);
            }
        }
    }

    pub async fn log_start(&self) {
        self.log(&Event::start()).await;
    }

    pub async fn log_request(
        &self,
        correlation_id: Uuid,
        server_port: u16,
        client_addr: SocketAddr,
        request_line: String,
        headers: Headers,
        body: Option<String>,
    ) {
        self.log(&Event::request(
            correlation_id,
            server_port,
            client_addr,
            request_line,
            headers,
            body,
        ))
        .await;
    }

    pub async fn log_exploit(
        &self,
        correlation_id: Uuid,
        location: String,
        payload: String,
        client_addr: SocketAddr,
    ) {
        self.log(&Event::exploit(correlation_id, location, payload, client_addr))
            .await;
    }

    pub async fn log_exception(&self, description: impl std::fmt::Display) {
        self.log(&Event::exception(description)).await;
    }

    /// Emit the final `end` event. The local handle is released on drop.
    pub async fn close(&self) {
        // Anything still held back must land before `end` closes the store.
        self.flush_deferred();
        self.log(&Event::end()).await;
        info!("Event log closed at {}", self.path.display());
    }
}
