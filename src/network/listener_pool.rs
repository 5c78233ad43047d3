//! # Listener Pool Module
//!
//! Owns one independent listening socket per configured port. Each socket is
//! driven by its own acceptor task, and every accepted connection is handed
//! to a freshly spawned [`RequestRecorder`] invocation, so one slow or
//! malicious client never blocks acceptance on any port.
//!
//! ```text
//! ┌─────────────┐    ┌───────────────┐    ┌──────────────────┐
//! │ Connections │───▶│ ListenerPool  │───▶│ RequestRecorder  │
//! │ (per port)  │    │ one acceptor  │    │ (task per conn)  │
//! └─────────────┘    │ task per port │    └──────────────────┘
//!                    └───────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::capture::recorder::RequestRecorder;
use crate::configuration::types::ListenerConfig;
use crate::detection::detector::ExploitDetector;
use crate::error_handling::types::NetworkError;
use crate::event_log::sink::EventSink;

/// Multi-port acceptor supervisor.
///
/// A bind failure on one port is fatal to that listener only: it is
/// recorded as an `exception` event and the remaining listeners proceed.
/// Each acceptor tracks the connection tasks it spawned; on shutdown it
/// stops accepting and waits for its in-flight handlers, so
/// [`stop`](Self::stop) returns only once no handler can emit another
/// event.
pub struct ListenerPool {
    sink: Arc<EventSink>,
    detector: Arc<ExploitDetector>,
    read_timeout: Duration,
    shutdown: watch::Sender<bool>,
    acceptors: JoinSet<()>,
    bound: Vec<SocketAddr>,
}

impl ListenerPool {
    pub fn new(sink: Arc<EventSink>, detector: Arc<ExploitDetector>, read_timeout: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sink,
            detector,
            read_timeout,
            shutdown,
            acceptors: JoinSet::new(),
            bound: Vec::new(),
        }
    }

    /// Bind every configured port and start its acceptor task.
    ///
    /// Returns an error only when not a single listener could be bound.
    pub async fn start(&mut self, configs: &[ListenerConfig]) -> Result<(), NetworkError> {
        for config in configs {
            let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("[!] Failed to bind port {}: {}", config.port, e);
                    self.sink
                        .log_exception(format!("Failed to bind port {}: {}", config.port, e))
                        .await;
                    continue;
                }
            };
            let local_addr = listener.local_addr().map_err(NetworkError::BindError)?;
            info!("Started decoy server on port {}", local_addr.port());
            self.bound.push(local_addr);

            let recorder = RequestRecorder::new(
                Arc::clone(&self.sink),
                Arc::clone(&self.detector),
                config.clone(),
                self.read_timeout,
            );
            let sink = Arc::clone(&self.sink);
            let mut shutdown_rx = self.shutdown.subscribe();
            let port = config.port;

            self.acceptors.spawn(async move {
                let mut connections = JoinSet::new();
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        accepted = listener.accept() => match accepted {
                            Ok((stream, client_addr)) => {
                                let recorder = recorder.clone();
                                connections.spawn(async move {
                                    recorder.handle(stream, client_addr).await;
                                });
                            }
                            Err(e) => {
                                warn!("Accept failed on port {}: {}", port, e);
                                sink.log_exception(format!("Accept failed on port {}: {}", port, e))
                                    .await;
                            }
                        },
                        // Reap finished handlers so the set stays small.
                        Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    }
                }
                // Let in-flight handlers finish before this listener reports
                // itself stopped; their read timeouts bound the wait.
                while connections.join_next().await.is_some() {}
                info!("Stopped decoy server on port {}", port);
            });
        }

        if self.bound.is_empty() {
            return Err(NetworkError::NoListeners);
        }
        Ok(())
    }

    /// Addresses actually bound, in configuration order (minus failed binds).
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.bound
    }

    /// Signal every acceptor to stop and wait for them, and their in-flight
    /// connection handlers, to drain.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        while self.acceptors.join_next().await.is_some() {}
    }
}
