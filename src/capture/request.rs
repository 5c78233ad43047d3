//! Minimal HTTP/1.x request reading.
//!
//! Just enough parsing to capture what a probe sent: the raw request line,
//! the headers in wire order, and an optional `Content-Length`-delimited
//! body. Nothing is routed or validated beyond what reading requires, and
//! every read is bounded by the caller's timeout so a client withholding
//! bytes cannot pin a connection task forever.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error_handling::types::RequestError;
use crate::event_log::types::Headers;

/// Upper bound on the request line plus headers, matching common server
/// defaults. A head that exceeds this is treated as malformed.
const MAX_HEAD_BYTES: u64 = 64 * 1024;

/// Upper bound on header count, against clients streaming headers forever.
const MAX_HEADER_COUNT: usize = 256;

/// Request line and headers, read eagerly off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub request_line: String,
    pub headers: Headers,
}

impl RequestHead {
    /// The declared body length, if a well-formed `Content-Length` header is
    /// present (case-insensitive, first occurrence wins).
    pub fn content_length(&self) -> Result<Option<usize>, RequestError> {
        match self.headers.get("Content-Length") {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| RequestError::MalformedContentLength(value.to_string())),
        }
    }
}

/// Read the request line and all headers, bounded by `limit`.
pub async fn read_head<R>(reader: &mut R, limit: Duration) -> Result<RequestHead, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    match tokio::time::timeout(limit, read_head_inner(reader)).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::ReadTimeout),
    }
}

async fn read_head_inner<R>(reader: &mut R) -> Result<RequestHead, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(MAX_HEAD_BYTES);

    let request_line = read_crlf_line(&mut limited).await?;
    // Tokens per the request-line grammar: method, target, optional version.
    let tokens = request_line.split_whitespace().count();
    if !(2..=3).contains(&tokens) {
        return Err(RequestError::MalformedRequestLine);
    }

    let mut headers = Headers::new();
    loop {
        let line = read_crlf_line(&mut limited).await?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADER_COUNT {
            return Err(RequestError::MalformedRequestLine);
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(RequestError::MalformedRequestLine);
        };
        headers.push(name.trim().to_string(), value.trim().to_string());
    }

    Ok(RequestHead {
        request_line,
        headers,
    })
}

/// Read one line, requiring the `\n` terminator and stripping `\r\n`.
///
/// A line cut short by EOF or by the head size cap is malformed: it means
/// the client never finished the head.
async fn read_crlf_line<R>(reader: &mut R) -> Result<String, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if !line.ends_with('\n') {
        return Err(RequestError::MalformedRequestLine);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Read exactly `expected` body bytes, bounded by `limit`.
///
/// EOF before `expected` bytes is a truncated body, not a short read to be
/// papered over: the client promised bytes it never sent.
pub async fn read_body<R>(
    reader: &mut R,
    expected: usize,
    limit: Duration,
) -> Result<Vec<u8>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    match tokio::time::timeout(limit, read_body_inner(reader, expected)).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::ReadTimeout),
    }
}

async fn read_body_inner<R>(reader: &mut R, expected: usize) -> Result<Vec<u8>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = vec![0u8; expected];
    let mut read = 0;
    while read < expected {
        let n = reader.read(&mut body[read..]).await?;
        if n == 0 {
            return Err(RequestError::TruncatedBody { expected, read });
        }
        read += n;
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    const LIMIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn reads_request_line_and_ordered_headers() {
        let raw = b"GET /index.jsp HTTP/1.1\r\nHost: victim\r\nX-B: 1\r\nX-A: 2\r\nX-B: 3\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let head = read_head(&mut reader, LIMIT).await.unwrap();

        assert_eq!(head.request_line, "GET /index.jsp HTTP/1.1");
        let names: Vec<_> = head.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Host", "X-B", "X-A", "X-B"]);
    }

    #[tokio::test]
    async fn content_length_is_case_insensitive() {
        let raw = b"POST / HTTP/1.1\r\ncontent-length: 11\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let head = read_head(&mut reader, LIMIT).await.unwrap();
        assert_eq!(head.content_length().unwrap(), Some(11));
    }

    #[tokio::test]
    async fn malformed_content_length_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: eleven\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let head = read_head(&mut reader, LIMIT).await.unwrap();
        match head.content_length() {
            Err(RequestError::MalformedContentLength(v)) => assert_eq!(v, "eleven"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_request_line_is_malformed() {
        let raw = b"NOTHTTP\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        match read_head(&mut reader, LIMIT).await {
            Err(RequestError::MalformedRequestLine) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn eof_before_blank_line_is_malformed() {
        let raw = b"GET / HTTP/1.1\r\nHost: victim";
        let mut reader = BufReader::new(&raw[..]);
        match read_head(&mut reader, LIMIT).await {
            Err(RequestError::MalformedRequestLine) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn body_is_read_exactly() {
        let raw = b"hello world and trailing junk";
        let mut reader = BufReader::new(&raw[..]);
        let body = read_body(&mut reader, 11, LIMIT).await.unwrap();
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn short_body_reports_truncation() {
        let raw = b"hi";
        let mut reader = BufReader::new(&raw[..]);
        match read_body(&mut reader, 10, LIMIT).await {
            Err(RequestError::TruncatedBody { expected: 10, read: 2 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn withheld_body_times_out() {
        // A duplex stream with no writer activity never yields body bytes.
        let (client, server) = tokio::io::duplex(64);
        let mut reader = BufReader::new(server);
        let result = read_body(&mut reader, 10, Duration::from_millis(50)).await;
        drop(client);
        match result {
            Err(RequestError::ReadTimeout) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
