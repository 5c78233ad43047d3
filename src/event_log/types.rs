//! Common data types for the event log subsystem.

use std::fmt;
use std::net::SocketAddr;

use chrono::{SecondsFormat, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// UTC timestamp with microsecond precision, as carried by every event record.
pub fn event_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Request headers in wire order.
///
/// HTTP allows a header name to appear more than once, and probe traffic
/// regularly exercises that, so this is an ordered multimap rather than a
/// plain map. It still serializes as a JSON object (duplicate keys and all)
/// to keep the record shape consumers expect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    entries.push((name, value));
                }
                Ok(Headers(entries))
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// One structured record in the event log.
///
/// Serialized as a single JSON object with a `type` discriminator and a
/// `timestamp`, plus kind-specific fields. Immutable once constructed;
/// use the constructors below so the timestamp is stamped at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Start {
        timestamp: String,
    },
    Request {
        timestamp: String,
        correlation_id: Uuid,
        server_port: u16,
        client: String,
        port: u16,
        request: String,
        headers: Headers,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Exploit {
        timestamp: String,
        correlation_id: Uuid,
        location: String,
        payload: String,
        client: String,
    },
    Exception {
        timestamp: String,
        exception: String,
    },
    End {
        timestamp: String,
    },
}

impl Event {
    pub fn start() -> Self {
        Event::Start {
            timestamp: event_timestamp(),
        }
    }

    pub fn request(
        correlation_id: Uuid,
        server_port: u16,
        client_addr: SocketAddr,
        request_line: String,
        headers: Headers,
        body: Option<String>,
    ) -> Self {
        Event::Request {
            timestamp: event_timestamp(),
            correlation_id,
            server_port,
            client: client_addr.ip().to_string(),
            port: client_addr.port(),
            request: request_line,
            headers,
            body,
        }
    }

    pub fn exploit(
        correlation_id: Uuid,
        location: String,
        payload: String,
        client_addr: SocketAddr,
    ) -> Self {
        Event::Exploit {
            timestamp: event_timestamp(),
            correlation_id,
            location,
            payload,
            client: client_addr.ip().to_string(),
        }
    }

    pub fn exception(description: impl fmt::Display) -> Self {
        Event::Exception {
            timestamp: event_timestamp(),
            exception: description.to_string(),
        }
    }

    pub fn end() -> Self {
        Event::End {
            timestamp: event_timestamp(),
        }
    }

    /// The `type` discriminator this event serializes under.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::Request { .. } => "request",
            Event::Exploit { .. } => "exploit",
            Event::Exception { .. } => "exception",
            Event::End { .. } => "end",
        }
    }
}
