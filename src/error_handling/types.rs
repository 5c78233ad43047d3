use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    PortsEmpty,
    RemoteIncomplete(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::PortsEmpty => write!(f, "No listening port configured"),
            ConfigError::RemoteIncomplete(e) => {
                write!(f, "Incomplete remote sink configuration: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum SinkError {
    OpenFailed(std::io::Error),
    WriteFailed(std::io::Error),
    SerializeFailed(String),
    RemoteUnreachable(String),
    RemoteRejected(u16),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::OpenFailed(e) => write!(f, "Failed to open event log: {}", e),
            SinkError::WriteFailed(e) => write!(f, "Failed to write event record: {}", e),
            SinkError::SerializeFailed(e) => write!(f, "Failed to serialize event: {}", e),
            SinkError::RemoteUnreachable(e) => write!(f, "Remote sink unreachable: {}", e),
            SinkError::RemoteRejected(status) => {
                write!(f, "Remote sink rejected append with status {}", status)
            }
        }
    }
}

impl std::error::Error for SinkError {}

#[derive(Debug)]
pub enum DetectionError {
    PatternCompile(regex::Error),
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::PatternCompile(e) => {
                write!(f, "Failed to compile signature pattern: {}", e)
            }
        }
    }
}

impl std::error::Error for DetectionError {}

impl From<regex::Error> for DetectionError {
    fn from(err: regex::Error) -> Self {
        DetectionError::PatternCompile(err)
    }
}

#[derive(Debug)]
pub enum RequestError {
    IoError(std::io::Error),
    ReadTimeout,
    MalformedRequestLine,
    MalformedContentLength(String),
    TruncatedBody { expected: usize, read: usize },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::IoError(e) => write!(f, "Request IO error: {}", e),
            RequestError::ReadTimeout => write!(f, "Request read timed out"),
            RequestError::MalformedRequestLine => write!(f, "Malformed request line"),
            RequestError::MalformedContentLength(v) => {
                write!(f, "Malformed Content-Length value: {}", v)
            }
            RequestError::TruncatedBody { expected, read } => {
                write!(
                    f,
                    "Body truncated: expected {} byte(s), read {}",
                    expected, read
                )
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::IoError(err)
    }
}

#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
    NoListeners,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::NoListeners => write!(f, "No listener could be started"),
        }
    }
}

impl std::error::Error for NetworkError {}
