//! # Transport parameters
//! Describe how to reach one server. A group holds one [`TransportParameters`] per server name.
//!
//! | parameters                     | transport kind                     | protocol library transport            |
//! |:-:                             |:-:                                 |:-:                                    |
//! | [`LocalParameters`]            | [`TransportKind::Stdio`]           | `rmcp::transport::TokioChildProcess`  |
//! | [`RemoteParameters`] (default) | [`TransportKind::StreamableHttp`]  | `StreamableHttpClientTransport`       |
//! | [`RemoteParameters::sse`]      | [`TransportKind::Sse`]             | `SseClientTransport`                  |
//!
//! Parameters are plain data, they can be deserialized from a server map:
//!
//! ```rust
//! # use mcp_group::transport::{TransportParameters, TransportKind};
//! let local: TransportParameters =
//!     serde_json::from_str(r#"{"command": "python", "args": ["server.py"]}"#).unwrap();
//! assert_eq!(local.kind(), TransportKind::Stdio);
//!
//! let remote: TransportParameters =
//!     serde_json::from_str(r#"{"url": "http://localhost:8000", "timeout": 10}"#).unwrap();
//! assert_eq!(remote.kind(), TransportKind::StreamableHttp);
//! ```
use std::{collections::BTreeMap, fmt::Display, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
    Sse,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::StreamableHttp => write!(f, "streamable-http"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// How to reach one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportParameters {
    Local(LocalParameters),
    Remote(RemoteParameters),
}

impl TransportParameters {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportParameters::Local(_) => TransportKind::Stdio,
            TransportParameters::Remote(remote) => remote.kind(),
        }
    }
}

impl From<LocalParameters> for TransportParameters {
    fn from(value: LocalParameters) -> Self {
        TransportParameters::Local(value)
    }
}

impl From<RemoteParameters> for TransportParameters {
    fn from(value: RemoteParameters) -> Self {
        TransportParameters::Remote(value)
    }
}

/// Launch a server as a child process and talk to it over its stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalParameters {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Working directory of the child process, inherited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl LocalParameters {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// The protocol spoken by a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteProtocol {
    #[default]
    StreamableHttp,
    Sse,
}

impl RemoteProtocol {
    const fn path_suffix(self) -> &'static str {
        match self {
            RemoteProtocol::StreamableHttp => "/mcp",
            RemoteProtocol::Sse => "/sse",
        }
    }

    const fn default_timeout(self) -> Duration {
        match self {
            RemoteProtocol::StreamableHttp => Duration::from_secs(30),
            RemoteProtocol::Sse => Duration::from_secs(5),
        }
    }
}

/// Connect to a server over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteParameters {
    /// Base url of the server, see [`RemoteParameters::endpoint`].
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// HTTP timeout, in seconds when (de)serialized.
    #[serde(
        default,
        with = "duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub protocol: RemoteProtocol,
}

impl RemoteParameters {
    pub fn streamable_http(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout: None,
            protocol: RemoteProtocol::StreamableHttp,
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            protocol: RemoteProtocol::Sse,
            ..Self::streamable_http(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn kind(&self) -> TransportKind {
        match self.protocol {
            RemoteProtocol::StreamableHttp => TransportKind::StreamableHttp,
            RemoteProtocol::Sse => TransportKind::Sse,
        }
    }

    /// The url actually connected to.
    ///
    /// Streamable HTTP servers are mounted at `/mcp` and SSE servers at `/sse`, the suffix is
    /// appended when the configured url does not already end with it.
    pub fn endpoint(&self) -> String {
        let suffix = self.protocol.path_suffix();
        if self.url.ends_with(suffix) {
            self.url.clone()
        } else {
            format!("{}{suffix}", self.url.trim_end_matches('/'))
        }
    }

    /// The configured timeout, or 30s for streamable HTTP and 5s for SSE.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.protocol.default_timeout())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_f64(duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        secs.map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
