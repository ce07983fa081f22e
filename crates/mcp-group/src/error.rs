use std::{borrow::Cow, fmt::Display};

use crate::transport::TransportKind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for client and group operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to server '{server}' over {transport}: {source}")]
    Connection {
        server: String,
        transport: TransportKind,
        #[source]
        source: BoxError,
    },
    #[error("failed to close server '{server}' over {transport}: {source}")]
    Close {
        server: String,
        transport: TransportKind,
        #[source]
        source: BoxError,
    },
    #[error("server '{server}' ({transport}) is not connected")]
    NotConnected {
        server: String,
        transport: TransportKind,
    },
    #[error("failed to list tools of server '{server}' over {transport}: {source}")]
    Discovery {
        server: String,
        transport: TransportKind,
        #[source]
        source: BoxError,
    },
    #[error(
        "server '{requested}' not found in group. available servers: {}",
        NameList(.available)
    )]
    ServerNotFound {
        requested: String,
        available: Vec<String>,
    },
    #[error(
        "tool '{requested}' not found on server '{server}'. available tools: {}",
        NameList(.available)
    )]
    ToolNotFound {
        server: String,
        requested: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("invalid usage: {0}")]
    Usage(Cow<'static, str>),
    #[error("{} server(s) failed: {}", .failures.len(), FailureList(.failures))]
    Aggregate { failures: Vec<(String, Error)> },
}

impl Error {
    /// Unknown server or unknown tool.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ServerNotFound { .. } | Error::ToolNotFound { .. })
    }

    /// Transport-level failure, or an operation attempted without a live connection.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. }
                | Error::Close { .. }
                | Error::NotConnected { .. }
                | Error::Discovery { .. }
        )
    }

    /// Fold per-server failures of a fan-out operation into one error.
    ///
    /// Returns `Ok(())` if there is nothing to report.
    pub(crate) fn aggregate(mut failures: Vec<(String, Error)>) -> Result<(), Error> {
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Err(Error::Aggregate { failures })
    }
}

/// Failure of one dispatched invocation.
///
/// This is only observed through [`CallResult::output`](crate::CallResult::output), never
/// from the call itself, because the call has already been handed to the transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    #[error("tool '{tool}' reported an error: {message}")]
    Tool { tool: String, message: String },
    #[error("server rejected call to tool '{tool}' [{code}]: {message}")]
    Rejected {
        tool: String,
        code: i32,
        message: String,
    },
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("transport failed during call to tool '{tool}': {message}")]
    Transport { tool: String, message: String },
    #[error("call to tool '{tool}' was cancelled")]
    Cancelled { tool: String },
}

impl InvocationError {
    pub fn tool(&self) -> &str {
        match self {
            InvocationError::Tool { tool, .. }
            | InvocationError::Rejected { tool, .. }
            | InvocationError::InvalidArguments { tool, .. }
            | InvocationError::Transport { tool, .. }
            | InvocationError::Cancelled { tool } => tool,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InvocationError::Cancelled { .. })
    }
}

struct NameList<'a>(&'a [String]);

impl Display for NameList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (idx, name) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}'")?;
        }
        write!(f, "]")
    }
}

struct FailureList<'a>(&'a [(String, Error)]);

impl Display for FailureList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, (server, error)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{server}: {error}")?;
        }
        Ok(())
    }
}
