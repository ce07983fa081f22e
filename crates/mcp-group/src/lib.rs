#![cfg_attr(docsrs, feature(doc_cfg))]
//! Aggregate several MCP servers behind one async interface.
//!
//! A [`Group`] owns one [`Client`] per named server. Servers are reached over a child
//! process (stdio) or over HTTP (streamable HTTP or SSE), see [`transport`]. The group
//! discovers and caches each server's tools and dispatches calls to them by
//! `(server, tool)`.
//!
//! Every call returns a [`CallResult`] right away. Await its [`output`](CallResult::output),
//! or drain its [`events`](CallResult::events) to also observe progress reported by the
//! server.
//!
//! ## Feature flags
//!
//! | feature                            | transport                |
//! |:-:                                 |:-:                       |
//! | `transport-child-process`          | local child process      |
//! | `transport-streamable-http-client` | streamable HTTP          |
//! | `transport-sse-client`             | server-sent events       |
//!
//! All of them are enabled by default.
mod error;
pub use error::{BoxError, Error, InvocationError};

pub mod call;
pub use call::{CallResult, Event, EventStream, OutputEvent, ProgressEvent};

mod client;
pub use client::{Client, ClientOptions};

pub mod config;
pub use config::ServersConfig;

pub mod group;
pub use group::{Group, ToolCatalog};

pub mod model;
pub use model::{Arguments, Parameter, ToolDefinition};

pub mod session;
pub use session::{Connector, RmcpConnector, Session};

mod tool;
pub use tool::{Tool, ToolFilter};

pub mod transport;
pub use transport::{
    LocalParameters, RemoteParameters, RemoteProtocol, TransportKind, TransportParameters,
};
