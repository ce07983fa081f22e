//! The seam between [`Client`](crate::Client) and the protocol library.
//!
//! A [`Connector`] opens one [`Session`] per connection. The crate ships [`RmcpConnector`]; tests
//! and embedders may provide their own.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    call::{Event, ProgressEvent},
    error::{BoxError, InvocationError},
    model::{Arguments, CallToolResult, ToolDefinition},
    transport::TransportParameters,
};

pub mod rmcp;
pub use self::rmcp::RmcpConnector;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connection and complete the protocol handshake.
    async fn connect(
        &self,
        server: &str,
        parameters: &TransportParameters,
    ) -> Result<Box<dyn Session>, BoxError>;
}

/// One live connection.
///
/// Calls may run concurrently with each other and with [`Session::list_tools`].
#[async_trait]
pub trait Session: Send + Sync + 'static {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BoxError>;

    /// Send one `tools/call` request and wait for its response.
    ///
    /// Progress notifications for the call are forwarded to `progress`. The session must stop
    /// waiting and return [`InvocationError::Cancelled`] once `cancel` fires.
    async fn call_tool(
        &self,
        request: CallRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> CallOutcome;

    /// Release the underlying transport. Called at most once per session.
    async fn close(&self) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub tool: String,
    pub arguments: Arguments,
}

pub type CallOutcome = Result<CallToolResult, InvocationError>;

/// Where a session reports progress of one call.
///
/// Progress is only observable for calls that carry a call id, [`ProgressSink::is_enabled`]
/// tells a session whether it is worth subscribing at all.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    call_id: Option<String>,
    tx: Option<mpsc::Sender<Event>>,
    /// Set once the event stream of the call was handed out.
    observed: Arc<AtomicBool>,
}

impl ProgressSink {
    pub(crate) fn new(
        call_id: Option<String>,
        tx: mpsc::Sender<Event>,
        observed: Arc<AtomicBool>,
    ) -> Self {
        let tx = call_id.as_ref().filter(|id| !id.is_empty()).map(|_| tx);
        Self {
            call_id,
            tx,
            observed,
        }
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self {
            call_id: None,
            tx: None,
            observed: Arc::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn report(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let (Some(tx), Some(call_id)) = (&self.tx, &self.call_id) else {
            return;
        };
        let event = Event::Progress(ProgressEvent {
            call_id: call_id.clone(),
            progress,
            total,
            message,
        });
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) if self.observed.load(Ordering::Relaxed) => {
                tracing::warn!(call_id = %call_id, progress, "progress buffer full, dropping event");
            }
            // nobody is reading the events (yet), the output alone is awaited
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(call_id = %call_id, progress, "progress buffer full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!(call_id = %call_id, "progress receiver gone");
            }
        }
    }
}
