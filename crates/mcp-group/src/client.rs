use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    call::{CallResult, Invocation},
    error::Error,
    model::{Arguments, ToolDefinition},
    session::{Connector, RmcpConnector, Session},
    tool::{Tool, ToolFilter},
    transport::{TransportKind, TransportParameters},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Keep the tool list of the live connection until it is invalidated or the client
    /// reconnects.
    pub cache_tools: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { cache_tools: true }
    }
}

struct Connection {
    session: Arc<dyn Session>,
    /// Parent of the cancellation token of every call made on this connection.
    shutdown: CancellationToken,
}

struct ClientInner {
    name: String,
    parameters: TransportParameters,
    options: ClientOptions,
    connector: Arc<dyn Connector>,
    connection: RwLock<Option<Connection>>,
    tools: RwLock<Option<Arc<Vec<ToolDefinition>>>>,
}

/// A connection to one server.
///
/// `Client` is a cheap handle, clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.name)
            .field("transport", &self.transport())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(name: impl Into<String>, parameters: impl Into<TransportParameters>) -> Self {
        Self::with_connector(name, parameters, Arc::new(RmcpConnector))
    }

    pub fn with_connector(
        name: impl Into<String>,
        parameters: impl Into<TransportParameters>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::with_options(name, parameters, connector, ClientOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        parameters: impl Into<TransportParameters>,
        connector: Arc<dyn Connector>,
        options: ClientOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                parameters: parameters.into(),
                options,
                connector,
                connection: RwLock::new(None),
                tools: RwLock::new(None),
            }),
        }
    }

    /// The server name this client was registered under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parameters(&self) -> &TransportParameters {
        &self.inner.parameters
    }

    pub fn transport(&self) -> TransportKind {
        self.inner.parameters.kind()
    }

    pub fn options(&self) -> ClientOptions {
        self.inner.options
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.connection.read().await.is_some()
    }

    /// Open the connection. Does nothing if already connected.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut connection = self.inner.connection.write().await;
        if connection.is_some() {
            tracing::debug!(server = %self.name(), transport = %self.transport(), "already connected");
            return Ok(());
        }
        let session = self
            .inner
            .connector
            .connect(self.name(), self.parameters())
            .await
            .map_err(|source| Error::Connection {
                server: self.name().to_owned(),
                transport: self.transport(),
                source,
            })?;
        *connection = Some(Connection {
            session: Arc::from(session),
            shutdown: CancellationToken::new(),
        });
        self.inner.tools.write().await.take();
        tracing::info!(server = %self.name(), transport = %self.transport(), "connected");
        Ok(())
    }

    /// Close the connection and cancel every call still running on it.
    ///
    /// The client is disconnected afterwards even if tearing down the session failed.
    pub async fn close(&self) -> Result<(), Error> {
        let Some(connection) = self.inner.connection.write().await.take() else {
            return Ok(());
        };
        connection.shutdown.cancel();
        let closed = connection.session.close().await;
        self.inner.tools.write().await.take();
        closed.map_err(|source| Error::Close {
            server: self.name().to_owned(),
            transport: self.transport(),
            source,
        })?;
        tracing::info!(server = %self.name(), transport = %self.transport(), "closed");
        Ok(())
    }

    /// Connect, run `f`, then close, also when `f` fails or panics.
    pub async fn scoped<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c Client) -> BoxFuture<'c, Result<T, E>>,
        E: From<Error>,
    {
        self.connect().await?;
        let outcome = AssertUnwindSafe(f(self)).catch_unwind().await;
        let closed = self.close().await;
        match outcome {
            Ok(Ok(value)) => {
                closed?;
                Ok(value)
            }
            Ok(Err(error)) => {
                if let Err(close_error) = closed {
                    tracing::warn!(server = %self.name(), error = %close_error, "failed to close client");
                }
                Err(error)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn live(&self) -> Result<(Arc<dyn Session>, CancellationToken), Error> {
        match self.inner.connection.read().await.as_ref() {
            Some(connection) => Ok((connection.session.clone(), connection.shutdown.clone())),
            None => Err(Error::NotConnected {
                server: self.name().to_owned(),
                transport: self.transport(),
            }),
        }
    }

    async fn definitions(&self) -> Result<Arc<Vec<ToolDefinition>>, Error> {
        let (session, _) = self.live().await?;
        if !self.inner.options.cache_tools {
            return self.discover(session.as_ref()).await;
        }
        if let Some(tools) = self.inner.tools.read().await.clone() {
            tracing::debug!(server = %self.name(), "tool list served from connection cache");
            return Ok(tools);
        }
        let mut cached = self.inner.tools.write().await;
        // a concurrent caller may have listed the tools while we waited
        if let Some(tools) = cached.clone() {
            return Ok(tools);
        }
        let tools = self.discover(session.as_ref()).await?;
        *cached = Some(tools.clone());
        Ok(tools)
    }

    async fn discover(&self, session: &dyn Session) -> Result<Arc<Vec<ToolDefinition>>, Error> {
        tracing::debug!(server = %self.name(), transport = %self.transport(), "listing tools");
        session
            .list_tools()
            .await
            .map(Arc::new)
            .map_err(|source| Error::Discovery {
                server: self.name().to_owned(),
                transport: self.transport(),
                source,
            })
    }

    /// The tools of the server, in the order the server lists them.
    pub async fn get_tools(&self) -> Result<Vec<Tool>, Error> {
        let definitions = self.definitions().await?;
        Ok(definitions
            .iter()
            .cloned()
            .map(|definition| Tool::new(self.clone(), definition))
            .collect())
    }

    pub async fn get_tools_filtered(&self, filter: &ToolFilter) -> Result<Vec<Tool>, Error> {
        let mut tools = self.get_tools().await?;
        tools.retain(|tool| filter.matches(tool.name()));
        Ok(tools)
    }

    /// Drop the cached tool list, the next [`Client::get_tools`] asks the server again.
    pub async fn invalidate_cache(&self) {
        self.inner.tools.write().await.take();
    }

    /// Dispatch a call by tool name.
    ///
    /// Only a missing connection fails here, everything else, including an unknown tool,
    /// is reported by the returned [`CallResult`].
    pub async fn call_tool(
        &self,
        name: &str,
        call_id: Option<&str>,
        arguments: Arguments,
    ) -> Result<CallResult, Error> {
        self.dispatch(Invocation {
            tool: name.to_owned(),
            call_id: call_id.map(str::to_owned),
            arguments,
            definition: None,
        })
        .await
    }

    pub(crate) async fn dispatch(&self, invocation: Invocation) -> Result<CallResult, Error> {
        let (session, shutdown) = self.live().await?;
        tracing::debug!(
            server = %self.name(),
            tool = %invocation.tool,
            call_id = ?invocation.call_id,
            "dispatching call"
        );
        Ok(CallResult::dispatch(
            session,
            invocation,
            shutdown.child_token(),
        ))
    }
}
