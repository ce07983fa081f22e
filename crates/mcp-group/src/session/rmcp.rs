//! [`Connector`] backed by the `rmcp` client.
use std::sync::Arc;

use ::rmcp::{
    ClientHandler, Peer, RoleClient, ServiceError, ServiceExt,
    handler::client::progress::{ProgressDispatcher, ProgressSubscriber},
    model::{
        CallToolRequestParam, CancelledNotificationParam, ClientCapabilities, ClientInfo,
        ClientRequest, Implementation, ProgressNotificationParam, Request, ServerResult,
    },
    service::{NotificationContext, PeerRequestOptions, RunningService},
    transport::IntoTransport,
};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{CallOutcome, CallRequest, Connector, ProgressSink, Session};
use crate::{
    error::{BoxError, InvocationError},
    model::ToolDefinition,
    transport::{LocalParameters, RemoteParameters, RemoteProtocol, TransportParameters},
};

/// Client handler installed on every connection, relays progress notifications to the call
/// that owns the progress token.
#[derive(Clone, Default)]
pub struct ProgressRelay {
    progress: Arc<ProgressDispatcher>,
}

impl ClientHandler for ProgressRelay {
    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        tracing::trace!(token = ?params.progress_token, progress = params.progress, "progress notification");
        self.progress.handle_notification(params).await;
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RmcpConnector {
    async fn connect(
        &self,
        server: &str,
        parameters: &TransportParameters,
    ) -> Result<Box<dyn Session>, BoxError> {
        let session = match parameters {
            TransportParameters::Local(local) => serve_local(local).await?,
            TransportParameters::Remote(remote) => match remote.protocol {
                RemoteProtocol::StreamableHttp => serve_streamable_http(remote).await?,
                RemoteProtocol::Sse => serve_sse(remote).await?,
            },
        };
        if let Some(info) = session.peer.peer_info() {
            tracing::debug!(
                server,
                remote = %info.server_info.name,
                version = %info.server_info.version,
                "handshake complete"
            );
        }
        Ok(Box::new(session))
    }
}

type ClientService = RunningService<RoleClient, ProgressRelay>;

#[cfg(feature = "transport-child-process")]
async fn serve_local(local: &LocalParameters) -> Result<RmcpSession, BoxError> {
    use ::rmcp::transport::TokioChildProcess;

    let mut command = tokio::process::Command::new(&local.command);
    command.args(&local.args).envs(&local.env);
    if let Some(cwd) = &local.cwd {
        command.current_dir(cwd);
    }
    let transport = TokioChildProcess::new(command)?;
    RmcpSession::serve(transport).await
}

#[cfg(not(feature = "transport-child-process"))]
async fn serve_local(_local: &LocalParameters) -> Result<RmcpSession, BoxError> {
    Err(feature_disabled("transport-child-process"))
}

#[cfg(any(
    feature = "transport-streamable-http-client",
    feature = "transport-sse-client"
))]
fn http_client(remote: &RemoteParameters) -> Result<reqwest::Client, BoxError> {
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    let mut headers = HeaderMap::new();
    for (name, value) in &remote.headers {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    let timeout = remote.effective_timeout();
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?)
}

#[cfg(feature = "transport-streamable-http-client")]
async fn serve_streamable_http(remote: &RemoteParameters) -> Result<RmcpSession, BoxError> {
    use ::rmcp::transport::{
        StreamableHttpClientTransport, streamable_http_client::StreamableHttpClientTransportConfig,
    };

    let transport = StreamableHttpClientTransport::with_client(
        http_client(remote)?,
        StreamableHttpClientTransportConfig::with_uri(remote.endpoint()),
    );
    RmcpSession::serve(transport).await
}

#[cfg(not(feature = "transport-streamable-http-client"))]
async fn serve_streamable_http(_remote: &RemoteParameters) -> Result<RmcpSession, BoxError> {
    Err(feature_disabled("transport-streamable-http-client"))
}

#[cfg(feature = "transport-sse-client")]
async fn serve_sse(remote: &RemoteParameters) -> Result<RmcpSession, BoxError> {
    use ::rmcp::transport::{SseClientTransport, sse_client::SseClientConfig};

    let transport = SseClientTransport::start_with_client(
        http_client(remote)?,
        SseClientConfig {
            sse_endpoint: remote.endpoint().into(),
            ..Default::default()
        },
    )
    .await?;
    RmcpSession::serve(transport).await
}

#[cfg(not(feature = "transport-sse-client"))]
async fn serve_sse(_remote: &RemoteParameters) -> Result<RmcpSession, BoxError> {
    Err(feature_disabled("transport-sse-client"))
}

#[allow(dead_code)]
fn feature_disabled(feature: &str) -> BoxError {
    format!("this transport requires the `{feature}` feature of mcp-group").into()
}

pub struct RmcpSession {
    peer: Peer<RoleClient>,
    progress: Arc<ProgressDispatcher>,
    service: Mutex<Option<ClientService>>,
}

impl RmcpSession {
    /// Run the client handshake over any `rmcp` transport.
    pub async fn serve<T, E, A>(transport: T) -> Result<Self, BoxError>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let service = ProgressRelay::default().serve(transport).await?;
        Ok(Self {
            peer: service.peer().clone(),
            progress: service.service().progress.clone(),
            service: Mutex::new(Some(service)),
        })
    }
}

fn invocation_error(tool: &str, error: ServiceError) -> InvocationError {
    match error {
        ServiceError::McpError(error) => InvocationError::Rejected {
            tool: tool.to_owned(),
            code: error.code.0,
            message: error.message.to_string(),
        },
        other => InvocationError::Transport {
            tool: tool.to_owned(),
            message: other.to_string(),
        },
    }
}

async fn next_progress(
    subscriber: &mut Option<ProgressSubscriber>,
) -> Option<ProgressNotificationParam> {
    match subscriber {
        Some(subscriber) => subscriber.next().await,
        None => std::future::pending().await,
    }
}

fn forward(progress: &ProgressSink, params: ProgressNotificationParam) {
    progress.report(params.progress, params.total, params.message);
}

#[async_trait]
impl Session for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BoxError> {
        Ok(self.peer.list_all_tools().await?)
    }

    async fn call_tool(
        &self,
        request: CallRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> CallOutcome {
        let CallRequest { tool, arguments } = request;
        let handle = self
            .peer
            .send_cancellable_request(
                ClientRequest::CallToolRequest(Request::new(CallToolRequestParam {
                    name: tool.clone().into(),
                    arguments: Some(arguments.into_object()),
                })),
                PeerRequestOptions::no_options(),
            )
            .await
            .map_err(|e| invocation_error(&tool, e))?;
        let request_id = handle.id.clone();
        let mut subscriber = if progress.is_enabled() {
            Some(self.progress.subscribe(handle.progress_token.clone()).await)
        } else {
            None
        };

        let response = handle.await_response();
        tokio::pin!(response);
        let response = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let notified = self
                        .peer
                        .notify_cancelled(CancelledNotificationParam {
                            request_id: request_id.clone(),
                            reason: Some("cancelled by client".into()),
                        })
                        .await;
                    if let Err(error) = notified {
                        tracing::debug!(%tool, %error, "failed to notify cancellation");
                    }
                    return Err(InvocationError::Cancelled { tool });
                }
                Some(params) = next_progress(&mut subscriber) => forward(&progress, params),
                response = &mut response => break response,
            }
        };
        // notifications that raced with the response
        if let Some(subscriber) = subscriber.as_mut() {
            while let Some(Some(params)) = subscriber.next().now_or_never() {
                forward(&progress, params);
            }
        }

        match response.map_err(|e| invocation_error(&tool, e))? {
            ServerResult::CallToolResult(result) => Ok(result),
            other => Err(InvocationError::Transport {
                tool,
                message: format!("unexpected response: {other:?}"),
            }),
        }
    }

    async fn close(&self) -> Result<(), BoxError> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        self.progress.clear().await;
        let reason = service.cancel().await?;
        tracing::debug!(?reason, "session closed");
        Ok(())
    }
}
