//! In-flight invocations.
//!
//! Every call is driven by its own task. A [`CallResult`] observes it either as a single
//! value ([`CallResult::output`]) or as a stream of [`Event`]s ([`CallResult::events`]), both
//! views see the same terminal state.
use std::{
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, InvocationError},
    model::{self, Arguments, ToolDefinition},
    session::{CallRequest, ProgressSink, Session},
};

/// Progress events buffered per call before new ones are dropped.
pub const PROGRESS_BUFFER: usize = 64;

/// How long a cancelled call waits for its session to wind the request down.
const CANCEL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub call_id: String,
    pub progress: f64,
    pub total: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEvent {
    pub call_id: Option<String>,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Progress(ProgressEvent),
    Output(OutputEvent),
}

impl Event {
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Event::Progress(progress) => Some(progress.call_id.as_str()),
            Event::Output(output) => output.call_id.as_deref(),
        }
    }
}

type Outcome = Result<Value, InvocationError>;

/// Everything the driver needs to run one call.
pub(crate) struct Invocation {
    pub tool: String,
    pub call_id: Option<String>,
    pub arguments: Arguments,
    /// Set when the call goes through a discovered [`Tool`](crate::Tool), enables the
    /// argument shape check.
    pub definition: Option<ToolDefinition>,
}

/// One dispatched invocation.
#[derive(Debug)]
pub struct CallResult {
    tool: String,
    call_id: Option<String>,
    outcome: watch::Receiver<Option<Outcome>>,
    events: Mutex<Option<mpsc::Receiver<Event>>>,
    observed: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl CallResult {
    /// Spawn the driver task of `invocation` on `session`.
    pub(crate) fn dispatch(
        session: Arc<dyn Session>,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Self {
        let Invocation {
            tool,
            call_id,
            arguments,
            definition,
        } = invocation;
        let (event_tx, event_rx) = mpsc::channel(PROGRESS_BUFFER);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let observed = Arc::new(AtomicBool::new(false));
        let result = CallResult {
            tool: tool.clone(),
            call_id: call_id.clone(),
            outcome: outcome_rx,
            events: Mutex::new(Some(event_rx)),
            observed: observed.clone(),
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            let progress = ProgressSink::new(call_id.clone(), event_tx.clone(), observed);
            let outcome = drive(
                session.as_ref(),
                &tool,
                arguments,
                definition.as_ref(),
                progress,
                &cancel,
            )
            .await;
            match &outcome {
                Ok(_) => tracing::debug!(%tool, ?call_id, "call completed"),
                Err(error) => tracing::debug!(%tool, ?call_id, %error, "call failed"),
            }
            // publish before the event channel closes so a draining stream finds it
            outcome_tx.send_replace(Some(outcome));
            drop(event_tx);
        });
        result
    }

    pub fn tool_name(&self) -> &str {
        &self.tool
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Request cancellation. Has no effect once the call finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the call to finish.
    pub async fn output(&self) -> Result<Value, Error> {
        let mut outcome = self.outcome.clone();
        let outcome = match outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            // the driver went away without publishing anything
            Err(_) => None,
        };
        match outcome {
            Some(outcome) => Ok(outcome?),
            None => Err(InvocationError::Cancelled {
                tool: self.tool.clone(),
            }
            .into()),
        }
    }

    /// The events of this call, see [`EventStream`]. Can only be taken once.
    pub fn events(&self) -> Result<EventStream, Error> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::Usage(
                "the event stream of a call can only be taken once".into(),
            ))?;
        self.observed.store(true, Ordering::Relaxed);
        Ok(EventStream {
            events,
            outcome: self.outcome.clone(),
            call_id: self.call_id.clone(),
            done: false,
        })
    }
}

async fn drive(
    session: &dyn Session,
    tool: &str,
    arguments: Arguments,
    definition: Option<&ToolDefinition>,
    progress: ProgressSink,
    cancel: &CancellationToken,
) -> Outcome {
    if let Some(definition) = definition {
        model::validate(&definition.input_schema, arguments.as_object()).map_err(|reason| {
            InvocationError::InvalidArguments {
                tool: tool.to_owned(),
                reason,
            }
        })?;
    }
    let request = CallRequest {
        tool: tool.to_owned(),
        arguments,
    };
    // the session observes `cancel` itself so it can tell the server
    let call = session.call_tool(request, progress, cancel.clone());
    tokio::pin!(call);
    let response = tokio::select! {
        response = &mut call => response,
        _ = cancel.cancelled() => match tokio::time::timeout(CANCEL_GRACE, &mut call).await {
            Ok(response) => response,
            Err(_) => {
                tracing::debug!(%tool, "session ignored cancellation");
                Err(InvocationError::Cancelled { tool: tool.to_owned() })
            }
        },
    }?;
    model::into_output(response).map_err(|message| InvocationError::Tool {
        tool: tool.to_owned(),
        message,
    })
}

pin_project_lite::pin_project! {
    /// Progress events in arrival order, then one [`Event::Output`] if the call succeeded.
    ///
    /// A failed or cancelled call ends the stream without an output event, the error itself
    /// is available from [`CallResult::output`].
    #[derive(Debug)]
    pub struct EventStream {
        events: mpsc::Receiver<Event>,
        outcome: watch::Receiver<Option<Outcome>>,
        call_id: Option<String>,
        done: bool,
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                *this.done = true;
                let output = match &*this.outcome.borrow() {
                    Some(Ok(output)) => output.clone(),
                    _ => return Poll::Ready(None),
                };
                Poll::Ready(Some(Event::Output(OutputEvent {
                    call_id: this.call_id.clone(),
                    output,
                })))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::{
        error::BoxError,
        model::{CallToolResult, Content},
        session::CallOutcome,
    };

    #[derive(Default)]
    struct Echo {
        saw_cancel: AtomicBool,
    }

    #[async_trait]
    impl Session for Echo {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BoxError> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            request: CallRequest,
            progress: ProgressSink,
            cancel: CancellationToken,
        ) -> CallOutcome {
            match request.tool.as_str() {
                "hang" => {
                    cancel.cancelled().await;
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Err(InvocationError::Cancelled { tool: request.tool });
                }
                "chatty" => {
                    for step in 0..100 {
                        progress.report(step as f64, Some(100.0), None);
                    }
                }
                _ => progress.report(1.0, Some(1.0), Some("echo".into())),
            }
            let text = serde_json::to_string(request.arguments.as_object()).unwrap();
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }

        async fn close(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn invocation(tool: &str, call_id: Option<&str>) -> Invocation {
        Invocation {
            tool: tool.into(),
            call_id: call_id.map(Into::into),
            arguments: Arguments::new().arg("x", 1),
            definition: None,
        }
    }

    #[tokio::test]
    async fn events_end_with_output() {
        let result = CallResult::dispatch(
            Arc::new(Echo::default()),
            invocation("echo", Some("c1")),
            CancellationToken::new(),
        );
        let events: Vec<_> = result.events().unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Event::Progress(p) if p.call_id == "c1"));
        assert_eq!(
            events[1],
            Event::Output(OutputEvent {
                call_id: Some("c1".into()),
                output: json!(r#"{"x":1}"#),
            })
        );
        assert_eq!(result.output().await.unwrap(), json!(r#"{"x":1}"#));
        assert!(result.is_finished());
        assert!(matches!(result.events(), Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn cancelled_call_has_no_output_event() {
        let result = CallResult::dispatch(
            Arc::new(Echo::default()),
            invocation("hang", Some("c2")),
            CancellationToken::new(),
        );
        let events = result.events().unwrap();
        result.cancel();
        let events: Vec<_> = events.collect().await;
        assert!(events.is_empty());
        let error = result.output().await.unwrap_err();
        assert!(matches!(error, Error::Invocation(ref e) if e.is_cancelled()));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_session() {
        let schema = json!({
            "type": "object",
            "properties": {"x": {"type": "string"}},
        });
        let mut invocation = invocation("hang", None);
        invocation.definition = Some(ToolDefinition::new(
            "hang",
            "never returns",
            Arc::new(schema.as_object().cloned().unwrap()),
        ));
        let result =
            CallResult::dispatch(Arc::new(Echo::default()), invocation, CancellationToken::new());
        let error = result.output().await.unwrap_err();
        assert!(matches!(
            error,
            Error::Invocation(InvocationError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn session_winds_down_a_cancelled_call() {
        let echo = Arc::new(Echo::default());
        let result =
            CallResult::dispatch(echo.clone(), invocation("hang", None), CancellationToken::new());
        tokio::task::yield_now().await;
        result.cancel();
        let error = result.output().await.unwrap_err();
        assert!(matches!(error, Error::Invocation(ref e) if e.is_cancelled()));
        assert!(echo.saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unread_progress_never_blocks_the_output() {
        let result = CallResult::dispatch(
            Arc::new(Echo::default()),
            invocation("chatty", Some("c3")),
            CancellationToken::new(),
        );
        assert_eq!(result.output().await.unwrap(), json!(r#"{"x":1}"#));

        let events: Vec<_> = result.events().unwrap().collect().await;
        assert_eq!(events.len(), PROGRESS_BUFFER + 1);
        assert!(matches!(&events[0], Event::Progress(p) if p.progress == 0.0));
        assert!(matches!(events.last(), Some(Event::Output(_))));
    }
}
