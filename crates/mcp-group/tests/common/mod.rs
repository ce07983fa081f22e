#![allow(dead_code)]
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mcp_group::{
    BoxError, Connector, Group, InvocationError, LocalParameters, Session, ToolDefinition,
    model::{CallToolResult, Content, JsonObject},
    session::{CallOutcome, CallRequest, ProgressSink},
    transport::TransportParameters,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(object) => object,
        _ => unreachable!("schema literals are objects"),
    }
}

pub fn math_tools() -> Vec<ToolDefinition> {
    let mut add = ToolDefinition::new(
        "add",
        "Add two numbers",
        object(json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"]
        })),
    );
    add.output_schema = Some(Arc::new(object(json!({
        "type": "object",
        "properties": {"result": {"type": "integer"}}
    }))));
    vec![
        add,
        ToolDefinition::new(
            "fail",
            "Always reports an error",
            object(json!({"type": "object"})),
        ),
    ]
}

pub fn progress_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "long_running_task",
            "A task that reports its progress",
            object(json!({
                "type": "object",
                "properties": {
                    "task_name": {"type": "string"},
                    "steps": {"type": "integer", "default": 5}
                },
                "required": ["task_name"]
            })),
        ),
        ToolDefinition::new(
            "slow",
            "Never finishes on its own",
            object(json!({"type": "object"})),
        ),
    ]
}

/// Server side state shared by every session opened to one fake server.
#[derive(Default)]
pub struct FakeServer {
    pub tools: Vec<ToolDefinition>,
    pub discovery_delay: Duration,
    pub fail_connect: AtomicBool,
    pub fail_discovery: AtomicBool,
    pub fail_close: AtomicBool,
    pub connects: AtomicUsize,
    pub discoveries: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeServer {
    pub fn new(tools: Vec<ToolDefinition>) -> Arc<Self> {
        Arc::new(Self {
            tools,
            ..Default::default()
        })
    }

    pub fn with_delay(tools: Vec<ToolDefinition>, discovery_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            tools,
            discovery_delay,
            ..Default::default()
        })
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.connects.load(Ordering::SeqCst) - self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Default, Clone)]
pub struct FakeConnector {
    servers: BTreeMap<String, Arc<FakeServer>>,
}

impl FakeConnector {
    pub fn new<'a>(servers: impl IntoIterator<Item = (&'a str, Arc<FakeServer>)>) -> Self {
        Self {
            servers: servers
                .into_iter()
                .map(|(name, server)| (name.to_owned(), server))
                .collect(),
        }
    }

    pub fn group(&self) -> Group {
        let connector: Arc<dyn Connector> = Arc::new(self.clone());
        Group::with_connector(
            self.servers
                .keys()
                .map(|name| (name.clone(), TransportParameters::from(LocalParameters::new("fake")))),
            connector,
        )
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        server: &str,
        _parameters: &TransportParameters,
    ) -> Result<Box<dyn Session>, BoxError> {
        let state = self
            .servers
            .get(server)
            .cloned()
            .ok_or_else(|| format!("no fake server named {server}"))?;
        if state.fail_connect.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession { state }))
    }
}

pub struct FakeSession {
    state: Arc<FakeServer>,
}

fn integer(request: &CallRequest, name: &str) -> i64 {
    request.arguments.get(name).and_then(Value::as_i64).unwrap_or(0)
}

#[async_trait]
impl Session for FakeSession {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BoxError> {
        self.state.discoveries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.state.discovery_delay).await;
        if self.state.fail_discovery.load(Ordering::SeqCst) {
            return Err("tools/list failed".into());
        }
        Ok(self.state.tools.clone())
    }

    async fn call_tool(
        &self,
        request: CallRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> CallOutcome {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        match request.tool.as_str() {
            "add" => Ok(CallToolResult::structured(json!({
                "result": integer(&request, "a") + integer(&request, "b")
            }))),
            "fail" => Ok(CallToolResult::error(vec![Content::text("something went wrong")])),
            "long_running_task" => {
                let steps = request
                    .arguments
                    .get("steps")
                    .and_then(Value::as_u64)
                    .unwrap_or(5);
                let task_name = request
                    .arguments
                    .get("task_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                for step in 1..=steps {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    progress.report(
                        step as f64,
                        Some(steps as f64),
                        Some(format!("step {step} of {task_name}")),
                    );
                }
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Task '{task_name}' completed"
                ))]))
            }
            "slow" => {
                cancel.cancelled().await;
                Err(InvocationError::Cancelled { tool: request.tool })
            }
            _ => Err(InvocationError::Rejected {
                message: format!("Unknown tool: {}", request.tool),
                tool: request.tool,
                code: -32602,
            }),
        }
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err("broken pipe".into());
        }
        Ok(())
    }
}

/// "math" and "progress", as used by most tests.
pub fn scenario() -> (FakeConnector, Arc<FakeServer>, Arc<FakeServer>) {
    let math = FakeServer::new(math_tools());
    let progress = FakeServer::new(progress_tools());
    let connector = FakeConnector::new([("math", math.clone()), ("progress", progress.clone())]);
    (connector, math, progress)
}
