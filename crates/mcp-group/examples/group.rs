//! List the tools of several MCP servers and optionally call one of them.
//!
//! ```sh
//! cargo run --example group -- --config servers.json
//! cargo run --example group -- \
//!     --server '{"name": "math", "url": "http://localhost:8000"}' \
//!     --call math/add --arguments '{"a": 1, "b": 2}'
//! ```
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::{FutureExt, StreamExt};
use mcp_group::{Arguments, Event, Group, ServersConfig, TransportParameters};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "group")]
#[command(about = "Connect to a group of MCP servers")]
struct Args {
    /// JSON file with a `servers` (or `mcpServers`) map
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// One server as JSON: `{"name": ..., "url": ...}` or `{"name": ..., "command": ...}`
    #[arg(short, long)]
    server: Vec<String>,

    /// Tool to call, as `server/tool`
    #[arg(long)]
    call: Option<String>,

    /// Arguments of the call as a JSON object
    #[arg(long, default_value = "{}")]
    arguments: String,

    /// Call id used to receive progress events
    #[arg(long, default_value = "demo")]
    call_id: String,
}

#[derive(Deserialize)]
struct NamedServer {
    name: String,
    #[serde(flatten)]
    parameters: TransportParameters,
}

fn load_config(args: &Args) -> Result<ServersConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ServersConfig::from_json_str(&json)
                .with_context(|| format!("invalid server map in {}", path.display()))?
        }
        None => ServersConfig::default(),
    };
    for server in &args.server {
        let NamedServer { name, parameters } =
            serde_json::from_str(server).with_context(|| format!("invalid server {server}"))?;
        config.servers.insert(name, parameters);
    }
    if config.servers.is_empty() {
        bail!("no servers configured, pass --config or --server");
    }
    Ok(config)
}

async fn run(group: &Group, args: Args) -> Result<()> {
    for (server, tools) in group.get_tools_grouped_by_server().await? {
        tracing::info!("{server}: {} tool(s)", tools.len());
        for tool in tools {
            let parameters: Vec<_> = tool
                .parameters()
                .into_iter()
                .map(|p| {
                    let ty = p.json_type.unwrap_or_else(|| "any".into());
                    if p.required {
                        format!("{}: {ty}", p.name)
                    } else {
                        format!("{}?: {ty}", p.name)
                    }
                })
                .collect();
            tracing::info!(
                "  {}({}) -> {}  {}",
                tool.name(),
                parameters.join(", "),
                tool.return_type().unwrap_or("any"),
                tool.description()
            );
        }
    }

    let Some(target) = &args.call else {
        return Ok(());
    };
    let Some((server, tool)) = target.split_once('/') else {
        bail!("--call expects server/tool, got {target}");
    };
    let arguments = Arguments::try_from(serde_json::from_str::<serde_json::Value>(
        &args.arguments,
    )?)?;
    let result = group
        .call_tool(server, tool, Some(args.call_id.as_str()), arguments)
        .await?;
    let mut events = result.events()?;
    while let Some(event) = events.next().await {
        match event {
            Event::Progress(progress) => tracing::info!(
                "progress {}/{} {}",
                progress.progress,
                progress.total.unwrap_or(0.0),
                progress.message.unwrap_or_default()
            ),
            Event::Output(output) => tracing::info!("output: {}", output.output),
        }
    }
    // a failed call ends the stream without output, surface why
    result.output().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let group = Group::from_config(load_config(&args)?);
    group.scoped(move |group| run(group, args).boxed()).await
}
