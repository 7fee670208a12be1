use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zenflow_core::config::AppConfig;
use zenflow_core::directory::AgentDirectory;
use zenflow_core::event::EventBus;
use zenflow_core::graph::Flow;
use zenflow_core::traits::ExecutionLog;
use zenflow_engine::catalog;
use zenflow_engine::{
    ExecutionContext, FlowDraft, FlowExecutor, FlowRegistry, FlowScheduler, HandlerRegistry,
    HandlerSettings, RunLogger,
};
use zenflow_store::SqliteStore;

#[derive(Parser)]
#[command(name = "zenflow", version, about = "Graph-based marketing automation flows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "zenflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway and the flow scheduler
    Serve,
    /// Store a flow definition from a JSON file
    Import {
        /// Flow file ({"name", "description", "nodes", "edges"}, optional "id")
        file: PathBuf,
    },
    /// Execute a stored flow once and print the execution record
    Run {
        /// Flow ID
        flow_id: String,
        /// Trigger payload (JSON, or plain text)
        #[arg(long)]
        payload: Option<String>,
        /// Template variables (KEY=VALUE)
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Check a flow file without storing it
    Validate {
        file: PathBuf,
    },
    /// List stored flows
    Flows,
    /// List execution records
    Executions {
        /// Only records of this flow
        #[arg(long)]
        flow: Option<String>,
    },
    /// List built-in node types
    NodeTypes,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// A flow file on disk.
#[derive(Deserialize)]
struct FlowFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    draft: FlowDraft,
}

/// Wired-up engine components.
struct Engine {
    store: Arc<SqliteStore>,
    flows: Arc<FlowRegistry>,
    executor: Arc<FlowExecutor>,
    agents: AgentDirectory,
    event_bus: Arc<EventBus>,
}

impl Engine {
    fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let db_path = config.db_path();
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("opening database {}", db_path.display()))?,
        );
        let event_bus = Arc::new(EventBus::default());
        let agents = zenflow_agents::build_directory(config);

        let handlers = HandlerRegistry::with_builtins(
            agents.clone(),
            HandlerSettings::from_config(&config.engine),
        );
        let executor = FlowExecutor::new(Arc::new(handlers), store.clone())
            .with_event_bus(event_bus.clone())
            .with_max_steps(config.engine.max_steps);
        let flows = FlowRegistry::new(store.clone());

        Ok(Self {
            store,
            flows: Arc::new(flows),
            executor: Arc::new(executor),
            agents,
            event_bus,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zenflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "zenflow", &mut std::io::stdout());
        }
        Commands::NodeTypes => print_node_types(),
        Commands::Validate { file } => validate(&file)?,
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Serve => {
            let config = load_config(&cli.config)?;
            let engine = Engine::build(&config)?;
            serve(&config, engine).await?;
        }
        Commands::Import { file } => {
            let engine = Engine::build(&load_config(&cli.config)?)?;
            let parsed = read_flow_file(&file)?;
            let flow = match parsed.id {
                Some(id) => {
                    let draft = parsed.draft;
                    let flow = Flow::from_specs(
                        id,
                        draft.name,
                        draft.description,
                        &draft.nodes,
                        &draft.edges,
                    )?;
                    engine.flows.import(flow).await?
                }
                None => engine.flows.create(parsed.draft).await?,
            };
            println!("Imported flow {} ({})", flow.id, flow.name);
        }
        Commands::Run {
            flow_id,
            payload,
            vars,
        } => {
            let engine = Engine::build(&load_config(&cli.config)?)?;
            let input = payload.map(|p| parse_payload(&p)).unwrap_or(Value::Null);
            let ctx = ExecutionContext::new(input).with_variables(parse_vars(&vars)?);

            let cancel = ctx.cancel_token().clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                cancel.cancel();
            });

            let result = engine.flows.execute(&engine.executor, &flow_id, ctx).await?;
            println!("{}", serde_json::to_string_pretty(&result.record)?);
            if !result.succeeded() {
                std::process::exit(1);
            }
        }
        Commands::Flows => {
            let engine = Engine::build(&load_config(&cli.config)?)?;
            let flows = engine.flows.list().await?;
            if flows.is_empty() {
                println!("No flows stored.");
            }
            for flow in flows {
                let last_run = flow
                    .last_run
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<32} {:<10} {:>3} nodes  last run: {:<19}  {}",
                    flow.id,
                    flow.status.as_str(),
                    flow.nodes().len(),
                    last_run,
                    flow.name
                );
            }
        }
        Commands::Executions { flow } => {
            let engine = Engine::build(&load_config(&cli.config)?)?;
            let records = engine.store.list(flow.as_deref()).await?;
            for record in records {
                let outcome = match &record.error {
                    Some(e) => e.kind.clone(),
                    None if record.success => "ok".to_string(),
                    None => "failed".to_string(),
                };
                println!(
                    "{}  {}  {:<24} {:>3} steps  {:>6}ms  {}",
                    record.started_at.format("%Y-%m-%d %H:%M:%S"),
                    record.run_id,
                    record.flow_id,
                    record.steps.len(),
                    record.elapsed_ms().unwrap_or(0),
                    outcome
                );
            }
        }
    }

    Ok(())
}

async fn serve(config: &AppConfig, engine: Engine) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
        cancel_clone.cancel();
    });

    if let (Some(log_dir), Some(log)) = (config.log_dir(), config.engine.log.as_ref()) {
        let logger = RunLogger::new(log_dir, log.level);
        let bus = engine.event_bus.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { logger.run(bus, cancel).await });
    }

    let scheduler = FlowScheduler::new(
        &config.schedules,
        engine.flows.clone(),
        engine.executor.clone(),
        engine.event_bus.clone(),
        cancel.clone(),
    );
    if !scheduler.is_empty() {
        tokio::spawn(async move { scheduler.run().await });
        info!("Flow scheduler started");
    }

    let server = zenflow_gateway::GatewayServer::new(
        config.gateway.clone(),
        engine.flows.clone(),
        engine.executor.clone(),
        engine.agents.clone(),
    );
    server.run(cancel).await
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    let home_config = dirs_home().map(|h| h.join(".zenflow").join("config.toml"));
    match home_config {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "Loading config from home directory");
            Ok(AppConfig::load(&path)?)
        }
        _ => {
            warn!("No config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn read_flow_file(path: &Path) -> anyhow::Result<FlowFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let parsed = read_flow_file(path)?;
    let draft = parsed.draft;
    let flow = Flow::from_specs(
        parsed.id.unwrap_or_else(|| "flow_unsaved".to_string()),
        draft.name,
        draft.description,
        &draft.nodes,
        &draft.edges,
    )?;

    println!(
        "{}: {} nodes, {} edges",
        flow.name,
        flow.nodes().len(),
        flow.edges().len()
    );
    match flow.trigger() {
        Some(t) => println!("  trigger: {}", t.id),
        None => println!("  warning: no trigger node, runs will fail"),
    }
    for node in flow.nodes() {
        if catalog::lookup(&node.node_type).is_none() {
            println!(
                "  note: node '{}' has custom type '{}' (passes input through)",
                node.id, node.node_type
            );
        }
    }
    Ok(())
}

fn print_node_types() {
    println!("{:<10} {:<14} {:<8} {:<14} OUTPUTS", "TYPE", "LABEL", "COLOR", "ICON");
    for info in catalog::node_types() {
        println!(
            "{:<10} {:<14} {:<8} {:<14} {}",
            info.node_type,
            info.label,
            info.color,
            info.icon,
            info.outputs.join(", ")
        );
    }
}

/// JSON if it parses, else the raw text as a string.
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_vars(vars: &[String]) -> anyhow::Result<HashMap<String, Value>> {
    vars.iter()
        .map(|kv| {
            let (k, v) = kv
                .split_once('=')
                .with_context(|| format!("invalid variable '{}', expected KEY=VALUE", kv))?;
            Ok((k.to_string(), Value::String(v.to_string())))
        })
        .collect()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(r#"{"text":"hi"}"#), serde_json::json!({"text": "hi"}));
        assert_eq!(parse_payload("urgent please"), Value::String("urgent please".into()));
        assert_eq!(parse_payload("42"), serde_json::json!(42));
    }

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&["name=Ana".to_string(), "x=a=b".to_string()]).unwrap();
        assert_eq!(vars["name"], "Ana");
        assert_eq!(vars["x"], "a=b");
        assert!(parse_vars(&["broken".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["zenflow", "run", "flow_1", "--payload", "oi", "--var", "a=b"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { .. }));
        assert_eq!(cli.config, PathBuf::from("zenflow.toml"));
    }
}
