//! Local driver for the healthcare query orchestration core. Thin by
//! design: argument parsing, config loading, runtime construction, and
//! result rendering. All orchestration logic lives in the runtime crate.

mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use care_orchestrator_runtime::llm::MockLlmClient;
use care_orchestrator_runtime::transport::MockToolTransport;
use care_orchestrator_runtime::types::{Query, QueryOptions, SessionId, UserContext, UserRole};
use care_orchestrator_runtime::{AgentRuntime, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "care-orchestrator", about = "Drive the healthcare query orchestration core against a single query")]
struct Cli {
    /// The natural-language query to submit.
    query: String,

    /// Session identifier; queries in the same session share cache and tool
    /// listing state. Defaults to a fresh session per invocation.
    #[arg(long)]
    session_id: Option<String>,

    /// Path to a YAML runtime configuration file. Falls back to built-in
    /// defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Caller role, used only to shape agent selection context.
    #[arg(long, value_enum, default_value = "unspecified")]
    role: CliUserRole,

    /// Run against deterministic canned tool responses and a scripted LLM
    /// instead of live subprocesses and a real model endpoint.
    #[arg(long)]
    mock: bool,

    /// Scripted LLM replies for `--mock` mode, in order: first the agent
    /// selection reply, then one per selected agent's reasoning step(s).
    /// When omitted under `--mock`, a reasonable canned script is used.
    #[arg(long = "mock-reply", num_args = 0..)]
    mock_replies: Vec<String>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum CliUserRole {
    Clinician,
    Researcher,
    Patient,
    Unspecified,
}

impl From<CliUserRole> for UserRole {
    fn from(value: CliUserRole) -> Self {
        match value {
            CliUserRole::Clinician => UserRole::Clinician,
            CliUserRole::Researcher => UserRole::Researcher,
            CliUserRole::Patient => UserRole::Patient,
            CliUserRole::Unspecified => UserRole::Unspecified,
        }
    }
}

fn default_mock_script() -> Vec<String> {
    vec![
        "medical_literature_search".to_string(),
        "Tool: literature-search\nArgs: {\"query\": \"sglt2 inhibitors cardiovascular outcomes\"}".to_string(),
        "Answer: SGLT2 inhibitors show a consistent reduction in heart failure hospitalization \
         across the cited trials, with cardiovascular benefit most pronounced in patients with \
         existing cardiovascular disease.".to_string(),
    ]
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading config file at {}", p.display()))?;
            serde_yaml::from_str(&raw).with_context(|| format!("parsing config file at {}", p.display()))
        }
        None => Ok(RuntimeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let session_id = SessionId::new(cli.session_id.clone().unwrap_or_else(|| "cli-session".to_string()));

    let runtime = if cli.mock {
        let replies = if cli.mock_replies.is_empty() {
            default_mock_script()
        } else {
            cli.mock_replies.clone()
        };
        let llm = Arc::new(MockLlmClient::new(replies));
        let transport = Arc::new(MockToolTransport::new(fixtures::mock_tool_fixtures()));
        AgentRuntime::with_transport(
            config,
            fixtures::default_tool_descriptors(),
            fixtures::default_category_rules(),
            Some(llm),
            Some(transport),
        )
    } else {
        AgentRuntime::new(config, fixtures::default_tool_descriptors(), fixtures::default_category_rules(), None)
    };

    let mut query = Query::new(cli.query.clone(), session_id.clone());
    query = query.with_options(QueryOptions { intent: None, mock: cli.mock });
    if !matches!(cli.role, CliUserRole::Unspecified) {
        query = query.with_user(UserContext {
            id: "cli-user".to_string(),
            role: cli.role.clone().into(),
        });
    }

    let response = runtime.handle_query(query).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    let metrics = runtime.metrics();
    tracing::info!(?metrics, "request complete");

    runtime.end_session(&session_id);
    Ok(())
}
