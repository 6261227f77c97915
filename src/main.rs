//! Conductor CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use conductor::cli::{repl, ChatArgs, Cli, Commands, ReplCommand};
use conductor::config::ConductorConfig;
use conductor::error::{ConductorError, Result};
use conductor::graph::{AgentDeps, GraphEngine, RunOutcome};
use conductor::mcp::{MCPConnector, ToolClient};
use conductor::oracle::{DecisionOracle, OpenAiOracle};
use conductor::session::SessionRegistry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "conductor=debug" } else { "conductor=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ConductorConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.tools_url {
        config.set_tools_url(url);
    }

    match cli.command {
        Commands::Chat(args) => handle_chat(&config, args).await,
        Commands::Tools => handle_tools(&config).await,
        Commands::Workflows => {
            handle_workflows(&config);
            Ok(())
        }
    }
}

fn tool_client(config: &ConductorConfig) -> Option<Arc<ToolClient>> {
    let url = config.tools.url.as_ref()?;
    let connector = Arc::new(MCPConnector::new(url.clone()));
    Some(Arc::new(ToolClient::from_config(connector, &config.tools)))
}

async fn handle_tools(config: &ConductorConfig) -> Result<()> {
    let client = tool_client(config).ok_or_else(|| {
        ConductorError::Configuration("no tool service configured; set tools.url or CONDUCTOR_TOOLS_URL".into())
    })?;
    let catalog = client.catalog().await?;
    for tool in catalog.remote_tools() {
        let exposed = catalog.oracle_name(&tool.name).unwrap_or(tool.name.as_str());
        println!("{exposed:<28} {}", tool.description.as_deref().unwrap_or_default());
    }
    client.close().await
}

fn handle_workflows(config: &ConductorConfig) {
    for (kind, workflow) in &config.workflows {
        println!("{kind} (entry: {})", workflow.entry);
        for member in &workflow.agents {
            let Some(agent) = config.agents.get(member) else {
                continue;
            };
            let state = if agent.enabled { "" } else { " [disabled]" };
            println!(
                "  {member}{state}: max_iterations={} tools={:?} delegates={:?}",
                agent.max_iterations, agent.tools, agent.delegates
            );
        }
    }
}

async fn handle_chat(config: &ConductorConfig, args: ChatArgs) -> Result<()> {
    let oracle: Arc<dyn DecisionOracle> = Arc::new(OpenAiOracle::from_config(&config.oracle));
    let tools = tool_client(config);
    let deps = AgentDeps::from_config(config, oracle, tools.clone());

    let shutdown = CancellationToken::new();
    let engine = GraphEngine::from_config(config, &deps, Arc::new(SessionRegistry::new()))?
        .with_shutdown(shutdown.clone());
    if engine.workflow(&args.workflow).is_none() {
        return Err(ConductorError::UnknownWorkflow(args.workflow));
    }

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut session = args
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = match args.message {
        Some(ref message) => {
            let outcome = engine.run(&args.workflow, &session, message.as_str()).await?;
            print_outcome(&outcome, args.json)
        }
        None => interactive(&engine, &args, &mut session, &shutdown).await,
    };

    if let Some(tools) = tools {
        tools.close().await?;
    }
    result
}

async fn interactive(
    engine: &GraphEngine,
    args: &ChatArgs,
    session: &mut String,
    shutdown: &CancellationToken,
) -> Result<()> {
    eprintln!("workflow '{}', session '{session}'. /help for commands.", args.workflow);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush()?;
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        match ReplCommand::parse(&line) {
            ReplCommand::Message(text) => {
                let outcome = engine.run(&args.workflow, session.as_str(), text).await?;
                print_outcome(&outcome, args.json)?;
                if shutdown.is_cancelled() {
                    break;
                }
            }
            ReplCommand::Sessions => {
                for info in engine.sessions().list_info().await {
                    println!(
                        "{:<32} messages={:<4} runs={:<3} status={} updated={}",
                        info.key.to_string(),
                        info.message_count,
                        info.runs,
                        info.status,
                        info.updated_at.format("%H:%M:%S")
                    );
                }
            }
            ReplCommand::Stats => {
                println!("{}", serde_json::to_string_pretty(&engine.sessions().stats().await)?);
            }
            ReplCommand::Export => match engine.sessions().export(&args.workflow, session.as_str()).await {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => eprintln!("no checkpoint for this session yet"),
            },
            ReplCommand::Evict => {
                let removed = engine.sessions().evict(&args.workflow, session.as_str()).await;
                eprintln!("{}", if removed { "evicted" } else { "nothing to evict" });
            }
            ReplCommand::Switch(id) => {
                *session = id;
                eprintln!("session '{session}'");
            }
            ReplCommand::Help => eprintln!("{}", repl::HELP),
            ReplCommand::Quit => break,
            ReplCommand::Empty => {}
            ReplCommand::Unknown(input) => eprintln!("unknown command: {input}"),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.state)?);
    }
    println!("{}", outcome.response);
    if let Some(kind) = outcome.failure {
        eprintln!("[{} {}]", outcome.status, kind);
    }
    Ok(())
}
