mod face;

use anyhow::{Context, Result};
use browser_pilot::config::AgentConfig;
use browser_pilot::hands::ChromeSession;
use browser_pilot::{Agent, AgentEvent, Brain, HistoryEntry, OpenAiChat, SessionState};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::io::{BufRead, Write};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent", version, about = "Drive Chrome toward an objective with an LLM")]
struct Cli {
    #[command(flatten)]
    config: AgentConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one objective and exit. Prompts for it when omitted.
    Run { objective: Option<String> },
    /// Serve a local web UI that accepts objectives and streams progress.
    Serve {
        #[arg(long, env = "PILOT_PORT", default_value_t = 3000)]
        port: u16,
    },
}

type ChromeAgent = Agent<ChromeSession, Brain<OpenAiChat>>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.config.validate()?;

    match cli.command {
        Command::Run { objective } => {
            let objective = match objective {
                Some(objective) => objective,
                None => prompt_objective()?,
            };
            let (event_tx, _) = broadcast::channel(64);
            let mut agent = build_agent(&cli.config, event_tx).await?;
            let ok = run_objective(&mut agent, &cli.config, &objective).await;
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Serve { port } => {
            // Web UI first so the user sees something while Chrome starts.
            let (mut cmd_rx, event_tx) = face::start_server(port).await?;
            let mut agent = build_agent(&cli.config, event_tx.clone()).await?;
            info!("Waiting for objectives...");

            while let Some(objective) = cmd_rx.recv().await {
                if let Err(e) = agent.page_mut().new_tab().await {
                    warn!(error = %format!("{:#}", e), "could not open a fresh tab, reusing the current one");
                }
                run_objective(&mut agent, &cli.config, &objective).await;
                let _ = event_tx.send(AgentEvent::Ready);
            }
        }
    }

    Ok(())
}

async fn build_agent(config: &AgentConfig, events: broadcast::Sender<AgentEvent>) -> Result<ChromeAgent> {
    info!("Launching Chrome...");
    let page = ChromeSession::start(&config.browser).await?;
    let brain = Brain::new(config.chat_model());
    Ok(Agent::new(page, brain, events)
        .with_executor(config.executor()?)
        .with_rules(config.suppression_rules()?))
}

/// Returns whether the goal was reached.
async fn run_objective(agent: &mut ChromeAgent, config: &AgentConfig, objective: &str) -> bool {
    let mut session = SessionState::new(objective, config.max_retries);
    let result = agent.run(&mut session).await;

    println!("\nFINAL GOAL:\n{}\n", session.final_goal());
    println!("HISTORY:");
    for entry in session.history() {
        if let HistoryEntry::Action { .. } = entry {
            println!("  {}", entry);
        }
    }
    match result {
        Ok(()) => {
            println!("\nGoal achieved in {} steps.", session.steps());
            true
        }
        Err(e) => {
            println!("\nRun failed: {}", e);
            false
        }
    }
}

fn prompt_objective() -> Result<String> {
    print!("> Enter your objective: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("could not read the objective from stdin")?;
    let objective = line.trim().to_string();
    anyhow::ensure!(!objective.is_empty(), "no objective given");
    Ok(objective)
}
