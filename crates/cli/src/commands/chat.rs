//! `kestrel chat` Interactive or single-message mode.

use anyhow::Context;
use clap::Args;
use kestrel_agent::{AgentStreamEvent, CompletionReason, TurnReport};
use kestrel_config::AppConfig;
use kestrel_providers::build_client;
use kestrel_security::{AuditLogger, FilePolicyStore, PermissionGate, TracingSink};
use kestrel_cli::terminal::{ask, render, TerminalApprover, TerminalPrompt};
use kestrel_cli::Session;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::load_config;

#[derive(Args)]
pub struct ChatArgs {
    /// Directory the agent works in (defaults to the current directory)
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Override the configured provider
    #[arg(long)]
    provider: Option<String>,

    /// Override the configured model
    #[arg(long)]
    model: Option<String>,

    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Run every tool call sequentially
    #[arg(long)]
    no_parallel: bool,

    /// Approve all writes and commands for this session (dangerous
    /// commands still ask)
    #[arg(short, long)]
    yes: bool,
}

pub async fn run(config_path: Option<&Path>, args: ChatArgs) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(provider) = args.provider {
        config.provider.name = provider;
    }
    if let Some(model) = args.model {
        config.provider.model = model;
    }
    if args.no_parallel {
        config.parallel.enable_parallel = false;
    }

    let working_dir = match args.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot read the current directory")?,
    };
    let working_dir = working_dir
        .canonicalize()
        .with_context(|| format!("Working directory {} not found", working_dir.display()))?;

    let client = build_client(&config.provider).context("Failed to create the model client")?;
    if !client.is_healthy().await {
        warn!(provider = client.provider_name(), "Provider health check failed");
        eprintln!(
            "Warning: cannot connect to the {} provider. Check the configuration and connectivity.",
            client.provider_name()
        );
    }

    let gate = PermissionGate::new(&working_dir)
        .with_prompt(Arc::new(TerminalPrompt))
        .with_store(Arc::new(FilePolicyStore::new(AppConfig::permissions_path())))
        .with_audit(Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)])))
        .with_danger_confirmation(config.safety.require_dangerous_command_confirmation);
    if args.yes {
        gate.grant_all_writes();
        gate.grant_all_bash();
    }

    let mut session = Session::new(config, client, gate).with_approver(Arc::new(TerminalApprover));

    if let Some(message) = args.message {
        run_turn(&mut session, &message).await;
        return Ok(());
    }

    eprintln!();
    eprintln!("  Kestrel interactive mode");
    eprintln!("  Working directory: {}", session.working_dir().display());
    eprintln!(
        "  Provider: {} / {}",
        session.client().provider_name(),
        session.client().model_name()
    );
    eprintln!("  Conversation: {}", session.conversation_id());
    eprintln!("  Commands: /clear, /exit, /quit");
    eprintln!();

    while let Some(line) = ask("\nYou > ".into()).await {
        let input = line.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" | "exit" | "quit" => break,
            "/clear" => {
                session.clear();
                eprintln!("Conversation cleared.");
            }
            _ => run_turn(&mut session, input).await,
        }
    }

    eprintln!("Goodbye!");
    Ok(())
}

/// Run one turn while rendering its events, then print a summary line.
async fn run_turn(session: &mut Session, input: &str) {
    let (tx, mut rx) = mpsc::unbounded_channel::<AgentStreamEvent>();
    let printer = tokio::spawn(async move {
        let mut out = std::io::stdout();
        let mut log = std::io::stderr();
        while let Some(event) = rx.recv().await {
            if let Err(e) = render(&event, &mut out, &mut log) {
                warn!(error = %e, "Failed to render agent output");
            }
        }
    });

    let report = session.send(input, Some(tx)).await;
    // The runner owned the sender, so the printer drains and stops
    let _ = printer.await;
    println!();
    eprintln!("{}", summary(&report));
}

fn summary(report: &TurnReport) -> String {
    let outcome = &report.outcome;
    if let Some(error) = &outcome.error {
        return format!("Error: {error}");
    }
    if outcome.completion_reason == CompletionReason::PlanRejected {
        return "Task cancelled: plan rejected".into();
    }
    format!(
        "Completed in {} iteration(s) with {} tool call(s) [{}]",
        outcome.iteration_count, outcome.tool_call_count, outcome.completion_reason
    )
}
