use std::io::{self, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use desk_client::{
    ApprovalOutcome, Conversation, HttpBackend, SessionState, SessionUpdate, StreamDriver,
    StreamOutcome, SubmitOutcome,
};
use desk_core::{DeskConfig, NodeStatus, Provider, TelemetryKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "desk-cli")]
#[command(about = "Chat with the service desk orchestration backend")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides desk.toml and DESK_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// LLM provider: openai, groq, openrouter or local
    #[arg(long)]
    provider: Option<Provider>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    /// Continue an existing backend thread
    #[arg(long)]
    thread_id: Option<String>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single message and stream the reply
    Send {
        /// Message content
        message: String,
    },
    /// Start interactive chat
    Chat,
    /// Approve a thread paused for human verification
    Approve {
        /// Thread to resume
        thread_id: String,
    },
    /// Check that the backend is up
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = resolve_config(&cli);
    tracing::debug!("Using backend at {}", config.base_url);

    match cli.command {
        Commands::Send { ref message } => {
            let mut conversation = build_conversation(config, cli.thread_id.clone())?;
            stream_reply(&mut conversation, message).await?;
        }
        Commands::Chat => {
            let conversation = build_conversation(config, cli.thread_id.clone())?;
            run_interactive_chat(conversation).await?;
        }
        Commands::Approve { ref thread_id } => {
            let mut conversation = build_conversation(config, Some(thread_id.clone()))?;
            report_approval(conversation.approve_escalation().await);
        }
        Commands::Health => check_health(&config).await?,
    }

    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_line_number(debug),
        )
        .init();
}

fn resolve_config(cli: &Cli) -> DeskConfig {
    let mut config = DeskConfig::new();
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }
    if let Some(api_key) = &cli.api_key {
        config.api_key = Some(api_key.clone());
    }
    config
}

fn build_conversation(
    config: DeskConfig,
    thread_id: Option<String>,
) -> anyhow::Result<Conversation> {
    let backend = HttpBackend::new(config.base_url.clone())?;
    let conversation = Conversation::new(Arc::new(backend), config);
    Ok(match thread_id {
        Some(thread_id) => conversation.with_thread_id(thread_id),
        None => conversation,
    })
}

async fn stream_reply(conversation: &mut Conversation, message: &str) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let cancel_token = CancellationToken::new();
    let driver = StreamDriver::new()
        .with_updates(tx)
        .with_cancel_token(cancel_token.clone());

    let renderer = tokio::spawn(render_updates(rx));
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_token.cancel();
        }
    });

    let config = conversation.config();
    println!(
        "{}",
        format!(
            "→ {} via {}",
            config.model.as_deref().unwrap_or("default model"),
            config.provider.display_name()
        )
        .dimmed()
    );

    let outcome = conversation.submit(message, &driver).await;
    drop(driver);
    interrupt.abort();
    renderer.await?;

    match outcome {
        SubmitOutcome::Rejected => println!("{}", "Nothing to send.".yellow()),
        SubmitOutcome::Streamed(StreamOutcome::Completed { records }) => {
            print_timeline(conversation.session());
            if let Some(ticket) = conversation
                .session()
                .pending_message()
                .and_then(|m| m.ticket_id())
            {
                println!("{}", format!("Ticket: {ticket}").cyan());
            }
            println!("{}", format!("✨ Stream complete ({records} records)").dimmed());
        }
        SubmitOutcome::Streamed(StreamOutcome::Cancelled { records }) => {
            println!();
            println!("{}", format!("Stream cancelled after {records} records").yellow());
        }
        SubmitOutcome::Streamed(StreamOutcome::Failed { reason, .. }) => {
            tracing::debug!("Submission failed: {}", reason);
            if let Some(notice) = conversation.session().messages().last() {
                println!("{}", notice.content().red());
            }
        }
    }

    if let Some(thread_id) = conversation.thread_id() {
        println!("{}", format!("Thread: {thread_id}").dimmed());
    }
    Ok(())
}

async fn render_updates(mut rx: mpsc::Receiver<SessionUpdate>) {
    let mut streamed_tokens = false;
    while let Some(update) = rx.recv().await {
        match update {
            SessionUpdate::ThreadAssigned { thread_id } => {
                tracing::debug!("Bound to thread {}", thread_id);
            }
            SessionUpdate::StageEntered {
                label, reentered, ..
            } => {
                if streamed_tokens {
                    println!();
                    streamed_tokens = false;
                }
                let suffix = if reentered { " (again)" } else { "" };
                println!("{}", format!("▸ {label}{suffix}").magenta());
            }
            SessionUpdate::TokenAppended { token, .. } => {
                print!("{}", token.green());
                let _ = io::stdout().flush();
                streamed_tokens = true;
            }
            SessionUpdate::Finalized { content, .. } => {
                if streamed_tokens {
                    println!();
                    streamed_tokens = false;
                }
                println!("{}", "Assistant:".green().bold());
                println!("{content}");
            }
            SessionUpdate::ProtocolError { detail } => {
                println!();
                println!("{}", format!("❌ Backend error: {detail}").red());
            }
            SessionUpdate::TransportFailed { reason } => {
                println!();
                println!("{}", format!("❌ Connection failed: {reason}").red());
            }
        }
    }
    if streamed_tokens {
        println!();
    }
}

fn print_timeline(session: &SessionState) {
    if session.execution_log().is_empty() {
        return;
    }
    println!("{}", "─".repeat(50).dimmed());
    for entry in session.execution_log() {
        let line = format!("{} — {}", entry.label, entry.detail);
        match entry.status {
            NodeStatus::Active => println!("{} {}", "●".magenta(), line.bold()),
            NodeStatus::Completed => println!("{} {}", "○".dimmed(), line.dimmed()),
        }
    }
}

fn print_telemetry(session: &SessionState) {
    if session.telemetry_log().is_empty() {
        println!("{}", "No telemetry recorded.".dimmed());
        return;
    }
    for entry in session.telemetry_log() {
        let msg = match entry.kind {
            TelemetryKind::Error => entry.msg.red(),
            TelemetryKind::Node => entry.msg.magenta(),
            TelemetryKind::Success => entry.msg.green(),
            TelemetryKind::Hitl => entry.msg.yellow(),
            TelemetryKind::Info => entry.msg.normal(),
        };
        println!("{} {}", format!("[{}]", entry.time).dimmed(), msg);
    }
}

fn report_approval(outcome: ApprovalOutcome) {
    match outcome {
        ApprovalOutcome::Resumed => println!("{}", "✅ Escalation approved, resuming.".green()),
        ApprovalOutcome::Rejected => println!(
            "{}",
            "No thread to resume; send a message or pass --thread-id first.".yellow()
        ),
        ApprovalOutcome::Failed(reason) => {
            println!("{}", format!("❌ Approval failed: {reason}").red())
        }
    }
}

async fn run_interactive_chat(mut conversation: Conversation) -> anyhow::Result<()> {
    println!("{}", "🛟 Service Desk Interactive Chat".cyan().bold());
    if let Some(greeting) = conversation.session().messages().first() {
        println!("{}", greeting.content());
    }
    println!(
        "{}",
        "Commands: /approve, /log, /timeline, /wipe, /quit".dimmed()
    );
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        match input {
            "" => continue,
            "/quit" | "/exit" => {
                println!("{}", "👋 Goodbye!".cyan());
                break;
            }
            "/approve" => report_approval(conversation.approve_escalation().await),
            "/log" => print_telemetry(conversation.session()),
            "/timeline" => print_timeline(conversation.session()),
            "/wipe" => {
                conversation.wipe_telemetry();
                println!("{}", "Telemetry buffer wiped.".dimmed());
            }
            message => stream_reply(&mut conversation, message).await?,
        }

        println!();
    }

    Ok(())
}

async fn check_health(config: &DeskConfig) -> anyhow::Result<()> {
    let backend = HttpBackend::new(config.base_url.clone())?;
    match backend.health().await {
        Ok(true) => println!("{}", format!("✅ {} is healthy", config.base_url).green()),
        Ok(false) => println!("{}", format!("⚠️  {} reports degraded", config.base_url).yellow()),
        Err(err) => {
            println!("{}", format!("❌ {} unreachable: {err}", config.base_url).red());
            std::process::exit(1);
        }
    }
    Ok(())
}
