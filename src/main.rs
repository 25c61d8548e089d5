//! colloquy CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use colloquy::chat::{Chat, ResolveOutcome, RetryOutcome};
use colloquy::cli::{Cli, Commands};
use colloquy::config::ColloquyConfig;
use colloquy::turn::{TurnEvent, TurnEventPayload, TurnEventSink, TurnOutcome, TurnState};
use colloquy::types::{MessageKind, Session};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_env("COLLOQUY_LOG")
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ColloquyConfig::load()?;
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }
    let chat = Arc::new(Chat::from_config(config)?.with_event_sink(terminal_sink()));

    match cli.command {
        Commands::Sessions => {
            for session in chat.list_sessions().await? {
                println!(
                    "{}  {}  {} messages  {}",
                    session.id,
                    session.updated_at.format("%Y-%m-%d %H:%M"),
                    session.messages.len(),
                    session.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        Commands::New(args) => {
            let mut session = Session::generate();
            if let Some(system) = args.system {
                session = session.with_system_prompt(system);
            }
            let session = chat.create_session(session).await?;
            println!("{}", session.id);
        }
        Commands::Send(args) => {
            let outcome = with_ctrl_c(&chat, &args.session, chat.send(&args.session, args.message)).await?;
            report(&outcome);
        }
        Commands::History(args) => print_history(&chat.session(&args.session).await?),
        Commands::Retry(args) => {
            match with_ctrl_c(&chat, &args.session, chat.retry(&args.session, &args.message_id)).await? {
                RetryOutcome::Regenerated(outcome) => report(&outcome),
                RetryOutcome::AwaitingToolResults { reopened } => {
                    eprintln!("waiting on tool results: {}", reopened.join(", "));
                }
            }
        }
        Commands::Edit(args) => {
            let outcome = with_ctrl_c(
                &chat,
                &args.session,
                chat.edit(&args.session, &args.message_id, args.content),
            )
            .await?;
            report(&outcome);
        }
        Commands::Delete(args) => {
            let removed = chat.delete_message(&args.session, &args.message_id).await?;
            eprintln!("deleted {} message {}", removed.role(), removed.id);
        }
        Commands::Resolve(args) => {
            let outcome = args.outcome();
            let resolved = with_ctrl_c(
                &chat,
                &args.session,
                chat.resolve_tool_call(&args.session, &args.tool_call_id, outcome),
            )
            .await?;
            match resolved {
                ResolveOutcome::AlreadyResolved => eprintln!("already resolved"),
                ResolveOutcome::Pending { remaining } => {
                    eprintln!("recorded; {remaining} tool call(s) still pending")
                }
                ResolveOutcome::Continued(outcome) => report(&outcome),
            }
        }
    }
    Ok(())
}

/// Drive `fut`, cancelling the session's turn on Ctrl-C. The future still
/// runs to completion so the partial reply is committed.
async fn with_ctrl_c<T>(
    chat: &Arc<Chat>,
    session_id: &str,
    fut: impl std::future::Future<Output = colloquy::Result<T>>,
) -> colloquy::Result<T> {
    tokio::pin!(fut);
    tokio::select! {
        result = &mut fut => return result,
        _ = tokio::signal::ctrl_c() => {
            chat.cancel(session_id);
        }
    }
    fut.await
}

fn terminal_sink() -> TurnEventSink {
    let printed = Arc::new(std::sync::Mutex::new(0usize));
    Arc::new(move |event: TurnEvent| match &event.payload {
        TurnEventPayload::Started => {
            if let Ok(mut n) = printed.lock() {
                *n = 0;
            }
        }
        TurnEventPayload::Responding => eprintln!("…"),
        TurnEventPayload::Preview { preview } => {
            let Ok(mut n) = printed.lock() else {
                return;
            };
            if let Some(fresh) = preview.text.get(*n..) {
                print!("{fresh}");
                let _ = std::io::stdout().flush();
            }
            *n = preview.text.len();
        }
        TurnEventPayload::ToolResultsAppended { count } => {
            eprintln!("{count} tool result(s) sent back to the model");
        }
        TurnEventPayload::Finished { .. } => println!(),
        TurnEventPayload::PreviewCleared => {}
    })
}

fn report(outcome: &TurnOutcome) {
    match outcome.state {
        TurnState::Errored => {
            eprintln!("❌ {}", outcome.error().unwrap_or("unknown error"));
        }
        TurnState::Aborted => eprintln!("(cancelled)"),
        _ => {}
    }
    let Some(assistant) = outcome.message.as_ref().and_then(|m| m.as_assistant()) else {
        return;
    };
    for call in &assistant.tool_calls {
        eprintln!("⚡ {} {} {}", call.id, call.name, call.arguments);
    }
    if !assistant.tool_calls.is_empty() {
        eprintln!(
            "resolve with: colloquy resolve {} <tool_call_id> --result <text>",
            outcome.session_id
        );
    }
}

fn print_history(session: &Session) {
    if let Some(title) = &session.title {
        println!("# {title}");
    }
    for message in &session.messages {
        match &message.kind {
            MessageKind::System { content } => println!("[{}] system: {content}", message.id),
            MessageKind::User { content } => println!("[{}] user: {content}", message.id),
            MessageKind::ToolResult {
                content,
                tool_call_id,
                ..
            } => println!("[{}] tool {tool_call_id}: {content}", message.id),
            MessageKind::Assistant(assistant) => {
                let mut flags = Vec::new();
                if assistant.incomplete {
                    flags.push("incomplete".to_string());
                }
                for exec in &assistant.executions {
                    flags.push(format!("{}={}", exec.tool_call_id, exec.status));
                }
                let suffix = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", flags.join(", "))
                };
                println!("[{}] assistant: {}{suffix}", message.id, assistant.content);
            }
        }
    }
}
