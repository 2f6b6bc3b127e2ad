use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result},
    chatrelay_agent::CliConnector,
    chatrelay_chat::{ChatBackend, EventKind, StreamEvent, StreamObserver},
    chatrelay_common::SessionId,
    chatrelay_config::LayeredConfigProvider,
    clap::Args,
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        sync::mpsc,
    },
    tracing::{info, warn},
};

/// Session id used when none is given.
const DEFAULT_SESSION: &str = "cli_local";

#[derive(Args)]
pub struct ChatArgs {
    /// Message to send.
    pub message: String,
    /// Session id (`<prefix>_<local>`).
    #[arg(long, short, default_value = DEFAULT_SESSION)]
    pub session: String,
    /// Print assistant text as it arrives instead of the final reply.
    #[arg(long)]
    pub stream: bool,
}

#[derive(Args)]
pub struct ReplArgs {
    #[arg(long, short, default_value = DEFAULT_SESSION)]
    pub session: String,
    #[arg(long)]
    pub stream: bool,
}

pub fn load_provider(config: Option<&Path>) -> Result<LayeredConfigProvider> {
    let provider = match config {
        Some(path) => LayeredConfigProvider::load(path)?,
        None => {
            let cwd = std::env::current_dir().context("cannot read current directory")?;
            LayeredConfigProvider::discover(&cwd)?
        },
    };
    info!(path = %provider.source().display(), "config loaded");
    Ok(provider)
}

fn backend(config: Option<&Path>) -> Result<ChatBackend> {
    let provider = load_provider(config)?;
    Ok(ChatBackend::new(Arc::new(provider), Arc::new(CliConnector)))
}

pub async fn handle_chat(config: Option<&Path>, args: ChatArgs) -> Result<()> {
    SessionId::parse(args.session.as_str())?;
    let backend = backend(config)?;

    let outcome = send(&backend, &args.session, &args.message, args.stream).await;
    backend.cleanup_all().await;
    outcome
}

pub async fn handle_repl(config: Option<&Path>, args: ReplArgs) -> Result<()> {
    SessionId::parse(args.session.as_str())?;
    let backend = backend(config)?;
    eprintln!("session {}; /reset, /compact, /sessions, /quit", args.session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                let had = backend.reset(&args.session).await;
                eprintln!("{}", if had { "session reset" } else { "no live session" });
            },
            "/compact" => {
                let ok = backend.compact(&args.session).await;
                eprintln!("{}", if ok { "compacted" } else { "nothing to compact" });
            },
            "/sessions" => {
                for id in backend.active_sessions().await {
                    eprintln!("  {id}");
                }
            },
            message => {
                let turn = send(&backend, &args.session, message, args.stream);
                tokio::pin!(turn);
                let outcome = loop {
                    tokio::select! {
                        outcome = &mut turn => break outcome,
                        _ = tokio::signal::ctrl_c() => {
                            match backend.interrupt(&args.session).await {
                                Ok(true) => eprintln!("interrupt sent"),
                                Ok(false) => eprintln!("nothing to interrupt"),
                                Err(e) => warn!(error = %e, "interrupt failed"),
                            }
                        },
                    }
                };
                if let Err(e) = outcome {
                    eprintln!("{e}");
                }
            },
        }
    }

    let closed = backend.cleanup_all().await;
    info!(sessions = closed, "repl finished");
    Ok(())
}

/// Run one turn, printing either the streamed text or the final reply.
async fn send(backend: &ChatBackend, session: &str, message: &str, stream: bool) -> Result<()> {
    if !stream {
        let reply = backend
            .send_message_with_session(message, session, None)
            .await?;
        println!("{reply}");
        return Ok(());
    }

    let (tx, rx) = mpsc::channel::<StreamEvent>(64);
    let printer = tokio::spawn(print_events(rx));
    let observer: &dyn StreamObserver = &tx;
    let outcome = backend
        .send_message_with_session(message, session, Some(observer))
        .await;
    drop(tx);
    if let Err(e) = printer.await {
        warn!(error = %e, "printer task failed");
    }
    outcome?;
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<StreamEvent>) {
    while let Some(event) = rx.recv().await {
        if event.kind == EventKind::Assistant
            && let Some(text) = event.text
        {
            println!("{text}");
        }
    }
}
