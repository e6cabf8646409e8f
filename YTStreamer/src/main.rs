mod console;

use std::sync::Arc;

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::{error, info, warn};
use ytsconfig::Config;
use ytsmedia::{LanAddressProvider, MediaConfigExt};
use ytsserver::logs::{init_logging, LogHandle, LoggingOptions};
use ytsstream::{
    Collaborators, Orchestrator, OrchestratorHandle, PipelineConfigExt, PipelineState,
    PipelineStatus,
};

use crate::console::{format_history, format_queue, format_status, ConsoleCommand, HELP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== Configuration & logs ==========
    let config = Arc::new(Config::load_config("").context("cannot load configuration")?);
    let log = init_logging(LoggingOptions::from_config(&config));

    info!("🎵 YTStreamer {} starting", env!("CARGO_PKG_VERSION"));
    info!(config_dir = %config.directory().display(), "Configuration loaded");

    // ========== Pipeline ==========
    let collaborators = Collaborators {
        fetcher: Arc::new(config.ytdlp_fetcher().context("cannot prepare yt-dlp")?),
        transcoder: Arc::new(config.ffmpeg_transcoder().context("cannot prepare ffmpeg")?),
        addresses: Arc::new(LanAddressProvider),
    };
    let settings = config.stream_settings();
    info!(
        port = settings.server.port,
        chunk_size = settings.chunk_size,
        "📡 Stream settings loaded"
    );

    let (orchestrator, task) = Orchestrator::spawn(collaborators, settings, Some(config.history()));
    tokio::spawn(report_status(orchestrator.subscribe()));

    for source in std::env::args().skip(1) {
        orchestrator
            .submit(source)
            .context("orchestrator stopped during startup")?;
    }

    // ========== Console ==========
    info!("✅ YTStreamer is ready! Paste a YouTube link, or type 'help'");
    info!("Press Ctrl+C to stop...");

    tokio::select! {
        result = run_console(&orchestrator, &log) => {
            if let Err(e) = result {
                error!("Console error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received");
        }
    }

    info!("🛑 Shutting down...");
    if let Err(e) = orchestrator.shutdown().await {
        warn!("⚠️ Orchestrator already stopped: {}", e);
    }
    if let Err(e) = task.await {
        error!("Orchestrator task failed: {}", e);
    }
    info!("👋 Bye");
    Ok(())
}

async fn run_console(orchestrator: &OrchestratorHandle, log: &LogHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("cannot read stdin")? {
        let Some(cmd) = ConsoleCommand::parse(&line) else {
            continue;
        };

        match cmd {
            ConsoleCommand::Submit(source) => orchestrator.submit(source)?,
            ConsoleCommand::Skip => orchestrator.skip()?,
            ConsoleCommand::Previous => orchestrator.previous()?,
            ConsoleCommand::Stop => orchestrator.stop()?,
            ConsoleCommand::Status => println!("{}", format_status(&orchestrator.status())),
            ConsoleCommand::Queue => {
                let status = orchestrator.status();
                println!("{}", format_queue(&status.queue, status.current_index));
            }
            ConsoleCommand::History => {
                println!("{}", format_history(&orchestrator.history().await?));
            }
            ConsoleCommand::ForgetHistory(position) => {
                let entries = orchestrator.history().await?;
                let Some(entry) = entries.get(position - 1) else {
                    println!("No history entry at position {position}");
                    continue;
                };
                if orchestrator.forget_history(entry.key()).await? {
                    println!("Forgot {}", entry.title);
                } else {
                    println!("{} is no longer in the history", entry.title);
                }
            }
            ConsoleCommand::ClearHistory => {
                orchestrator.clear_history().await?;
                println!("History cleared");
            }
            ConsoleCommand::Remove(position) => {
                let status = orchestrator.status();
                let Some(item) = status.queue.get(position - 1) else {
                    println!("No item at position {position}");
                    continue;
                };
                if orchestrator.remove(item.id).await? {
                    println!("Removed {}", item.display_name());
                } else {
                    println!("Cannot remove the item being played");
                }
            }
            ConsoleCommand::Log(level) => match log.set_max_level(&level) {
                Ok(()) => println!("Log level set to {level}"),
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Ok(()),
            ConsoleCommand::Unknown(input) => println!("Unknown command: {input} (try 'help')"),
        }
    }

    // detached from a terminal: keep streaming until Ctrl+C
    info!("stdin closed, console disabled");
    std::future::pending::<()>().await;
    Ok(())
}

/// Logs state and track changes as they are published.
async fn report_status(mut status: watch::Receiver<PipelineStatus>) {
    let mut last_state = PipelineState::Idle;
    let mut last_title: Option<String> = None;

    while status.changed().await.is_ok() {
        let snapshot = status.borrow_and_update().clone();

        if snapshot.state != last_state {
            match snapshot.state {
                PipelineState::Idle => info!("⏸️ Idle"),
                PipelineState::FetchingMetadata => info!("🔎 Fetching metadata..."),
                PipelineState::Downloading => info!("⬇️ Downloading..."),
                PipelineState::Converting => info!("🎛️ Converting..."),
                PipelineState::Serving => match &snapshot.stream_url {
                    Some(url) => info!("📻 Streaming at {}", url),
                    None => info!("📻 Streaming"),
                },
                PipelineState::Error => {
                    warn!("❌ {}", snapshot.error.as_deref().unwrap_or("pipeline error"))
                }
            }
            last_state = snapshot.state;
        }

        let title = snapshot.current.as_ref().map(|i| i.display_name());
        if title != last_title {
            if let Some(title) = &title {
                info!("🎵 {}", title);
            }
            last_title = title;
        }
    }
}
