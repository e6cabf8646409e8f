//! Interactive console commands read from stdin.

use std::fmt::Write as _;

use ytsqueue::Item;
use ytsstream::{HistoryEntry, PipelineStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Submit(String),
    Skip,
    Previous,
    Stop,
    Status,
    Queue,
    History,
    /// 1-based history position
    ForgetHistory(usize),
    ClearHistory,
    /// 1-based queue position
    Remove(usize),
    Log(String),
    Help,
    Quit,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parses one input line. Empty lines give `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, arg) = match line.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, arg.trim()),
            None => (line, ""),
        };

        let cmd = match word.to_ascii_lowercase().as_str() {
            _ if word.contains("://") => ConsoleCommand::Submit(line.to_string()),
            "skip" | "next" | "n" => ConsoleCommand::Skip,
            "prev" | "previous" | "p" => ConsoleCommand::Previous,
            "stop" => ConsoleCommand::Stop,
            "status" | "s" => ConsoleCommand::Status,
            "queue" | "q" => ConsoleCommand::Queue,
            "history" | "h" => match arg.split_once(char::is_whitespace) {
                _ if arg.is_empty() => ConsoleCommand::History,
                _ if arg.eq_ignore_ascii_case("clear") => ConsoleCommand::ClearHistory,
                Some(("rm" | "remove", pos)) => match pos.trim().parse() {
                    Ok(pos) if pos > 0 => ConsoleCommand::ForgetHistory(pos),
                    _ => ConsoleCommand::Unknown(line.to_string()),
                },
                _ => ConsoleCommand::Unknown(line.to_string()),
            },
            "remove" | "rm" => match arg.parse() {
                Ok(pos) if pos > 0 => ConsoleCommand::Remove(pos),
                _ => ConsoleCommand::Unknown(line.to_string()),
            },
            "log" if !arg.is_empty() => ConsoleCommand::Log(arg.to_string()),
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(line.to_string()),
        };
        Some(cmd)
    }
}

pub const HELP: &str = "\
Commands:
  <url>           add a video or playlist to the queue
  skip | next     skip to the next item
  prev            go back to the previous item
  stop            stop streaming (the queue is kept)
  status          show the pipeline state
  queue           list the queue
  remove <n>      remove the n-th queue entry
  history         list recently played items
  history rm <n>  forget the n-th history entry
  history clear   forget all played items
  log <level>     change the log level (error, warn, info, debug, trace)
  quit            stop and exit";

pub fn format_status(status: &PipelineStatus) -> String {
    let mut out = format!("State: {}", status.state);
    if let Some(item) = &status.current {
        let _ = write!(out, "\nCurrent: {}", item.display_name());
        if status.progress > 0.0 && status.progress < 1.0 {
            let _ = write!(out, " ({:.0}%)", status.progress * 100.0);
        }
    }
    if let Some(url) = &status.stream_url {
        let _ = write!(out, "\nStream: {url}");
    }
    if let Some(error) = &status.error {
        let _ = write!(out, "\nError: {error}");
    }
    out
}

pub fn format_queue(items: &[Item], current: Option<usize>) -> String {
    if items.is_empty() {
        return "Queue is empty".to_string();
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let marker = if Some(i) == current { '>' } else { ' ' };
            format!("{marker}{:>3}. [{}] {}", i + 1, item.status, item.display_name())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "History is empty".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let name = match &e.artist {
                Some(artist) => format!("{artist} - {}", e.title),
                None => e.title.clone(),
            };
            format!("{:>3}. {}  {name}", i + 1, e.played_at.format("%Y-%m-%d %H:%M"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
