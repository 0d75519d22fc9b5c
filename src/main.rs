mod config;
mod output;
mod time;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use logscope_client::{HttpBackend, LogBackend, SocketIoChannel};
use logscope_logs::{FilterCriteria, LogTailer, Normalizer, RecordFilter};

use crate::config::{CliOverrides, Config};
use crate::output::{ViewPrinter, format_record};
use crate::time::parse_time_arg;

/// Logscope - tail a container log stream with historical search
#[derive(Parser, Debug)]
#[command(name = "logscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.config/logscope/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    /// Live buffer capacity
    #[arg(long, global = true)]
    buffer_size: Option<usize>,

    /// Entries fetched on startup (0 = none)
    #[arg(long, global = true)]
    initial_fetch: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Follow the live stream; reads /search, /range, /clear, /reconnect, /status, /quit from stdin
    Tail {
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Run one historical query and print the results
    Query {
        #[command(flatten)]
        search: SearchArgs,

        /// Maximum entries to request (default: buffer size)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct SearchArgs {
    /// Case-insensitive text to match
    #[arg(short, long)]
    query: Option<String>,

    /// Range start (RFC 3339 or local YYYY-MM-DDTHH:MM[:SS])
    #[arg(long, value_parser = parse_time_arg)]
    start: Option<DateTime<Utc>>,

    /// Range end (RFC 3339 or local YYYY-MM-DDTHH:MM[:SS])
    #[arg(long, value_parser = parse_time_arg)]
    end: Option<DateTime<Utc>>,
}

impl SearchArgs {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            start_time: self.start,
            end_time: self.end,
            query: self.query.clone().filter(|q| !q.trim().is_empty()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    // Initialize tracing on stderr so stdout stays clean for records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the application
    let result = run_app(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let config = Config::load(
        args.config.as_deref(),
        CliOverrides {
            endpoint: args.endpoint,
            buffer_size: args.buffer_size,
            initial_fetch: args.initial_fetch,
        },
    )?;
    debug!(?config, "configuration loaded");

    match args.command {
        Command::Tail { search } => run_tail(&config, search.criteria()).await,
        Command::Query { search, limit } => {
            run_query(&config, search.criteria(), limit.unwrap_or(config.buffer_size)).await
        }
    }
}

/// Interactive commands read from stdin
#[derive(Debug, PartialEq)]
enum Input {
    Search(String),
    Range(DateTime<Utc>, DateTime<Utc>),
    Clear,
    Reconnect,
    Status,
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let input = match command {
        "/search" => Input::Search(rest.to_string()),
        "/range" => {
            let mut parts = rest.split_whitespace();
            let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
                anyhow::bail!("usage: /range START END");
            };
            let start = parse_time_arg(start).map_err(anyhow::Error::msg)?;
            let end = parse_time_arg(end).map_err(anyhow::Error::msg)?;
            Input::Range(start, end)
        }
        "/clear" => Input::Clear,
        "/reconnect" => Input::Reconnect,
        "/status" => Input::Status,
        "/quit" | "/q" => Input::Quit,
        // Bare text is a search
        _ if !command.starts_with('/') => Input::Search(line.to_string()),
        other => anyhow::bail!("unknown command: {}", other),
    };
    Ok(Some(input))
}

async fn run_tail(config: &Config, initial: FilterCriteria) -> Result<()> {
    let backend = HttpBackend::new(&config.endpoint).context("Failed to create backend client")?;
    let (channel, events) =
        SocketIoChannel::new(config.channel_config()).context("Failed to create push channel")?;

    let tailer = Arc::new(LogTailer::start(
        config.engine_config(),
        Arc::new(backend),
        Box::new(channel),
        events,
    ));

    if !initial.is_empty() {
        spawn_search(&tailer, initial);
    }

    let mut revisions = tailer.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printer = ViewPrinter::new();
    refresh(&tailer, &mut printer)?;

    // Main event loop
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                refresh(&tailer, &mut printer)?;
            }

            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    // Keep tailing after EOF
                    stdin_open = false;
                    continue;
                };
                match parse_input(&line) {
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(input)) => handle_input(&tailer, input),
                    Ok(None) => {}
                    Err(e) => eprintln!("{:#}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tailer.shutdown();
    Ok(())
}

fn handle_input(tailer: &Arc<LogTailer>, input: Input) {
    match input {
        Input::Search(_) | Input::Range(..) => {
            if let Some(criteria) = refine(tailer.working_criteria(), &input) {
                spawn_search(tailer, criteria);
            }
        }
        Input::Clear => tailer.clear_filter(),
        Input::Reconnect => tailer.reconnect(),
        Input::Status => {
            eprintln!("[status] connection: {}", tailer.status());
            eprintln!(
                "[status] filtering: {}{}",
                tailer.is_filtering(),
                if tailer.is_loading() { " (search in flight)" } else { "" }
            );
            eprintln!("[status] records in view: {}", tailer.view().len());
            if let Some(err) = tailer.last_error() {
                eprintln!("[status] last error: {}", err);
            }
        }
        Input::Quit => {}
    }
}

/// Layer a search command over the criteria already requested, so a
/// query typed while a range search is in flight keeps the range
fn refine(base: FilterCriteria, input: &Input) -> Option<FilterCriteria> {
    match input {
        Input::Search(query) => Some(base.with_query(query.as_str())),
        Input::Range(start, end) => Some(base.with_start(*start).with_end(*end)),
        _ => None,
    }
}

/// Run a search without stalling output; failures show up as the error status
fn spawn_search(tailer: &Arc<LogTailer>, criteria: FilterCriteria) {
    let tailer = Arc::clone(tailer);
    tokio::spawn(async move {
        if let Err(e) = tailer.search(criteria).await {
            debug!(error = %e, "search failed");
        }
    });
}

fn refresh(tailer: &LogTailer, printer: &mut ViewPrinter) -> Result<()> {
    if let Some(line) = printer.status_change(tailer.status()) {
        eprintln!("{}", line);
    }
    if let Some(line) = printer.error_change(tailer.last_error()) {
        eprintln!("{}", line);
    }
    printer
        .emit(&tailer.view(), tailer.is_filtering(), &tailer.criteria())
        .context("Failed to write output")
}

async fn run_query(config: &Config, criteria: FilterCriteria, limit: usize) -> Result<()> {
    let backend = HttpBackend::new(&config.endpoint).context("Failed to create backend client")?;
    let raws = backend
        .query(&criteria, limit)
        .await
        .with_context(|| format!("Query against {} failed", backend.logs_url()))?;

    let normalizer = Normalizer::new();
    let filter = RecordFilter::new(&criteria);
    let now = Utc::now();
    for raw in raws {
        let record = normalizer.normalize_at(raw, now);
        if filter.matches(&record) {
            println!("{}", format_record(&record));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_input("/search disk error").unwrap(),
            Some(Input::Search("disk error".to_string()))
        );
        assert_eq!(parse_input("/clear").unwrap(), Some(Input::Clear));
        assert_eq!(parse_input("/reconnect").unwrap(), Some(Input::Reconnect));
        assert_eq!(parse_input("/status").unwrap(), Some(Input::Status));
        assert_eq!(parse_input("/quit").unwrap(), Some(Input::Quit));
        assert_eq!(parse_input("   ").unwrap(), None);
        assert_eq!(
            parse_input("timeout").unwrap(),
            Some(Input::Search("timeout".to_string()))
        );
        assert!(parse_input("/bogus").is_err());
    }

    #[test]
    fn test_parse_range() {
        let input = parse_input("/range 2024-01-15T10:00:00Z 2024-01-15T11:00:00Z").unwrap();
        assert_eq!(
            input,
            Some(Input::Range(
                Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap(),
            ))
        );
        assert!(parse_input("/range 2024-01-15T10:00:00Z").is_err());
        assert!(parse_input("/range soon later").is_err());
    }

    #[test]
    fn test_refine_keeps_other_half() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();

        let ranged = refine(FilterCriteria::new(), &Input::Range(start, end)).unwrap();
        let both = refine(ranged, &Input::Search("disk".to_string())).unwrap();
        assert_eq!(both.start_time, Some(start));
        assert_eq!(both.end_time, Some(end));
        assert_eq!(both.query(), Some("disk"));

        let later = end + chrono::Duration::hours(1);
        let moved = refine(both, &Input::Range(end, later)).unwrap();
        assert_eq!(moved.query(), Some("disk"));
        assert_eq!(moved.end_time, Some(later));

        assert!(refine(moved, &Input::Clear).is_none());
    }

    #[test]
    fn test_search_args_criteria() {
        let args = SearchArgs {
            query: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(args.criteria().is_empty());

        let args = Args::parse_from([
            "logscope",
            "query",
            "--query",
            "err",
            "--start",
            "2024-01-15T10:00:00Z",
            "--limit",
            "5",
        ]);
        let Command::Query { search, limit } = args.command else {
            panic!("expected query command");
        };
        assert_eq!(limit, Some(5));
        let criteria = search.criteria();
        assert_eq!(criteria.query(), Some("err"));
        assert!(criteria.start_time.is_some());
        assert!(criteria.end_time.is_none());
    }
}
