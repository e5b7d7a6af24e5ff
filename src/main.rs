use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use todod::cli::client::DaemonClient;
use todod::{config::ServerConfig, ipc, ipc::event::EventBroadcaster, store::Storage, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "todod",
    about = "todod — local todo-list daemon with a JSON-RPC WebSocket API",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "TODOD_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "TODOD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TODOD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TODOD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TODOD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// Suppress progress and informational output.
    ///
    /// Errors are still printed to stderr. JSON output (--json flags) is
    /// unaffected. Use this flag when piping output to other tools.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs todod in the foreground.
    ///
    /// Examples:
    ///   todod serve
    ///   todod
    Serve,
    /// Show daemon status (version, uptime, todo count).
    Status {
        /// Print the raw JSON status document
        #[arg(long)]
        json: bool,
    },
    /// List all todos.
    ///
    /// Examples:
    ///   todod list
    ///   todod list --json
    List {
        /// Print the raw JSON records
        #[arg(long)]
        json: bool,
    },
    /// Create a todo.
    ///
    /// Examples:
    ///   todod add "Buy milk"
    ///   todod add "Buy milk" --description "2 liters, skim"
    Add {
        title: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },
    /// Mark a todo completed.
    Done {
        id: i64,
    },
    /// Mark a completed todo as open again.
    Reopen {
        id: i64,
    },
    /// Delete a todo.
    Rm {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        command,
        port,
        data_dir,
        log,
        bind_address,
        log_file,
        quiet,
    } = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = log.as_deref().unwrap_or("info").to_owned();
    let log_format = std::env::var("TODOD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, log_file.as_deref(), &log_format);

    match command {
        Some(Command::Status { json }) => {
            run_status(&cli_config(port, data_dir), json).await?;
        }
        Some(Command::List { json }) => {
            run_list(&cli_config(port, data_dir), json).await?;
        }
        Some(Command::Add { title, description }) => {
            run_add(
                &cli_config(port, data_dir),
                &title,
                description.as_deref(),
                quiet,
            )
            .await?;
        }
        Some(Command::Done { id }) => {
            run_set_completed(&cli_config(port, data_dir), id, true, quiet).await?;
        }
        Some(Command::Reopen { id }) => {
            run_set_completed(&cli_config(port, data_dir), id, false, quiet).await?;
        }
        Some(Command::Rm { id }) => {
            run_rm(&cli_config(port, data_dir), id, quiet).await?;
        }
        None | Some(Command::Serve) => {
            run_server(port, data_dir, log, bind_address).await?;
        }
    }

    Ok(())
}

/// Config for client subcommands — quiet logging, same port resolution as the server.
fn cli_config(port: Option<u16>, data_dir: Option<std::path::PathBuf>) -> ServerConfig {
    ServerConfig::new(port, data_dir, Some("error".to_string()), None)
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("todod.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(log_level)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(log_level)
                    .compact()
                    .init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .init();
        }
        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .init();
        None
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}

// ── Panic hook + crash log ────────────────────────────────────────────────────

/// Install a custom panic hook that writes panic info to `{data_dir}/crash.log`.
///
/// The crash log is checked and removed on the next startup (`check_crash_log`).
fn install_panic_hook(data_dir: std::path::PathBuf) {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Call the original hook first (prints to stderr).
        original(info);

        let crash_path = data_dir.join("crash.log");
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("unknown panic");
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let report = format!(
            "todod {} panicked at {location}\n{msg}\n",
            env!("CARGO_PKG_VERSION")
        );
        let _ = std::fs::write(&crash_path, report);
    }));
}

/// If the previous run left a crash log behind, report it and remove it.
fn check_crash_log(data_dir: &std::path::Path) {
    let crash_path = data_dir.join("crash.log");
    if let Ok(report) = std::fs::read_to_string(&crash_path) {
        tracing::warn!(report = %report.trim(), "previous run crashed");
        let _ = std::fs::remove_file(&crash_path);
    }
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "todod starting");

    let config = Arc::new(ServerConfig::new(port, data_dir, log, bind_address));
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "config loaded"
    );

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.data_dir.display()
        )
    })?;
    install_panic_hook(config.data_dir.clone());
    check_crash_log(&config.data_dir);

    let storage = Arc::new(
        Storage::new_with_slow_query(
            &config.data_dir,
            config.observability.slow_query_threshold_ms,
        )
        .await?,
    );

    let broadcaster = Arc::new(EventBroadcaster::new());
    let ctx = Arc::new(AppContext {
        config,
        storage,
        broadcaster,
        started_at: std::time::Instant::now(),
    });

    ipc::run(ctx).await
}

// ── Client subcommands ────────────────────────────────────────────────────────

async fn connect(config: &ServerConfig) -> Result<DaemonClient> {
    let client = DaemonClient::new(config.port);
    if !client.is_reachable().await {
        anyhow::bail!(
            "daemon not reachable on port {} — start it with `todod serve`",
            client.port()
        );
    }
    Ok(client)
}

async fn run_status(config: &ServerConfig, as_json: bool) -> Result<()> {
    let client = connect(config).await?;
    let status = client.call_once("daemon.status", json!({})).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "todod {} — up {}s, {} todo(s), port {}",
            status["version"].as_str().unwrap_or("?"),
            status["uptime"].as_u64().unwrap_or(0),
            status["todoCount"].as_i64().unwrap_or(0),
            status["port"].as_u64().unwrap_or(0),
        );
    }
    Ok(())
}

async fn run_list(config: &ServerConfig, as_json: bool) -> Result<()> {
    let client = connect(config).await?;
    let result = client.call_once("todo.list", json!({})).await?;
    let todos = result["todos"].as_array().cloned().unwrap_or_default();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&todos)?);
        return Ok(());
    }

    if todos.is_empty() {
        println!("no todos");
        return Ok(());
    }
    for todo in &todos {
        let mark = if todo["completed"].as_bool().unwrap_or(false) {
            "x"
        } else {
            " "
        };
        let id = todo["id"].as_i64().unwrap_or(0);
        let title = todo["title"].as_str().unwrap_or("");
        match todo["description"].as_str() {
            Some(desc) => println!("[{mark}] {id:>4}  {title}  ({desc})"),
            None => println!("[{mark}] {id:>4}  {title}"),
        }
    }
    Ok(())
}

async fn run_add(
    config: &ServerConfig,
    title: &str,
    description: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let client = connect(config).await?;
    let result = client
        .call_once(
            "todo.create",
            json!({ "title": title, "description": description }),
        )
        .await?;
    if !quiet {
        println!("created todo {}", result["todo"]["id"]);
    }
    Ok(())
}

async fn run_set_completed(
    config: &ServerConfig,
    id: i64,
    completed: bool,
    quiet: bool,
) -> Result<()> {
    let client = connect(config).await?;
    let result = client
        .call_once("todo.update", json!({ "id": id, "completed": completed }))
        .await?;
    if !quiet {
        let state = if completed { "done" } else { "open" };
        println!(
            "todo {} is now {state}: {}",
            id,
            result["todo"]["title"].as_str().unwrap_or("")
        );
    }
    Ok(())
}

async fn run_rm(config: &ServerConfig, id: i64, quiet: bool) -> Result<()> {
    let client = connect(config).await?;
    client.call_once("todo.delete", json!({ "id": id })).await?;
    if !quiet {
        println!("deleted todo {id}");
    }
    Ok(())
}
