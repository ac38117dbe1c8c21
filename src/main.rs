//! reading-session command line entry point.

use clap::Parser;
use reading_session::{
    BookType, EndSessionResult, HttpSessionService, ReadingPosition, SessionError,
    SessionManager, SessionState,
    config::{Cli, Command, Config},
    format_duration,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let mut config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.apply_overrides(&cli);

    // Logs go to stderr, command output to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reading_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Status => cmd_status(&config).await,
        Command::Today => cmd_today(&config).await,
        Command::Read {
            book_id,
            book_type,
            position,
            chapter,
        } => cmd_read(&config, book_id, book_type, position, chapter).await,
        Command::End => cmd_end(&config).await,
    }
}

/// Build a session manager talking to the configured server.
fn build_manager(config: &Config) -> anyhow::Result<SessionManager> {
    let service = HttpSessionService::new(config)?;
    Ok(SessionManager::new(
        Arc::new(service),
        config.session.heartbeat_interval(),
    ))
}

/// Write a default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let device_id = uuid::Uuid::new_v4().to_string();
    std::fs::write(&config_path, Config::generate_default(&device_id))?;
    println!("Created config file: {}", config_path.display());
    println!("Device id: {}", device_id);
    println!("\nSet [server] url and token, then run: reading-session read <book-id>");

    Ok(())
}

/// Show the server-side active session and today's total.
async fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let manager = build_manager(config)?;

    let active = manager.recover().await?;
    if let Err(e) = manager.refresh_today_duration().await {
        tracing::warn!(error = %e, "Failed to fetch today's reading time");
    }

    let state = manager.state();
    if active {
        print_state(&state);
    } else {
        println!("No active session.");
    }
    println!("Today: {}", format_duration(state.today_duration));

    Ok(())
}

/// Show today's total.
async fn cmd_today(config: &Config) -> anyhow::Result<()> {
    let manager = build_manager(config)?;
    let today = manager.refresh_today_duration().await?;
    println!("Today: {}", format_duration(today));
    Ok(())
}

/// End whatever session the server holds open.
async fn cmd_end(config: &Config) -> anyhow::Result<()> {
    let manager = build_manager(config)?;

    if !manager.recover().await? {
        println!("No active session.");
        return Ok(());
    }

    let result = manager.end_session(ReadingPosition::default()).await?;
    print_end(&result);
    Ok(())
}

/// Read a book interactively.
async fn cmd_read(
    config: &Config,
    book_id: i64,
    book_type: BookType,
    position: Option<String>,
    chapter: Option<u32>,
) -> anyhow::Result<()> {
    let manager = build_manager(config)?;

    // Pick up a session left open by a previous run
    if let Err(e) = manager.recover().await {
        tracing::warn!(error = %e, "Session recovery failed");
    }

    if manager.is_session_active_for_book(book_id, book_type) {
        println!("Continuing session for {} {}", book_type, book_id);
    } else {
        let position = ReadingPosition {
            position,
            chapter_index: chapter,
            pages_read: None,
        };
        let session_id = manager.start_session(book_id, book_type, position).await?;
        println!("Started session {} for {} {}", session_id, book_type, book_id);
    }

    spawn_minute_printer(&manager);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            break;
        };

        if !handle_command(&manager, line.trim()).await {
            break;
        }
    }

    match manager.end_session(ReadingPosition::default()).await {
        Ok(result) => print_end(&result),
        Err(SessionError::NoActiveSession) => {}
        Err(e) => println!("Session closed locally, server did not confirm: {}", e),
    }

    Ok(())
}

/// Run one interactive command. Returns false when the session should end.
async fn handle_command(manager: &SessionManager, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return true;
    };

    match command {
        "pause" | "p" => match manager.pause_session().await {
            Ok(()) => println!("Paused at {}", manager.formatted_duration()),
            Err(e) => println!("Pause failed: {}", e),
        },
        "resume" | "r" => match manager.resume_session().await {
            Ok(()) => println!("Resumed at {}", manager.formatted_duration()),
            Err(e) => println!("Resume failed: {}", e),
        },
        "pos" => {
            let position = ReadingPosition {
                position: parts.next().map(str::to_string),
                chapter_index: parts.next().and_then(|c| c.parse().ok()),
                pages_read: parts.next().and_then(|p| p.parse().ok()),
            };
            manager.update_position(position);
            println!("Position updated");
        }
        "flush" | "f" => match manager.flush().await {
            Ok(()) => println!("Synced: {}", manager.formatted_duration()),
            Err(e) => println!("Sync failed: {}", e),
        },
        "status" | "s" => print_state(&manager.state()),
        "end" | "quit" | "q" => return false,
        "help" | "h" | "?" => print_help(),
        other => println!("Unknown command: {} (try 'help')", other),
    }

    true
}

/// Print the session duration on every new minute.
fn spawn_minute_printer(manager: &SessionManager) {
    let mut rx = manager.subscribe();

    tokio::spawn(async move {
        let mut last_minute = None;

        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if !state.is_running() {
                continue;
            }

            let minute = state.duration_seconds / 60;
            if last_minute != Some(minute) {
                last_minute = Some(minute);
                println!("  reading {}", state.formatted_duration());
            }
        }
    });
}

fn print_help() {
    println!("Commands: pause, resume, pos <position> [chapter] [pages], flush, status, end");
}

fn print_state(state: &SessionState) {
    let (Some(session_id), Some(book_id)) = (state.session_id, state.book_id) else {
        println!("No active session.");
        return;
    };

    let book_type = state.book_type.map(|t| t.as_str()).unwrap_or("unknown");
    let started = state
        .start_time
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("{:<12} {}", "SESSION", session_id);
    println!("{:<12} {} {}", "BOOK", book_type, book_id);
    println!("{:<12} {}", "STARTED", started);
    println!("{:<12} {}", "DURATION", state.formatted_duration());
    println!(
        "{:<12} {}",
        "STATE",
        if state.is_paused { "paused" } else { "reading" }
    );
    println!("{:<12} {}", "TODAY", format_duration(state.today_duration));
}

fn print_end(result: &EndSessionResult) {
    println!(
        "Session ended: {} (today {})",
        format_duration(result.duration_seconds),
        format_duration(result.today_duration)
    );

    for milestone in &result.milestones {
        println!("  Milestone unlocked: {}", milestone.description);
    }
}
