//! Tapdinner - shared household dinner planner
//!
//! CLI entry point.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tapdinner::cli::{Cli, Command, MemberCommand, SyncCommand};
use tapdinner::codec;
use tapdinner::config::Config;
use tapdinner::render;
use tapdinner::session::{PlannerEvent, PlannerHandle, PlannerSession};
use tapdinner::store::{FileSlots, LocalStore, MemorySlots};
use tapdinner::sync::{DisabledRemote, RemoteStore, SyncEvent, SyncEventBus, create_remote};
use tapdinner::week;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tapdinner")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tapdinner.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn open_local_store(config: &Config) -> LocalStore {
    let dir = config.storage.slot_dir();
    match FileSlots::open(&dir) {
        Ok(slots) => {
            debug!(dir = %dir.display(), "open_local_store: using file slots");
            LocalStore::new(slots)
        }
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "Local storage unavailable, changes will not persist");
            eprintln!(
                "{} Local storage unavailable ({}), changes will not persist",
                "!".yellow(),
                e
            );
            LocalStore::new(MemorySlots::new())
        }
    }
}

fn open_remote(config: &Config) -> Arc<dyn RemoteStore> {
    match create_remote(&config.sync) {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "Sync backend unavailable, running offline");
            Arc::new(DisabledRemote)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let bus = SyncEventBus::default();
    let sync_events = bus.subscribe();
    let session = PlannerSession::spawn(open_local_store(&config), open_remote(&config), Arc::new(bus.clone()));

    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Some(Command::Member { command }) => match command {
            MemberCommand::Add { name } => cmd_member_add(&session, &name).await,
            MemberCommand::Rm { member, yes } => cmd_member_rm(&session, &member, yes).await,
            MemberCommand::List => cmd_member_list(&session).await,
        },
        Some(Command::Mark { member, date }) => cmd_mark(&session, &member, &date).await,
        Some(Command::Week { offset }) => cmd_week(&session, offset).await,
        Some(Command::Sync { command }) => match command {
            SyncCommand::Set { passphrase } => cmd_sync_set(&session, &passphrase).await,
            SyncCommand::Show => cmd_sync_show(&session).await,
            SyncCommand::Off => cmd_sync_off(&session).await,
        },
        Some(Command::Watch) => cmd_watch(&session, bus.subscribe()).await,
        None => {
            debug!("main: no command specified, showing this week");
            cmd_week(&session, 0).await
        }
    };

    finish(&session, &config, sync_events).await;
    result
}

/// Let queued pushes drain, report sync failures, stop the session
async fn finish(session: &PlannerHandle, config: &Config, mut sync_events: broadcast::Receiver<SyncEvent>) {
    debug!("finish: called");
    // Every queued push and the listener registration may each take a full request timeout
    let pending = match session.sync_info().await {
        Ok(info) if info.channel.is_some() => info.pending_pushes + 1,
        _ => 1,
    };
    let timeout = config
        .sync
        .timeout()
        .saturating_mul(u32::try_from(pending).unwrap_or(u32::MAX));
    match tokio::time::timeout(timeout, session.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "finish: flush failed"),
        Err(_) => {
            warn!(?timeout, "Sync did not finish in time");
            eprintln!("{} Sync did not finish in time, changes are kept locally", "!".yellow());
        }
    }

    while let Ok(event) = sync_events.try_recv() {
        if event.is_error() {
            eprintln!("{} {}", "!".yellow(), event.status_line());
        }
    }

    if let Err(e) = session.shutdown().await {
        debug!(error = %e, "finish: shutdown failed");
    }
}

async fn cmd_member_add(session: &PlannerHandle, name: &str) -> Result<()> {
    debug!(%name, "cmd_member_add: called");
    let member = session.add_member(name).await?;
    println!("{} Added member: {}", "✓".green(), member.name.cyan());
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn cmd_member_rm(session: &PlannerHandle, id_or_name: &str, yes: bool) -> Result<()> {
    debug!(%id_or_name, yes, "cmd_member_rm: called");
    let Some(member) = session.find_member(id_or_name).await? else {
        bail!("No member named '{}'", id_or_name);
    };
    if !yes && !confirm(&format!("Remove {} and all of their marks?", member.name))? {
        println!("Cancelled");
        return Ok(());
    }
    if let Some(removal) = session.remove_member(&member.id).await? {
        println!(
            "{} Removed member: {} ({} marks)",
            "✓".green(),
            removal.member.name.cyan(),
            removal.pruned
        );
    }
    Ok(())
}

async fn cmd_member_list(session: &PlannerHandle) -> Result<()> {
    debug!("cmd_member_list: called");
    let members = session.members().await?;
    print!("{}", render::render_members(&members));
    Ok(())
}

async fn cmd_mark(session: &PlannerHandle, id_or_name: &str, date: &str) -> Result<()> {
    debug!(%id_or_name, %date, "cmd_mark: called");
    let Some(day) = codec::parse_iso_date(date) else {
        bail!("Invalid date '{}', expected YYYY-MM-DD", date);
    };
    let Some(member) = session.find_member(id_or_name).await? else {
        bail!("No member named '{}'", id_or_name);
    };

    let status = session.set_status(&member.id, day).await?;
    match status {
        Some(status) => println!("{} {}: {} ({})", member.name.cyan(), codec::format_date(day), status.symbol(), status),
        None => println!("{} {}: cleared", member.name.cyan(), codec::format_date(day)),
    }
    Ok(())
}

async fn cmd_week(session: &PlannerHandle, offset: i64) -> Result<()> {
    debug!(offset, "cmd_week: called");
    let today = Local::now().date_naive();
    let Some(target) = week::shift_weeks(today, offset) else {
        bail!("Week offset {} is out of range", offset);
    };
    session.show_week_of(target).await?;
    print!("{}", render::render_week(&session.week_view(today).await?));
    Ok(())
}

async fn cmd_sync_set(session: &PlannerHandle, passphrase: &str) -> Result<()> {
    debug!("cmd_sync_set: called");
    let channel = session.set_channel_secret(passphrase).await?;
    println!("{} Sync channel: {}", "✓".green(), channel.as_str().cyan());
    Ok(())
}

async fn cmd_sync_show(session: &PlannerHandle) -> Result<()> {
    debug!("cmd_sync_show: called");
    print!("{}", render::render_sync_info(&session.sync_info().await?));
    Ok(())
}

async fn cmd_sync_off(session: &PlannerHandle) -> Result<()> {
    debug!("cmd_sync_off: called");
    session.disconnect().await?;
    println!("{} Sync turned off", "✓".green());
    Ok(())
}

async fn cmd_watch(session: &PlannerHandle, mut sync_events: broadcast::Receiver<SyncEvent>) -> Result<()> {
    debug!("cmd_watch: called");
    let mut changes = session.subscribe_changes();
    let today = Local::now().date_naive();
    session.show_week_of(today).await?;
    print!("{}", render::render_week(&session.week_view(today).await?));
    println!("{}", "Watching for changes, Ctrl-C to stop".dimmed());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Watch interrupted");
                break;
            }
            change = changes.recv() => match change {
                Ok(PlannerEvent::RemoteApplied { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    let today = Local::now().date_naive();
                    println!();
                    print!("{}", render::render_week(&session.week_view(today).await?));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = sync_events.recv() => match event {
                Ok(event) if event.is_error() => eprintln!("{} {}", "!".yellow(), event.status_line()),
                Ok(event) => println!("{}", event.status_line().dimmed()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => debug!(skipped, "cmd_watch: sync events lagged"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
