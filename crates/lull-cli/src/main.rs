mod listener;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::{env, fs, io, path::Path, process::Command, thread::sleep, time};
use sysinfo::{Pid, System};
use tabled::{Table, Tabled};
use tokio::sync::mpsc;

use lull_core::{
    config::get_data_dir,
    ipc::{self, EngineIpcHandler, IpcClient, IpcRequest, IpcResponse, StatusMirror},
    ActivityAggregator, Engine, EngineCommand, EngineEvent, NullProbe,
};
use lull_storage::Database;

#[derive(Parser)]
#[command(name = "lull")]
#[command(about = "Activity-aware break reminders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the break reminder daemon
    Start,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Stop the break reminder daemon
    Stop,
    /// Check daemon status and per-break countdowns
    Status,
    /// Work session control
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Respond to the current break prompt
    Break {
        #[command(subcommand)]
        action: BreakAction,
    },
    /// Pause break scheduling
    Pause {
        /// Minutes to pause for (indefinite if omitted)
        #[arg(short, long)]
        minutes: Option<u64>,
    },
    /// Resume break scheduling
    Resume,
    /// Update a setting (e.g. `micro_break_interval 1200`)
    Set {
        /// Setting key
        key: String,
        /// Value to set
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Start a work session
    Start,
    /// Pause the current session
    Pause,
    /// Resume a paused session
    Resume,
    /// End the current session
    End,
}

#[derive(Subcommand, Debug)]
enum BreakAction {
    /// Mark the pending break as taken
    Complete,
    /// Push the pending break back by a few minutes
    Snooze {
        /// Minutes to snooze for
        #[arg(short, long, default_value = "5")]
        minutes: u64,
    },
    /// Dismiss the pending break
    Skip,
}

#[derive(Tabled)]
struct BreakRow {
    #[tabled(rename = "Break")]
    category: String,
    #[tabled(rename = "Interval")]
    interval: String,
    #[tabled(rename = "Next in")]
    remaining: String,
    #[tabled(rename = "Progress")]
    progress: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;

    match cli.command {
        Commands::Start => start_daemon(&data_dir),
        Commands::DaemonInternalStart => run_daemon_process().await,
        Commands::Stop => stop_daemon(&data_dir).await,
        Commands::Status => show_status(&data_dir).await,
        Commands::Session { action } => {
            let command = match action {
                SessionAction::Start => EngineCommand::StartSession,
                SessionAction::Pause => EngineCommand::PauseSession,
                SessionAction::Resume => EngineCommand::ResumeSession,
                SessionAction::End => EngineCommand::EndSession,
            };
            send_engine_command(&data_dir, command).await
        }
        Commands::Break { action } => {
            let command = match action {
                BreakAction::Complete => EngineCommand::CompleteBreak,
                BreakAction::Snooze { minutes } => EngineCommand::SnoozeBreak { minutes },
                BreakAction::Skip => EngineCommand::SkipBreak,
            };
            send_engine_command(&data_dir, command).await
        }
        Commands::Pause { minutes } => {
            send_engine_command(&data_dir, EngineCommand::Pause { minutes }).await
        }
        Commands::Resume => send_engine_command(&data_dir, EngineCommand::Resume).await,
        Commands::Set { key, value } => set_setting(&data_dir, key, value).await,
    }
}

fn start_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join("lull.pid");
    let sock_path = data_dir.join("lull.sock");

    // 1. Check if daemon is already running
    if pid_file_path.exists() {
        if let Ok(pid_str) = fs::read_to_string(&pid_file_path) {
            if let Ok(pid) = pid_str.trim().parse::<usize>() {
                let mut sys = System::new();
                if sys.refresh_process(Pid::from(pid)) {
                    log::info!("Daemon is already running (PID: {pid}).");
                    return Ok(());
                }
            }
        }
        // If pid file is stale, remove it
        log::warn!("Removing stale PID file.");
        let _ = fs::remove_file(&pid_file_path);
    }

    // 2. Clean up old socket if it exists
    if sock_path.exists() {
        log::warn!("Removing stale socket file.");
        fs::remove_file(&sock_path)?;
    }

    log::info!("Starting lull daemon...");

    // 3. Spawn a new process for the daemon
    let current_exe = env::current_exe()?;
    let current_dir = env::current_dir()?;
    let child = Command::new(current_exe)
        .arg("daemon-internal-start")
        .current_dir(current_dir)
        .spawn()?;

    // 4. In parent process, write PID and exit
    log::info!("Daemon process started with PID: {}", child.id());
    fs::write(&pid_file_path, child.id().to_string())?;

    Ok(())
}

async fn run_daemon_process() -> Result<()> {
    // This is the detached daemon process; logging has to be re-initialized
    // here because it is a new process.
    if let Err(e) = setup_daemon_logging() {
        // Without logging there is no way to report errors.
        panic!("Failed to set up daemon logging: {e}");
    }
    log::info!("Daemon process started internally.");

    if let Err(e) = daemon_main_logic().await {
        log::error!("Daemon exited with a fatal error: {e:#}");
        return Err(e);
    }

    Ok(())
}

async fn daemon_main_logic() -> Result<()> {
    let database = Arc::new(Database::new(Some(Database::default_db_path()))?);
    let aggregator = Arc::new(ActivityAggregator::new());
    listener::spawn(aggregator.clone());

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let status_mirror = StatusMirror::default();
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut engine = Engine::new(
        database,
        aggregator,
        Box::new(NullProbe),
        command_rx,
        event_tx,
        status_mirror.clone(),
        shutdown.clone(),
    );

    let handler = Arc::new(EngineIpcHandler::new(
        command_tx,
        status_mirror,
        shutdown.clone(),
    ));
    let sock_path = get_data_dir()?.join("lull.sock");
    tokio::spawn(async move {
        if let Err(e) = ipc::listen(handler, &sock_path).await {
            log::error!("IPC listener failed: {e}");
        }
    });

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                EngineEvent::BreakDue {
                    category,
                    duration_seconds,
                    ..
                } => {
                    log::info!("Break due: {} ({duration_seconds}s)", category.as_str());
                }
                EngineEvent::StateChange { state } => {
                    log::info!("Activity state: {}", state.as_str());
                }
                EngineEvent::Metrics { .. } => {}
                other => log::debug!("Event: {other:?}"),
            }
        }
    });

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received interrupt, shutting down.");
            ctrl_c_shutdown.store(true, Ordering::SeqCst);
        }
    });

    engine.run().await
}

async fn stop_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join("lull.pid");
    let sock_path = data_dir.join("lull.sock");

    if !pid_file_path.exists() {
        log::info!("Daemon is not running (no PID file).");
        // Also remove socket if it exists for consistency
        if sock_path.exists() {
            fs::remove_file(&sock_path)?;
        }
        return Ok(());
    }

    let pid_str = fs::read_to_string(&pid_file_path)?;
    let pid = pid_str
        .trim()
        .parse::<usize>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    log::info!("Stopping lull daemon (PID: {pid})...");
    let client = IpcClient::new(&sock_path);

    match client.send_command(IpcRequest::Shutdown).await {
        Ok(IpcResponse::Ack) => {
            log::info!("Daemon shutdown signal sent. Waiting for process to exit...");
            sleep(time::Duration::from_secs(2));

            let mut sys = System::new();
            if sys.refresh_process(Pid::from(pid)) {
                log::warn!("Daemon did not stop gracefully. Force killing...");
                if let Some(process) = sys.process(Pid::from(pid)) {
                    process.kill();
                }
            } else {
                log::info!("Daemon stopped successfully.");
            }
        }
        Ok(resp) => log::error!("Received unexpected response from daemon: {resp:?}"),
        Err(e) => {
            log::error!("Failed to send shutdown command: {e}. Forcing cleanup.");
            let mut sys = System::new();
            if sys.refresh_process(Pid::from(pid)) {
                if let Some(process) = sys.process(Pid::from(pid)) {
                    process.kill();
                    log::info!("Process killed.");
                }
            }
        }
    }

    // Cleanup
    fs::remove_file(&pid_file_path)?;
    if sock_path.exists() {
        fs::remove_file(&sock_path)?;
    }

    Ok(())
}

async fn show_status(data_dir: &Path) -> Result<()> {
    let sock_path = data_dir.join("lull.sock");

    if !sock_path.exists() {
        println!("Daemon Status: Not running");
        return Ok(());
    }

    let client = IpcClient::new(&sock_path);
    match client.send_command(IpcRequest::Status).await {
        Ok(IpcResponse::Status(Some(status))) => {
            println!("Daemon Status: Running");
            println!("Session: {}", status.session_state.as_str());
            println!("Timer mode: {}", status.timer_mode.as_str());
            if status.paused {
                println!("Scheduling: paused");
            }
            if let Some(category) = status.pending {
                println!("Pending break: {}", category.as_str());
            }

            let hours = status.active_time_seconds / 3600;
            let minutes = (status.active_time_seconds % 3600) / 60;
            let seconds = status.active_time_seconds % 60;
            println!("Active time: {hours:02}:{minutes:02}:{seconds:02}");

            let rows: Vec<BreakRow> = status
                .breaks
                .iter()
                .map(|b| BreakRow {
                    category: b.category.as_str().to_string(),
                    interval: format_duration(u64::from(b.interval_seconds)),
                    remaining: format_duration(b.remaining_seconds),
                    progress: format!("{:.0}%", b.progress * 100.0),
                })
                .collect();

            let table = Table::new(rows).to_string();
            println!("\n{table}");
        }
        Ok(IpcResponse::Status(None)) => {
            println!("Daemon Status: Starting up");
        }
        Ok(_) => anyhow::bail!("Unexpected response from daemon"),
        Err(e) => {
            log::error!("Failed to get status: {e}");
            println!("Daemon Status: Not running (or not responding)");
        }
    }
    Ok(())
}

async fn send_engine_command(data_dir: &Path, command: EngineCommand) -> Result<()> {
    let sock_path = data_dir.join("lull.sock");

    if !sock_path.exists() {
        println!("Daemon is not running. Start it with `lull start`.");
        return Ok(());
    }

    let client = IpcClient::new(&sock_path);
    match client.send_command(IpcRequest::Command(command)).await? {
        IpcResponse::Ack => {
            println!("Done.");
            Ok(())
        }
        IpcResponse::Error(message) => anyhow::bail!("Daemon rejected command: {message}"),
        resp => anyhow::bail!("Unexpected response from daemon: {resp:?}"),
    }
}

/// Route a setting change to the running daemon, or straight into the
/// settings store when no daemon is up.
async fn set_setting(data_dir: &Path, key: String, value: String) -> Result<()> {
    let sock_path = data_dir.join("lull.sock");

    if sock_path.exists() {
        return send_engine_command(data_dir, EngineCommand::UpdateSetting { key, value }).await;
    }

    let db = Database::new(Some(Database::default_db_path()))?;
    db.set_setting(&key, &value)?;
    println!("Saved. Takes effect when the daemon starts.");
    Ok(())
}

fn setup_daemon_logging() -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = get_data_dir()?.join("lull.log");

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .init();

    Ok(())
}

fn format_duration(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m 00s");
        assert_eq!(format_duration(95), "1m 35s");
        assert_eq!(format_duration(1200), "20m 00s");
        assert_eq!(format_duration(2700), "45m 00s");
        assert_eq!(format_duration(3661), "1h 01m");
    }

    #[test]
    fn test_pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("lull.pid");

        fs::write(&pid_file, std::process::id().to_string()).unwrap();
        let pid = fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse::<usize>()
            .unwrap();
        assert_eq!(pid, std::process::id() as usize);
    }
}
