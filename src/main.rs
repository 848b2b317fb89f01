use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use desksession::db::helpers::parse_status;
use desksession::db::Session;
use desksession::{data_dir, init_logging, run_daemon, App};

#[derive(Parser)]
#[command(name = "desksession")]
#[command(about = "Tracks work sessions across virtual desktops and restores them")]
#[command(version)]
struct Cli {
    /// Where the database and settings live
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track desktops until interrupted
    Run,
    /// List stored sessions
    List {
        #[arg(long)]
        json: bool,
        /// Only sessions in this state (active, paused, idle)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show counts and accrued time for a session
    Stats { session_id: String },
    /// Show what a restore would reopen
    Preview { session_id: String },
    /// Reopen a session's latest snapshot
    Restore {
        session_id: String,
        /// Restore onto the current desktop
        #[arg(long, conflicts_with = "new_desktop")]
        here: bool,
        /// Restore onto a freshly created desktop
        #[arg(long)]
        new_desktop: bool,
    },
    Rename { session_id: String, name: String },
    Describe {
        session_id: String,
        description: String,
    },
    /// Set the icon shown next to a session
    Icon { session_id: String, icon: String },
    Delete { session_id: String },
    /// Snapshot history, newest first
    Snapshots {
        session_id: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let dir = match cli.data_dir {
        Some(dir) => dir,
        None => data_dir()?,
    };
    let app = App::open(dir)?;

    match cli.command {
        Command::Run => run_daemon(&app).await?,
        Command::List { json, status } => {
            let sessions = match status {
                Some(raw) => {
                    app.db
                        .get_sessions_by_status(parse_status(&raw.to_lowercase())?)
                        .await?
                }
                None => app.manager.get_all_sessions().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No sessions yet.");
            } else {
                for session in &sessions {
                    print_session_line(session);
                }
            }
        }
        Command::Stats { session_id } => {
            require_session(&app, &session_id).await?;
            let stats = app.manager.get_session_stats(&session_id).await?;
            println!("windows:  {}", stats.window_count);
            println!("tabs:     {}", stats.tab_count);
            println!("apps:     {} ({})", stats.app_count, stats.apps.join(", "));
            println!("time:     {}", stats.duration);
        }
        Command::Preview { session_id } => {
            let lines = app.restore_engine().preview(&session_id).await?;
            if lines.is_empty() {
                println!("Nothing to restore.");
            }
            for line in lines {
                println!("{line}");
            }
        }
        Command::Restore {
            session_id,
            here,
            new_desktop,
        } => {
            app.ensure_no_daemon("restore")?;
            let on_new_desktop = if here {
                false
            } else {
                new_desktop || app.settings.daemon().restore_new_desktop
            };
            let summary = app
                .restore_engine()
                .restore_session(&session_id, on_new_desktop)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Rename { session_id, name } => {
            app.db.rename_session(&session_id, &name).await?;
            println!("Renamed {session_id} to '{}'", name.trim());
        }
        Command::Describe {
            session_id,
            description,
        } => {
            app.db
                .update_session_description(&session_id, &description)
                .await?;
        }
        Command::Icon { session_id, icon } => {
            app.db.update_session_icon(&session_id, &icon).await?;
        }
        Command::Delete { session_id } => {
            app.ensure_no_daemon("deleteSession")?;
            if !app.manager.delete_session(&session_id).await? {
                bail!("Session not found: {session_id}");
            }
            println!("Deleted {session_id}");
        }
        Command::Snapshots { session_id, limit } => {
            require_session(&app, &session_id).await?;
            for snapshot in app.db.list_snapshots(&session_id, limit).await? {
                println!(
                    "{}  {:>3} windows  {:>3} tabs",
                    snapshot.captured_at.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.window_count,
                    snapshot.tab_count
                );
            }
        }
    }
    Ok(())
}

async fn require_session(app: &App, session_id: &str) -> Result<Session> {
    match app.db.get_session(session_id).await? {
        Some(session) => Ok(session),
        None => bail!("Session not found: {session_id}"),
    }
}

fn print_session_line(session: &Session) {
    let icon = if session.icon.is_empty() {
        " "
    } else {
        session.icon.as_str()
    };
    println!(
        "{icon} {:<36}  {:<24}  {:<7}  {}",
        session.id,
        session.name,
        session.status.as_str(),
        desksession::db::format_duration(session.total_seconds)
    );
}
