//! linenote: review a source file line by line in the terminal.
//!
//! Entry point for the `linenote` binary. Wires together the terminal
//! lifecycle (`tui`), the unified event bus (`event`), the UI (`ui`), the
//! theme system (`theme`) and the review engine in `linenote-core`.
//!
//! # Startup sequence
//!
//! 1. Parse arguments and load config. Both are read-only and safe before
//!    terminal init.
//! 2. Initialise logging to a file in the data directory. Nothing may write
//!    to the terminal once the alternate screen is active.
//! 3. Read and highlight the file, then reflow it into numbered lines. A
//!    structural error aborts here, before the terminal is touched.
//! 4. Open the comment store (SQLite file or web application).
//! 5. `install_panic_hook()`, `register_sigterm()`, `init_tui()`.
//! 6. Spawn the event task and announce that every line is numbered; the
//!    loop answers that by fetching comments.
//!
//! `restore_tui()` runs after the event loop exits on every path: `q`,
//! SIGTERM, channel close and draw errors. The panic hook covers panics.

mod app;
mod config;
mod event;
mod markup;
mod remote;
mod theme;
mod tui;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use linenote_core::db::{Author, SqliteTransport};
use linenote_core::highlight::highlight_to_markup;
use linenote_core::http::HttpTransport;
use linenote_core::surface::{ReviewSurface, SurfaceEvent};
use linenote_core::types::{FileId, Role, UserId, ViewerContext};
use linenote_core::{CommentTransport, RemoteSyncClient};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::app::RemoteOp;
use crate::config::Config;
use crate::event::AppEvent;
use crate::ui::keybindings::KeyAction;

/// Review a source file line by line: comment, move and delete comments.
#[derive(Debug, Parser)]
#[command(name = "linenote", version)]
struct Args {
    /// File to review.
    file: PathBuf,

    /// Identity of the file in the comment store. Defaults to the path as given.
    #[arg(long)]
    file_id: Option<String>,

    /// Web application to load and store comments with.
    #[arg(long, env = "LINENOTE_REMOTE", conflicts_with = "db")]
    remote: Option<String>,

    /// SQLite comment database. Defaults to `comments.db` in the data directory.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Exercise the file belongs to; scopes common comments.
    #[arg(long)]
    exercise: Option<i64>,

    /// User id of the submission's author. Defaults to the viewer.
    #[arg(long)]
    solver: Option<UserId>,

    /// Override the configured user id.
    #[arg(long)]
    user: Option<UserId>,

    /// Override the configured role (student, staff, administrator).
    #[arg(long, value_parser = parse_role)]
    role: Option<Role>,

    /// Disallow new comments by non-staff viewers.
    #[arg(long)]
    closed: bool,

    /// UI theme (dark, catppuccin-mocha).
    #[arg(long)]
    theme: Option<String>,

    /// Config file to read instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::from_name(raw).ok_or_else(|| format!("unknown role '{raw}'"))
}

/// Sends logs to `linenote.log` in the data directory.
///
/// The returned guard flushes the writer on drop and must outlive the
/// event loop.
fn init_logging(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "linenote.log"));
    let filter = EnvFilter::try_from_env("LINENOTE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn viewer_for(args: &Args, config: &Config, file_id: FileId) -> ViewerContext {
    let user_id = args.user.unwrap_or(config.viewer.user_id);
    ViewerContext {
        file_id,
        user_id,
        user_name: config.viewer.name.clone(),
        role: args.role.unwrap_or(config.viewer.role),
        solver_id: args.solver.unwrap_or(user_id),
        comments_permitted: config.viewer.comments_permitted && !args.closed,
    }
}

/// Picks the comment store: `--db`, then `--remote`, then the configured
/// web application, then the default database file.
async fn open_transport(
    args: &Args,
    config: &Config,
    viewer: &ViewerContext,
    data_dir: &Path,
) -> Result<Arc<dyn CommentTransport>> {
    let remote = args.remote.clone().or_else(|| config.remote.base_url.clone());
    if let (None, Some(base_url)) = (&args.db, remote) {
        info!(%base_url, "using web comment store");
        let timeout = Duration::from_secs(config.remote.timeout_secs);
        let transport = HttpTransport::new(base_url, timeout).context("building HTTP client")?;
        return Ok(Arc::new(transport));
    }

    let path = args.db.clone().unwrap_or_else(|| data_dir.join("comments.db"));
    info!(path = %path.display(), "using local comment store");
    let author = Author { id: viewer.user_id, name: viewer.user_name.clone(), role: viewer.role };
    let mut transport = SqliteTransport::open(&path.to_string_lossy(), author)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    if let Some(exercise) = args.exercise {
        transport = transport.with_exercise(exercise);
    }
    Ok(Arc::new(transport))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let config = config::load(&config_path);
    let data_dir = config::data_dir();
    let _log_guard = init_logging(&data_dir)?;

    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let extension = args.file.extension().and_then(|e| e.to_str()).unwrap_or("txt");
    let markup = highlight_to_markup(&source, extension, &config.syntax_theme);

    let file_id = FileId(args.file_id.clone().unwrap_or_else(|| args.file.display().to_string()));
    let viewer = viewer_for(&args, &config, file_id.clone());
    let (surface, SurfaceEvent::LinesNumbered { count }) = ReviewSurface::new(&markup, viewer.clone())
        .with_context(|| format!("laying out {}", args.file.display()))?;

    let transport = open_transport(&args, &config, &viewer, &data_dir).await?;
    let client = RemoteSyncClient::new(transport, file_id);

    let theme = theme::Theme::from_name(args.theme.as_deref().unwrap_or(&config.theme));
    let file_name = args
        .file
        .file_name()
        .map_or_else(|| args.file.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut state = app::AppState::new(surface, file_name);

    tui::install_panic_hook();
    let term_flag = tui::register_sigterm();
    let mut terminal = tui::init_tui()?;

    let handler = event::EventHandler::new();
    event::spawn_event_task(handler.tx.clone());
    let remote = remote::Remote::new(client, viewer, args.exercise, handler.tx.clone());
    let _ = handler.tx.send(AppEvent::LinesNumbered { count });
    let mut rx = handler.rx;

    let mut outcome = Ok(());

    // Exits only via `break`, so `restore_tui()` below is always reached.
    'event_loop: loop {
        tokio::select! {
            // Heartbeat: SIGTERM is checked at least every 50ms even when no
            // other event arrives.
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                if term_flag.load(Ordering::Relaxed) {
                    break 'event_loop;
                }
            }
            maybe_event = rx.recv() => {
                let action = match maybe_event {
                    Some(AppEvent::Render) => {
                        if let Err(err) = terminal.draw(|frame| ui::render(frame, &mut state, &theme)) {
                            error!(error = %err, "draw failed");
                            outcome = Err(err.into());
                            break 'event_loop;
                        }
                        KeyAction::Continue
                    }
                    Some(AppEvent::Key(key)) => ui::keybindings::handle_key(key, &mut state),
                    Some(AppEvent::Mouse(mouse)) => ui::keybindings::handle_mouse(mouse, &mut state),
                    Some(AppEvent::Tick) => {
                        state.tick();
                        KeyAction::Continue
                    }
                    Some(AppEvent::LinesNumbered { count }) => {
                        info!(lines = count, "fetching comments");
                        KeyAction::Remote(RemoteOp::Fetch)
                    }
                    Some(AppEvent::Sync(done)) => {
                        state.apply_sync(done);
                        KeyAction::Continue
                    }
                    // The next Render picks up the new size from frame.area().
                    Some(AppEvent::Resize(_, _)) => KeyAction::Continue,
                    Some(AppEvent::Quit) | None => KeyAction::Quit,
                };
                match action {
                    KeyAction::Quit => break 'event_loop,
                    KeyAction::Remote(op) => remote.spawn(op),
                    KeyAction::Continue => {}
                }
                if term_flag.load(Ordering::Relaxed) {
                    break 'event_loop;
                }
            }
        }
    }

    tui::restore_tui()?;
    outcome
}
