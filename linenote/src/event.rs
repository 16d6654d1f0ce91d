//! Event bus for linenote.
//!
//! All user input, timer ticks, and results of comment-store calls are
//! normalised into a single `AppEvent` enum and sent over a tokio unbounded
//! MPSC channel. The main loop receives from this channel and dispatches
//! accordingly, so local state is only ever touched from one place.
//!
//! Two independent intervals drive the render and logic cycles:
//! - **Render interval** (33 ms ≈ 30 FPS) triggers a `terminal.draw()` call.
//! - **Tick interval** (250 ms = 4 Hz) expires status messages.

use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind, MouseEvent};
use futures::{FutureExt, StreamExt};
use linenote_core::error::SyncError;
use linenote_core::sync::{Fetched, Mutation};
use linenote_core::types::{CommentId, CommonComment};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// All events the application can receive from any source.
#[derive(Debug)]
pub enum AppEvent {
    /// A key press from the terminal (`KeyEventKind::Press` only).
    ///
    /// Release and repeat events are filtered in [`spawn_event_task`] to avoid
    /// double-firing on Windows, which synthesises both press and release for
    /// every keystroke.
    Key(KeyEvent),
    /// A mouse event from the terminal (click, drag, move, scroll).
    Mouse(MouseEvent),
    /// Terminal was resized to (columns, rows).
    Resize(u16, u16),
    /// Logic tick for state updates (4 Hz / 250 ms).
    Tick,
    /// Render tick, triggers a `terminal.draw()` call (≈30 FPS / 33 ms).
    Render,
    /// Every source line is numbered; the initial fetch may start.
    LinesNumbered { count: usize },
    /// A comment-store call finished.
    Sync(SyncDone),
    /// Quit signal (from `q` key or SIGTERM).
    Quit,
}

/// Outcome of one call to the comment store.
#[derive(Debug)]
pub enum SyncDone {
    Fetched(Fetched),
    Created(Result<Mutation, SyncError>),
    Deleted {
        id: CommentId,
        result: Result<Mutation, SyncError>,
    },
    Reassigned {
        id: CommentId,
        result: Result<Mutation, SyncError>,
    },
    CommonLoaded(Result<Vec<CommonComment>, SyncError>),
}

/// Holds the sender and receiver ends of the unified event channel.
///
/// The sender (`tx`) is cloned and distributed to background tasks;
/// the receiver (`rx`) is owned by the main event loop.
pub struct EventHandler {
    pub tx: mpsc::UnboundedSender<AppEvent>,
    pub rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the background tokio task that drives the unified event channel.
///
/// Two independent `tokio::time::interval` timers drive the render and logic
/// cycles; crossterm input is polled via `EventStream`. The task stops once
/// the receiver has been dropped.
///
/// `reader.next().fuse()` is required so that if the crossterm stream
/// terminates unexpectedly, `tokio::select!` does not keep polling a
/// completed future.
pub fn spawn_event_task(tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut tick_interval = interval(Duration::from_millis(250));
        let mut render_interval = interval(Duration::from_millis(33));
        let mut reader = EventStream::new();

        loop {
            let tick_tick = tick_interval.tick();
            let render_tick = render_interval.tick();
            let crossterm_event = reader.next().fuse();

            let sent = tokio::select! {
                _ = tick_tick => tx.send(AppEvent::Tick),
                _ = render_tick => tx.send(AppEvent::Render),
                maybe_event = crossterm_event => match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        tx.send(AppEvent::Key(key))
                    }
                    Some(Ok(Event::Resize(w, h))) => tx.send(AppEvent::Resize(w, h)),
                    Some(Ok(Event::Mouse(mouse))) => tx.send(AppEvent::Mouse(mouse)),
                    _ => Ok(()),
                },
            };
            if sent.is_err() {
                break;
            }
        }
    });
}
