//! Event bus for komma.
//!
//! Terminal input, timer ticks and assistant task events are normalised into
//! one `AppEvent` enum on a tokio unbounded channel. The main loop receives
//! from it and dispatches.
//!
//! Render (33 ms) and tick (250 ms) run on independent intervals so frame rate
//! and logic rate can be tuned separately.

use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind, MouseEvent};
use futures::{FutureExt, StreamExt};
use komma_core::dispatcher::DispatchEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

#[derive(Debug)]
pub enum AppEvent {
    /// A key press (`KeyEventKind::Press` only).
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Terminal was resized to (columns, rows).
    Resize(u16, u16),
    /// Logic tick (4 Hz); drives the busy spinner.
    Tick,
    /// Triggers a `terminal.draw()` call (≈30 FPS).
    Render,
    /// Progress of the assistant task, still to be settled by the session.
    Task(DispatchEvent),
}

/// Sender and receiver ends of the unified event channel.
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

/// Spawns the task that feeds terminal input and timers into the channel.
///
/// `reader.next().fuse()` keeps `select!` from polling a finished stream.
/// Release and repeat key events are dropped so a keystroke fires once.
pub fn spawn_event_task(tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut tick_interval = interval(Duration::from_millis(250));
        let mut render_interval = interval(Duration::from_millis(33));
        let mut reader = EventStream::new();

        loop {
            let tick_tick = tick_interval.tick();
            let render_tick = render_interval.tick();
            let crossterm_event = reader.next().fuse();

            tokio::select! {
                _ = tick_tick => {
                    let _ = tx.send(AppEvent::Tick);
                }
                _ = render_tick => {
                    let _ = tx.send(AppEvent::Render);
                }
                maybe_event = crossterm_event => {
                    match maybe_event {
                        Some(Ok(Event::Key(key))) => {
                            if key.kind == KeyEventKind::Press {
                                let _ = tx.send(AppEvent::Key(key));
                            }
                        }
                        Some(Ok(Event::Resize(w, h))) => {
                            let _ = tx.send(AppEvent::Resize(w, h));
                        }
                        Some(Ok(Event::Mouse(mouse))) => {
                            let _ = tx.send(AppEvent::Mouse(mouse));
                        }
                        _ => {}
                    }
                }
            }
            if tx.is_closed() {
                break;
            }
        }
    });
}

/// Forwards the session's task events onto the bus until either side closes.
pub fn spawn_task_forwarder(
    mut task_rx: mpsc::UnboundedReceiver<DispatchEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
) {
    tokio::spawn(async move {
        while let Some(ev) = task_rx.recv().await {
            if tx.send(AppEvent::Task(ev)).is_err() {
                break;
            }
        }
    });
}
