//! Scoped background listeners and terminal state.
//!
//! Everything registered at mount goes into one [`Subscriptions`] handle;
//! dropping it releases every listener it holds, newest first.

use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::Terminal;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One background listener: an async task, optionally paired with a stop
/// flag for work that cannot be aborted (blocking reads).
pub struct Listener {
    task: JoinHandle<()>,
    stop: Option<Arc<AtomicBool>>,
}

impl Listener {
    pub fn task(task: JoinHandle<()>) -> Self {
        Self { task, stop: None }
    }

    /// A blocking loop that polls `stop` between reads.
    pub fn blocking(task: JoinHandle<()>, stop: Arc<AtomicBool>) -> Self {
        Self {
            task,
            stop: Some(stop),
        }
    }

    fn release(self) {
        if let Some(stop) = &self.stop {
            stop.store(true, Ordering::Relaxed);
        }
        self.task.abort();
    }
}

#[derive(Default)]
pub struct Subscriptions {
    listeners: Vec<(&'static str, Listener)>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, listener: Listener) {
        debug!("subscriptions: + {}", name);
        self.listeners.push((name, listener));
    }

    /// Release any listener registered under `name`, then register the new
    /// one in its place.
    pub fn replace(&mut self, name: &'static str, listener: Listener) {
        self.release(name);
        self.add(name, listener);
    }

    pub fn release(&mut self, name: &str) -> bool {
        let Some(pos) = self.listeners.iter().position(|(n, _)| *n == name) else {
            return false;
        };
        let (name, listener) = self.listeners.remove(pos);
        debug!("subscriptions: - {}", name);
        listener.release();
        true
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.listeners.iter().any(|(n, _)| *n == name)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        while let Some((name, listener)) = self.listeners.pop() {
            debug!("subscriptions: - {}", name);
            listener.release();
        }
    }
}

// ── Terminal ──────────────────────────────────────────────────────────────────

/// Raw mode + alternate screen + mouse capture for as long as it lives.
pub struct TerminalGuard {
    pub terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn enter() -> anyhow::Result<Self> {
        debug!("terminal: enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen, EnableMouseCapture) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        debug!("terminal: ready, size={:?}", terminal.size());
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("terminal: disable raw mode: {}", e);
        }
        if let Err(e) = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        ) {
            warn!("terminal: leave alternate screen: {}", e);
        }
        let _ = self.terminal.show_cursor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pending_task() -> JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[tokio::test]
    async fn drop_releases_every_listener() {
        let stop = Arc::new(AtomicBool::new(false));
        let stream = pending_task();
        let stream_abort = stream.abort_handle();
        let input = pending_task();
        let input_abort = input.abort_handle();

        {
            let mut subs = Subscriptions::new();
            subs.add("events", Listener::task(stream));
            subs.add("input", Listener::blocking(input, stop.clone()));
            assert_eq!(subs.len(), 2);
        }

        assert!(stop.load(Ordering::Relaxed));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(stream_abort.is_finished());
        assert!(input_abort.is_finished());
    }

    #[tokio::test]
    async fn replace_releases_the_previous_listener() {
        let first = pending_task();
        let first_abort = first.abort_handle();

        let mut subs = Subscriptions::new();
        subs.add("events", Listener::task(first));
        subs.replace("events", Listener::task(pending_task()));

        assert_eq!(subs.len(), 1);
        assert!(subs.is_active("events"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(first_abort.is_finished());

        assert!(subs.release("events"));
        assert!(!subs.release("events"));
        assert!(subs.is_empty());
    }
}
