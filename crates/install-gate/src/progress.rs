use std::io::Write;
use std::sync::Mutex;

use tty_arbiter::HostOutput;

/// A single status line on stderr, redrawn in place. Hidden while another
/// flow holds the terminal.
pub struct Progress {
    enabled: bool,
    state: Mutex<ProgressState>,
}

#[derive(Default)]
struct ProgressState {
    message: Option<String>,
    paused: bool,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn for_stderr() -> Self {
        Self::new(atty::is(atty::Stream::Stderr))
    }

    pub fn set(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.message = Some(message.into());
        if !state.paused {
            self.draw(state.message.as_deref());
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        if state.message.take().is_some() && !state.paused {
            self.draw(None);
        }
    }

    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn draw(&self, message: Option<&str>) {
        if !self.enabled {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{}", message.unwrap_or(""));
        let _ = stderr.flush();
    }
}

impl HostOutput for Progress {
    fn pause(&self) {
        let mut state = self.lock();
        if !state.paused && state.message.is_some() {
            self.draw(None);
        }
        state.paused = true;
    }

    fn resume(&self) {
        let mut state = self.lock();
        state.paused = false;
        if state.message.is_some() {
            self.draw(state.message.as_deref());
        }
    }
}
