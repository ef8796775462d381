use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{AppError, Result};

/// Tracks Ctrl-C against running child processes.
///
/// While a child runs it receives the signal itself, so the press is only
/// recorded; otherwise the program exits quietly.
pub struct InterruptState {
    children: AtomicUsize,
    interrupted: AtomicBool,
}

impl InterruptState {
    pub const fn new() -> Self {
        InterruptState {
            children: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Records a Ctrl-C. Returns true when nothing is running and the
    /// program should exit.
    pub fn note_interrupt(&self) -> bool {
        if self.children.load(Ordering::SeqCst) > 0 {
            self.interrupted.store(true, Ordering::SeqCst);
            false
        } else {
            true
        }
    }

    pub fn child(&self) -> ChildGuard<'_> {
        self.children.fetch_add(1, Ordering::SeqCst);
        ChildGuard { state: self }
    }

    /// Turns a Ctrl-C seen while a child ran into `AppError::Interrupted`.
    pub fn check(&self) -> Result<()> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            Err(AppError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Forgets a Ctrl-C seen while a child ran.
    pub fn clear(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

pub struct ChildGuard<'a> {
    state: &'a InterruptState,
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        self.state.children.fetch_sub(1, Ordering::SeqCst);
    }
}

static STATE: InterruptState = InterruptState::new();

/// Installs the process-wide Ctrl-C handler.
pub fn install() -> Result<()> {
    ctrlc::set_handler(|| {
        if STATE.note_interrupt() {
            std::process::exit(0);
        }
    })?;
    Ok(())
}

/// Marks a child process as running until the guard drops.
pub fn child() -> ChildGuard<'static> {
    STATE.child()
}

pub fn check() -> Result<()> {
    STATE.check()
}

pub fn clear() {
    STATE.clear()
}
