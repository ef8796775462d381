use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::process::{Command, ExitStatus, Stdio};

use console::Term;

use crate::error::{AppError, Result};
use crate::interrupt;
use crate::tools::require_tool;

/// Exit status of `sh -c` when the command does not exist.
const SHELL_NOT_FOUND: i32 = 127;

/// Somewhere to show a long block of text.
pub trait Pager {
    fn page(&self, text: &str) -> Result<()>;
}

/// Pages through `$PAGER` (or `less`) when attached to a terminal, and
/// falls back to plain stdout otherwise.
pub struct TerminalPager {
    command: Option<String>,
}

impl TerminalPager {
    pub fn new(command: Option<String>) -> Self {
        TerminalPager { command }
    }

    /// `$PAGER` goes through the shell so its quoting is honoured.
    fn resolve_command(&self) -> Option<(OsString, Vec<OsString>)> {
        if let Some(command) = &self.command {
            let command = command.trim();
            if command.is_empty() {
                return None;
            }
            return Some(shell_command(command));
        }

        match require_tool("less") {
            Ok(less) => Some((less.into_os_string(), vec!["-R".into()])),
            Err(e) => {
                log::debug!("No pager available: {}", e);
                None
            }
        }
    }

    fn run(&self, program: &OsString, args: &[OsString], text: &str) -> Result<ExitStatus> {
        let _child = interrupt::child();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(AppError::Pager)?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(text.as_bytes()).and_then(|_| stdin.write_all(b"\n")) {
                Ok(()) => {}
                // The user quit before reading everything.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => return Err(AppError::Pager(e)),
            }
        }

        child.wait().map_err(AppError::Pager)
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> (OsString, Vec<OsString>) {
    ("sh".into(), vec!["-c".into(), command.into()])
}

#[cfg(windows)]
fn shell_command(command: &str) -> (OsString, Vec<OsString>) {
    ("cmd".into(), vec!["/C".into(), command.into()])
}

impl Pager for TerminalPager {
    fn page(&self, text: &str) -> Result<()> {
        if !Term::stdout().is_term() {
            println!("{}", text);
            return Ok(());
        }

        let Some((program, args)) = self.resolve_command() else {
            println!("{}", text);
            return Ok(());
        };

        log::debug!("Paging through {:?} {:?}", program, args);
        let paged = self.run(&program, &args, text);
        // Ctrl-C inside the pager belongs to the pager.
        interrupt::clear();

        if should_print_instead(&paged) {
            log::warn!("Could not start pager {:?} {:?}, printing instead", program, args);
            println!("{}", text);
            return Ok(());
        }
        paged.map(|_| ())
    }
}

/// True when the pager never got going and the text should go to stdout.
fn should_print_instead(paged: &Result<ExitStatus>) -> bool {
    match paged {
        Ok(status) => status.code() == Some(SHELL_NOT_FOUND),
        Err(AppError::Pager(e)) => e.kind() == ErrorKind::NotFound,
        Err(_) => false,
    }
}
