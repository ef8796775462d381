use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::{print_error, AppError, Result};
use crate::interrupt;
use crate::pager::{Pager, TerminalPager};
use crate::paths::get_paths;
use crate::prompt::ask_selection;

static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^.*(?:Input|Duration|Stream).*$").expect("summary line regex is valid")
});

/// Runs a media inspection tool against one file and returns its text.
pub trait ProbeRunner {
    fn probe(&self, path: &Path) -> Result<String>;
}

pub struct Ffprobe {
    program: String,
}

impl Ffprobe {
    pub fn new(program: impl Into<String>) -> Self {
        Ffprobe {
            program: program.into(),
        }
    }
}

impl ProbeRunner for Ffprobe {
    /// ffprobe prints its human-readable summary on stderr, so that is the
    /// stream returned. A non-zero exit still yields whatever was printed.
    fn probe(&self, path: &Path) -> Result<String> {
        log::debug!("Running {} -hide_banner {}", self.program, path.display());
        let output = {
            let _child = interrupt::child();
            Command::new(&self.program)
                .arg("-hide_banner")
                .arg(path)
                .output()
                .map_err(|source| AppError::ToolLaunch {
                    tool: self.program.clone(),
                    source,
                })?
        };
        interrupt::check()?;

        if !output.status.success() {
            log::debug!(
                "{} exited with {} for {}",
                self.program,
                output.status,
                path.display()
            );
        }

        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// Pulls the Input/Duration/Stream lines out of ffprobe text and shapes them
/// into a tree. `None` when nothing matched.
pub fn filter_probe(raw_probe: &str) -> Option<Vec<String>> {
    let lines: Vec<&str> = SUMMARY_LINE
        .find_iter(raw_probe)
        .map(|m| m.as_str())
        .collect();
    decorate(&lines)
}

/// Prefixes lines with tree connectors keyed on how many there are.
pub fn decorate(lines: &[&str]) -> Option<Vec<String>> {
    let lines: Vec<&str> = lines.iter().map(|line| line.trim()).collect();

    match lines.as_slice() {
        [] => None,
        [input] => Some(vec![input.to_string()]),
        [input, second] => Some(vec![input.to_string(), format!("└───{}", second)]),
        [input, second, third] => Some(vec![
            input.to_string(),
            format!("└───{}", second),
            format!("   └───{}", third),
        ]),
        [input, second, third, rest @ ..] => {
            let mut decorated = vec![
                input.to_string(),
                format!("└──┬{}", second),
                format!("   └──┬{}", third),
            ];
            decorated.extend(rest.iter().map(|line| format!("      ├{}", line)));
            Some(decorated)
        }
    }
}

/// Joins each block by lines and separates blocks with a blank line.
pub fn compose_report(blocks: &[Vec<String>]) -> String {
    let mut combined = String::new();
    for block in blocks {
        combined.push_str(&block.join("\n"));
        combined.push_str("\n\n");
    }
    combined.trim_end().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    NoFiles,
    NoProbableFiles,
    Displayed,
}

pub fn probe_files(
    paths: &[PathBuf],
    runner: &dyn ProbeRunner,
    pager: &dyn Pager,
) -> Result<ProbeOutcome> {
    if paths.is_empty() {
        return Ok(ProbeOutcome::NoFiles);
    }

    let mut blocks = Vec::new();
    for path in paths {
        match filter_probe(&runner.probe(path)?) {
            Some(block) => blocks.push(block),
            None => log::debug!("Nothing to report for {}", path.display()),
        }
    }

    if blocks.is_empty() {
        return Ok(ProbeOutcome::NoProbableFiles);
    }

    pager.page(&compose_report(&blocks))?;
    Ok(ProbeOutcome::Displayed)
}

/// The interactive ffprobe operation.
pub fn run(config: &Config) -> Result<()> {
    let selection = ask_selection("probe")?;
    let paths = get_paths(&selection.path, selection.recursive, &selection.pattern)?;

    let runner = Ffprobe::new(config.ffprobe.clone());
    let pager = TerminalPager::new(config.pager.clone());

    match probe_files(&paths, &runner, &pager)? {
        ProbeOutcome::NoFiles => print_error(&format!(
            "No files matching pattern \"{}\" were found in directory \"{}\".",
            selection.pattern, selection.path
        )),
        ProbeOutcome::NoProbableFiles => print_error(&format!(
            "No probable files matching pattern \"{}\" were found in directory \"{}\".",
            selection.pattern, selection.path
        )),
        ProbeOutcome::Displayed => {}
    }
    Ok(())
}
