use std::fmt;
use std::path::Path;

use inquire::validator::Validation;
use inquire::{Confirm, CustomUserError, Select, Text};

use crate::error::Result;
use crate::paths::check_pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ffmpeg,
    Ffprobe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Ffmpeg => write!(f, "ffmpeg"),
            Operation::Ffprobe => write!(f, "ffprobe"),
        }
    }
}

/// Answers shared by both operations.
#[derive(Debug, Clone)]
pub struct Selection {
    pub path: String,
    pub recursive: bool,
    pub pattern: String,
}

pub fn select_operation() -> Result<Operation> {
    let operation = Select::new(
        "Select the type of operation you would like to execute",
        vec![Operation::Ffmpeg, Operation::Ffprobe],
    )
    .prompt()?;
    Ok(operation)
}

/// Asks for the directory, recursion and pattern. `verb` fills in the
/// directory question ("probe", "convert").
pub fn ask_selection(verb: &str) -> Result<Selection> {
    let path = ask_directory(&format!(
        "Enter the relative path where the files you would like to {} are located",
        verb
    ))?;
    let recursive = ask_recursive()?;
    let pattern = ask_pattern(recursive)?;
    Ok(Selection {
        path,
        recursive,
        pattern,
    })
}

pub fn ask_directory(message: &str) -> Result<String> {
    let path = Text::new(message)
        .with_default(".")
        .with_validator(|input: &str| Ok::<_, CustomUserError>(validate_directory(input)))
        .prompt()?;
    Ok(path)
}

pub fn ask_recursive() -> Result<bool> {
    let recursive = Confirm::new("Check subfolders for files")
        .with_default(true)
        .prompt()?;
    Ok(recursive)
}

pub fn ask_pattern(recursive: bool) -> Result<String> {
    let pattern = Text::new("Enter a pattern to match files against")
        .with_default("**")
        .with_validator(move |input: &str| {
            Ok::<_, CustomUserError>(validate_pattern(input, recursive))
        })
        .prompt()?;
    Ok(pattern)
}

pub fn validate_directory(input: &str) -> Validation {
    let expanded = shellexpand::tilde(input);
    if Path::new(expanded.as_ref()).is_dir() {
        Validation::Valid
    } else {
        Validation::Invalid(format!("\"{}\" is not an existing directory", input).into())
    }
}

pub fn validate_pattern(input: &str, recursive: bool) -> Validation {
    if input.trim().is_empty() {
        return Validation::Invalid("The pattern must not be empty".into());
    }
    match check_pattern(input, recursive) {
        Ok(()) => Validation::Valid,
        Err(e) => Validation::Invalid(e.to_string().into()),
    }
}
