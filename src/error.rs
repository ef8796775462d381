use inquire::InquireError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// The user cancelled a prompt. Swallowed by `main`.
    #[error("operation interrupted")]
    Interrupted,

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to run {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} {message}")]
    ToolFailed { tool: String, message: String },

    #[error("{0} is not installed")]
    ToolNotFound(String),

    #[error("Pager failed: {0}")]
    Pager(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not install the Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Could not parse ffprobe output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<InquireError> for AppError {
    fn from(err: InquireError) -> Self {
        match err {
            InquireError::OperationInterrupted | InquireError::OperationCanceled => {
                AppError::Interrupted
            }
            other => AppError::Prompt(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Prints a user-facing error line, preceded by a blank line.
pub fn print_error(message: &str) {
    println!("\n{} {}", console::style("Error:").red().bold(), message);
}
