use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;

mod config;
mod convert;
mod error;
mod interrupt;
mod pager;
mod paths;
mod probe;
mod prompt;
mod tools;

#[cfg(all(test, unix))]
mod test_support;

use config::Config;
use error::{print_error, AppError, Result};
use prompt::{select_operation, Operation};

#[derive(Parser)]
#[command(name = "ffprompt", version)]
#[command(about = "Interactively run ffmpeg conversions or ffprobe inspections over matching files")]
struct Args {}

fn run(config: &Config) -> Result<()> {
    interrupt::install()?;

    match select_operation()? {
        Operation::Ffmpeg => convert::run(config),
        Operation::Ffprobe => probe::run(config),
    }
}

fn main() -> ExitCode {
    let _args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let config = Config::from_env();
    log::debug!("Using {:?}", config);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        // Cancelling a prompt or a running tool ends the program quietly.
        Err(AppError::Interrupted) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
