use std::env;

/// Runtime settings. Only `PAGER` comes from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Pager command line, run through the shell.
    pub pager: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            pager: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            pager: lookup("PAGER").filter(|v| !v.trim().is_empty()),
            ..Config::default()
        }
    }
}
