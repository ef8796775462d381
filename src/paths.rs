use std::fs;
use std::path::{Path, PathBuf};

use glob::{glob_with, MatchOptions, Pattern};

use crate::error::Result;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Rewrites a user pattern so the glob walk honours the recursion choice.
///
/// Without recursion `**` is just `*`. With recursion a `**` segment crosses
/// directories, and a trailing `**` is widened to `**/*` so that files (not
/// only directories) are yielded at every depth.
pub fn normalize_pattern(pattern: &str, recursive: bool) -> String {
    let mut segments: Vec<String> = pattern
        .split('/')
        .map(|segment| {
            if segment == "**" && recursive {
                segment.to_string()
            } else {
                collapse_stars(segment)
            }
        })
        .collect();

    if recursive && segments.last().map(String::as_str) == Some("**") {
        segments.push("*".to_string());
    }

    segments.join("/")
}

fn collapse_stars(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Compiles the pattern the same way `get_paths` would, for prompt validation.
pub fn check_pattern(pattern: &str, recursive: bool) -> Result<()> {
    Pattern::new(&normalize_pattern(pattern, recursive))?;
    Ok(())
}

/// Expands `pattern` under `base` and returns the absolute paths of the
/// regular files it matches.
pub fn get_paths(base: &str, recursive: bool, pattern: &str) -> Result<Vec<PathBuf>> {
    let base = shellexpand::tilde(base);
    let normalized = normalize_pattern(pattern, recursive);

    let full_pattern = if Path::new(&normalized).is_absolute() {
        normalized
    } else {
        format!("{}/{}", Pattern::escape(&base), normalized)
    };
    log::debug!("Resolving files with pattern {}", full_pattern);

    let mut paths = Vec::new();
    for entry in glob_with(&full_pattern, MATCH_OPTIONS)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Error matching pattern: {}", e);
                continue;
            }
        };

        let absolute = match fs::canonicalize(&path) {
            Ok(absolute) => absolute,
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if absolute.is_file() {
            paths.push(absolute);
        }
    }

    log::debug!("Resolved {} file(s)", paths.len());
    Ok(paths)
}
