use std::fs;
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::validator::Validation;
use inquire::{Confirm, CustomUserError, Text};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::{print_error, AppError, Result};
use crate::interrupt;
use crate::paths::get_paths;
use crate::prompt::{ask_selection, Selection};
use crate::tools::ensure_installed;

static OUT_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^out_time_us=(\d+)$").expect("progress regex is valid"));

/// What to do with every matched file.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub ffmpeg_args: Vec<String>,
    pub extension: String,
    pub output_dir: Option<PathBuf>,
    pub delete_originals: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub converted: usize,
    pub deleted: usize,
}

pub fn output_path_for(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let filename = format!("{}.{}", stem, extension);

    match output_dir {
        Some(dir) => dir.join(filename),
        None => input.with_file_name(filename),
    }
}

fn temp_path_for(output: &Path, extension: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}-temp-{}.{}", stem, std::process::id(), extension))
}

pub fn plan_jobs(paths: &[PathBuf], options: &ConvertOptions) -> Vec<Job> {
    paths
        .iter()
        .map(|input| Job {
            input: input.clone(),
            output: output_path_for(input, options.output_dir.as_deref(), &options.extension),
        })
        .collect()
}

/// Outputs that more than one input would be written to.
pub fn duplicate_outputs(jobs: &[Job]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for job in jobs {
        if !seen.insert(&job.output) && !duplicates.contains(&job.output) {
            duplicates.push(job.output.clone());
        }
    }
    duplicates
}

/// Outputs that already exist and would be replaced. Nothing is reported
/// when originals are deleted afterwards.
pub fn check_overwrites(jobs: &[Job], delete_originals: bool) -> Vec<PathBuf> {
    if delete_originals {
        return Vec::new();
    }

    jobs.iter()
        .filter(|job| job.output.exists())
        .map(|job| job.output.clone())
        .collect()
}

pub fn normalize_extension(input: &str) -> String {
    input.trim().trim_start_matches('.').to_string()
}

pub fn validate_extension(input: &str) -> Validation {
    let extension = normalize_extension(input);
    if extension.is_empty() {
        Validation::Invalid("The extension must not be empty".into())
    } else if extension.contains('/') || extension.contains('\\') {
        Validation::Invalid("The extension must not contain a path separator".into())
    } else {
        Validation::Valid
    }
}

/// Position in milliseconds from an ffmpeg `-progress` line.
pub fn parse_progress_line(line: &str) -> Option<u64> {
    OUT_TIME
        .captures(line.trim())
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(|us| us / 1000)
}

/// Container duration in milliseconds from `-of json` output.
pub fn parse_duration_json(json: &[u8]) -> Result<Option<u64>> {
    let json: serde_json::Value = serde_json::from_slice(json)?;
    Ok(json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| (d * 1000.0).round() as u64))
}

fn get_duration_ms(ffprobe: &str, path: &Path) -> Result<Option<u64>> {
    let output = {
        let _child = interrupt::child();
        Command::new(ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("json")
            .arg(path)
            .output()
            .map_err(|source| AppError::ToolLaunch {
                tool: ffprobe.to_string(),
                source,
            })?
    };
    interrupt::check()?;

    parse_duration_json(&output.stdout)
}

fn ask_options() -> Result<ConvertOptions> {
    let args = Text::new("Enter the ffmpeg arguments to apply to each file")
        .with_default("-c copy")
        .prompt()?;

    let extension = Text::new("Enter the output file extension")
        .with_default("mkv")
        .with_validator(|input: &str| Ok::<_, CustomUserError>(validate_extension(input)))
        .prompt()?;

    let output_dir = Text::new("Enter an output directory (leave empty to write next to each file)")
        .with_default("")
        .prompt()?;

    let delete_originals = Confirm::new("Delete original files after successful conversion")
        .with_default(false)
        .prompt()?;

    let output_dir = output_dir.trim();
    Ok(ConvertOptions {
        ffmpeg_args: args.split_whitespace().map(String::from).collect(),
        extension: normalize_extension(&extension),
        output_dir: (!output_dir.is_empty())
            .then(|| PathBuf::from(shellexpand::tilde(output_dir).as_ref())),
        delete_originals,
    })
}

/// The interactive ffmpeg operation.
pub fn run(config: &Config) -> Result<()> {
    let selection = ask_selection("convert")?;
    let paths = get_paths(&selection.path, selection.recursive, &selection.pattern)?;

    if paths.is_empty() {
        print_no_files(&selection);
        return Ok(());
    }

    let options = ask_options()?;
    ensure_installed(&[config.ffmpeg.as_str(), config.ffprobe.as_str()])?;

    if let Some(ref output_dir) = options.output_dir {
        fs::create_dir_all(output_dir)?;
        println!("Output directory: {}", output_dir.display());
    }

    let jobs = plan_jobs(&paths, &options);

    let duplicates = duplicate_outputs(&jobs);
    if !duplicates.is_empty() {
        print_error("Several files would be converted to the same output:");
        for path in &duplicates {
            println!("  {}", path.display());
        }
        println!("Aborting.");
        return Ok(());
    }

    let overwrites = check_overwrites(&jobs, options.delete_originals);
    if !overwrites.is_empty() {
        println!("\nThe following files would be overwritten:");
        for path in &overwrites {
            println!("  {}", path.display());
        }
        println!();

        let proceed = Confirm::new("Do you want to continue and overwrite these files?")
            .with_default(false)
            .prompt()?;
        if !proceed {
            println!("Aborting.");
            return Ok(());
        }
    }

    let start_time = Instant::now();
    let summary = convert_all(config, &jobs, &options)?;

    println!("\n{}", style("Conversion Summary:").bold());
    println!("Total files processed: {}", summary.processed);
    println!("Successfully converted: {}", summary.converted);
    println!("Failed conversions: {}", summary.processed - summary.converted);
    if options.delete_originals {
        println!("Original files deleted: {}", summary.deleted);
    }
    println!("Time taken: {:.2} seconds", start_time.elapsed().as_secs_f64());

    Ok(())
}

fn print_no_files(selection: &Selection) {
    print_error(&format!(
        "No files matching pattern \"{}\" were found in directory \"{}\".",
        selection.pattern, selection.path
    ));
}

fn convert_all(config: &Config, jobs: &[Job], options: &ConvertOptions) -> Result<Summary> {
    let mut durations = Vec::with_capacity(jobs.len());
    for job in jobs {
        let duration = match get_duration_ms(&config.ffprobe, &job.input) {
            Ok(duration) => duration,
            Err(AppError::Json(e)) => {
                log::warn!("Could not read duration of {}: {}", job.input.display(), e);
                None
            }
            Err(e) => return Err(e),
        };
        durations.push(duration.unwrap_or(0));
    }
    let total_ms: u64 = durations.iter().sum();

    let pb = if total_ms > 0 {
        let pb = ProgressBar::new(total_ms);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}",
                )
                .expect("progress template is valid")
                .progress_chars("#>-"),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("spinner template is valid"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    };

    let mut summary = Summary::default();
    let mut done_ms = 0;
    for (job, duration) in jobs.iter().zip(durations) {
        pb.set_message(job.input.display().to_string());

        match convert_file(&config.ffmpeg, job, options, &pb, done_ms) {
            Ok(()) => {
                summary.converted += 1;
                if options.delete_originals && job.output != job.input {
                    match fs::remove_file(&job.input) {
                        Ok(()) => summary.deleted += 1,
                        Err(e) => pb.println(format!(
                            "Failed to delete {}: {}",
                            job.input.display(),
                            e
                        )),
                    }
                }
            }
            Err(e @ (AppError::ToolLaunch { .. } | AppError::Interrupted)) => {
                pb.abandon();
                return Err(e);
            }
            Err(e) => {
                pb.println(format!(
                    "{} {}: {}",
                    style("Failed to convert").red(),
                    job.input.display(),
                    e
                ));
            }
        }

        summary.processed += 1;
        done_ms += duration;
        pb.set_position(done_ms);
    }

    pb.finish_with_message("Conversion complete!");
    Ok(summary)
}

fn convert_file(
    ffmpeg: &str,
    job: &Job,
    options: &ConvertOptions,
    pb: &ProgressBar,
    offset_ms: u64,
) -> Result<()> {
    let temp_path = temp_path_for(&job.output, &options.extension);

    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner")
        .arg("-i")
        .arg(&job.input)
        .args(&options.ffmpeg_args)
        .arg("-progress")
        .arg("pipe:1")
        .arg("-nostats")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg(&temp_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::debug!("Running {:?}", cmd);

    let (status, stderr) = {
        let _child = interrupt::child();
        let mut process = cmd.spawn().map_err(|source| AppError::ToolLaunch {
            tool: ffmpeg.to_string(),
            source,
        })?;

        // stderr is drained concurrently; a full pipe would stall the progress stream.
        let stderr_reader = process.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let progress = match process.stdout.take() {
            Some(stdout) => follow_progress(stdout, pb, offset_ms),
            None => Ok(()),
        };
        let status = process.wait()?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        progress?;
        (status, stderr)
    };

    if let Err(e) = interrupt::check() {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if !status.success() {
        let _ = fs::remove_file(&temp_path);
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(AppError::ToolFailed {
            tool: ffmpeg.to_string(),
            message: format!("exited with {}: {}", status, last_lines(stderr.trim(), 5)),
        });
    }

    fs::rename(&temp_path, &job.output)?;
    log::debug!("Wrote {}", job.output.display());
    Ok(())
}

fn follow_progress(stdout: impl Read, pb: &ProgressBar, offset_ms: u64) -> Result<()> {
    for line in BufReader::new(stdout).lines() {
        let line = line?;
        if let Some(position) = parse_progress_line(&line) {
            let limit = pb.length().unwrap_or(u64::MAX);
            pb.set_position((offset_ms + position).min(limit));
        }
    }
    Ok(())
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn options(output_dir: Option<PathBuf>, delete_originals: bool) -> ConvertOptions {
        ConvertOptions {
            ffmpeg_args: vec!["-c".to_string(), "copy".to_string()],
            extension: "mkv".to_string(),
            output_dir,
            delete_originals,
        }
    }

    #[test]
    fn output_lands_next_to_input_or_in_output_dir() {
        let input = Path::new("/videos/show/ep01.mp4");
        assert_eq!(
            output_path_for(input, None, "mkv"),
            PathBuf::from("/videos/show/ep01.mkv")
        );
        assert_eq!(
            output_path_for(input, Some(Path::new("/out")), "webm"),
            PathBuf::from("/out/ep01.webm")
        );
    }

    #[test]
    fn temp_file_sits_beside_output() {
        let temp = temp_path_for(Path::new("/out/ep01.mkv"), "mkv");
        assert_eq!(temp.parent(), Some(Path::new("/out")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ep01-temp-"));
        assert!(name.ends_with(".mkv"));
    }

    #[test]
    fn existing_outputs_are_flagged() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        File::create(&a).unwrap();
        File::create(&b).unwrap();
        File::create(dir.path().join("a.mkv")).unwrap();

        let jobs = plan_jobs(&[a, b], &options(None, false));
        assert_eq!(check_overwrites(&jobs, false), vec![dir.path().join("a.mkv")]);
        assert!(check_overwrites(&jobs, true).is_empty());
    }

    #[test]
    fn extensions_are_normalized_and_checked() {
        assert_eq!(normalize_extension(" .mkv "), "mkv");
        assert_eq!(validate_extension("mp4"), Validation::Valid);
        assert!(matches!(validate_extension("."), Validation::Invalid(_)));
        assert!(matches!(validate_extension("a/b"), Validation::Invalid(_)));
    }

    #[test]
    fn progress_lines() {
        assert_eq!(parse_progress_line("out_time_us=2500000"), Some(2500));
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("progress=continue"), None);
    }

    #[test]
    fn duration_from_json() {
        let json = br#"{"format": {"duration": "12.345000"}}"#;
        assert_eq!(parse_duration_json(json).unwrap(), Some(12345));
        assert_eq!(parse_duration_json(br#"{"format": {}}"#).unwrap(), None);
        assert_eq!(
            parse_duration_json(br#"{"format": {"duration": "N/A"}}"#).unwrap(),
            None
        );
        assert!(matches!(parse_duration_json(b""), Err(AppError::Json(_))));
    }

    #[test]
    fn colliding_outputs_are_reported() {
        let paths = vec![
            PathBuf::from("/videos/a.mp4"),
            PathBuf::from("/videos/a.avi"),
            PathBuf::from("/videos/b.mp4"),
            PathBuf::from("/videos/a.webm"),
        ];
        let jobs = plan_jobs(&paths, &options(None, false));
        assert_eq!(duplicate_outputs(&jobs), vec![PathBuf::from("/videos/a.mkv")]);

        let distinct = plan_jobs(&paths[2..3], &options(None, false));
        assert!(duplicate_outputs(&distinct).is_empty());
    }

    #[test]
    fn last_lines_keeps_the_tail() {
        assert_eq!(last_lines("one\ntwo\nthree", 2), "two\nthree");
        assert_eq!(last_lines("only", 5), "only");
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::test_support::write_script;
        use std::sync::mpsc;
        use std::time::Duration;

        const FAKE_FFMPEG: &str = r#"in="$3"
for out; do :; done
case "$in" in
  *bad*)
    : > "$out"
    echo "$in: Invalid data found when processing input" >&2
    exit 1
    ;;
esac
echo "out_time_us=500000"
echo "progress=end"
cp "$in" "$out""#;

        const FAKE_FFPROBE: &str = r#"echo '{"format": {"duration": "1.000000"}}'"#;

        fn config(dir: &Path) -> Config {
            Config {
                ffmpeg: write_script(dir, "ffmpeg", FAKE_FFMPEG)
                    .to_string_lossy()
                    .into_owned(),
                ffprobe: write_script(dir, "ffprobe", FAKE_FFPROBE)
                    .to_string_lossy()
                    .into_owned(),
                pager: None,
            }
        }

        fn media_dir() -> (tempfile::TempDir, tempfile::TempDir, Vec<PathBuf>) {
            let tools = tempdir().unwrap();
            let media = tempdir().unwrap();
            let good = media.path().join("a.mp4");
            let bad = media.path().join("bad.mp4");
            fs::write(&good, "a").unwrap();
            fs::write(&bad, "b").unwrap();
            (tools, media, vec![good, bad])
        }

        fn leftover_temp_files(dir: &Path) -> Vec<String> {
            fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| name.contains("-temp-"))
                .collect()
        }

        #[test]
        fn converts_and_keeps_going_after_a_failure() {
            let (tools, media, paths) = media_dir();
            let opts = options(None, false);
            let jobs = plan_jobs(&paths, &opts);

            let summary = convert_all(&config(tools.path()), &jobs, &opts).unwrap();
            assert_eq!(
                summary,
                Summary {
                    processed: 2,
                    converted: 1,
                    deleted: 0
                }
            );
            assert_eq!(fs::read_to_string(media.path().join("a.mkv")).unwrap(), "a");
            assert!(!media.path().join("bad.mkv").exists());
            assert!(leftover_temp_files(media.path()).is_empty());
            assert!(media.path().join("a.mp4").exists());
        }

        #[test]
        fn originals_are_deleted_only_after_success() {
            let (tools, media, paths) = media_dir();
            let opts = options(None, true);
            let jobs = plan_jobs(&paths, &opts);

            let summary = convert_all(&config(tools.path()), &jobs, &opts).unwrap();
            assert_eq!(summary.converted, 1);
            assert_eq!(summary.deleted, 1);
            assert!(!media.path().join("a.mp4").exists());
            assert!(media.path().join("bad.mp4").exists());
        }

        #[test]
        fn original_is_kept_when_output_replaces_it() {
            let (tools, media, paths) = media_dir();
            let mut opts = options(None, true);
            opts.extension = "mp4".to_string();
            let jobs = plan_jobs(&paths[..1], &opts);
            assert_eq!(jobs[0].output, jobs[0].input);

            let summary = convert_all(&config(tools.path()), &jobs, &opts).unwrap();
            assert_eq!(summary.converted, 1);
            assert_eq!(summary.deleted, 0);
            assert_eq!(fs::read_to_string(media.path().join("a.mp4")).unwrap(), "a");
            assert!(leftover_temp_files(media.path()).is_empty());
        }

        #[test]
        fn missing_ffmpeg_aborts_the_batch() {
            let (tools, _media, paths) = media_dir();
            let opts = options(None, false);
            let jobs = plan_jobs(&paths, &opts);
            let mut config = config(tools.path());
            config.ffmpeg = "ffprompt-missing-ffmpeg".to_string();

            let err = convert_all(&config, &jobs, &opts).unwrap_err();
            assert!(matches!(
                err,
                AppError::ToolLaunch { tool, .. } if tool == "ffprompt-missing-ffmpeg"
            ));
        }

        fn convert_with_timeout(ffmpeg: PathBuf, job: Job) -> Result<()> {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let opts = options(None, false);
                let result = convert_file(
                    &ffmpeg.to_string_lossy(),
                    &job,
                    &opts,
                    &ProgressBar::hidden(),
                    0,
                );
                let _ = tx.send(result);
            });
            rx.recv_timeout(Duration::from_secs(30))
                .expect("conversion did not finish")
        }

        #[test]
        fn heavy_stderr_does_not_stall_conversion() {
            let (tools, media, paths) = media_dir();
            let ffmpeg = write_script(
                tools.path(),
                "noisy-ffmpeg",
                r#"in="$3"
for out; do :; done
head -c 200000 /dev/zero | tr '\0' 'e' >&2
echo "out_time_us=1000000"
cp "$in" "$out""#,
            );
            let job = plan_jobs(&paths[..1], &options(None, false)).remove(0);

            convert_with_timeout(ffmpeg, job).unwrap();
            assert_eq!(fs::read_to_string(media.path().join("a.mkv")).unwrap(), "a");
        }

        #[test]
        fn failure_message_survives_heavy_stderr() {
            let (tools, media, paths) = media_dir();
            let ffmpeg = write_script(
                tools.path(),
                "failing-ffmpeg",
                r#"head -c 200000 /dev/zero | tr '\0' 'e' >&2
echo >&2
echo "Conversion failed!" >&2
exit 1"#,
            );
            let job = plan_jobs(&paths[..1], &options(None, false)).remove(0);

            let err = convert_with_timeout(ffmpeg, job).unwrap_err();
            match err {
                AppError::ToolFailed { message, .. } => {
                    assert!(message.ends_with("Conversion failed!"));
                }
                other => panic!("unexpected error: {:?}", other),
            }
            assert!(leftover_temp_files(media.path()).is_empty());
        }
    }
}
