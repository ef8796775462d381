use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Writes an executable `sh` script standing in for ffmpeg or ffprobe.
///
/// The file is written by a child shell so no descriptor for it is ever open
/// in this process; otherwise a fork on another test thread could inherit it
/// and make the script fail with "text file busy".
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut child = Command::new("sh")
        .arg("-c")
        .arg("cat > \"$1\" && chmod 755 \"$1\"")
        .arg("sh")
        .arg(&path)
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(format!("#!/bin/sh\n{}\n", body).as_bytes())
        .unwrap();
    assert!(child.wait().unwrap().success());
    path
}
