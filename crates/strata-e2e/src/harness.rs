use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

static BUILD_STRATA: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub command_line: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    #[must_use]
    pub fn transcript(&self) -> String {
        format!(
            "$ {}\n[exit: {}]\n[stdout]\n{}[stderr]\n{}",
            self.command_line, self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Run the `strata` binary as an external process.
///
/// `NO_COLOR=1` is always set to keep output deterministic for assertions;
/// secrets for manifests under test travel through `env_overrides`.
///
/// # Errors
///
/// Returns an error if building/running the `strata` binary fails.
pub fn run_strata(
    working_dir: &Path,
    args: &[&str],
    env_overrides: &[(String, String)],
) -> Result<RunResult, String> {
    ensure_strata_built()?;
    let bin = strata_bin()?;

    let mut command = Command::new(bin);
    command.current_dir(working_dir);
    command.env("NO_COLOR", "1");
    command.args(args);

    let mut command_parts = vec!["strata".to_string()];
    command_parts.extend(args.iter().map(|arg| (*arg).to_string()));

    for (name, value) in env_overrides {
        command.env(name, value);
    }

    let output = command
        .output()
        .map_err(|error| format!("failed to run strata: {error}"))?;

    Ok(RunResult {
        command_line: command_parts.join(" "),
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Write a text file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directories or file contents cannot be written.
pub fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn ensure_strata_built() -> Result<(), String> {
    match BUILD_STRATA.get_or_init(|| {
        let status = Command::new("cargo")
            .arg("build")
            .arg("-q")
            .arg("-p")
            .arg("strata")
            .status()
            .map_err(|error| format!("failed to build strata binary: {error}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("cargo build for strata failed: {status}"))
        }
    }) {
        Ok(()) => Ok(()),
        Err(error) => Err(error.clone()),
    }
}

fn strata_bin() -> Result<PathBuf, String> {
    let mut path = std::env::current_exe()
        .map_err(|error| format!("cannot locate test executable: {error}"))?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    let bin = path.join(format!("strata{}", std::env::consts::EXE_SUFFIX));
    if bin.exists() {
        Ok(bin)
    } else {
        Err(format!("strata binary not found at {}", bin.display()))
    }
}
