//! Subprocess seam.
//!
//! Everything the engine does to the host goes through [`ProcessRunner`], so
//! the dispatch logic can be exercised without touching the machine.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{DispatchError, DispatchResult};

/// Exit code and captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    /// What to show the operator when the process failed.
    pub fn failure_detail(&self) -> String {
        if self.stderr.trim().is_empty() {
            format!("exit status {}", self.code)
        } else {
            self.stderr.clone()
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments; waits for exit.
    async fn run(&self, argv: &[&str]) -> std::io::Result<ProcessOutput>;

    /// Run a command line through the shell; waits for exit.
    async fn run_shell(&self, command: &str) -> std::io::Result<ProcessOutput>;
}

/// Run `argv` and turn a spawn error or non-zero exit into an execution error
/// labelled `what`.
pub async fn run_checked(
    runner: &dyn ProcessRunner,
    what: &str,
    argv: &[&str],
) -> DispatchResult<ProcessOutput> {
    let output = runner
        .run(argv)
        .await
        .map_err(|e| DispatchError::execution(what, e.to_string()))?;
    if !output.success() {
        return Err(DispatchError::execution(what, output.failure_detail()));
    }
    Ok(output)
}

/// Runs real processes via Tokio. In dry-run mode nothing is spawned; each
/// invocation is logged and reported as a silent success.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    dry_run: bool,
    shell: PathBuf,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            shell: PathBuf::from("/bin/bash"),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn spawn(mut command: Command) -> std::io::Result<ProcessOutput> {
        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(ProcessOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, argv: &[&str]) -> std::io::Result<ProcessOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argument vector",
            ));
        };
        if self.dry_run {
            info!(target: "telepwn::process", ?argv, "DRY-RUN run");
            return Ok(ProcessOutput::default());
        }
        debug!(target: "telepwn::process", ?argv, "run");
        let mut command = Command::new(program);
        command.args(args);
        Self::spawn(command).await
    }

    async fn run_shell(&self, command: &str) -> std::io::Result<ProcessOutput> {
        if self.dry_run {
            info!(target: "telepwn::process", %command, "DRY-RUN run_shell");
            return Ok(ProcessOutput::default());
        }
        debug!(target: "telepwn::process", %command, "run_shell");
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        Self::spawn(cmd).await
    }
}
