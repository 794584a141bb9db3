use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::AnalyzerError;

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout of a successful run; a non-zero exit is an `ExternalToolFailure`.
    pub fn into_stdout(self, tool: &str) -> Result<String, AnalyzerError> {
        if self.success() {
            return Ok(self.stdout);
        }
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        Err(AnalyzerError::tool(format!(
            "{} exited with {}: {}",
            tool,
            code,
            self.stderr.trim()
        )))
    }
}

/// Runs external tools with a bounded wait.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, AnalyzerError>;
}

pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, AnalyzerError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        debug!(program = %spec.program.display(), args = ?spec.args, "spawning external tool");

        let output = match tokio::time::timeout(spec.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                AnalyzerError::tool(format!(
                    "failed to run {}: {}",
                    spec.program.display(),
                    e
                ))
            })?,
            Err(_) => {
                return Err(AnalyzerError::timeout(format!(
                    "{} did not finish within {}s",
                    spec.program.display(),
                    spec.timeout.as_secs()
                )))
            }
        };

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
