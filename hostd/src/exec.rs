use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{instrument, warn};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("empty argv")]
    EmptyArgv,
}

pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `argv` against the VM and enforces `timeout_sec`, killing the
/// process and reporting exit code 124 on expiry. A real guest-exec channel
/// is out of scope here; this is the scaffold's stand-in for it.
#[instrument(skip(argv))]
pub async fn exec(argv: Vec<String>, timeout_sec: u32) -> Result<ExecOutcome, ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::EmptyArgv)?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(Duration::from_secs(timeout_sec as u64), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(ExecError::Spawn(e)),
        Err(_) => {
            warn!(timeout_sec, "exec timed out");
            Ok(ExecOutcome {
                exit_code: 124,
                stdout: String::new(),
                stderr: "timeout".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_and_captures_stdout() {
        let outcome = exec(vec!["echo".into(), "hi".into()], 5).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let outcome = exec(vec!["sleep".into(), "5".into()], 1).await.unwrap();
        assert_eq!(outcome.exit_code, 124);
        assert_eq!(outcome.stderr, "timeout");
    }

    #[tokio::test]
    async fn rejects_empty_argv() {
        let result = exec(vec![], 1).await;
        assert!(matches!(result, Err(ExecError::EmptyArgv)));
    }
}
