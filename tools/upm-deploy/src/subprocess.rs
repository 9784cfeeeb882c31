use std::{
    path::Path,
    process::{Output, Stdio},
    time::Duration,
};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::DeployError;

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs a command to completion and captures its output.
///
/// The child is killed if it outlives `limit`.
pub async fn run_command(program: &str, args: &[&str], limit: Duration) -> anyhow::Result<Output> {
    let command_line = display_command(program, args);
    tracing::debug!("Running `{command_line}`");

    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DeployError::command_failed(&command_line, e.to_string()))?;

    match timeout(limit, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(DeployError::command_failed(
            command_line,
            format!("did not finish within {limit:?}"),
        )
        .into()),
    }
}

/// Like [`run_command`] but a non-zero exit status is an error. Returns stdout.
pub async fn run_command_checked(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> anyhow::Result<String> {
    let output = run_command(program, args, limit).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeployError::command_failed(
            display_command(program, args),
            format!("exited with {}: {}", output.status, stderr.trim()),
        )
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs a long command, forwarding each line of its output to the log as it
/// arrives. Both pipes are drained from this task, nothing is spawned.
pub async fn run_streamed(
    name: &str,
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    limit: Duration,
) -> anyhow::Result<()> {
    let command_line = display_command(program, args);
    tracing::info!("{name}: running `{command_line}`");

    let mut command = Command::new(program);
    command
        .args(args)
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let mut child = command
        .spawn()
        .map_err(|e| DeployError::command_failed(&command_line, e.to_string()))?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        anyhow::bail!("Failed to capture output of `{command_line}`");
    };

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let drain_and_wait = async {
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                line = stdout_reader.next_line(), if stdout_open => match line? {
                    Some(line) => tracing::info!("{name}: {line}"),
                    None => stdout_open = false,
                },
                line = stderr_reader.next_line(), if stderr_open => match line? {
                    Some(line) => tracing::warn!("{name}: {line}"),
                    None => stderr_open = false,
                },
            }
        }

        child.wait().await
    };

    let status = match timeout(limit, drain_and_wait).await {
        Ok(status) => status?,
        Err(_) => {
            return Err(DeployError::command_failed(
                command_line,
                format!("did not finish within {limit:?}"),
            )
            .into())
        }
    };

    if !status.success() {
        return Err(DeployError::command_failed(command_line, format!("exited with {status}")).into());
    }

    Ok(())
}

/// Hands the terminal to the child, e.g. for `vagrant ssh`.
pub async fn run_interactive(program: &str, args: &[&str], cwd: &Path) -> anyhow::Result<()> {
    let status = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .status()
        .await
        .map_err(|e| DeployError::command_failed(display_command(program, args), e.to_string()))?;

    if !status.success() {
        return Err(DeployError::command_failed(
            display_command(program, args),
            format!("exited with {status}"),
        )
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checked_command_returns_stdout() {
        let stdout = run_command_checked("sh", &["-c", "echo hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run_command_checked("sh", &["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("boom"), "{message}");
    }

    #[tokio::test]
    async fn commands_are_killed_after_the_limit() {
        let err = run_command("sh", &["-c", "sleep 5"], Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test]
    async fn streamed_command_reports_failure() {
        let dir = tempfile::tempdir().unwrap();

        run_streamed(
            "ok",
            "sh",
            &["-c", "echo out; echo err >&2"],
            Some(dir.path()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let err = run_streamed("fail", "sh", &["-c", "exit 1"], None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
