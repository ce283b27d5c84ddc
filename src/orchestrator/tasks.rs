// ABOUTME: Task sequence normalization and the process-mode runner.
// ABOUTME: Runs steps strictly in order, streaming output lines to the bus.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::bus::EventBus;
use crate::metrics;
use crate::protocol::{TaskRequestPayload, TaskStep};

/// Normalize a task request into an ordered step list.
///
/// An explicit sequence wins over the legacy single-command form. An empty
/// result means the request carried no runnable work.
pub fn normalize(request: &TaskRequestPayload) -> Vec<TaskStep> {
    if let Some(sequence) = &request.sequence {
        if !sequence.is_empty() {
            return sequence.clone();
        }
    }
    match &request.command {
        Some(command) if !command.trim().is_empty() => vec![TaskStep {
            command: command.clone(),
            args: request.args.clone(),
        }],
        _ => Vec::new(),
    }
}

/// Render a step as the line written into a terminal.
pub fn command_line(step: &TaskStep) -> String {
    if step.args.is_empty() {
        step.command.clone()
    } else {
        format!("{} {}", step.command, step.args.join(" "))
    }
}

/// Build the `cd` line sent before terminal steps. Backticks and double
/// quotes are escaped so the path survives the shell.
pub fn cd_command(cwd: &str) -> String {
    let escaped = cwd.replace('`', "\\`").replace('"', "\\\"");
    format!("cd \"{escaped}\"")
}

/// Run steps strictly in sequence, stopping at the first failure.
///
/// Returns the number of steps that ran on full success; the error of the
/// failing step otherwise (remaining steps are not started).
pub async fn run_sequence(
    steps: &[TaskStep],
    cwd: Option<&Path>,
    bus: &Arc<EventBus>,
) -> Result<usize> {
    for step in steps {
        run_step(step, cwd, bus).await?;
        metrics::record_task_step("process");
    }
    Ok(steps.len())
}

/// Spawn one step and stream its output. Non-empty stdout lines become info
/// logs, stderr lines warnings. A spawn failure or nonzero exit is an error
/// naming the command.
async fn run_step(step: &TaskStep, cwd: Option<&Path>, bus: &Arc<EventBus>) -> Result<()> {
    let display = command_line(step);

    let mut command = Command::new(&step.command);
    command
        .args(&step.args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn `{display}`"))?;

    let stdout = child.stdout.take().context("failed to capture stdout")?;
    let stderr = child.stderr.take().context("failed to capture stderr")?;

    // Drain stderr on its own task so neither pipe can fill and stall the child
    let stderr_bus = Arc::clone(bus);
    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                stderr_bus.warn(line);
            }
        }
    });

    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.is_empty() {
            bus.info(line);
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait for `{display}`"))?;

    if let Err(e) = stderr_handle.await {
        tracing::warn!(error = %e, "stderr reader task failed to complete");
    }

    if !status.success() {
        return Err(match status.code() {
            Some(code) => anyhow!("command `{display}` exited with status {code}"),
            None => anyhow!("command `{display}` was terminated by a signal"),
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
