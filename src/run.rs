//! Execution of confirmed shell commands.

use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

const SHELL: &str = "bash";

/// Strip surrounding whitespace and trailing `;` from a generated command.
pub fn clean_command(command: &str) -> &str {
    command.trim().trim_end_matches(';').trim_end()
}

/// Build `bash -c <command>` with stdio inherited from this process.
pub fn prepare_interactive_command(command: &str) -> Command {
    let mut cmd = Command::new(SHELL);
    cmd.arg("-c").arg(clean_command(command));
    cmd
}

/// Run `command` interactively and wait for it to finish.
pub async fn run_interactive(command: &str) -> std::io::Result<ExitStatus> {
    debug!(command = clean_command(command), "running command");
    let status = prepare_interactive_command(command).status().await?;
    debug!(code = ?status.code(), "command finished");
    Ok(status)
}
