//! External editor integration
//!
//! Opens files such as the config in the user's editor and waits for it to
//! exit.

use std::io;
use std::path::Path;
use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

/// Used when neither `VISUAL` nor `EDITOR` is set.
pub const FALLBACK_EDITOR: &str = "nano";

/// The editor to launch: `VISUAL`, then `EDITOR`, then nano.
pub fn editor_program<E>(env: E) -> String
where
    E: Fn(&str) -> Option<String>,
{
    ["VISUAL", "EDITOR"]
        .into_iter()
        .filter_map(|var| env(var))
        .map(|editor| editor.trim().to_string())
        .find(|editor| !editor.is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string())
}

/// `editor` split on whitespace, so values like `code --wait` work, followed
/// by `path`. Stdio is inherited.
pub fn editor_command(editor: &str, path: &Path) -> Command {
    let mut words = editor.split_whitespace();
    let program = words.next().unwrap_or(FALLBACK_EDITOR);
    let mut command = Command::new(program);
    command.args(words).arg(path);
    command
}

/// Run the editor on `path` and wait for it to exit.
pub async fn open_in_editor(editor: &str, path: &Path) -> io::Result<ExitStatus> {
    debug!(editor, path = %path.display(), "opening editor");
    let status = editor_command(editor, path).status().await?;
    debug!(code = ?status.code(), "editor exited");
    Ok(status)
}
