//! Host environment facts that are folded into the system prompt so the model
//! can tailor commands to the user's machine.

use directories::BaseDirs;
use std::path::Path;

const OS_RELEASE_PATH: &str = "/etc/os-release";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemContext {
    pub operating_system: Option<String>,
    pub distribution: Option<String>,
    pub home_directory: Option<String>,
    pub shell: Option<String>,
    pub editor: Option<String>,
}

impl SystemContext {
    /// Inspect the current process environment.
    pub fn analyse() -> Self {
        Self {
            operating_system: operating_system_name(std::env::consts::OS),
            distribution: read_distribution(Path::new(OS_RELEASE_PATH)),
            home_directory: BaseDirs::new().map(|dirs| dirs.home_dir().display().to_string()),
            shell: std::env::var("SHELL")
                .ok()
                .and_then(|shell| shell_name(&shell)),
            editor: std::env::var("VISUAL")
                .or_else(|_| std::env::var("EDITOR"))
                .ok()
                .filter(|editor| !editor.trim().is_empty()),
        }
    }
}

fn operating_system_name(os: &str) -> Option<String> {
    let name = match os {
        "linux" => "Linux",
        "macos" => "MacOS",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        "netbsd" => "NetBSD",
        _ => return None,
    };
    Some(name.to_string())
}

fn shell_name(shell: &str) -> Option<String> {
    Path::new(shell.trim())
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

fn read_distribution(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_os_release(&contents)
}

fn parse_os_release(contents: &str) -> Option<String> {
    let mut name = None;
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "PRETTY_NAME" => return Some(value.to_string()),
            "NAME" => name = Some(value.to_string()),
            _ => {}
        }
    }
    name
}
