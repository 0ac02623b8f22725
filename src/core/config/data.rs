use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::mode::Mode;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Gemini API key. The keyring and environment take precedence.
    pub gemini_key: Option<String>,
    /// Model name; validated and mapped onto a current model at startup.
    pub gemini_model: Option<String>,
    /// Overrides the Gemini REST endpoint (proxies, tests).
    pub gemini_base_url: Option<String>,
    /// Prompt mode used when neither `--exec` nor `--chat` is given.
    pub default_prompt_mode: Option<Mode>,
    /// Free-form user preferences appended to the system prompt.
    pub preferences: Option<String>,
}

impl Config {
    pub fn prompt_mode(&self) -> Mode {
        self.default_prompt_mode.unwrap_or_default()
    }

    /// Preferences with surrounding whitespace removed; blank counts as unset.
    pub fn preferences(&self) -> Option<&str> {
        self.preferences
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/xang/config.toml` → `~/.config/xang/config.toml`
/// - macOS: `/Users/user/Library/Application Support/...` → `~/Library/Application Support/...`
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
