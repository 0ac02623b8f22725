use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selects which conversation history and system prompt are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Turn requests into a single executable shell command.
    #[default]
    Exec,
    /// Free-form conversation.
    Chat,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Exec => "exec",
            Mode::Chat => "chat",
        }
    }

    pub fn toggled(self) -> Mode {
        match self {
            Mode::Exec => Mode::Chat,
            Mode::Chat => Mode::Exec,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exec" | "execute" | "command" => Ok(Mode::Exec),
            "chat" => Ok(Mode::Chat),
            other => Err(format!("unknown prompt mode: {other}")),
        }
    }
}
