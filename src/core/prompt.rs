//! System prompt construction.

use crate::core::mode::Mode;
use crate::core::system::SystemContext;

const EXEC_PROMPT: &str = r#"You are Xang, a terminal assistant that turns requests into shell commands.
Always answer with ONLY one JSON object of the form {"cmd":"the command", "exp":"explanation", "exec":true}.
Never write anything before or after the JSON object.
"cmd" holds a single-line shell command; chain steps with && or ; and never use newlines.
"exp" briefly explains what the command does.
"exec" is true when the command can be run as-is, false otherwise.
When no sensible command exists, set "cmd" to an empty string and "exec" to false.

Examples:
User: make a folder named test
Response: {"cmd":"mkdir test", "exp":"creates a directory named test", "exec":true}
User: list files
Response: {"cmd":"ls -la", "exp":"lists all files with details", "exec":true}
User: how are you
Response: {"cmd":"", "exp":"I cannot generate a command for casual conversation. Use chat mode.", "exec":false}"#;

const CHAT_PROMPT: &str = "You are Xang, a helpful and friendly terminal assistant.
You help with terminal commands, programming, system administration and other technical questions.
Keep answers clear, concise and practical, and format them in markdown when it helps.
When you discuss a command, explain what it does and anything the user should watch out for.";

/// Everything besides the mode that feeds into the system instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub system: SystemContext,
    pub preferences: Option<String>,
}

impl PromptContext {
    pub fn new(system: SystemContext, preferences: Option<String>) -> Self {
        Self {
            system,
            preferences: preferences.filter(|prefs| !prefs.trim().is_empty()),
        }
    }

    fn context_line(&self) -> Option<String> {
        let labelled = [
            ("OS", &self.system.operating_system),
            ("Distribution", &self.system.distribution),
            ("Home", &self.system.home_directory),
            ("Shell", &self.system.shell),
            ("Editor", &self.system.editor),
            ("User preferences", &self.preferences),
        ];

        let parts: Vec<String> = labelled
            .iter()
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .filter(|value| !value.is_empty())
                    .map(|value| format!("{label}: {value}"))
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(format!("System context: {}", parts.join(", ")))
        }
    }
}

/// Build the system instruction for `mode`.
pub fn system_instruction(mode: Mode, context: &PromptContext) -> String {
    let body = match mode {
        Mode::Exec => EXEC_PROMPT,
        Mode::Chat => CHAT_PROMPT,
    };

    match context.context_line() {
        Some(line) => format!("{body}\n\n{line}"),
        None => body.to_string(),
    }
}

/// Synthetic leading user turn carrying piped input.
pub fn pipe_turn(pipe: &str) -> String {
    format!("I will work on the following input: {pipe}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_prompt_demands_the_json_contract() {
        let prompt = system_instruction(Mode::Exec, &PromptContext::default());
        assert!(prompt.contains(r#"{"cmd":"the command", "exp":"explanation", "exec":true}"#));
        assert!(!prompt.contains("System context"));
    }

    #[test]
    fn chat_prompt_differs_from_exec_prompt() {
        let context = PromptContext::default();
        assert_ne!(
            system_instruction(Mode::Chat, &context),
            system_instruction(Mode::Exec, &context)
        );
    }

    #[test]
    fn context_lists_only_known_entries() {
        let context = PromptContext::new(
            SystemContext {
                operating_system: Some("Linux".to_string()),
                shell: Some("zsh".to_string()),
                ..Default::default()
            },
            Some("prefer ripgrep".to_string()),
        );
        let prompt = system_instruction(Mode::Chat, &context);
        assert!(prompt.ends_with(
            "System context: OS: Linux, Shell: zsh, User preferences: prefer ripgrep"
        ));
    }

    #[test]
    fn blank_preferences_are_dropped() {
        let context = PromptContext::new(SystemContext::default(), Some("  ".to_string()));
        assert_eq!(context.preferences, None);
    }

    #[test]
    fn pipe_turn_is_framed() {
        assert_eq!(
            pipe_turn("a.txt\nb.txt"),
            "I will work on the following input: a.txt\nb.txt"
        );
    }
}
