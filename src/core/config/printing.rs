use crate::core::config::data::Config;
use crate::core::models::DEFAULT_MODEL;

/// Show only the last four characters of a secret.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

impl Config {
    pub fn render(&self) -> String {
        let mut lines = vec!["Current configuration:".to_string()];
        match &self.gemini_key {
            Some(key) => lines.push(format!("  gemini-key: {}", mask_key(key))),
            None => lines.push("  gemini-key: (unset)".to_string()),
        }
        match &self.gemini_model {
            Some(model) => lines.push(format!("  gemini-model: {model}")),
            None => lines.push(format!("  gemini-model: (unset, {DEFAULT_MODEL})")),
        }
        if let Some(base_url) = &self.gemini_base_url {
            lines.push(format!("  gemini-base-url: {base_url}"));
        }
        lines.push(format!("  default-prompt-mode: {}", self.prompt_mode()));
        match self.preferences() {
            Some(preferences) => lines.push(format!("  preferences: {preferences}")),
            None => lines.push("  preferences: (none)".to_string()),
        }
        lines.join("\n")
    }

    pub fn print_all(&self) {
        println!("{}", self.render());
    }
}
