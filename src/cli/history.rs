/// Prompts entered at the REPL, oldest first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PromptHistory {
    entries: Vec<String>,
}

impl PromptHistory {
    /// Record a prompt. Repeating the previous prompt adds nothing.
    pub fn add(&mut self, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() || self.entries.last().is_some_and(|last| last == prompt) {
            return;
        }
        self.entries.push(prompt.to_string());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Entry `number` counting from 1, or the latest entry for `None`.
    pub fn recall(&self, number: Option<usize>) -> Option<&str> {
        let entry = match number {
            None => self.entries.last(),
            Some(number) => number.checked_sub(1).and_then(|index| self.entries.get(index)),
        };
        entry.map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Numbered listing as printed by `/history`.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, prompt)| format!("{:>4}  {prompt}\n", index + 1))
            .collect()
    }
}
