//! Conversation State Store.
//!
//! Plain data with no locking of its own; the engine owns it behind a
//! reader/writer lock and keeps every critical section short.

use tokio_util::sync::CancellationToken;

use crate::core::message::Message;
use crate::core::mode::Mode;
use crate::core::prompt::{pipe_turn, system_instruction, PromptContext};

#[derive(Debug)]
pub struct ConversationState {
    mode: Mode,
    exec_history: Vec<Message>,
    chat_history: Vec<Message>,
    pipe_context: Option<String>,
    prompt_context: PromptContext,
    system_instruction: String,
    operation: Option<(u64, CancellationToken)>,
    next_operation: u64,
}

impl ConversationState {
    pub fn new(mode: Mode, prompt_context: PromptContext) -> Self {
        let system_instruction = system_instruction(mode, &prompt_context);
        Self {
            mode,
            exec_history: Vec::new(),
            chat_history: Vec::new(),
            pipe_context: None,
            prompt_context,
            system_instruction,
            operation: None,
            next_operation: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch the active mode. Neither history is touched.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.refresh_system_instruction();
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn refresh_system_instruction(&mut self) {
        self.system_instruction = system_instruction(self.mode, &self.prompt_context);
    }

    /// Store piped input; an empty string disables injection.
    pub fn set_pipe_context(&mut self, pipe: impl Into<String>) {
        let pipe = pipe.into();
        self.pipe_context = (!pipe.is_empty()).then_some(pipe);
    }

    pub fn pipe_context(&self) -> Option<&str> {
        self.pipe_context.as_deref()
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.active_history_mut().push(Message::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.active_history_mut().push(Message::assistant(text));
    }

    /// Append to the history of `mode` regardless of which mode is active.
    pub fn append_to(&mut self, mode: Mode, message: Message) {
        self.history_mut(mode).push(message);
    }

    pub fn history(&self, mode: Mode) -> &[Message] {
        match mode {
            Mode::Exec => &self.exec_history,
            Mode::Chat => &self.chat_history,
        }
    }

    pub fn active_history(&self) -> &[Message] {
        self.history(self.mode)
    }

    fn history_mut(&mut self, mode: Mode) -> &mut Vec<Message> {
        match mode {
            Mode::Exec => &mut self.exec_history,
            Mode::Chat => &mut self.chat_history,
        }
    }

    fn active_history_mut(&mut self) -> &mut Vec<Message> {
        self.history_mut(self.mode)
    }

    /// Empty only the active mode's history.
    pub fn clear_active(&mut self) {
        self.active_history_mut().clear();
    }

    /// Empty both histories.
    pub fn reset_all(&mut self) {
        self.exec_history.clear();
        self.chat_history.clear();
    }

    /// History as sent to the model: the synthetic pipe turn, if any, followed
    /// by the active history in insertion order.
    pub fn outgoing_history(&self) -> Vec<Message> {
        let active = self.active_history();
        let mut messages = Vec::with_capacity(active.len() + 1);
        if let Some(pipe) = &self.pipe_context {
            messages.push(Message::user(pipe_turn(pipe)));
        }
        messages.extend_from_slice(active);
        messages
    }

    pub fn is_running(&self) -> bool {
        self.operation.is_some()
    }

    /// Mark an operation as in flight and return its id; `token` is
    /// cancelled if it is interrupted.
    pub(crate) fn begin_operation(&mut self, token: CancellationToken) -> u64 {
        self.next_operation += 1;
        let id = self.next_operation;
        self.operation = Some((id, token));
        id
    }

    /// Id and token of the operation in flight.
    pub(crate) fn current_operation(&self) -> Option<(u64, CancellationToken)> {
        self.operation.clone()
    }

    /// Clear the running flag if operation `id` is still the one in flight.
    /// Returns its token; a later operation is left untouched.
    pub(crate) fn stop_operation(&mut self, id: u64) -> Option<CancellationToken> {
        match &self.operation {
            Some((current, _)) if *current == id => self.operation.take().map(|(_, token)| token),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;

    fn state(mode: Mode) -> ConversationState {
        ConversationState::new(mode, PromptContext::default())
    }

    #[test]
    fn alternating_turns_replay_in_insertion_order() {
        let mut state = state(Mode::Chat);
        for i in 0..5 {
            state.append_user(format!("question {i}"));
            state.append_assistant(format!("answer {i}"));
        }

        let replay = state.outgoing_history();
        assert_eq!(replay.len(), 10);
        for (index, message) in replay.iter().enumerate() {
            let turn = index / 2;
            if index % 2 == 0 {
                assert_eq!(message.role, Role::User);
                assert_eq!(message.text, format!("question {turn}"));
            } else {
                assert_eq!(message.role, Role::Assistant);
                assert_eq!(message.text, format!("answer {turn}"));
            }
        }
    }

    #[test]
    fn mode_round_trip_keeps_histories_independent() {
        let mut state = state(Mode::Exec);
        state.append_user("list files");
        state.append_assistant(r#"{"cmd":"ls","exp":"lists","exec":true}"#);
        let exec_before = state.history(Mode::Exec).to_vec();

        state.set_mode(Mode::Chat);
        state.append_user("hello");
        assert_eq!(state.active_history().len(), 1);

        state.set_mode(Mode::Exec);
        assert_eq!(state.history(Mode::Exec), exec_before.as_slice());
        assert_eq!(state.history(Mode::Chat).len(), 1);
    }

    #[test]
    fn set_mode_regenerates_system_instruction() {
        let mut state = state(Mode::Exec);
        let exec_prompt = state.system_instruction().to_string();
        state.set_mode(Mode::Chat);
        assert_ne!(state.system_instruction(), exec_prompt);
        state.set_mode(Mode::Exec);
        assert_eq!(state.system_instruction(), exec_prompt);
    }

    #[test]
    fn pipe_context_leads_the_outgoing_history() {
        let mut state = state(Mode::Exec);
        state.set_pipe_context("a.txt\nb.txt");
        state.append_user("count them");

        let replay = state.outgoing_history();
        assert_eq!(replay.len(), 2);
        assert_eq!(
            replay[0],
            Message::user("I will work on the following input: a.txt\nb.txt")
        );
        assert_eq!(replay[1], Message::user("count them"));
        // The synthetic turn is never stored.
        assert_eq!(state.active_history().len(), 1);
    }

    #[test]
    fn empty_pipe_disables_injection() {
        let mut state = state(Mode::Chat);
        state.set_pipe_context("data");
        state.set_pipe_context("");
        assert_eq!(state.pipe_context(), None);
        assert!(state.outgoing_history().is_empty());
    }

    #[test]
    fn append_to_targets_the_named_mode() {
        let mut state = state(Mode::Chat);
        state.append_to(Mode::Exec, Message::assistant("ls"));
        assert!(state.active_history().is_empty());
        assert_eq!(state.history(Mode::Exec), [Message::assistant("ls")].as_slice());
    }

    #[test]
    fn clear_active_leaves_the_other_mode_alone() {
        let mut state = state(Mode::Exec);
        state.append_user("exec turn");
        state.set_mode(Mode::Chat);
        state.append_user("chat turn");

        state.clear_active();
        assert!(state.history(Mode::Chat).is_empty());
        assert_eq!(state.history(Mode::Exec).len(), 1);

        state.reset_all();
        assert!(state.history(Mode::Exec).is_empty());
    }

    #[test]
    fn stopping_hands_back_the_operation_token() {
        let mut state = state(Mode::Chat);
        let token = CancellationToken::new();
        let id = state.begin_operation(token.clone());
        assert!(state.is_running());

        let stopped = state.stop_operation(id).expect("operation token");
        stopped.cancel();
        assert!(token.is_cancelled());
        assert!(!state.is_running());
        assert!(state.stop_operation(id).is_none());
    }

    #[test]
    fn stale_stop_leaves_the_next_operation_running() {
        let mut state = state(Mode::Chat);
        let first = state.begin_operation(CancellationToken::new());
        assert!(state.stop_operation(first).is_some());

        let second_token = CancellationToken::new();
        let second = state.begin_operation(second_token.clone());
        assert_ne!(first, second);

        assert!(state.stop_operation(first).is_none());
        assert!(state.is_running());
        let (current, _) = state.current_operation().expect("second in flight");
        assert_eq!(current, second);
        assert!(!second_token.is_cancelled());
    }
}
