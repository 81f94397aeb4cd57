use serde::{Deserialize, Serialize};

use crate::domain::message::{Message, MessageRole};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mutable per-session conversation state.
///
/// The turn index strictly increases, one increment per controller advance.
/// Once `terminal` is set no further assistant/customer turns are appended;
/// the single exception is the confirmation message that immediately follows
/// a positive plan selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: SessionId,
    pub persona: Option<String>,
    pub messages: Vec<Message>,
    pub turn_index: u32,
    pub terminal: bool,
    pub selected_plan: Option<String>,
    #[serde(default)]
    confirmation_recorded: bool,
}

impl ConversationState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            persona: None,
            messages: Vec::new(),
            turn_index: 0,
            terminal: false,
            selected_plan: None,
            confirmation_recorded: false,
        }
    }

    pub fn append(&mut self, message: Message) -> Result<(), DomainError> {
        if self.terminal {
            return Err(DomainError::TerminalStateViolation {
                session_id: self.session_id.0.clone(),
            });
        }
        self.messages.push(message);
        Ok(())
    }

    /// Record the one confirmation message allowed after a plan selection.
    pub fn append_confirmation(&mut self, message: Message) -> Result<(), DomainError> {
        if self.selected_plan.is_none() || self.confirmation_recorded {
            return Err(DomainError::TerminalStateViolation {
                session_id: self.session_id.0.clone(),
            });
        }
        self.confirmation_recorded = true;
        self.messages.push(message);
        Ok(())
    }

    pub fn advance_turn(&mut self) -> Result<u32, DomainError> {
        if self.terminal {
            return Err(DomainError::TerminalStateViolation {
                session_id: self.session_id.0.clone(),
            });
        }
        self.turn_index += 1;
        Ok(self.turn_index)
    }

    pub fn finish_with_selection(&mut self, plan_name: impl Into<String>) {
        self.selected_plan = Some(plan_name.into());
        self.terminal = true;
    }

    /// Terminal without a selection: the max-turn fallback. Not an error.
    pub fn finish_exhausted(&mut self) {
        self.terminal = true;
    }

    /// Number of customer turns taken so far; drives the assistant's
    /// recommendation-narrowing directive.
    pub fn customer_turns(&self) -> u32 {
        self.messages.iter().filter(|m| m.role == MessageRole::Customer).count() as u32
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent messages, oldest first, bounded by `window`.
    pub fn recent_messages(&self, window: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::message::Message;
    use crate::errors::DomainError;

    use super::{ConversationState, SessionId};

    fn state() -> ConversationState {
        ConversationState::new(SessionId("s-1".to_string()))
    }

    #[test]
    fn turn_index_strictly_increases() {
        let mut state = state();
        assert_eq!(state.advance_turn().expect("first advance"), 1);
        assert_eq!(state.advance_turn().expect("second advance"), 2);
        assert_eq!(state.turn_index, 2);
    }

    #[test]
    fn terminal_state_rejects_further_appends() {
        let mut state = state();
        state.append(Message::customer("I need a cheap plan.")).expect("append");
        state.finish_exhausted();

        let error = state.append(Message::assistant("One more offer...")).expect_err("terminal");
        assert!(matches!(error, DomainError::TerminalStateViolation { .. }));
        let error = state.advance_turn().expect_err("terminal");
        assert!(matches!(error, DomainError::TerminalStateViolation { .. }));
    }

    #[test]
    fn selection_allows_exactly_one_confirmation() {
        let mut state = state();
        state.finish_with_selection("Comfort 50GB");

        state
            .append_confirmation(Message::assistant("Welcome aboard with Comfort 50GB!"))
            .expect("first confirmation is allowed");
        let error = state
            .append_confirmation(Message::assistant("Welcome again!"))
            .expect_err("second confirmation is not");
        assert!(matches!(error, DomainError::TerminalStateViolation { .. }));
    }

    #[test]
    fn confirmation_requires_a_selection() {
        let mut state = state();
        state.finish_exhausted();
        let error = state
            .append_confirmation(Message::assistant("Welcome aboard!"))
            .expect_err("no selection was made");
        assert!(matches!(error, DomainError::TerminalStateViolation { .. }));
    }

    #[test]
    fn exhaustion_leaves_selected_plan_unset() {
        let mut state = state();
        state.finish_exhausted();
        assert!(state.terminal);
        assert!(state.selected_plan.is_none());
    }

    #[test]
    fn recent_messages_bounds_the_window() {
        let mut state = state();
        for index in 0..6 {
            state.append(Message::customer(format!("message {index}"))).expect("append");
        }

        let window = state.recent_messages(4);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].content, "message 2");
        assert_eq!(window[3].content, "message 5");
    }

    #[test]
    fn customer_turns_counts_only_customer_messages() {
        let mut state = state();
        state.append(Message::assistant("Hello!")).expect("append");
        state.append(Message::customer("Hi, I need data.")).expect("append");
        state.append(Message::assistant("Sure.")).expect("append");
        state.append(Message::customer("Lots of it.")).expect("append");
        assert_eq!(state.customer_turns(), 2);
    }
}
