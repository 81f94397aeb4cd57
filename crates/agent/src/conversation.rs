use std::sync::Arc;

use tracing::{debug, info};

use tariffsim_core::config::SimulationConfig;
use tariffsim_core::domain::conversation::ConversationState;
use tariffsim_core::domain::message::Message;
use tariffsim_core::domain::persona::Persona;
use tariffsim_core::domain::tariff::TariffCatalog;
use tariffsim_core::errors::ApplicationError;

use crate::llm::{ChatMessage, LlmClient};
use crate::prompts;
use crate::selection::{SelectionClassifier, SelectionDecision};

/// The three conversational steps, dispatched sequentially through one
/// shared LLM client. Not an agent framework: `TerminationCheck` never calls
/// the LLM at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnKind {
    AssistantTurn,
    CustomerTurn,
    TerminationCheck,
}

#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub max_turns: u32,
    pub history_window: usize,
}

impl From<&SimulationConfig> for ControllerSettings {
    fn from(config: &SimulationConfig) -> Self {
        Self { max_turns: config.max_turns, history_window: config.history_window }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdvanceOutcome {
    pub new_messages: Vec<Message>,
    /// True when this call moved the conversation into its terminal state.
    pub finished: bool,
}

/// Orchestrates turn order: builds the role-specific prompt, invokes the LLM
/// client, appends the returned text, and asks the selection classifier
/// whether the conversation is over. Persistence and streaming are the
/// caller's responsibility; the controller has no side effects beyond the
/// returned messages.
pub struct ConversationController {
    llm: Arc<dyn LlmClient>,
    catalog: TariffCatalog,
    classifier: SelectionClassifier,
    settings: ControllerSettings,
}

impl ConversationController {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: TariffCatalog,
        settings: ControllerSettings,
    ) -> Self {
        let classifier = SelectionClassifier::new(catalog.clone());
        Self { llm, catalog, classifier, settings }
    }

    pub fn greeting() -> Message {
        Message::assistant(prompts::ASSISTANT_GREETING)
    }

    /// One simulator-mode step: the first call produces the customer
    /// introduction; each later call produces one assistant reply and one
    /// customer reply, then runs the termination check. Calls on a terminal
    /// state are no-ops.
    pub async fn advance(
        &self,
        state: &mut ConversationState,
        persona: &Persona,
    ) -> Result<AdvanceOutcome, ApplicationError> {
        if state.terminal {
            return Ok(AdvanceOutcome::default());
        }

        let turn_index = state.advance_turn().map_err(ApplicationError::from)?;
        debug!(
            event_name = "agent.conversation.advance",
            session_id = %state.session_id.as_str(),
            turn_index,
            "advancing simulated conversation"
        );

        let script: &[TurnKind] = if state.customer_turns() == 0 {
            &[TurnKind::CustomerTurn, TurnKind::TerminationCheck]
        } else {
            &[TurnKind::AssistantTurn, TurnKind::CustomerTurn, TurnKind::TerminationCheck]
        };

        let mut outcome = AdvanceOutcome::default();
        for kind in script {
            match kind {
                TurnKind::AssistantTurn => {
                    let message = self.assistant_turn(state, &persona_line(persona)).await?;
                    state.append(message.clone()).map_err(ApplicationError::from)?;
                    outcome.new_messages.push(message);
                }
                TurnKind::CustomerTurn => {
                    let message = self.customer_turn(state, persona).await?;
                    state.append(message.clone()).map_err(ApplicationError::from)?;
                    outcome.new_messages.push(message);
                }
                TurnKind::TerminationCheck => {
                    if self.termination_check(state, &mut outcome).await? {
                        return Ok(outcome);
                    }
                }
            }
        }

        if state.turn_index >= self.settings.max_turns {
            info!(
                event_name = "agent.conversation.exhausted",
                session_id = %state.session_id.as_str(),
                turn_index = state.turn_index,
                "conversation ended without selection"
            );
            state.finish_exhausted();
            outcome.finished = true;
        }

        Ok(outcome)
    }

    /// Interactive mode: append an externally supplied customer message and
    /// advance only the assistant role in response.
    pub async fn respond(
        &self,
        state: &mut ConversationState,
        user_message: &str,
    ) -> Result<AdvanceOutcome, ApplicationError> {
        if state.terminal {
            return Ok(AdvanceOutcome::default());
        }

        state.advance_turn().map_err(ApplicationError::from)?;
        state.append(Message::customer(user_message)).map_err(ApplicationError::from)?;

        let mut outcome = AdvanceOutcome::default();
        if self.termination_check(state, &mut outcome).await? {
            return Ok(outcome);
        }

        let persona_line = state
            .persona
            .clone()
            .unwrap_or_else(|| format!("Customer message: {user_message}"));
        let message = self.assistant_turn(state, &persona_line).await?;
        state.append(message.clone()).map_err(ApplicationError::from)?;
        outcome.new_messages.push(message);

        if state.turn_index >= self.settings.max_turns {
            state.finish_exhausted();
            outcome.finished = true;
        }

        Ok(outcome)
    }

    async fn assistant_turn(
        &self,
        state: &ConversationState,
        persona_line: &str,
    ) -> Result<Message, ApplicationError> {
        let prompt = prompts::assistant_prompt(
            state.recent_messages(self.settings.history_window),
            &self.catalog.render_markdown(),
            persona_line,
            state.customer_turns(),
        );
        let content = self
            .complete(&[
                ChatMessage::system(prompts::ASSISTANT_ROLE_INSTRUCTIONS),
                ChatMessage::user(prompt),
            ])
            .await?;
        Ok(Message::assistant(content))
    }

    async fn customer_turn(
        &self,
        state: &ConversationState,
        persona: &Persona,
    ) -> Result<Message, ApplicationError> {
        let prompt = if state.customer_turns() == 0 {
            prompts::customer_intro_prompt(persona)
        } else {
            let last_assistant = state
                .last_message()
                .map(|message| message.content.clone())
                .unwrap_or_default();
            let mut previous: Vec<String> = state
                .messages
                .iter()
                .filter(|m| m.role == tariffsim_core::domain::message::MessageRole::Customer)
                .rev()
                .take(2)
                .map(|m| m.content.clone())
                .collect();
            previous.reverse();
            prompts::customer_reply_prompt(
                persona,
                state.recent_messages(self.settings.history_window),
                &last_assistant,
                &previous,
            )
        };

        let content = self
            .complete(&[
                ChatMessage::system(prompts::CUSTOMER_ROLE_INSTRUCTIONS),
                ChatMessage::user(prompt),
            ])
            .await?;
        Ok(Message::customer(content))
    }

    /// Runs the classifier on the latest customer message. On a positive
    /// result, marks the state terminal and generates the single allowed
    /// confirmation message naming the plan.
    async fn termination_check(
        &self,
        state: &mut ConversationState,
        outcome: &mut AdvanceOutcome,
    ) -> Result<bool, ApplicationError> {
        let Some(last) = state.last_message() else {
            return Ok(false);
        };
        let SelectionDecision::Selected { plan_name } = self.classifier.classify(&last.content)
        else {
            return Ok(false);
        };

        info!(
            event_name = "agent.conversation.plan_selected",
            session_id = %state.session_id.as_str(),
            plan_name = %plan_name,
            turn_index = state.turn_index,
            "customer selected a plan"
        );

        state.finish_with_selection(plan_name.clone());
        let content = self
            .complete(&[
                ChatMessage::system(prompts::ASSISTANT_ROLE_INSTRUCTIONS),
                ChatMessage::user(prompts::confirmation_prompt(&plan_name)),
            ])
            .await?;
        let confirmation = Message::assistant(content);
        state.append_confirmation(confirmation.clone()).map_err(ApplicationError::from)?;
        outcome.new_messages.push(confirmation);
        outcome.finished = true;
        Ok(true)
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ApplicationError> {
        self.llm
            .complete(messages)
            .await
            .map_err(|error| ApplicationError::Generation(error.to_string()))
    }
}

fn persona_line(persona: &Persona) -> String {
    format!("{}. {}", persona.name, persona.needs)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use tariffsim_core::domain::conversation::{ConversationState, SessionId};
    use tariffsim_core::domain::message::MessageRole;
    use tariffsim_core::domain::persona::Persona;
    use tariffsim_core::domain::tariff::TariffCatalog;
    use tariffsim_core::errors::ApplicationError;

    use crate::llm::{ChatMessage, GenerationError, LlmClient};

    use super::{AdvanceOutcome, ControllerSettings, ConversationController};

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            self.responses
                .lock()
                .expect("scripted responses lock")
                .pop()
                .ok_or(GenerationError::EmptyCompletion)
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            Err(GenerationError::Http("connection refused".to_string()))
        }
    }

    /// Records every prompt it receives and replies with a fixed line.
    struct CapturingLlm {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CapturingLlm {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: Mutex::new(Vec::new()) })
        }

        fn last_user_prompt(&self) -> String {
            let calls = self.calls.lock().expect("captured calls lock");
            calls
                .last()
                .and_then(|messages| messages.last())
                .map(|message| message.content.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for CapturingLlm {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
            self.calls.lock().expect("captured calls lock").push(messages.to_vec());
            Ok("Here is what I can offer.".to_string())
        }
    }

    fn controller(llm: Arc<dyn LlmClient>, max_turns: u32) -> ConversationController {
        ConversationController::new(
            llm,
            TariffCatalog::builtin(),
            ControllerSettings { max_turns, history_window: 12 },
        )
    }

    fn persona() -> Persona {
        Persona {
            name: "Anna, the Student".to_string(),
            needs: "You want enough data for streaming on a limited budget.".to_string(),
        }
    }

    fn state() -> ConversationState {
        ConversationState::new(SessionId("s-1".to_string()))
    }

    #[tokio::test]
    async fn first_advance_produces_only_the_customer_introduction() {
        let llm = ScriptedLlm::new(&["Hi, I'm Anna and I need a data plan."]);
        let controller = controller(llm, 10);
        let mut state = state();

        let outcome = controller.advance(&mut state, &persona()).await.expect("advance");

        assert_eq!(outcome.new_messages.len(), 1);
        assert_eq!(outcome.new_messages[0].role, MessageRole::Customer);
        assert_eq!(state.turn_index, 1);
        assert!(!state.terminal);
    }

    #[tokio::test]
    async fn turn_index_increments_exactly_once_per_advance() {
        let llm = ScriptedLlm::new(&[
            "Hi, I'm Anna.",
            "We have three plans for you.",
            "Tell me more about data volumes.",
        ]);
        let controller = controller(llm, 10);
        let mut state = state();

        controller.advance(&mut state, &persona()).await.expect("first advance");
        assert_eq!(state.turn_index, 1);
        controller.advance(&mut state, &persona()).await.expect("second advance");
        assert_eq!(state.turn_index, 2);
    }

    #[tokio::test]
    async fn selection_terminates_with_confirmation() {
        let llm = ScriptedLlm::new(&[
            "Hi, I'm Anna.",
            "The Comfort 50GB plan fits you best.",
            "Great, I'll take the Comfort 50GB plan.",
            "Thank you for choosing the Comfort 50GB plan! A representative will contact you.",
        ]);
        let controller = controller(llm, 10);
        let mut state = state();

        controller.advance(&mut state, &persona()).await.expect("intro");
        let outcome = controller.advance(&mut state, &persona()).await.expect("selection turn");

        assert!(outcome.finished);
        assert!(state.terminal);
        assert_eq!(state.selected_plan.as_deref(), Some("Comfort 50GB"));

        let last = state.last_message().expect("confirmation message");
        assert_eq!(last.role, MessageRole::Assistant);
        assert!(last.content.contains("Comfort 50GB"));
    }

    #[tokio::test]
    async fn terminal_state_advances_are_noops() {
        let llm = ScriptedLlm::new(&[
            "Hi, I'm Anna.",
            "The Comfort 50GB plan fits you best.",
            "I'll take the Comfort 50GB plan.",
            "Welcome aboard!",
        ]);
        let controller = controller(llm, 10);
        let mut state = state();

        controller.advance(&mut state, &persona()).await.expect("intro");
        controller.advance(&mut state, &persona()).await.expect("selection");
        let message_count = state.messages.len();

        let outcome = controller.advance(&mut state, &persona()).await.expect("noop");
        assert!(outcome.new_messages.is_empty());
        assert_eq!(state.messages.len(), message_count);
    }

    #[tokio::test]
    async fn max_turns_exhaustion_is_terminal_without_selection() {
        let llm = ScriptedLlm::new(&[
            "Hi, I'm Anna.",
            "We have three plans.",
            "I'm still not sure.",
        ]);
        let controller = controller(llm, 2);
        let mut state = state();

        controller.advance(&mut state, &persona()).await.expect("first");
        let outcome = controller.advance(&mut state, &persona()).await.expect("second");

        assert!(outcome.finished);
        assert!(state.terminal);
        assert!(state.selected_plan.is_none());

        let noop = controller.advance(&mut state, &persona()).await.expect("noop");
        assert!(noop.new_messages.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_surfaces_as_application_error() {
        let controller = controller(Arc::new(FailingLlm), 10);
        let mut state = state();

        let error = controller.advance(&mut state, &persona()).await.expect_err("must fail");
        assert!(matches!(error, ApplicationError::Generation(_)));
    }

    #[tokio::test]
    async fn interactive_selection_yields_confirmation() {
        let llm = ScriptedLlm::new(&["Thank you for choosing the Business 100GB plan!"]);
        let controller = controller(llm, 10);
        let mut state = state();

        let outcome = controller
            .respond(&mut state, "Great, I'll take the Business 100GB plan.")
            .await
            .expect("respond");

        assert!(outcome.finished);
        assert_eq!(state.selected_plan.as_deref(), Some("Business 100GB"));
        assert_eq!(outcome.new_messages.len(), 1);
        assert!(outcome.new_messages[0].content.contains("Business 100GB"));
    }

    #[tokio::test]
    async fn interactive_question_gets_an_assistant_reply() {
        let llm = ScriptedLlm::new(&["The Comfort 50GB plan includes unlimited calls."]);
        let controller = controller(llm, 10);
        let mut state = state();

        let outcome = controller
            .respond(&mut state, "Does the Comfort 50GB plan include unlimited calls?")
            .await
            .expect("respond");

        assert!(!outcome.finished);
        assert!(!state.terminal);
        assert_eq!(outcome.new_messages.len(), 1);
        assert_eq!(outcome.new_messages[0].role, MessageRole::Assistant);
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn interactive_prompt_quotes_the_user_message_when_no_persona_is_set() {
        let llm = CapturingLlm::new();
        let controller = controller(llm.clone(), 10);
        let mut state = state();

        controller
            .respond(&mut state, "Which plan is best for gaming?")
            .await
            .expect("respond");

        let prompt = llm.last_user_prompt();
        assert!(prompt.contains("Customer message: Which plan is best for gaming?"));
        assert!(!prompt.contains("Anna, the Student"));
    }

    #[tokio::test]
    async fn interactive_prompt_keeps_the_persona_of_a_simulated_session() {
        let llm = CapturingLlm::new();
        let controller = controller(llm.clone(), 10);
        let mut state = state();
        state.persona = Some("Anna, the Student".to_string());

        controller.respond(&mut state, "Tell me more about data volumes.").await.expect("respond");

        let prompt = llm.last_user_prompt();
        assert!(prompt.contains("Customer: Anna, the Student"));
    }

    #[test]
    fn outcome_default_is_empty_and_unfinished() {
        let outcome = AdvanceOutcome::default();
        assert!(outcome.new_messages.is_empty());
        assert!(!outcome.finished);
    }
}
