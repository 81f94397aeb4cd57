//! Conversation engine - LLM-backed turn generation and plan-selection detection
//!
//! This crate drives the simulated sales conversation:
//! - **Prompt templates** (`prompts`) - role instructions, bounded transcript
//!   windows, and the turn-based recommendation-narrowing directive
//! - **LLM client** (`llm`) - adapter for an OpenAI-compatible
//!   `chat/completions` endpoint, with role-compatibility folding
//! - **Selection classifier** (`selection`) - deterministic judge deciding
//!   whether a customer message is a plan purchase
//! - **Controller** (`conversation`) - alternates assistant/customer turns,
//!   runs the classifier, and enforces the max-turn stop condition
//!
//! # Key Types
//!
//! - `ConversationController` - the turn-taking orchestrator
//! - `LlmClient` - pluggable trait over the completion backend
//! - `SelectionClassifier` - pure text heuristic over the tariff catalog
//!
//! # Design Principle
//!
//! The three conversational roles are not independent agents; they are prompt
//! templates dispatched sequentially through one shared LLM client. The
//! decision to end a conversation is never delegated to the LLM: the
//! classifier is a pure function over the message text and the static
//! catalog.

pub mod conversation;
pub mod llm;
pub mod prompts;
pub mod selection;

pub use conversation::{AdvanceOutcome, ConversationController, ControllerSettings, TurnKind};
pub use llm::{ChatMessage, ChatRole, GenerationError, LlmClient, OpenAiChatClient};
pub use selection::{SelectionClassifier, SelectionDecision};
