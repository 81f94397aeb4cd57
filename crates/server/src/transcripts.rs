use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use tariffsim_core::domain::conversation::ConversationState;
use tariffsim_core::domain::message::Message;
use tariffsim_core::errors::ApplicationError;

/// On-disk transcript document. One file per session, overwritten on each
/// save so the file always reflects the latest state.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub timestamp: String,
    pub persona: Option<String>,
    pub selected_plan: Option<String>,
    pub conversation: Vec<Message>,
}

impl TranscriptDocument {
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            persona: state.persona.clone(),
            selected_plan: state.selected_plan.clone(),
            conversation: state.messages.clone(),
        }
    }
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn save(&self, state: &ConversationState) -> Result<PathBuf, ApplicationError>;
}

/// Writes `conversation_<session_id>.json` files under the configured
/// transcript directory.
pub struct JsonFileTranscriptStore {
    dir: PathBuf,
}

impl JsonFileTranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn transcript_path(&self, session_id: &str) -> PathBuf {
        // Session ids are caller-supplied; keep only filename-safe characters.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("conversation_{safe}.json"))
    }
}

#[async_trait]
impl TranscriptStore for JsonFileTranscriptStore {
    async fn save(&self, state: &ConversationState) -> Result<PathBuf, ApplicationError> {
        let document = TranscriptDocument::from_state(state);
        let payload = serde_json::to_vec_pretty(&document)
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let path = self.transcript_path(state.session_id.as_str());
        tokio::fs::write(&path, payload)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        info!(
            event_name = "server.transcripts.saved",
            session_id = %state.session_id.as_str(),
            path = %path.display(),
            messages = state.messages.len(),
            "conversation transcript written"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use tariffsim_core::domain::conversation::{ConversationState, SessionId};
    use tariffsim_core::domain::message::Message;

    use super::{JsonFileTranscriptStore, TranscriptDocument, TranscriptStore};

    fn state_with_messages() -> ConversationState {
        let mut state = ConversationState::new(SessionId("t-42".to_string()));
        state.persona = Some("Anna, the Student".to_string());
        state.advance_turn().expect("advance");
        state.append(Message::customer("Hi, I need a cheap plan.")).expect("append");
        state.append(Message::assistant("Take a look at Basic 5GB.")).expect("append");
        state
    }

    #[tokio::test]
    async fn save_writes_one_json_file_per_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileTranscriptStore::new(dir.path());

        let path = store.save(&state_with_messages()).await.expect("save");

        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("conversation_t-42.json"));
        let raw = std::fs::read_to_string(&path).expect("read transcript");
        let document: TranscriptDocument = serde_json::from_str(&raw).expect("parse transcript");
        assert_eq!(document.persona.as_deref(), Some("Anna, the Student"));
        assert_eq!(document.conversation.len(), 2);
        assert!(document.selected_plan.is_none());
    }

    #[tokio::test]
    async fn save_overwrites_with_the_latest_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileTranscriptStore::new(dir.path());
        let mut state = state_with_messages();

        store.save(&state).await.expect("first save");
        state.finish_with_selection("Basic 5GB");
        store.save(&state).await.expect("second save");

        let path = dir.path().join("conversation_t-42.json");
        let raw = std::fs::read_to_string(path).expect("read transcript");
        let document: TranscriptDocument = serde_json::from_str(&raw).expect("parse transcript");
        assert_eq!(document.selected_plan.as_deref(), Some("Basic 5GB"));
    }

    #[tokio::test]
    async fn hostile_session_ids_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileTranscriptStore::new(dir.path());
        let mut state = ConversationState::new(SessionId("../../etc/passwd".to_string()));
        state.advance_turn().expect("advance");
        state.append(Message::customer("hello")).expect("append");

        let path = store.save(&state).await.expect("save");

        assert!(path.starts_with(dir.path()));
        assert!(!path.to_string_lossy().contains(".."));
    }
}
