use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Assistant,
    Customer,
    Log,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Customer => "customer",
            Self::Log => "log",
        }
    }

    /// Speaker label used when a transcript is rendered into prompt text.
    pub fn speaker_label(&self) -> &'static str {
        match self {
            Self::Assistant => "Assistant",
            Self::Customer => "Customer",
            Self::Log => "Log",
        }
    }
}

/// One transcript entry. Immutable once created; the ordered sequence of
/// messages in a `ConversationState` forms the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), timestamp: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn customer(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Customer, content)
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, MessageRole};

    #[test]
    fn roles_serialize_lowercase() {
        let message = Message::assistant("Hello, how can I help with your tariff today?");
        let json = serde_json::to_value(&message).expect("serialize message");
        assert_eq!(json["role"], "assistant");

        let customer = Message::customer("I need more data.");
        let json = serde_json::to_value(&customer).expect("serialize message");
        assert_eq!(json["role"], "customer");
    }

    #[test]
    fn transcript_round_trips_through_json() {
        let original = Message::customer("I'll keep looking for now.");
        let encoded = serde_json::to_string(&original).expect("encode");
        let decoded: Message = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn speaker_labels_match_prompt_rendering() {
        assert_eq!(MessageRole::Assistant.speaker_label(), "Assistant");
        assert_eq!(MessageRole::Customer.speaker_label(), "Customer");
    }
}
