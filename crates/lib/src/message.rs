//! Message: the unit exchanged between a connection and the bot.
//!
//! Every inbound message that enters dispatch produces zero or more replies followed by
//! exactly one final message carrying the same correlation id.

use serde::{Deserialize, Serialize};

/// Correlation id tying every reply of a turn back to the inbound message that started it.
pub type CorrelationId = u64;

/// A chat message on the inbound (connection -> bot) or outbound (bot -> connection) path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: CorrelationId,
    pub text: String,
    /// Last message of a turn. Only the pump sets this on the outbound path.
    #[serde(default)]
    pub is_final: bool,
}

impl Message {
    pub fn new(id: CorrelationId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            is_final: false,
        }
    }

    /// Reply text from a handler. The pump fills in the correlation id.
    pub fn reply(text: impl Into<String>) -> Self {
        Self::new(0, text)
    }

    /// Empty handler reply; omitted from the outbound stream.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Final message with text, used by the bot's own commands.
    pub fn last(id: CorrelationId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            is_final: true,
        }
    }

    /// Empty final message closing the turn for `id`.
    pub fn end_of_turn(id: CorrelationId) -> Self {
        Self::last(id, "")
    }

    /// True for a non-final message without text: never sent outbound.
    pub fn is_noop(&self) -> bool {
        self.text.is_empty() && !self.is_final
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_wire_field_names() {
        let m = Message::last(7, "done");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v, serde_json::json!({ "id": 7, "text": "done", "isFinal": true }));
    }

    #[test]
    fn is_final_defaults_to_false() {
        let m: Message = serde_json::from_str(r#"{"id":2,"text":"hi"}"#).unwrap();
        assert_eq!(m, Message::new(2, "hi"));
    }

    #[test]
    fn noop_only_for_empty_non_final() {
        assert!(Message::empty().is_noop());
        assert!(!Message::end_of_turn(3).is_noop());
        assert!(!Message::reply("x").is_noop());
    }
}
