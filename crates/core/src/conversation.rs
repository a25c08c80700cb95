//! Conversation history supplied by callers

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One previously exchanged (question, answer) pair.
///
/// On the wire a turn is a two-element array `["question", "answer"]`; the
/// object form `{"question": .., "answer": ..}` is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TurnRepr {
    Pair(String, String),
    Object {
        #[serde(alias = "human")]
        question: String,
        #[serde(alias = "assistant", alias = "ai")]
        answer: String,
    },
}

impl<'de> Deserialize<'de> for ConversationTurn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match TurnRepr::deserialize(deserializer)? {
            TurnRepr::Pair(question, answer) => Self { question, answer },
            TurnRepr::Object { question, answer } => Self { question, answer },
        })
    }
}

impl Serialize for ConversationTurn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.question, &self.answer).serialize(serializer)
    }
}

/// Render history the way the condense prompt expects it
pub fn format_history(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}
