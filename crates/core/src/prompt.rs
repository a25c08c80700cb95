//! Prompt templates for question condensation and grounded answering.

use serde::{Deserialize, Serialize};

use crate::conversation::format_history;
use crate::ConversationTurn;

/// Rewrites a follow-up into a standalone question.
pub const CONDENSE_TEMPLATE: &str = "Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

/// Answers from retrieved context. `{system_prompt}` comes from the
/// selected domain profile.
pub const QA_TEMPLATE: &str = "{system_prompt} You have access to a wide range of books and research papers in these fields.
Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say you don't know. DO NOT try to make up an answer.
If the question is not related to the context, politely respond that you have not found appropriate sources in the user database and answer using your understanding of the key theories and concepts from the relevant fields.

{context}

Question: {question}
Helpful answer in markdown:";

/// The two templates the chain renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub condense: String,
    pub qa: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            condense: CONDENSE_TEMPLATE.to_string(),
            qa: QA_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn condense_prompt(&self, history: &[ConversationTurn], question: &str) -> String {
        render(
            &self.condense,
            &[
                ("chat_history", &format_history(history)),
                ("question", question),
            ],
        )
    }

    pub fn qa_prompt(&self, system_prompt: &str, context: &str, question: &str) -> String {
        render(
            &self.qa,
            &[
                ("system_prompt", system_prompt),
                ("context", context),
                ("question", question),
            ],
        )
    }
}

/// Substitute `{name}` placeholders in one pass.
///
/// Substituted values are never rescanned, so a passage that happens to
/// contain `{question}` stays literal. Unknown placeholders are kept as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
