//! Bounded conversation history.
//!
//! A [`ConversationHistory`] is a plain value owned by the caller: one per
//! conversation session, handed to the orchestrator and returned updated.
//! Appending never mutates the input; it produces a new history holding at
//! most `max_turns` of the most recent turns.

use serde::{Deserialize, Serialize};

/// Number of turns retained when nothing else is configured.
pub const DEFAULT_MAX_TURNS: usize = 4;

/// One question and the answer given to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }
}

/// Ordered prior turns, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty history; the result of clearing a conversation.
    pub fn clear() -> Self {
        Self::default()
    }

    /// Return a new history with `(question, answer)` appended, keeping only
    /// the `max_turns` most recent turns. `self` is left unchanged.
    ///
    /// The result has exactly `min(self.len() + 1, max_turns)` turns.
    pub fn append(
        &self,
        question: impl Into<String>,
        answer: impl Into<String>,
        max_turns: usize,
    ) -> Self {
        let mut turns = Vec::with_capacity((self.turns.len() + 1).min(max_turns));
        let keep_from = (self.turns.len() + 1).saturating_sub(max_turns);
        turns.extend(self.turns.iter().skip(keep_from).cloned());
        if max_turns > 0 {
            turns.push(ConversationTurn::new(question, answer));
        }
        Self { turns }
    }

    /// The `max_turns` most recent turns, oldest first.
    pub fn recent(&self, max_turns: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(max_turns);
        &self.turns[start..]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }
}

impl FromIterator<ConversationTurn> for ConversationHistory {
    fn from_iter<I: IntoIterator<Item = ConversationTurn>>(iter: I) -> Self {
        Self { turns: iter.into_iter().collect() }
    }
}
