//! The transcript sent to the model.

use crate::model::Turn;

/// A change to the transcript, requested by the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOp {
    /// Drop every turn; issued before each independent user query.
    Reset,
    Append(Turn),
}

/// Ordered turns of the current exchange.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, op: TranscriptOp) {
        match op {
            TranscriptOp::Reset => self.turns.clear(),
            TranscriptOp::Append(turn) => self.turns.push(turn),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
