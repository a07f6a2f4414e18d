//! Transcript events and turn merging.
//!
//! The service streams transcript text as small fragments. Consecutive
//! fragments from the same role belong to one turn; a fragment from the other
//! role starts a new turn.

use serde::{Deserialize, Serialize};

/// Who a transcript fragment is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// One transcript fragment as delivered to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    /// Role the fragment is attributed to.
    pub role: TranscriptRole,
    /// The text fragment.
    pub text: String,
    /// Whether this fragment starts a new turn (role changed or first fragment).
    pub starts_turn: bool,
}

/// A completed or in-progress turn: contiguous text from one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTurn {
    pub role: TranscriptRole,
    pub text: String,
}

/// Merges transcript fragments into role-attributed turns.
#[derive(Debug, Default)]
pub struct TurnAggregator {
    turns: Vec<TranscriptTurn>,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fragment into the turn list and describe it as an event.
    ///
    /// Fragments matching the role of the last turn are appended to it;
    /// anything else opens a new turn.
    pub fn push(&mut self, role: TranscriptRole, fragment: &str) -> TranscriptEvent {
        let starts_turn = match self.turns.last_mut() {
            Some(turn) if turn.role == role => {
                turn.text.push_str(fragment);
                false
            }
            _ => {
                self.turns.push(TranscriptTurn {
                    role,
                    text: fragment.to_owned(),
                });
                true
            }
        };
        TranscriptEvent {
            role,
            text: fragment.to_owned(),
            starts_turn,
        }
    }

    /// All turns accumulated so far, in order.
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// The turn currently being extended, if any.
    pub fn current_turn(&self) -> Option<&TranscriptTurn> {
        self.turns.last()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn same_role_fragments_merge_into_one_turn() {
        let mut agg = TurnAggregator::new();
        let first = agg.push(TranscriptRole::User, "Pay ");
        let second = agg.push(TranscriptRole::User, "my bill");

        assert!(first.starts_turn);
        assert!(!second.starts_turn);
        assert_eq!(agg.turns().len(), 1);
        assert_eq!(agg.current_turn().unwrap().text, "Pay my bill");
    }

    #[test]
    fn role_change_starts_new_turn() {
        let mut agg = TurnAggregator::new();
        agg.push(TranscriptRole::User, "Pay my bill");
        let reply = agg.push(TranscriptRole::Assistant, "Which bill");
        agg.push(TranscriptRole::Assistant, " would you like to pay?");

        assert!(reply.starts_turn);
        assert_eq!(agg.turns().len(), 2);
        assert_eq!(agg.turns()[0].text, "Pay my bill");
        assert_eq!(agg.turns()[1].text, "Which bill would you like to pay?");
    }

    #[test]
    fn alternating_roles_keep_separate_turns() {
        let mut agg = TurnAggregator::new();
        agg.push(TranscriptRole::User, "Hi");
        agg.push(TranscriptRole::Assistant, "Hello");
        agg.push(TranscriptRole::User, "Balance?");

        assert_eq!(agg.turns().len(), 3);
        assert_eq!(agg.turns()[2].role, TranscriptRole::User);
    }
}
