//! Property tests for bounded conversation history.

use docqa_rag::{ConversationHistory, ConversationTurn};
use proptest::prelude::*;

/// **History bound**
/// *For any* sequence of appends with bound `m`, the history holds
/// `min(n, m)` turns, and they are the most recent ones in order.
mod prop_history_bound {
    use super::*;

    proptest! {
        #[test]
        fn keeps_most_recent_turns(appends in 0usize..30, max_turns in 0usize..8) {
            let mut history = ConversationHistory::new();
            for i in 0..appends {
                let next = history.append(format!("q{i}"), format!("a{i}"), max_turns);
                prop_assert_eq!(next.len(), (history.len() + 1).min(max_turns));
                history = next;
            }

            prop_assert_eq!(history.len(), appends.min(max_turns));
            let expected: Vec<ConversationTurn> = (appends - history.len()..appends)
                .map(|i| ConversationTurn::new(format!("q{i}"), format!("a{i}")))
                .collect();
            prop_assert_eq!(history.turns(), expected.as_slice());
        }

        #[test]
        fn append_leaves_original_untouched(
            questions in proptest::collection::vec("[a-z ]{1,20}", 0..6),
            max_turns in 1usize..6,
        ) {
            let history: ConversationHistory = questions
                .iter()
                .map(|q| ConversationTurn::new(q.clone(), "answer"))
                .collect();
            let before = history.clone();
            let _ = history.append("new question", "new answer", max_turns);
            prop_assert_eq!(history, before);
        }
    }
}

#[test]
fn history_round_trips_as_plain_json_array() {
    let history = ConversationHistory::new().append("Where?", "Here.", 4);
    let json = serde_json::to_value(&history).unwrap();
    assert_eq!(json, serde_json::json!([{ "question": "Where?", "answer": "Here." }]));
}
