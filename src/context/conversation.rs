//! Bounded, self-repairing conversation history
//!
//! The context keeps at most `capacity` turns. After every mutation the head is
//! repaired so the model never sees a history that starts with an assistant
//! turn or with tool results whose tool use was already evicted.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::message::{ConversationTurn, Role};
use crate::Result;

/// Default number of retained turns
pub const DEFAULT_CAPACITY: usize = 20;

/// Fixed-capacity ordered sequence of conversation turns
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

/// Serialized form of a context
#[derive(Serialize, Deserialize)]
struct PersistedContext {
    turns: Vec<ConversationTurn>,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ConversationContext {
    /// Create an empty context holding at most `capacity` turns
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a turn, evicting from the head past capacity, then repair
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
        self.repair();
    }

    /// Evict head entries until the head is a genuine user turn
    ///
    /// Returns the number of evicted entries.
    pub fn repair(&mut self) -> usize {
        let mut evicted = 0;
        while let Some(head) = self.turns.front() {
            if head.role == Role::User && !head.is_tool_result_only() {
                break;
            }
            self.turns.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.turns.len(), "repaired context head");
        }
        evicted
    }

    /// Last `k` turns as speaker-labeled lines, oldest first
    #[must_use]
    pub fn recent_history(&self, k: usize) -> String {
        let skip = self.turns.len().saturating_sub(k);
        self.turns
            .iter()
            .skip(skip)
            .map(ConversationTurn::transcript_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Iterate over retained turns, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Oldest retained turn
    #[must_use]
    pub fn head(&self) -> Option<&ConversationTurn> {
        self.turns.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all turns
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Append the entries of one finished exchange in a single step
    ///
    /// Same result as appending each turn in order.
    pub fn commit<I>(&mut self, turns: I)
    where
        I: IntoIterator<Item = ConversationTurn>,
    {
        for turn in turns {
            self.append(turn);
        }
    }

    /// Serialize all retained turns
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        let persisted = PersistedContext {
            turns: self.turns.iter().cloned().collect(),
        };
        Ok(serde_json::to_string(&persisted)?)
    }

    /// Load turns from JSON, applying capacity and head repair
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is not a serialized context
    pub fn from_json(json: &str, capacity: usize) -> Result<Self> {
        let persisted: PersistedContext = serde_json::from_str(json)?;
        let mut context = Self::new(capacity);
        for turn in persisted.turns {
            context.append(turn);
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::message::ContentBlock;

    fn tool_use(id: &str) -> ConversationTurn {
        ConversationTurn::blocks(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: "get_champion_stat".to_string(),
                input: json!({"champion_id": "Jax"}),
            }],
        )
    }

    fn tool_result(id: &str) -> ConversationTurn {
        ConversationTurn::blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: id.to_string(),
                content: "{}".to_string(),
                is_error: false,
            }],
        )
    }

    fn assert_head_valid(context: &ConversationContext) {
        if let Some(head) = context.head() {
            assert_eq!(head.role, Role::User);
            assert!(!head.is_tool_result_only());
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut context = ConversationContext::new(4);
        for i in 0..3 {
            context.append(ConversationTurn::user(format!("q{i}")));
            context.append(ConversationTurn::assistant(format!("a{i}")));
        }
        assert_eq!(context.len(), 4);
        assert_eq!(context.head().unwrap().text(), "q1");
    }

    #[test]
    fn assistant_head_is_evicted() {
        let mut context = ConversationContext::new(3);
        context.append(ConversationTurn::user("q0"));
        context.append(ConversationTurn::assistant("a0"));
        context.append(ConversationTurn::user("q1"));
        // Capacity pushes q0 out, leaving a0 at the head
        context.append(ConversationTurn::assistant("a1"));

        assert_eq!(context.len(), 2);
        assert_eq!(context.head().unwrap().text(), "q1");
    }

    #[test]
    fn tool_pairs_are_evicted_together() {
        let mut context = ConversationContext::new(4);
        context.append(ConversationTurn::user("build for Jax?"));
        context.append(tool_use("t1"));
        context.append(tool_result("t1"));
        context.append(ConversationTurn::assistant("Trinity Force first."));
        context.append(ConversationTurn::user("and runes?"));

        // Eviction of the first question exposes the tool use and its result
        assert_eq!(context.len(), 1);
        assert_eq!(context.head().unwrap().text(), "and runes?");
    }

    #[test]
    fn empties_when_nothing_valid_remains() {
        let mut context = ConversationContext::new(2);
        context.append(tool_use("t1"));
        assert!(context.is_empty());
        context.append(tool_result("t1"));
        assert!(context.is_empty());
    }

    #[test]
    fn head_invariant_holds_for_any_append_sequence() {
        let turns = [
            ConversationTurn::user("a"),
            tool_use("1"),
            tool_result("1"),
            tool_use("2"),
            tool_result("2"),
            ConversationTurn::assistant("b"),
            ConversationTurn::user("c"),
            ConversationTurn::assistant("d"),
        ];

        for capacity in 1..=6 {
            let mut context = ConversationContext::new(capacity);
            for round in 0..3 {
                for (i, turn) in turns.iter().enumerate() {
                    if (i + round) % 3 == 0 {
                        continue;
                    }
                    context.append(turn.clone());
                    assert_head_valid(&context);
                    assert!(context.len() <= capacity);
                }
            }
        }
    }

    #[test]
    fn recent_history_is_read_only_and_ordered() {
        let mut context = ConversationContext::new(10);
        context.append(ConversationTurn::user("first"));
        context.append(ConversationTurn::assistant("second"));
        context.append(ConversationTurn::user("third"));
        let before = context.clone();

        assert_eq!(context.recent_history(2), "Assistant: second\nUser: third");
        assert_eq!(
            context.recent_history(10),
            "User: first\nAssistant: second\nUser: third"
        );
        assert_eq!(context.recent_history(0), "");
        assert_eq!(context, before);
    }

    #[test]
    fn commit_matches_sequential_appends() {
        let exchange = vec![
            ConversationTurn::user("build for Jax?"),
            tool_use("t"),
            tool_result("t"),
            ConversationTurn::assistant("Trinity Force first."),
        ];

        for capacity in [2, 3, 10] {
            let mut committed = ConversationContext::new(capacity);
            committed.commit(exchange.clone());

            let mut appended = ConversationContext::new(capacity);
            for turn in exchange.clone() {
                appended.append(turn);
            }
            assert_eq!(committed, appended);
            assert_head_valid(&committed);
        }
    }

    #[test]
    fn json_reload_applies_capacity_and_repair() {
        let mut context = ConversationContext::new(10);
        context.append(ConversationTurn::user("q"));
        context.append(tool_use("t"));
        context.append(tool_result("t"));
        context.append(ConversationTurn::assistant("done"));

        let json = context.to_json().unwrap();
        let same = ConversationContext::from_json(&json, 10).unwrap();
        assert_eq!(same, context);

        let smaller = ConversationContext::from_json(&json, 3).unwrap();
        assert_eq!(smaller.len(), 0);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let context = ConversationContext::new(0);
        assert_eq!(context.capacity(), 1);
    }
}
