//! Livelock guard for the tool-calling loop
//!
//! Two limits stop a turn that keeps asking for tools: a hard cap on model
//! rounds, and a repeat check on identical `(name, input)` invocations.

use std::collections::HashMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Outcome of recording one round of tool invocations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    /// Keep going
    Continue,
    /// Too many rounds in one turn
    RoundLimit(usize),
    /// The same invocation was requested too often
    Repeating {
        /// Tool name of the repeated invocation
        tool: String,
        /// Rounds it was seen in
        count: usize,
    },
}

/// Tracks tool rounds within one turn
#[derive(Debug)]
pub struct LoopDetector {
    max_rounds: usize,
    repeat_limit: usize,
    rounds: usize,
    seen: HashMap<[u8; 32], usize>,
}

impl LoopDetector {
    /// Create a detector allowing `max_rounds` tool rounds per turn
    ///
    /// Zero limits are raised to one.
    #[must_use]
    pub fn new(max_rounds: usize, repeat_limit: usize) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
            repeat_limit: repeat_limit.max(1),
            rounds: 0,
            seen: HashMap::new(),
        }
    }

    /// Rounds recorded so far
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }

    /// Record the invocations of one round and decide whether to run it
    pub fn record_round<'a, I>(&mut self, invocations: I) -> LoopVerdict
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.rounds += 1;

        let mut verdict = LoopVerdict::Continue;
        for (name, input) in invocations {
            let count = self.seen.entry(fingerprint(name, input)).or_insert(0);
            *count += 1;
            if *count >= self.repeat_limit && verdict == LoopVerdict::Continue {
                verdict = LoopVerdict::Repeating {
                    tool: name.to_string(),
                    count: *count,
                };
            }
        }

        if verdict != LoopVerdict::Continue {
            return verdict;
        }
        if self.rounds > self.max_rounds {
            return LoopVerdict::RoundLimit(self.rounds);
        }
        LoopVerdict::Continue
    }
}

/// SHA-256 of the tool name and its canonical JSON input
fn fingerprint(name: &str, input: &Value) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0]);
    // serde_json maps are ordered, so equal inputs serialize identically
    hasher.update(input.to_string().as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn distinct_rounds_continue_until_cap() {
        let mut detector = LoopDetector::new(3, 3);
        let a = json!({"champion_name": "Jax"});
        let b = json!({"champion_name": "Ahri"});

        assert_eq!(detector.record_round([("get_champion_build", &a)]), LoopVerdict::Continue);
        assert_eq!(detector.record_round([("get_champion_build", &b)]), LoopVerdict::Continue);
        assert_eq!(detector.record_round([("get_champion_story", &a)]), LoopVerdict::Continue);
        assert_eq!(
            detector.record_round([("get_champion_story", &b)]),
            LoopVerdict::RoundLimit(4)
        );
    }

    #[test]
    fn repeated_invocation_is_flagged() {
        let mut detector = LoopDetector::new(10, 2);
        let input = json!({"champion_name": "Jax"});

        assert_eq!(detector.record_round([("get_champion_build", &input)]), LoopVerdict::Continue);
        assert_eq!(
            detector.record_round([("get_champion_build", &input)]),
            LoopVerdict::Repeating {
                tool: "get_champion_build".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn key_order_does_not_change_fingerprint() {
        let a: Value = serde_json::from_str(r#"{"slot":"Q","champion_name":"Jax"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"champion_name":"Jax","slot":"Q"}"#).unwrap();
        assert_eq!(
            fingerprint("get_champion_spell_by_slot", &a),
            fingerprint("get_champion_spell_by_slot", &b)
        );
        assert_ne!(fingerprint("a", &a), fingerprint("b", &a));
    }

    #[test]
    fn zero_limits_are_raised() {
        let mut detector = LoopDetector::new(0, 0);
        let input = json!({});
        assert!(matches!(
            detector.record_round([("t", &input)]),
            LoopVerdict::Repeating { count: 1, .. }
        ));
        assert_eq!(detector.rounds(), 1);
    }
}
