//! Conversation context integration tests

use serde_json::json;
use summoner_voice::{ContentBlock, ConversationContext, ConversationTurn, Role};

fn tool_use(id: &str) -> ConversationTurn {
    ConversationTurn::blocks(
        Role::Assistant,
        vec![
            ContentBlock::text("Let me check."),
            ContentBlock::ToolUse {
                id: id.to_string(),
                name: "get_champion_build".to_string(),
                input: json!({"champion_name": "Jax"}),
            },
        ],
    )
}

fn tool_result(id: &str) -> ConversationTurn {
    ConversationTurn::blocks(
        Role::User,
        vec![ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: "{\"items\": []}".to_string(),
            is_error: false,
        }],
    )
}

fn assert_head_is_user_turn(context: &ConversationContext) {
    if let Some(head) = context.head() {
        assert_eq!(head.role, Role::User, "head must be a user turn");
        assert!(!head.is_tool_result_only(), "head must not be a lone tool result");
    }
}

#[test]
fn head_stays_a_user_turn_through_tool_exchanges() {
    for capacity in 1..=6 {
        let mut context = ConversationContext::new(capacity);

        for round in 0..5 {
            let id = format!("toolu_{round}");
            let turns = [
                ConversationTurn::user(format!("question {round}")),
                tool_use(&id),
                tool_result(&id),
                ConversationTurn::assistant(format!("answer {round}")),
            ];
            for turn in turns {
                context.append(turn);
                assert_head_is_user_turn(&context);
                assert!(context.len() <= capacity);
            }
        }
    }
}

#[test]
fn assistant_first_history_is_dropped() {
    let mut context = ConversationContext::new(4);
    context.append(ConversationTurn::assistant("Hello there"));
    assert!(context.is_empty());

    context.append(tool_result("toolu_orphan"));
    assert!(context.is_empty());

    context.append(ConversationTurn::user("Who is Jax?"));
    assert_eq!(context.len(), 1);
}

#[test]
fn recent_history_is_read_only_and_bounded() {
    let mut context = ConversationContext::new(10);
    for i in 0..4 {
        context.append(ConversationTurn::user(format!("question {i}")));
        context.append(ConversationTurn::assistant(format!("answer {i}")));
    }
    let before = context.clone();

    let history = context.recent_history(3);
    let lines: Vec<_> = history.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("answer 2"));
    assert!(lines[1].contains("question 3"));
    assert!(lines[2].contains("answer 3"));

    assert_eq!(context.recent_history(100).lines().count(), 8);
    assert_eq!(context, before);
}

#[test]
fn persisted_context_is_repaired_on_load() {
    let mut context = ConversationContext::new(10);
    context.append(ConversationTurn::user("Who is Jax?"));
    context.append(tool_use("toolu_1"));
    context.append(tool_result("toolu_1"));
    context.append(ConversationTurn::assistant("The Grandmaster at Arms."));
    let json = context.to_json().unwrap();

    // A smaller capacity evicts the user turn; the dangling tool exchange goes too
    let loaded = ConversationContext::from_json(&json, 2).unwrap();
    assert!(loaded.is_empty());

    let loaded = ConversationContext::from_json(&json, 10).unwrap();
    assert_eq!(loaded, context);
}
