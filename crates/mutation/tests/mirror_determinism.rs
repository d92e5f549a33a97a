//! A server engine and a mirror fed the same mutation log end up with
//! identical graphs, whatever the log contains.

use std::sync::Arc;

use cs_assets::{NotificationGate, OperationQueue};
use cs_domain::chat::Chat;
use cs_mutation::{Graph, Mutation, MutationEngine, ObjectType, Reference};
use serde_json::json;

fn log() -> Vec<Mutation> {
    let group = Reference::message_group("c1", "g1");
    let message = Reference::message("c1", "g1", "m1");
    vec![
        Mutation::create(Reference::chat("c1"), ObjectType::Chat, json!({"title": "Draft"})),
        Mutation::set_value(Reference::chat("c1").child("title"), "title", "Trip planning"),
        Mutation::create(group.clone(), ObjectType::MessageGroup, json!({"agent_id": "director", "role": "system"})),
        Mutation::append(group.clone(), "analysis", "The user "),
        Mutation::append(group.clone(), "analysis", "wants a plan."),
        Mutation::set_value(group.clone(), "materials_ids", json!(["guide"])),
        // rejected on both sides: unknown field
        Mutation::set_value(group.clone(), "mood", "cheerful"),
        Mutation::create(message.clone(), ObjectType::Message, json!({"content": ""})),
        Mutation::append(message.clone(), "content", "Day 1: "),
        Mutation::append(message.clone(), "content", "Lisbon"),
        // rejected on both sides: missing object
        Mutation::delete(Reference::message("c1", "g1", "m9")),
        Mutation::set_value(
            Reference::chat("c1"),
            "chat_options",
            json!({"agent_id": "planner", "ai_can_add_extra_materials": false}),
        ),
        Mutation::create(Reference::chat("c2"), ObjectType::Chat, json!({})),
        Mutation::delete(Reference::chat("c2")),
    ]
}

#[test]
fn server_and_mirror_converge() {
    let gate = Arc::new(NotificationGate::new());
    let (queue, mut rx) = OperationQueue::new(gate);
    let mut server = MutationEngine::new(queue);
    let mut mirror = Graph::new();

    let mut forwarded = Vec::new();
    for mutation in log() {
        // the wire hop: mirrors receive JSON
        let wire = serde_json::to_string(&mutation).unwrap();
        let server_ok = server.apply(&mutation).is_ok();
        let mirror_ok = mirror.apply(&serde_json::from_str(&wire).unwrap()).is_ok();
        assert_eq!(server_ok, mirror_ok, "divergent outcome for {wire}");
        if server_ok {
            forwarded.push(wire);
        }
    }

    assert_eq!(server.graph(), &mirror);
    assert_eq!(forwarded.len(), log().len() - 2);
    assert_eq!(rx.drain().len(), forwarded.len());

    let chat: &Chat = mirror.get("c1").unwrap();
    assert_eq!(chat.title, "Trip planning");
    assert_eq!(chat.chat_options.agent_id, "planner");
    assert!(!chat.chat_options.ai_can_add_extra_materials);
    let group = chat.message_group("g1").unwrap();
    assert_eq!(group.analysis, "The user wants a plan.");
    assert_eq!(group.messages[0].content, "Day 1: Lisbon");
    assert!(mirror.get("c2").is_none());
}

#[test]
fn two_mirrors_from_a_shared_snapshot_agree() {
    let mut seed = Chat::empty("c1");
    seed.title = "Seeded".into();

    let mut a = Graph::new();
    let mut b = Graph::new();
    a.insert(seed.clone());
    b.insert(seed);

    for mutation in log().into_iter().skip(1) {
        let ra = a.apply(&mutation).map(|_| ());
        let rb = b.apply(&mutation).map(|_| ());
        assert_eq!(ra.is_ok(), rb.is_ok());
    }
    assert_eq!(a, b);
}
