//! Integration tests for declarative behavior rules
//!
//! Materials are written in TOML the way they ship in `data/materials/`,
//! spawned into a world, and driven through speech, events and context.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use murmur::core::config::WorldConfig;
use murmur::core::types::{EntityId, Vec2};
use murmur::entity::material::{load_materials_dir, MaterialSpec};
use murmur::simulation::{Notification, NotificationKind, World};
use serde_json::{json, Map, Value};

fn material(toml: &str) -> MaterialSpec {
    MaterialSpec::from_toml_str(toml).unwrap()
}

fn values(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// Mentions
// ============================================================================

#[test]
fn test_named_entity_replies_to_speaker() {
    let mut world = World::default();
    let luna = world
        .spawn(
            &material(
                r#"
                name = "luna"
                id = "luna"
                [dialogue.lines]
                greeting = ["mrrp"]
                [relationships]
                [[triggers]]
                on = "mention(self)"
                actions = [
                    { say = { template = "{line:greeting} {speaker}", to = "{speaker}" } },
                    { update_relationship = { delta = 0.2 } },
                ]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.record_speech("user", "where is Luna today", None, None);

    let reply = world.last_utterance().unwrap();
    assert_eq!(reply.speaker_id, luna);
    assert_eq!(reply.text, "mrrp user");
    assert_eq!(reply.listener_id, Some(EntityId::new("user")));
    let bond = world.entity(&luna).unwrap().relationships.strength(&EntityId::new("user"));
    assert!((bond - 0.2).abs() < 1e-9);
}

#[test]
fn test_unrelated_speech_does_not_fire() {
    let mut world = World::default();
    world
        .spawn(
            &material(
                r#"
                name = "luna"
                [[triggers]]
                on = "mention(self)"
                actions = [{ say = "yes?" }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.record_speech("user", "nice weather", None, None);
    assert_eq!(world.transcript().len(), 1);
}

#[test]
fn test_echo_loop_is_bounded() {
    let config = WorldConfig::default();
    let depth = config.triggers.max_cascade_depth as usize;
    let mut world = World::new(config).unwrap();
    world
        .spawn(
            &material(
                r#"
                name = "echo"
                [[triggers]]
                on = "mention(any)"
                actions = [{ say = "echo" }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.record_speech("user", "hello", None, None);
    assert_eq!(world.transcript().len(), 1 + depth);

    // Every host call opens a fresh budget window
    world.tick(1.0);
    world.record_speech("user", "again", None, None);
    assert_eq!(world.transcript().len(), 2 * (1 + depth));
}

#[test]
fn test_every_host_utterance_gets_a_reply() {
    let mut world = World::default();
    let echo = world
        .spawn(
            &material(
                r#"
                name = "echo"
                [[triggers]]
                on = "mention(others)"
                actions = [{ say = "heard" }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();
    let replies = Rc::new(RefCell::new(0usize));
    let count = replies.clone();
    let speaker = echo.clone();
    world.on(NotificationKind::Utterance, move |n| {
        if let Notification::Utterance(u) = n {
            if u.speaker_id == speaker {
                *count.borrow_mut() += 1;
            }
        }
    });

    world.tick(1.0);
    for i in 0..300 {
        world.record_speech("user", &format!("line {}", i), None, None);
    }
    assert_eq!(*replies.borrow(), 300);
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_event_cascade_is_bounded() {
    let config = WorldConfig::default();
    let depth = config.triggers.max_cascade_depth as usize;
    let mut world = World::new(config).unwrap();
    world
        .spawn(
            &material(
                r#"
                name = "bell"
                [[triggers]]
                on = "event(ping)"
                actions = [{ emit = { event = "ping" } }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("ping", json!({}), false);
    assert_eq!(world.events().count(), 1 + depth);
    assert!(world.events().all(|e| e.name == "ping"));
}

#[test]
fn test_prefix_event_with_payload() {
    let mut world = World::default();
    let fox = world
        .spawn(
            &material(
                r#"
                name = "fox"
                [emotion]
                valence = 0.0
                arousal = 0.2
                [[triggers]]
                on = "event(storm.*)"
                where = "event.payload.level >= 3"
                actions = [{ modify_emotion = { arousal = "event.payload.level / 10" } }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("storm.light", json!({"level": 1}), false);
    assert!((world.entity(&fox).unwrap().emotion.arousal - 0.2).abs() < 1e-12);

    world.broadcast_event("storm.heavy", json!({"level": 5}), false);
    assert!((world.entity(&fox).unwrap().emotion.arousal - 0.7).abs() < 1e-12);
}

#[test]
fn test_relayed_event_lands_in_inbox() {
    let mut world = World::default();
    let radio = world
        .spawn(
            &material(
                r#"
                name = "radio"
                [features]
                communication = true
                [[triggers]]
                on = "time.every(1s)"
                where = "self.inbox.count > 0"
                actions = [{ say = "message received" }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("news", json!({"headline": "rain"}), true);
    world.tick(1.0);

    let inbox = &world.entity(&radio).unwrap().inbox;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox.latest().unwrap().body["event"], json!("news"));
    assert_eq!(world.last_utterance().unwrap().text, "message received");
}

#[test]
fn test_emitted_death_feeds_climate() {
    let mut world = World::default();
    world
        .spawn(
            &material(
                r#"
                name = "fragile"
                [[triggers]]
                on = "event(collapse)"
                actions = [{ emit = { event = "entity.died", payload = { intensity = 1.0 } } }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("collapse", json!({}), false);
    assert!((world.climate().grief - 0.6).abs() < 1e-12);
}

// ============================================================================
// Context
// ============================================================================

#[test]
fn test_nested_context_broadcast_is_queued() {
    let mut world = World::default();
    world
        .spawn(
            &material(
                r#"
                name = "lamp"
                [[triggers]]
                on = "event(context.changed)"
                where = "event.payload.values.dusk == true"
                actions = [{ set_context = { lamp = "on" } }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    world.on(NotificationKind::Context, move |n| {
        if let Notification::Context(values) = n {
            log.borrow_mut().push(values.keys().cloned().collect::<Vec<_>>());
        }
    });

    world.broadcast_context(values(json!({"dusk": true})));

    assert_eq!(world.context()["lamp"], json!("on"));
    assert_eq!(*seen.borrow(), vec![vec!["dusk".to_string()], vec!["lamp".to_string()]]);
}

#[test]
fn test_context_ttl_expires_during_tick() {
    let mut world = World::default();
    world
        .spawn(
            &material(
                r#"
                name = "owl"
                [[triggers]]
                on = "event(storm)"
                actions = [{ set_context = { values = { shelter = "open" }, ttl = 2.0 } }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("storm", json!({}), false);
    assert_eq!(world.context()["shelter"], json!("open"));
    world.tick(1.0);
    assert!(world.context().contains_key("shelter"));
    world.tick(1.5);
    assert!(!world.context().contains_key("shelter"));
}

// ============================================================================
// Memory and Translation
// ============================================================================

#[test]
fn test_memory_write_then_recall() {
    let mut world = World::default();
    let sage = world
        .spawn(
            &material(
                r#"
                name = "sage"
                [memory]
                [[triggers]]
                on = "event(gift)"
                actions = [{ memory_write = { kind = "gift", subject = "{event.payload.from}", content = "got {event.payload.item}", salience = 0.9 } }]
                [[triggers]]
                on = "event(ask)"
                actions = [
                    { memory_recall = { kind = "gift", into = "gifts" } },
                    { say = { template = "I {vars.gifts.latest.content}", fallback = "nothing yet" } },
                ]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("ask", json!({}), false);
    assert_eq!(world.last_utterance().unwrap().text, "nothing yet");

    world.broadcast_event("gift", json!({"from": "user", "item": "a shell"}), false);
    let memory = world.entity(&sage).unwrap().memory.latest_about("gift", "user").unwrap();
    assert_eq!(memory.content, "got a shell");

    world.broadcast_event("ask", json!({}), false);
    assert_eq!(world.last_utterance().unwrap().text, "I got a shell");
}

#[test]
fn test_learned_translation_is_used() {
    let mut world = World::default();
    world
        .spawn(
            &material(
                r#"
                name = "parrot"
                [dialogue]
                language = "fr"
                [[triggers]]
                on = "event(lesson)"
                actions = [{ learn_translation = { source = "hello", language = "fr", translation = "bonjour" } }]
                [[triggers]]
                on = "event(greet)"
                actions = [{ say = { template = "{t:hello}!", fallback = "squawk" } }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    world.broadcast_event("greet", json!({}), false);
    assert_eq!(world.last_utterance().unwrap().text, "squawk");

    world.broadcast_event("lesson", json!({}), false);
    world.broadcast_event("greet", json!({}), false);
    assert_eq!(world.last_utterance().unwrap().text, "bonjour!");
    assert_eq!(world.translation("hello", "fr"), Some("bonjour"));
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn test_broken_rules_are_dropped_at_spawn() {
    let mut world = World::default();
    let id = world
        .spawn(
            &material(
                r#"
                name = "mixed"
                [[triggers]]
                on = "whenever(tuesday)"
                actions = [{ say = "never" }]
                [[triggers]]
                on = "event(ok)"
                where = "1 +"
                actions = [{ say = "never" }]
                [[triggers]]
                on = "event(ok)"
                actions = [{ say = "fine" }]
                "#,
            ),
            Vec2::default(),
        )
        .unwrap();

    assert_eq!(world.entity(&id).unwrap().triggers.len(), 1);
    world.broadcast_event("ok", json!({}), false);
    assert_eq!(world.last_utterance().unwrap().text, "fine");
}

#[test]
fn test_shipped_materials_run() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/materials");
    let materials = load_materials_dir(&dir).unwrap();
    assert!(materials.len() >= 4);

    let mut world = World::default();
    for (i, spec) in materials.iter().enumerate() {
        world.spawn(spec, Vec2::new(i as f64, 0.0)).unwrap();
    }
    for tick in 0..120 {
        if tick % 5 == 0 {
            world.record_speech("user", "good morning luna and orin", None, None);
        }
        if tick == 60 {
            world.broadcast_event("storm.heavy", json!({"level": 4}), true);
            world.broadcast_event("entity.died", json!({"intensity": 0.5}), false);
        }
        world.tick(1.0);
    }

    assert!(world.transcript().len() > 24);
    assert!(world.climate().is_valid());
    for entity in world.entities() {
        assert!(entity.emotion.is_valid());
    }
}
