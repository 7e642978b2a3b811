//! Host-facing world API: lifecycle, observers, snapshots and determinism

use std::cell::RefCell;
use std::rc::Rc;

use murmur::core::config::WorldConfig;
use murmur::core::error::MurmurError;
use murmur::core::types::{EntityId, Vec2};
use murmur::entity::material::MaterialSpec;
use murmur::simulation::{Notification, NotificationKind, World, WorldSnapshot};
use serde_json::{json, Map, Value};

fn wren() -> MaterialSpec {
    MaterialSpec::from_toml_str(
        r#"
        name = "wren"
        [essence]
        mobile = true
        [emotion]
        valence = 0.3
        arousal = 0.4
        [memory]
        [relationships]
        [features]
        learning = true
        communication = true
        [[triggers]]
        on = "time.every(3s)"
        actions = [{ say = "tweet tweet" }]
        [[triggers]]
        on = "mention(others)"
        where = "emotion.arousal > 0.1"
        actions = [{ say = "chirp" }]
        "#,
    )
    .unwrap()
}

fn values(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn run_script(seed: u64) -> World {
    let config = WorldConfig {
        seed,
        ..WorldConfig::default()
    };
    let mut world = World::new(config).unwrap();
    for i in 0..4 {
        world.spawn(&wren(), Vec2::new(i as f64 * 2.0, 0.0)).unwrap();
    }
    for tick in 0..40 {
        if tick % 4 == 0 {
            world.record_speech("user", "morning birds by the river", None, None);
        }
        world.tick(1.0);
    }
    world
}

fn transcript_lines(world: &World) -> Vec<(String, String)> {
    world
        .transcript()
        .iter()
        .map(|u| (u.speaker_id.to_string(), u.text.clone()))
        .collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_spawn_assigns_unique_ids() {
    let mut world = World::default();
    let a = world.spawn(&wren(), Vec2::default()).unwrap();
    let b = world.spawn(&wren(), Vec2::default()).unwrap();
    assert_ne!(a, b);
    assert_eq!(world.entity_count(), 2);
    assert!(world.material("wren").is_some());
}

#[test]
fn test_spawn_rejects_duplicate_fixed_id() {
    let mut spec = wren();
    spec.id = Some("solo".into());
    let mut world = World::default();
    world.spawn(&spec, Vec2::default()).unwrap();
    assert!(matches!(
        world.spawn(&spec, Vec2::default()),
        Err(MurmurError::DuplicateEntity(id)) if id == EntityId::new("solo")
    ));
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn test_spawn_rejects_invalid_input() {
    let mut world = World::default();

    let mut nameless = wren();
    nameless.name = "  ".into();
    assert!(matches!(
        world.spawn(&nameless, Vec2::default()),
        Err(MurmurError::InvalidMaterial { .. })
    ));

    assert!(matches!(
        world.spawn(&wren(), Vec2::new(f64::NAN, 0.0)),
        Err(MurmurError::NumericDrift(_))
    ));

    let mut chatty = wren();
    chatty.dialogue.get_or_insert_with(Default::default).proto.min_words = usize::MAX;
    chatty.dialogue.get_or_insert_with(Default::default).proto.max_words = usize::MAX;
    assert!(matches!(
        world.spawn(&chatty, Vec2::default()),
        Err(MurmurError::InvalidMaterial { .. })
    ));
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn test_spawn_registered_material() {
    let mut world = World::default();
    assert!(matches!(
        world.spawn_registered("wren", Vec2::default()),
        Err(MurmurError::MaterialNotFound(_))
    ));

    world.register_material(wren()).unwrap();
    let id = world.spawn_registered("wren", Vec2::new(1.0, 1.0)).unwrap();
    assert_eq!(world.entity(&id).unwrap().material, "wren");
}

#[test]
fn test_despawn_keeps_other_memories() {
    let mut world = World::default();
    let a = world.spawn(&wren(), Vec2::new(0.0, 0.0)).unwrap();
    let b = world.spawn(&wren(), Vec2::new(1.0, 0.0)).unwrap();
    for _ in 0..10 {
        world.tick(1.0);
    }
    assert!(world.entity(&a).unwrap().relationships.get(&b).is_some());

    let removed = world.despawn(&b).unwrap();
    assert_eq!(removed.id, b);
    assert!(world.entity(&b).is_none());
    assert_eq!(world.entity_count(), 1);
    assert!(world.entity(&a).unwrap().relationships.get(&b).is_some());

    assert!(matches!(world.despawn(&b), Err(MurmurError::EntityNotFound(_))));
    world.tick(1.0);
}

// ============================================================================
// Observers
// ============================================================================

#[test]
fn test_notification_kind_from_str() {
    assert_eq!("tick".parse::<NotificationKind>().unwrap(), NotificationKind::Tick);
    assert_eq!(" Context ".parse::<NotificationKind>().unwrap(), NotificationKind::Context);
    assert_eq!("speech".parse::<NotificationKind>().unwrap(), NotificationKind::Utterance);
    assert!(matches!(
        "weather".parse::<NotificationKind>(),
        Err(MurmurError::UnknownNotification(_))
    ));
}

#[test]
fn test_on_once_off() {
    let mut world = World::default();
    let ticks = Rc::new(RefCell::new(Vec::new()));
    let first = Rc::new(RefCell::new(0));

    let log = ticks.clone();
    let listener = world.on(NotificationKind::Tick, move |n| {
        if let Notification::Tick(report) = n {
            log.borrow_mut().push(report.tick);
        }
    });
    let count = first.clone();
    world.once(NotificationKind::Tick, move |_| *count.borrow_mut() += 1);

    world.tick(1.0);
    world.tick(1.0);
    assert!(world.off(listener));
    assert!(!world.off(listener));
    world.tick(1.0);

    assert_eq!(*ticks.borrow(), vec![1, 2]);
    assert_eq!(*first.borrow(), 1);
}

#[test]
fn test_tick_notification_comes_last() {
    let mut config = WorldConfig::default();
    config.world_mind.every_ticks = 1;
    let mut world = World::new(config).unwrap();
    world.spawn(&wren(), Vec2::default()).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));
    for kind in [NotificationKind::Tick, NotificationKind::Utterance, NotificationKind::Analytics] {
        let log = order.clone();
        world.on(kind, move |n| log.borrow_mut().push(n.kind()));
    }

    world.tick(3.0);

    let order = order.borrow();
    assert_eq!(order.last(), Some(&NotificationKind::Tick));
    assert!(order.contains(&NotificationKind::Utterance));
    assert!(order.contains(&NotificationKind::Analytics));
}

#[test]
fn test_context_ttl_from_host() {
    let mut world = World::default();
    world.broadcast_context_with_ttl(values(json!({"fog": true})), 2.0);
    world.broadcast_context(values(json!({"season": "autumn"})));
    assert_eq!(world.context()["fog"], json!(true));

    world.tick(1.0);
    world.tick(1.0);
    assert!(!world.context().contains_key("fog"));
    assert_eq!(world.context()["season"], json!("autumn"));
}

// ============================================================================
// Snapshots and Determinism
// ============================================================================

#[test]
fn test_snapshot_json_round_trip() {
    let world = run_script(7);
    let json = world.snapshot().to_json().unwrap();
    let restored = World::restore(world.config().clone(), WorldSnapshot::from_json(&json).unwrap()).unwrap();

    assert_eq!(restored.session_id(), world.session_id());
    assert_eq!(restored.tick_count(), world.tick_count());
    assert_eq!(transcript_lines(&restored), transcript_lines(&world));
    assert_eq!(restored.lexicon().len(), world.lexicon().len());
    for entry in world.lexicon().iter() {
        let other = restored.lexicon().get(&entry.term).unwrap();
        assert_eq!(other.usage_count, entry.usage_count);
    }
    let (saved, resumed) = (world.snapshot().crystallizer, restored.snapshot().crystallizer);
    assert_eq!(resumed.cursor, saved.cursor);
    assert_eq!(resumed.passes, saved.passes);
    assert_eq!(resumed.ticks_since, saved.ticks_since);
    let terms = |c: &murmur::linguistics::CrystallizerState| {
        c.candidates.iter().map(|(term, _)| term.clone()).collect::<Vec<_>>()
    };
    assert_eq!(terms(&resumed), terms(&saved));

    for (a, b) in world.entities().iter().zip(restored.entities()) {
        assert_eq!(a.id, b.id);
        assert!(a.emotion.similarity(&b.emotion) > 0.999_999);
        assert_eq!(a.memory.len(), b.memory.len());
        assert_eq!(a.relationships.len(), b.relationships.len());
        for (other, bond) in a.relationships.iter() {
            assert!((b.relationships.strength(other) - bond.strength).abs() < 1e-9);
        }
        assert!((a.position.x - b.position.x).abs() < 1e-9);
    }
}

#[test]
fn test_restores_evolve_identically() {
    let world = run_script(11);
    let snapshot = world.snapshot();
    let mut a = World::restore(world.config().clone(), snapshot.clone()).unwrap();
    let mut b = World::restore(world.config().clone(), snapshot).unwrap();
    for _ in 0..20 {
        a.record_speech("user", "the river sings", None, None);
        b.record_speech("user", "the river sings", None, None);
        a.tick(1.0);
        b.tick(1.0);
    }
    assert_eq!(transcript_lines(&a), transcript_lines(&b));
}

#[test]
fn test_same_seed_same_transcript() {
    let a = run_script(42);
    let b = run_script(42);
    assert_eq!(transcript_lines(&a), transcript_lines(&b));
    assert_eq!(
        a.lexicon().sorted().iter().map(|e| &e.term).collect::<Vec<_>>(),
        b.lexicon().sorted().iter().map(|e| &e.term).collect::<Vec<_>>()
    );
}

#[test]
fn test_config_from_toml() {
    let config = WorldConfig::from_toml_str(
        r#"
        seed = 99
        transcript_capacity = 50
        [crystallizer]
        min_usage = 5
        "#,
    )
    .unwrap();
    assert_eq!(config.seed, 99);
    assert_eq!(config.transcript_capacity, 50);
    assert_eq!(config.crystallizer.min_usage, 5);
    assert_eq!(config.crystallizer.min_speakers, WorldConfig::default().crystallizer.min_speakers);

    assert!(matches!(
        WorldConfig::from_toml_str("transcript_capacity = 0"),
        Err(MurmurError::InvalidConfig(_))
    ));
}
