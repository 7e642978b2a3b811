//! Property tests for simulation invariants
//!
//! Ranges, capacities and catch-up counts must hold for any tick sequence,
//! not just the hand-picked ones in the scenario tests.

use ahash::AHashMap;
use murmur::core::config::{AdaptiveTimeConfig, WorldConfig};
use murmur::core::types::Vec2;
use murmur::entity::emotion::Emotion;
use murmur::entity::material::MaterialSpec;
use murmur::simulation::{effective_dt, World};
use proptest::prelude::*;

fn creature(valence: f64, arousal: f64) -> MaterialSpec {
    MaterialSpec::from_toml_str(&format!(
        r#"
        name = "creature"
        [essence]
        mobile = true
        [emotion]
        valence = {valence}
        arousal = {arousal}
        [memory]
        capacity = 8
        [relationships]
        [needs]
        [features]
        learning = true
        consolidation = true
        communication = true
        "#
    ))
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn emotions_stay_in_range(
        seeds in prop::collection::vec((-1.0f64..=1.0, 0.0f64..=1.0, -5.0f64..5.0, -5.0f64..5.0), 0..8),
        steps in prop::collection::vec(0.0f64..5.0, 1..30),
        deaths in prop::collection::vec(0.0f64..=1.0, 0..3),
    ) {
        let mut world = World::default();
        for (valence, arousal, x, y) in &seeds {
            world.spawn(&creature(*valence, *arousal), Vec2::new(*x, *y)).unwrap();
        }
        for intensity in &deaths {
            world.record_entity_death(*intensity);
        }

        for dt in steps {
            world.tick(dt);
            prop_assert!(world.climate().is_valid());
            for entity in world.entities() {
                prop_assert!(entity.emotion.is_valid(), "{:?}", entity.emotion);
                prop_assert!(entity.position.is_finite());
                prop_assert!(entity.memory.len() <= entity.memory.capacity());
            }
        }
    }

    #[test]
    fn transcript_is_bounded_fifo(capacity in 1usize..20, spoken in 0usize..60) {
        let config = WorldConfig {
            transcript_capacity: capacity,
            ..WorldConfig::default()
        };
        let mut world = World::new(config).unwrap();
        for i in 0..spoken {
            world.record_speech("user", &format!("line {}", i), None, None);
        }

        let kept = spoken.min(capacity);
        prop_assert_eq!(world.transcript().len(), kept);
        let ids: Vec<u64> = world.transcript().iter().map(|u| u.id).collect();
        let expected: Vec<u64> = ((spoken - kept + 1) as u64..=spoken as u64).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn periodic_catch_up_ignores_granularity(
        interval in 0.5f64..5.0,
        steps in prop::collection::vec(0.01f64..10.0, 1..30),
    ) {
        let spec = MaterialSpec::from_toml_str(&format!(
            "name = \"metronome\"\n[[triggers]]\non = \"time.every({interval})\"\nactions = [{{ log = \"tick\" }}]\n"
        ))
        .unwrap();
        let mut world = World::default();
        world.spawn(&spec, Vec2::default()).unwrap();

        let mut fired = 0;
        for dt in steps {
            fired += world.tick(dt).triggers_fired;
        }

        let elapsed = world.time();
        let expected = (1u64..)
            .take_while(|n| interval * *n as f64 <= elapsed)
            .count();
        prop_assert_eq!(fired, expected);
        prop_assert!(fired as f64 <= elapsed / interval + 1e-9);
    }

    #[test]
    fn lexicon_terms_unique_and_usage_monotonic(
        script in prop::collection::vec((0usize..3, 0usize..4), 1..60),
    ) {
        const SPEAKERS: [&str; 3] = ["ada", "bo", "cy"];
        const PHRASES: [&str; 4] = ["hello", "good night", "Hello", "river song"];

        let mut config = WorldConfig::default();
        config.crystallizer.coin_chance = 0.0;
        config.crystallizer.min_usage = 2;
        let min_usage = config.crystallizer.min_usage;
        let mut world = World::new(config).unwrap();

        let mut previous: AHashMap<String, u32> = AHashMap::new();
        for (speaker, phrase) in script {
            world.record_speech(SPEAKERS[speaker], PHRASES[phrase], None, None);
            world.tick(1.0);

            let mut seen = AHashMap::new();
            for entry in world.lexicon().iter() {
                prop_assert!(seen.insert(entry.term.clone(), entry.usage_count).is_none());
                prop_assert!(entry.usage_count >= min_usage);
                if let Some(before) = previous.get(&entry.term) {
                    prop_assert!(entry.usage_count >= *before);
                }
            }
            previous = seen;
        }
    }

    #[test]
    fn adaptive_time_is_finite_and_non_negative(
        dt in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), -10.0f64..10.0],
        valence in -1.0f64..=1.0,
        arousal in 0.0f64..=1.0,
        k in -2.0f64..3.0,
    ) {
        let config = AdaptiveTimeConfig { enabled: true, k, ..AdaptiveTimeConfig::default() };
        let result = effective_dt(dt, &Emotion::new(valence, arousal, 0.5), &config);
        prop_assert!(result.is_finite());
        prop_assert!(result >= 0.0);
    }
}
