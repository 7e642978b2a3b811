//! Housekeeping phase: expire context keys, trim logs, collect timer firings

use tracing::{debug, warn};

use crate::simulation::world::{DueFiring, World};

pub(crate) fn run_housekeeping(world: &mut World) {
    expire_context(world);
    world.events.trim();
    collect_due_firings(world);
}

/// Remove broadcast keys whose TTL has elapsed, world-wide and per entity
pub(crate) fn expire_context(world: &mut World) {
    let now = world.time;
    let expired: Vec<String> = world
        .context_expiry
        .iter()
        .filter(|(_, at)| **at <= now)
        .map(|(key, _)| key.clone())
        .collect();
    if expired.is_empty() {
        return;
    }

    for key in &expired {
        world.context_expiry.remove(key);
        world.context.remove(key);
        for entity in &mut world.entities {
            entity.context.remove(key);
        }
    }
    debug!(keys = ?expired, "Context keys expired");
}

/// Queue every periodic rule that came due, catch-up bounded per schedule
pub(crate) fn collect_due_firings(world: &mut World) {
    let now = world.time;
    let max_catch_up = world.config.triggers.max_catch_up;
    for entity in &mut world.entities {
        for runtime in &mut entity.triggers {
            let Some(schedule) = runtime.schedule.as_mut() else {
                continue;
            };
            let catch_up = schedule.take_due(now, max_catch_up);
            if catch_up.skipped > 0 {
                warn!(
                    entity = %entity.id,
                    rule = %runtime.rule.source,
                    skipped = catch_up.skipped,
                    max_catch_up,
                    "Periodic catch-up capped; skipping missed firings"
                );
            }
            for scheduled_at in catch_up.due {
                world.due_firings.push(DueFiring {
                    entity: entity.id.clone(),
                    rule: runtime.rule.clone(),
                    scheduled_at,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec2;
    use crate::entity::material::MaterialSpec;
    use serde_json::{json, Map, Value};

    #[test]
    fn test_context_ttl_expires_everywhere() {
        let mut world = World::default();
        let a = world.spawn(&MaterialSpec::named("a"), Vec2::default()).unwrap();
        let mut values = Map::new();
        values.insert("alarm".into(), json!(true));
        world.broadcast_context_with_ttl(values, 2.0);

        world.time = 1.0;
        expire_context(&mut world);
        assert_eq!(world.context().get("alarm"), Some(&Value::Bool(true)));

        world.time = 2.0;
        expire_context(&mut world);
        assert!(world.context().get("alarm").is_none());
        assert!(world.entity(&a).unwrap().context.get("alarm").is_none());
    }

    #[test]
    fn test_rebroadcast_without_ttl_clears_expiry() {
        let mut world = World::default();
        let mut values = Map::new();
        values.insert("mode".into(), json!("night"));
        world.broadcast_context_with_ttl(values.clone(), 1.0);
        world.broadcast_context(values);

        world.time = 10.0;
        expire_context(&mut world);
        assert_eq!(world.context()["mode"], json!("night"));
    }

    #[test]
    fn test_periodic_rules_are_collected() {
        let mut world = World::default();
        let spec = MaterialSpec::from_toml_str(
            r#"
            name = "clock"
            [[triggers]]
            on = "time.every(1s)"
            actions = [{ emit = { event = "chime" } }]
            "#,
        )
        .unwrap();
        world.spawn(&spec, Vec2::default()).unwrap();

        world.time = 3.0;
        collect_due_firings(&mut world);
        assert_eq!(world.due_firings.len(), 3);
        assert!(world.due_firings.windows(2).all(|w| w[0].scheduled_at < w[1].scheduled_at));
    }
}
