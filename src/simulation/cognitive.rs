//! Cognitive phase: skill rust, memory consolidation, forgetting learned phrases

use tracing::debug;

use crate::entity::capabilities::Capability;
use crate::simulation::world::World;

pub(crate) fn update_cognition(world: &mut World, dt: f64) {
    let now = world.time;
    let config = &world.config.cognitive;
    let consolidate = config.consolidation_every > 0 && world.tick % config.consolidation_every == 0;

    for entity in &mut world.entities {
        if entity.has(Capability::Skills) {
            entity.skills.apply_rust(
                now,
                dt,
                config.skill_rust_after,
                config.skill_rust_rate,
                config.skill_floor,
            );
        }

        if consolidate && entity.has(Capability::Consolidation) && entity.has(Capability::Memory) {
            let merged = entity.memory.consolidate(
                config.duplicate_similarity,
                config.consolidation_threshold,
                config.max_replacements,
            );
            if merged > 0 {
                debug!(entity = %entity.id, merged, "Consolidated memories");
            }
        }

        if entity.has(Capability::Learning) {
            entity.learned.forget_stale(now, config.pattern_stale_after);
        }
    }
}
