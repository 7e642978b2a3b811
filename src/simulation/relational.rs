//! Relational phase: proximity-driven contagion, memories, bonds and attraction
//!
//! Everything is computed against a snapshot taken at the start of the phase,
//! so the outcome does not depend on entity order.

use crate::core::types::{EntityId, Vec2};
use crate::entity::capabilities::Capability;
use crate::entity::emotion::Emotion;
use crate::entity::memory::Memory;
use crate::simulation::world::World;

/// Largest fraction of an emotional gap closed in one tick
const MAX_PULL: f64 = 0.25;

/// One nearby partner as seen from the snapshot
struct Partner {
    idx: usize,
    distance: f64,
}

/// Frozen view of one entity
struct Frame {
    id: EntityId,
    name: String,
    position: Vec2,
    emotion: Emotion,
    feels: bool,
    moves: bool,
}

pub(crate) fn update_relations(world: &mut World, dt: f64) {
    let now = world.time;
    let config = world.config.relational.clone();

    let frames: Vec<Frame> = world
        .entities
        .iter()
        .map(|e| Frame {
            id: e.id.clone(),
            name: e.name.clone(),
            position: e.position,
            emotion: e.emotion,
            feels: e.has(Capability::Emotion),
            moves: e.has(Capability::Motion),
        })
        .collect();

    let partners: Vec<Vec<Partner>> = (0..frames.len())
        .map(|i| {
            (0..frames.len())
                .filter(|&j| j != i)
                .filter_map(|j| {
                    let distance = frames[i].position.distance(&frames[j].position);
                    (distance <= config.interaction_radius).then_some(Partner { idx: j, distance })
                })
                .collect()
        })
        .collect();

    // Forces read memories and bonds before this tick's updates touch them
    let forces: Vec<Vec2> = (0..frames.len())
        .map(|i| attraction_on(world, &frames, i, &partners[i], config.attraction, config.min_separation))
        .collect();

    let contagion = (config.contagion_rate * dt).clamp(0.0, MAX_PULL);
    let influence = world.influence;
    let climate_pull = (influence.weight * dt).clamp(0.0, MAX_PULL);

    for (i, entity) in world.entities.iter_mut().enumerate() {
        let nearby = &partners[i];

        if frames[i].feels {
            let felt: Vec<&Emotion> = nearby
                .iter()
                .filter(|p| frames[p.idx].feels)
                .map(|p| &frames[p.idx].emotion)
                .collect();
            if !felt.is_empty() && contagion > 0.0 {
                let mean = Emotion::mean(felt);
                entity.emotion.blend_toward(&mean, contagion);
            }
            if climate_pull > 0.0 {
                entity.emotion.blend_toward(&influence.target, climate_pull);
            }
        }

        for partner in nearby {
            let other = &frames[partner.idx];

            if entity.has(Capability::Memory) {
                let recent = entity
                    .memory
                    .latest_about("interaction", other.id.as_str())
                    .is_some_and(|m| now - m.timestamp < config.interaction_memory_cooldown);
                if !recent {
                    entity.memory.add(Memory::new(
                        now,
                        "interaction",
                        other.id.as_str(),
                        format!("was near {}", other.name),
                        config.interaction_salience / (1.0 + partner.distance),
                    ));
                }
            }

            if entity.has(Capability::Relationships) {
                let bond = entity.relationships.entry(&other.id, now);
                bond.adjust_strength(config.bond_rate * dt);
                bond.touch(now);
            }
        }

        if frames[i].moves {
            let force = forces[i];
            entity.velocity = entity.velocity + force * dt;
        }
    }
}

/// Summed pull toward every mobile partner beyond `min_separation`
///
/// Familiar partners (remembered, bonded) pull harder.
fn attraction_on(
    world: &World,
    frames: &[Frame],
    i: usize,
    partners: &[Partner],
    attraction: f64,
    min_separation: f64,
) -> Vec2 {
    if !frames[i].moves || attraction == 0.0 {
        return Vec2::default();
    }
    let me = &world.entities[i];
    partners
        .iter()
        .filter(|p| frames[p.idx].moves && p.distance > min_separation)
        .fold(Vec2::default(), |acc, p| {
            let other = &world.entities[p.idx];
            let familiarity = 1.0 + 0.1 * me.memory.count_about(other.id.as_str()) as f64;
            let mutual = (me.relationships.strength(&other.id) + other.relationships.strength(&me.id)) / 2.0;
            let magnitude = attraction * familiarity * (0.5 + mutual);
            let direction = (frames[p.idx].position - frames[i].position).normalize();
            acc + direction * magnitude
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::material::MaterialSpec;

    fn social() -> MaterialSpec {
        MaterialSpec::from_toml_str(
            "name = \"kin\"\n[essence]\nmobile = true\n[emotion]\n[memory]\n[relationships]\n",
        )
        .unwrap()
    }

    #[test]
    fn test_contagion_narrows_gap() {
        let mut world = World::default();
        world.config.climate.influence_weight = 0.0;
        world.influence.weight = 0.0;
        let a = world.spawn(&social(), Vec2::new(0.0, 0.0)).unwrap();
        let b = world.spawn(&social(), Vec2::new(2.0, 0.0)).unwrap();
        let (ia, ib) = (world.index_of(&a).unwrap(), world.index_of(&b).unwrap());
        world.entities[ia].emotion.valence = 0.8;
        world.entities[ib].emotion.valence = -0.8;

        update_relations(&mut world, 1.0);
        let gap = world.entities[ia].emotion.valence - world.entities[ib].emotion.valence;
        assert!(gap > 0.0 && gap < 1.6);
    }

    #[test]
    fn test_interaction_memory_respects_cooldown() {
        let mut world = World::default();
        let a = world.spawn(&social(), Vec2::new(0.0, 0.0)).unwrap();
        let b = world.spawn(&social(), Vec2::new(3.0, 0.0)).unwrap();

        update_relations(&mut world, 1.0);
        update_relations(&mut world, 1.0);
        let memory = &world.entity(&a).unwrap().memory;
        assert_eq!(memory.count_about(b.as_str()), 1);
        assert!(world.entity(&a).unwrap().relationships.strength(&b) > 0.0);

        world.time += world.config.relational.interaction_memory_cooldown;
        update_relations(&mut world, 1.0);
        assert_eq!(world.entity(&a).unwrap().memory.count_about(b.as_str()), 2);
    }

    #[test]
    fn test_distant_entities_ignore_each_other() {
        let mut world = World::default();
        let a = world.spawn(&social(), Vec2::new(0.0, 0.0)).unwrap();
        world.spawn(&social(), Vec2::new(100.0, 0.0)).unwrap();

        update_relations(&mut world, 1.0);
        let a = world.entity(&a).unwrap();
        assert!(a.memory.is_empty());
        assert_eq!(a.velocity, Vec2::default());
    }

    #[test]
    fn test_partners_attract() {
        let mut world = World::default();
        let a = world.spawn(&social(), Vec2::new(0.0, 0.0)).unwrap();
        world.spawn(&social(), Vec2::new(5.0, 0.0)).unwrap();

        update_relations(&mut world, 1.0);
        assert!(world.entity(&a).unwrap().velocity.x > 0.0);
    }
}
