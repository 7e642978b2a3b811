//! Mental phase: memory fade, emotion drift, needs, and the emotional climate

use crate::entity::capabilities::Capability;
use crate::entity::emotion::Emotion;
use crate::simulation::world::World;

/// Movement multiplier at zero arousal
const BASE_SPEED: f64 = 0.5;

pub(crate) fn update_minds(world: &mut World, dt: f64) {
    let now = world.time;
    let mental = &world.config.mental;

    for entity in &mut world.entities {
        if entity.has(Capability::Memory) {
            entity.memory.decay_all(mental.memory_decay_rate, dt);
            entity
                .memory
                .prune_if_due(now, mental.prune_interval, mental.prune_threshold);
        }

        if !entity.has(Capability::Emotion) {
            continue;
        }
        entity.emotion.drift(&entity.baseline, entity.drift_rate, dt);

        if entity.has(Capability::Needs) {
            entity.needs.grow(dt, entity.emotion.arousal);
            let pressure = entity.needs.valence_pressure();
            entity
                .emotion
                .shift(pressure * mental.need_emotion_weight * dt, 0.0, 0.0);
        }

        entity.speed = BASE_SPEED + entity.emotion.arousal;
    }

    update_climate(world, dt);
}

/// Decay toward neutral, sample the population, refresh the feedback pull
fn update_climate(world: &mut World, dt: f64) {
    let config = &world.config.climate;
    world.climate.decay(config.decay_rate, dt);

    let emotions: Vec<Emotion> = world
        .entities
        .iter()
        .filter(|e| e.has(Capability::Emotion))
        .map(|e| e.emotion)
        .collect();
    if !emotions.is_empty() {
        let fraction = (config.sampling_rate * dt).min(1.0);
        world.climate.sample(&emotions, fraction);
    }

    world.influence = world.climate.influence(emotions.len(), config);
}
