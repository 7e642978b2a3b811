//! Whole-world snapshots and restore
//!
//! A snapshot stores entity state, not compiled behavior: on restore each
//! entity is rebuilt from its material (rules and reactions recompile) and
//! its mutable state is laid back on top. Listeners are not persisted.

use std::collections::BTreeMap;

use ahash::AHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::climate::EmotionalClimate;
use crate::core::config::WorldConfig;
use crate::core::error::{MurmurError, Result};
use crate::core::types::{EntityId, Seconds, Tick, UtteranceId, Vec2};
use crate::entity::emotion::Emotion;
use crate::entity::inbox::{Inbox, Message};
use crate::entity::material::MaterialSpec;
use crate::entity::memory::MemoryBuffer;
use crate::entity::needs::Needs;
use crate::entity::relationships::RelationshipTable;
use crate::entity::skills::{LearnedPatterns, SkillSet};
use crate::entity::state::Entity;
use crate::linguistics::{CrystallizerState, LexiconEntry, Utterance};
use crate::simulation::world::World;
use crate::triggers::schedule::PeriodicSchedule;

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub material: String,
    pub spawned_at: Seconds,
    pub position: Vec2,
    pub velocity: Vec2,
    pub speed: f64,
    pub emotion: Emotion,
    pub baseline: Emotion,
    pub memory: MemoryBuffer,
    pub relationships: RelationshipTable,
    pub skills: SkillSet,
    pub needs: Needs,
    pub learned: LearnedPatterns,
    pub inbox: Inbox,
    pub context: Map<String, Value>,
    /// Periodic schedule per compiled rule, in rule order
    pub schedules: Vec<Option<PeriodicSchedule>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub source: String,
    pub language: String,
    pub translation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub version: u32,
    pub session: Uuid,
    pub time: Seconds,
    pub tick: Tick,
    pub next_utterance_id: UtteranceId,
    pub spawn_counter: u64,
    pub materials: Vec<MaterialSpec>,
    pub entities: Vec<EntitySnapshot>,
    pub lexicon: Vec<LexiconEntry>,
    pub crystallizer: CrystallizerState,
    pub climate: EmotionalClimate,
    pub collective: Emotion,
    pub context: Map<String, Value>,
    pub context_expiry: BTreeMap<String, Seconds>,
    pub translations: Vec<TranslationRecord>,
    pub transcript: Vec<Utterance>,
    pub outbox: Vec<Message>,
    pub next_message_id: u64,
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl EntitySnapshot {
    fn capture(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            material: entity.material.clone(),
            spawned_at: entity.spawned_at,
            position: entity.position,
            velocity: entity.velocity,
            speed: entity.speed,
            emotion: entity.emotion,
            baseline: entity.baseline,
            memory: entity.memory.clone(),
            relationships: entity.relationships.clone(),
            skills: entity.skills.clone(),
            needs: entity.needs.clone(),
            learned: entity.learned.clone(),
            inbox: entity.inbox.clone(),
            context: entity.context.clone(),
            schedules: entity.triggers.iter().map(|t| t.schedule).collect(),
        }
    }

    /// Rebuild from the material, then lay the saved state on top
    fn rebuild(self, spec: &MaterialSpec, config: &WorldConfig) -> Entity {
        let mut entity = Entity::from_material(spec, self.id, self.position, self.spawned_at, config);
        entity.velocity = self.velocity;
        entity.speed = self.speed;
        entity.emotion = self.emotion;
        entity.baseline = self.baseline;
        entity.memory = self.memory;
        entity.relationships = self.relationships;
        entity.skills = self.skills;
        entity.needs = self.needs;
        entity.learned = self.learned;
        entity.inbox = self.inbox;
        entity.inbox.set_capacity(config.communication.inbox_capacity);
        entity.context = self.context;

        if entity.triggers.len() == self.schedules.len() {
            for (runtime, schedule) in entity.triggers.iter_mut().zip(self.schedules) {
                runtime.schedule = schedule;
            }
        } else {
            tracing::warn!(
                entity = %entity.id,
                saved = self.schedules.len(),
                compiled = entity.triggers.len(),
                "Rule count changed since snapshot; schedules restart"
            );
        }
        entity
    }
}

impl World {
    /// Capture everything needed to resume this world
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut translations: Vec<TranslationRecord> = self
            .translations
            .iter()
            .map(|((source, language), translation)| TranslationRecord {
                source: source.clone(),
                language: language.clone(),
                translation: translation.clone(),
            })
            .collect();
        translations.sort_by(|a, b| (&a.source, &a.language).cmp(&(&b.source, &b.language)));

        WorldSnapshot {
            version: SNAPSHOT_VERSION,
            session: self.session,
            time: self.time,
            tick: self.tick,
            next_utterance_id: self.next_utterance_id,
            spawn_counter: self.spawn_counter,
            materials: self.materials.values().cloned().collect(),
            entities: self.entities.iter().map(EntitySnapshot::capture).collect(),
            lexicon: self.lexicon.sorted().into_iter().cloned().collect(),
            crystallizer: self.crystallizer.state(),
            climate: self.climate,
            collective: self.mind.collective(),
            context: self.context.clone(),
            context_expiry: self.context_expiry.clone(),
            translations,
            transcript: self.transcript.iter().cloned().collect(),
            outbox: self.outbox.clone(),
            next_message_id: self.next_message_id,
        }
    }

    /// Rebuild a world from a snapshot under `config`
    ///
    /// The random stream restarts from `config.seed` mixed with the tick,
    /// so two restores of the same snapshot evolve identically.
    pub fn restore(config: WorldConfig, snapshot: WorldSnapshot) -> Result<World> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MurmurError::IncompatibleSnapshot {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let mut world = World::new(config)?;
        for spec in snapshot.materials {
            world.register_material(spec)?;
        }

        for saved in snapshot.entities {
            let spec = world
                .materials
                .get(&saved.material)
                .cloned()
                .ok_or_else(|| MurmurError::MaterialNotFound(saved.material.clone()))?;
            if world.index.contains_key(&saved.id) {
                return Err(MurmurError::DuplicateEntity(saved.id.clone()));
            }
            let entity = saved.rebuild(&spec, &world.config);
            world.index.insert(entity.id.clone(), world.entities.len());
            world.entities.push(entity);
        }

        world.session = snapshot.session;
        world.time = snapshot.time;
        world.tick = snapshot.tick;
        world.rng = ChaCha8Rng::seed_from_u64(world.config.seed ^ snapshot.tick);
        world.spawn_counter = snapshot.spawn_counter;
        world.next_utterance_id = snapshot.next_utterance_id;
        world.next_message_id = snapshot.next_message_id;

        for utterance in snapshot.transcript {
            world.transcript.push(utterance);
        }
        world.last_utterance = world.transcript.last().cloned();
        world
            .crystallizer
            .restore(&mut world.lexicon, snapshot.lexicon, snapshot.crystallizer);

        world.climate = snapshot.climate;
        world.influence = world.climate.influence(world.entities.len(), &world.config.climate);
        world.mind.set_collective(snapshot.collective);
        world.context = snapshot.context;
        world.context_expiry = snapshot.context_expiry;
        world.translations = snapshot
            .translations
            .into_iter()
            .map(|r| ((r.source, r.language), r.translation))
            .collect::<AHashMap<_, _>>();
        world.outbox = snapshot.outbox;

        info!(
            session = %world.session,
            entities = world.entities.len(),
            tick = world.tick,
            "World restored"
        );
        Ok(world)
    }
}
