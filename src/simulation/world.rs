//! The world: owns the clock, every entity and every world-scoped singleton

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use ahash::AHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::climate::{ClimateInfluence, EmotionalClimate, WorldMind, WorldStats};
use crate::core::config::WorldConfig;
use crate::core::error::{MurmurError, Result};
use crate::core::types::{EntityId, Seconds, Tick, UtteranceId, Vec2};
use crate::entity::inbox::Message;
use crate::entity::material::MaterialSpec;
use crate::entity::state::Entity;
use crate::linguistics::{
    Crystallizer, EmergenceState, EmergenceTelemetry, Lexicon, LexiconEntry, LexiconStats,
    Transcript, Utterance,
};
use crate::simulation::events::{CascadeBudget, EventLog, WorldEvent};
use crate::simulation::notifications::{ListenerId, ListenerRegistry, Notification, NotificationKind};
use crate::triggers::CompiledRule;

/// Context broadcast waiting behind one already in flight
#[derive(Debug, Clone)]
pub(crate) struct PendingContext {
    pub values: Map<String, Value>,
    pub ttl: Option<f64>,
    pub depth: u32,
}

/// Periodic firing collected by housekeeping, run by the time-trigger phase
#[derive(Debug, Clone)]
pub(crate) struct DueFiring {
    pub entity: EntityId,
    pub rule: Arc<CompiledRule>,
    pub scheduled_at: Seconds,
}

/// Per-tick counters folded into the `TickReport`
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TickCounters {
    pub utterances: usize,
    pub triggers_fired: usize,
    pub events_emitted: usize,
}

pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) session: Uuid,
    pub(crate) time: Seconds,
    pub(crate) tick: Tick,
    pub(crate) rng: ChaCha8Rng,

    pub(crate) materials: BTreeMap<String, MaterialSpec>,
    pub(crate) entities: Vec<Entity>,
    pub(crate) index: AHashMap<EntityId, usize>,
    pub(crate) spawn_counter: u64,

    pub(crate) transcript: Transcript,
    pub(crate) next_utterance_id: UtteranceId,
    pub(crate) last_utterance: Option<Utterance>,
    pub(crate) lexicon: Lexicon,
    pub(crate) crystallizer: Crystallizer,
    pub(crate) telemetry: EmergenceTelemetry,

    pub(crate) climate: EmotionalClimate,
    pub(crate) influence: ClimateInfluence,
    pub(crate) mind: WorldMind,

    pub(crate) context: Map<String, Value>,
    /// Expiry time per context key set with a TTL
    pub(crate) context_expiry: BTreeMap<String, Seconds>,
    pub(crate) translations: AHashMap<(String, String), String>,

    pub(crate) events: EventLog,
    pub(crate) outbox: Vec<Message>,
    pub(crate) next_message_id: u64,
    pub(crate) listeners: ListenerRegistry,

    pub(crate) cascade: CascadeBudget,
    pub(crate) broadcasting: bool,
    pub(crate) pending_context: VecDeque<PendingContext>,
    pub(crate) due_firings: Vec<DueFiring>,
    pub(crate) counters: TickCounters,
}

impl Default for World {
    fn default() -> Self {
        Self::build(WorldConfig::default())
    }
}

impl World {
    /// Create an empty world after validating the configuration
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let session = Uuid::new_v4();
        info!(session = %session, seed = config.seed, "World created");
        Self {
            session,
            time: 0.0,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            materials: BTreeMap::new(),
            entities: Vec::new(),
            index: AHashMap::new(),
            spawn_counter: 0,
            transcript: Transcript::new(config.transcript_capacity),
            next_utterance_id: 1,
            last_utterance: None,
            lexicon: Lexicon::new(),
            crystallizer: Crystallizer::new(config.crystallizer.clone()),
            telemetry: EmergenceTelemetry::new(),
            climate: EmotionalClimate::neutral(),
            influence: ClimateInfluence::default(),
            mind: WorldMind::new(),
            context: Map::new(),
            context_expiry: BTreeMap::new(),
            translations: AHashMap::new(),
            events: EventLog::new(config.triggers.event_log_capacity),
            outbox: Vec::new(),
            next_message_id: 1,
            listeners: ListenerRegistry::new(),
            cascade: CascadeBudget::new(
                config.triggers.max_cascade_depth,
                config.triggers.max_emissions_per_tick,
            ),
            broadcasting: false,
            pending_context: VecDeque::new(),
            due_firings: Vec::new(),
            counters: TickCounters::default(),
            config,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Make a material available to `spawn_registered` and to restore
    pub fn register_material(&mut self, spec: MaterialSpec) -> Result<()> {
        spec.validate()?;
        self.materials.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn material(&self, name: &str) -> Option<&MaterialSpec> {
        self.materials.get(name)
    }

    fn next_entity_id(&mut self, spec: &MaterialSpec) -> EntityId {
        if let Some(id) = &spec.id {
            return EntityId::new(id.as_str());
        }
        loop {
            self.spawn_counter += 1;
            let id = EntityId::new(format!("{}-{}", spec.name, self.spawn_counter));
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }

    /// Spawn an entity from a material; the material is registered too
    pub fn spawn(&mut self, spec: &MaterialSpec, position: Vec2) -> Result<EntityId> {
        spec.validate()?;
        if !position.is_finite() {
            return Err(MurmurError::NumericDrift("spawn position"));
        }
        let id = self.next_entity_id(spec);
        if self.index.contains_key(&id) {
            return Err(MurmurError::DuplicateEntity(id));
        }

        let entity = Entity::from_material(spec, id.clone(), position, self.time, &self.config);
        info!(
            entity = %id,
            material = %spec.name,
            triggers = entity.triggers.len(),
            capabilities = ?entity.capabilities.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "Spawned entity"
        );
        self.materials.insert(spec.name.clone(), spec.clone());
        self.index.insert(id.clone(), self.entities.len());
        self.entities.push(entity);
        Ok(id)
    }

    pub fn spawn_registered(&mut self, material: &str, position: Vec2) -> Result<EntityId> {
        let spec = self
            .materials
            .get(material)
            .cloned()
            .ok_or_else(|| MurmurError::MaterialNotFound(material.to_string()))?;
        self.spawn(&spec, position)
    }

    /// Remove an entity; others keep their memories of it
    pub fn despawn(&mut self, id: &EntityId) -> Result<Entity> {
        let idx = self
            .index
            .remove(id)
            .ok_or_else(|| MurmurError::EntityNotFound(id.clone()))?;
        let entity = self.entities.remove(idx);
        self.reindex();
        self.due_firings.retain(|f| &f.entity != id);
        info!(entity = %id, "Despawned entity");
        Ok(entity)
    }

    pub(crate) fn reindex(&mut self) {
        self.index = self
            .entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }

    pub(crate) fn index_of(&self, id: &EntityId) -> Option<usize> {
        self.index.get(id).copied()
    }

    // ========================================================================
    // Climate injections
    // ========================================================================

    pub fn record_entity_death(&mut self, intensity: f64) {
        self.climate.record_death(intensity);
    }

    pub fn record_suffering(&mut self, severity: f64) {
        self.climate.record_suffering(severity);
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn on(&mut self, kind: NotificationKind, handler: impl FnMut(&Notification) + 'static) -> ListenerId {
        self.listeners.on(kind, Box::new(handler))
    }

    pub fn once(&mut self, kind: NotificationKind, handler: impl FnMut(&Notification) + 'static) -> ListenerId {
        self.listeners.once(kind, Box::new(handler))
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn time(&self) -> Seconds {
        self.time
    }

    pub fn tick_count(&self) -> Tick {
        self.tick
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.index_of(id).map(|i| &self.entities[i])
    }

    /// Entities in spawn order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn climate(&self) -> &EmotionalClimate {
        &self.climate
    }

    pub fn climate_influence(&self) -> &ClimateInfluence {
        &self.influence
    }

    pub fn world_stats(&self) -> Option<&WorldStats> {
        self.mind.latest()
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn lexicon_stats(&self) -> LexiconStats {
        self.lexicon.stats()
    }

    pub fn popular_terms(&self, min_usage: u32) -> Vec<&LexiconEntry> {
        self.lexicon.popular(min_usage)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The last `n` utterances, oldest first
    pub fn recent_utterances(&self, n: usize) -> Vec<&Utterance> {
        self.transcript.recent(n)
    }

    pub fn last_utterance(&self) -> Option<&Utterance> {
        self.last_utterance.as_ref()
    }

    pub fn emergence_state(&self) -> &EmergenceState {
        self.telemetry.state()
    }

    pub fn events(&self) -> impl Iterator<Item = &WorldEvent> {
        self.events.iter()
    }

    pub fn translation(&self, source: &str, language: &str) -> Option<&str> {
        self.translations
            .get(&(source.to_string(), language.to_string()))
            .map(String::as_str)
    }

    /// Messages queued for delivery by the communication phase
    pub fn pending_messages(&self) -> &[Message] {
        &self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moth() -> MaterialSpec {
        MaterialSpec::from_toml_str("name = \"moth\"\n[emotion]\nvalence = 0.2").unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = WorldConfig::default();
        config.transcript_capacity = 0;
        assert!(matches!(World::new(config), Err(MurmurError::InvalidConfig(_))));
    }

    #[test]
    fn test_spawn_generates_unique_ids() {
        let mut world = World::default();
        let a = world.spawn(&moth(), Vec2::default()).unwrap();
        let b = world.spawn(&moth(), Vec2::new(1.0, 0.0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(world.entity_count(), 2);
        assert_eq!(world.entity(&b).unwrap().position.x, 1.0);
    }

    #[test]
    fn test_fixed_id_duplicate_rejected() {
        let mut world = World::default();
        let mut spec = moth();
        spec.id = Some("lamp-moth".into());
        world.spawn(&spec, Vec2::default()).unwrap();
        assert!(matches!(
            world.spawn(&spec, Vec2::default()),
            Err(MurmurError::DuplicateEntity(_))
        ));
    }

    #[test]
    fn test_spawn_registered_and_despawn() {
        let mut world = World::default();
        assert!(matches!(
            world.spawn_registered("moth", Vec2::default()),
            Err(MurmurError::MaterialNotFound(_))
        ));
        world.register_material(moth()).unwrap();
        let a = world.spawn_registered("moth", Vec2::default()).unwrap();
        let b = world.spawn_registered("moth", Vec2::default()).unwrap();

        let removed = world.despawn(&a).unwrap();
        assert_eq!(removed.id, a);
        assert!(world.entity(&a).is_none());
        assert_eq!(world.entity(&b).unwrap().id, b);
        assert!(matches!(world.despawn(&a), Err(MurmurError::EntityNotFound(_))));
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let mut world = World::default();
        assert!(matches!(
            world.spawn(&moth(), Vec2::new(f64::NAN, 0.0)),
            Err(MurmurError::NumericDrift(_))
        ));
    }
}
