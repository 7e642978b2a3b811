//! The simulated entity and its construction from a material

use ahash::AHashMap;
use serde_json::{json, Map, Value};

use crate::core::config::WorldConfig;
use crate::core::types::{EntityId, Seconds, Vec2};
use crate::entity::capabilities::{Capability, CapabilitySet};
use crate::entity::emotion::Emotion;
use crate::entity::inbox::Inbox;
use crate::entity::material::{Essence, MaterialSpec, UtteranceStyle};
use crate::entity::memory::MemoryBuffer;
use crate::entity::needs::Needs;
use crate::entity::relationships::RelationshipTable;
use crate::entity::skills::{LearnedPatterns, SkillSet};
use crate::linguistics::proto_language::GenerateOptions;
use crate::triggers::compiler::compile_rules;
use crate::triggers::context::{emotion_value, position_value};
use crate::triggers::expression::Expr;
use crate::triggers::schedule::TriggerRuntime;
use std::collections::BTreeMap;

/// Compiled `[[reactions]]` entry
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionReaction {
    pub guard: Expr,
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Name of the material this entity was spawned from
    pub material: String,
    pub essence: Essence,
    pub capabilities: CapabilitySet,
    pub spawned_at: Seconds,

    pub position: Vec2,
    pub velocity: Vec2,
    /// Movement multiplier, coupled to arousal
    pub speed: f64,

    pub emotion: Emotion,
    pub baseline: Emotion,
    pub drift_rate: f64,

    pub memory: MemoryBuffer,
    pub relationships: RelationshipTable,
    pub skills: SkillSet,
    pub needs: Needs,
    pub learned: LearnedPatterns,
    pub inbox: Inbox,

    pub style: UtteranceStyle,
    pub language: Option<String>,
    pub lines: BTreeMap<String, Vec<String>>,
    pub proto: GenerateOptions,

    /// Latest broadcast context as seen by this entity plus local writes
    pub context: Map<String, Value>,
    pub triggers: Vec<TriggerRuntime>,
    pub reactions: Vec<EmotionReaction>,
}

impl Entity {
    /// Build an entity; rules and reactions that fail to compile are dropped
    pub fn from_material(
        spec: &MaterialSpec,
        id: EntityId,
        position: Vec2,
        now: Seconds,
        config: &WorldConfig,
    ) -> Self {
        let capabilities = spec.capabilities();

        let (baseline, drift_rate) = match &spec.emotion {
            Some(decl) => (
                Emotion::new(decl.valence, decl.arousal, decl.dominance),
                decl.drift_rate.unwrap_or(config.mental.default_drift_rate),
            ),
            None => (Emotion::neutral(), config.mental.default_drift_rate),
        };

        let memory = MemoryBuffer::new(spec.memory.as_ref().map_or(64, |m| m.capacity));

        let mut relationships = RelationshipTable::new();
        if let Some(decl) = &spec.relationships {
            for (other, strength) in &decl.initial {
                relationships
                    .entry(&EntityId::new(other.as_str()), now)
                    .set_strength(*strength);
            }
        }

        let skills = spec
            .skills
            .as_ref()
            .map(|levels| {
                let levels: AHashMap<String, f64> =
                    levels.iter().map(|(k, v)| (k.clone(), *v)).collect();
                SkillSet::from_levels(&levels, now)
            })
            .unwrap_or_default();

        let (style, language, lines, proto) = match &spec.dialogue {
            Some(d) => (d.style.clone(), d.language.clone(), d.lines.clone(), d.proto.clone()),
            None => (UtteranceStyle::default(), None, BTreeMap::new(), GenerateOptions::default()),
        };

        let triggers = compile_rules(&spec.name, &spec.triggers)
            .into_iter()
            .map(|rule| TriggerRuntime::new(rule, now))
            .collect();

        let reactions = spec
            .reactions
            .iter()
            .filter_map(|r| match Expr::parse(&r.when) {
                Ok(guard) => Some(EmotionReaction {
                    guard,
                    valence: r.valence,
                    arousal: r.arousal,
                    dominance: r.dominance,
                }),
                Err(e) => {
                    tracing::warn!(material = %spec.name, when = %r.when, error = %e, "Dropping reaction");
                    None
                }
            })
            .collect();

        Self {
            id,
            name: spec.name.clone(),
            material: spec.name.clone(),
            essence: spec.essence.clone(),
            capabilities,
            spawned_at: now,
            position,
            velocity: Vec2::default(),
            speed: 0.5 + baseline.arousal,
            emotion: baseline,
            baseline,
            drift_rate,
            memory,
            relationships,
            skills,
            needs: spec.needs.clone().unwrap_or_default(),
            learned: LearnedPatterns::default(),
            inbox: Inbox::new(config.communication.inbox_capacity),
            style,
            language,
            lines,
            proto,
            context: Map::new(),
            triggers,
            reactions,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.has(capability)
    }

    /// Language for translation lookups
    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }

    /// Whether `text` names this entity (`@id` or its name as a word)
    pub fn is_named_in(&self, text: &str) -> bool {
        let handle = format!("@{}", self.id.as_str().to_lowercase());
        let name = self.name.to_lowercase();
        crate::linguistics::normalize::tokens(text).any(|t| t == handle || t == name)
    }

    /// JSON view exposed to trigger expressions as `self`
    pub fn view(&self) -> Value {
        json!({
            "id": self.id.as_str(),
            "name": self.name,
            "material": self.material,
            "kind": self.essence.kind,
            "emotion": emotion_value(&self.emotion),
            "position": position_value(&self.position),
            "context": Value::Object(self.context.clone()),
            "needs": {
                "rest": self.needs.rest,
                "social": self.needs.social,
                "novelty": self.needs.novelty,
            },
            "inbox": {
                "count": self.inbox.len(),
                "latest": self.inbox.latest().map(|m| m.body.clone()).unwrap_or(Value::Null),
            },
            "memories": self.memory.len(),
            "relationships": self.relationships.len(),
        })
    }
}
