//! Material specs: declarative documents an entity is spawned from
//!
//! A material names the entity's essence, emotion baseline, dialogue and
//! behavior rules. Optional sections switch on the matching capability;
//! `[features]` can force a capability on or off explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{MurmurError, Result};
use crate::entity::capabilities::{Capability, CapabilitySet};
use crate::entity::needs::Needs;
use crate::linguistics::proto_language::{GenerateOptions, MAX_WORDS};
use crate::triggers::actions::RuleDecl;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Essence {
    pub kind: String,
    pub description: String,
    /// Takes part in the physical phase
    pub mobile: bool,
}

impl Default for Essence {
    fn default() -> Self {
        Self {
            kind: "being".to_string(),
            description: String::new(),
            mobile: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionDecl {
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
    /// Overrides the world's default drift toward this baseline
    pub drift_rate: Option<f64>,
}

impl Default for EmotionDecl {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.5,
            dominance: 0.5,
            drift_rate: None,
        }
    }
}

/// How an entity's utterances are dressed before they are recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtteranceStyle {
    pub prefix: String,
    pub suffix: String,
    pub lowercase: bool,
    pub max_chars: Option<usize>,
}

impl UtteranceStyle {
    pub fn format(&self, text: &str) -> String {
        let mut body = text.trim().to_string();
        if self.lowercase {
            body = body.to_lowercase();
        }
        if let Some(max) = self.max_chars {
            if body.chars().count() > max {
                body = body.chars().take(max).collect::<String>().trim_end().to_string();
            }
        }
        if body.is_empty() {
            return body;
        }
        format!("{}{}{}", self.prefix, body, self.suffix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueDecl {
    /// Language used for `{t:key}` lookups
    pub language: Option<String>,
    #[serde(flatten)]
    pub style: UtteranceStyle,
    /// Scripted lines by category, used by `{line:category}`
    pub lines: BTreeMap<String, Vec<String>>,
    pub proto: GenerateOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDecl {
    pub capacity: usize,
}

impl Default for MemoryDecl {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipsDecl {
    /// Starting strength toward known entities
    pub initial: BTreeMap<String, f64>,
}

/// Emotion nudge applied when a broadcast context matches `when`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDecl {
    pub when: String,
    #[serde(default)]
    pub valence: f64,
    #[serde(default)]
    pub arousal: f64,
    #[serde(default)]
    pub dominance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSpec {
    pub name: String,
    /// Fixed id; a fresh one is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub essence: Essence,
    #[serde(default)]
    pub emotion: Option<EmotionDecl>,
    #[serde(default)]
    pub dialogue: Option<DialogueDecl>,
    #[serde(default)]
    pub memory: Option<MemoryDecl>,
    #[serde(default)]
    pub relationships: Option<RelationshipsDecl>,
    #[serde(default)]
    pub skills: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub needs: Option<Needs>,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    #[serde(default)]
    pub triggers: Vec<RuleDecl>,
    #[serde(default)]
    pub reactions: Vec<ReactionDecl>,
}

impl MaterialSpec {
    /// Bare material with no optional sections
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            essence: Essence::default(),
            emotion: None,
            dialogue: None,
            memory: None,
            relationships: None,
            skills: None,
            needs: None,
            features: BTreeMap::new(),
            triggers: Vec::new(),
            reactions: Vec::new(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let spec: MaterialSpec = toml::from_str(content)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let spec: MaterialSpec = serde_json::from_str(content)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a `.toml` or `.json` material file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> MurmurError {
        MurmurError::InvalidMaterial {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name must not be empty"));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() || id.chars().any(char::is_whitespace) {
                return Err(self.invalid(format!("id '{}' must be non-empty without spaces", id)));
            }
        }
        if let Some(emotion) = &self.emotion {
            let values = [emotion.valence, emotion.arousal, emotion.dominance];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(self.invalid("emotion values must be finite"));
            }
            if let Some(rate) = emotion.drift_rate {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(self.invalid("drift_rate must be finite and non-negative"));
                }
            }
        }
        if let Some(memory) = &self.memory {
            if memory.capacity == 0 {
                return Err(self.invalid("memory capacity must be at least 1"));
            }
        }
        for name in self.features.keys() {
            if Capability::from_name(name).is_none() {
                return Err(self.invalid(format!("unknown feature '{}'", name)));
            }
        }
        if let Some(dialogue) = &self.dialogue {
            let (min, max) = (dialogue.proto.min_words, dialogue.proto.max_words);
            if min < 1 || min > max || max > MAX_WORDS {
                return Err(self.invalid(format!(
                    "proto word bounds must satisfy 1 <= min_words ({}) <= max_words ({}) <= {}",
                    min, max, MAX_WORDS
                )));
            }
        }
        if let Some(skills) = &self.skills {
            if skills.values().any(|v| !v.is_finite()) {
                return Err(self.invalid("skill levels must be finite"));
            }
        }
        Ok(())
    }

    /// Capabilities implied by the sections present, then `[features]`
    pub fn capabilities(&self) -> CapabilitySet {
        let mut set = CapabilitySet::empty();
        let implied = [
            (self.emotion.is_some(), Capability::Emotion),
            (self.memory.is_some(), Capability::Memory),
            (self.relationships.is_some(), Capability::Relationships),
            (self.skills.is_some(), Capability::Skills),
            (self.needs.is_some(), Capability::Needs),
            (self.dialogue.is_some(), Capability::Speech),
            (self.essence.mobile, Capability::Motion),
        ];
        for (present, capability) in implied {
            if present {
                set.insert(capability);
            }
        }
        for (name, enabled) in &self.features {
            if let Some(capability) = Capability::from_name(name) {
                if *enabled {
                    set.insert(capability);
                } else {
                    set.remove(capability);
                }
            }
        }
        set
    }
}

/// Load every `.toml` / `.json` material in a directory, sorted by file name
pub fn load_materials_dir(dir: &Path) -> Result<Vec<MaterialSpec>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("toml") | Some("json")))
        .collect();
    paths.sort();
    paths.iter().map(|p| MaterialSpec::load(p)).collect()
}
