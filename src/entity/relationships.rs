//! Relationship table: how one entity feels about the others it has met

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{EntityId, Seconds};
use crate::entity::emotion::sanitize;

/// How an entity regards another, derived from the stored numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Hostile,
    Wary,
    Neutral,
    Friendly,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// 0.0 = stranger, 1.0 = inseparable
    pub strength: f64,
    /// -1.0 = loathing, 1.0 = affection
    pub valence: f64,
    pub last_interaction: Seconds,
    /// Total interactions ever recorded
    pub interactions: u32,
}

impl Relationship {
    pub fn new(now: Seconds) -> Self {
        Self {
            strength: 0.0,
            valence: 0.0,
            last_interaction: now,
            interactions: 0,
        }
    }

    pub fn set_strength(&mut self, value: f64) {
        self.strength = sanitize(value, self.strength, 0.0, 1.0);
    }

    pub fn adjust_strength(&mut self, delta: f64) {
        self.set_strength(self.strength + delta);
    }

    pub fn adjust_valence(&mut self, delta: f64) {
        self.valence = sanitize(self.valence + delta, self.valence, -1.0, 1.0);
    }

    pub fn touch(&mut self, now: Seconds) {
        self.last_interaction = now;
        self.interactions = self.interactions.saturating_add(1);
    }

    pub fn disposition(&self) -> Disposition {
        let net = self.valence * (0.5 + self.strength * 0.5);
        match net {
            n if n > 0.5 => Disposition::Close,
            n if n > 0.1 => Disposition::Friendly,
            n if n < -0.5 => Disposition::Hostile,
            n if n < -0.1 => Disposition::Wary,
            _ => Disposition::Neutral,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipTable {
    entries: AHashMap<EntityId, Relationship>,
}

impl RelationshipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Relationship> {
        self.entries.get(id)
    }

    /// Fetch or lazily create the record for `id`
    pub fn entry(&mut self, id: &EntityId, now: Seconds) -> &mut Relationship {
        self.entries
            .entry(id.clone())
            .or_insert_with(|| Relationship::new(now))
    }

    pub fn strength(&self, id: &EntityId) -> f64 {
        self.entries.get(id).map(|r| r.strength).unwrap_or(0.0)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Relationship> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Relationship)> {
        self.entries.iter()
    }

    pub fn mean_strength(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.values().map(|r| r.strength).sum::<f64>() / self.entries.len() as f64
    }
}
