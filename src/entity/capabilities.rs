//! Capability set: which optional subsystems an entity takes part in
//!
//! Phases and actions ask `has(Capability::X)` instead of probing optional
//! fields. A missing capability is a skip, never a fault.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Emotion,
    Memory,
    Relationships,
    Skills,
    Consolidation,
    Learning,
    Communication,
    Needs,
    Speech,
    Motion,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::Emotion,
        Capability::Memory,
        Capability::Relationships,
        Capability::Skills,
        Capability::Consolidation,
        Capability::Learning,
        Capability::Communication,
        Capability::Needs,
        Capability::Speech,
        Capability::Motion,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Emotion => "emotion",
            Capability::Memory => "memory",
            Capability::Relationships => "relationships",
            Capability::Skills => "skills",
            Capability::Consolidation => "consolidation",
            Capability::Learning => "learning",
            Capability::Communication => "communication",
            Capability::Needs => "needs",
            Capability::Speech => "speech",
            Capability::Motion => "motion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Capabilities that make no sense without another one
    fn requires(self) -> Option<Capability> {
        match self {
            Capability::Consolidation => Some(Capability::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.bit();
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0 && capability.requires().map_or(true, |r| self.has(r))
    }

    pub fn has_all(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.has(*c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(move |c| self.has(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = CapabilitySet::empty();
        for c in iter {
            set.insert(c);
        }
        set
    }
}
