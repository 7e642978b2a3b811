//! World configuration with documented constants
//!
//! All magic numbers are collected here with explanations of their purpose
//! and how they interact with each other. Every section deserializes with
//! defaults, so a TOML file only needs the values it changes.

use serde::{Deserialize, Serialize};

use crate::core::error::{MurmurError, Result};

/// Phase switches for the tick pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseFlags {
    pub physical: bool,
    pub mental: bool,
    pub communication: bool,
    pub relational: bool,
    pub housekeeping: bool,
    pub cognitive: bool,
    pub world_mind: bool,
    pub linguistics: bool,
    pub time_triggers: bool,
}

impl Default for PhaseFlags {
    fn default() -> Self {
        Self {
            physical: true,
            mental: true,
            communication: true,
            relational: true,
            housekeeping: true,
            cognitive: true,
            world_mind: true,
            linguistics: true,
            time_triggers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentalConfig {
    /// Exponential memory fade per second
    ///
    /// At 0.003 a memory loses about 0.3% of its salience each second,
    /// halving in roughly four minutes of world time.
    pub memory_decay_rate: f64,

    /// World seconds between low-salience pruning sweeps
    pub prune_interval: f64,

    /// Memories below this salience are dropped on a sweep
    pub prune_threshold: f64,

    /// Fallback drift toward the emotion baseline (fraction per second)
    ///
    /// Materials may override this per entity.
    pub default_drift_rate: f64,

    /// Emotion influence of unmet needs (per second at need = 1.0)
    pub need_emotion_weight: f64,
}

impl Default for MentalConfig {
    fn default() -> Self {
        Self {
            memory_decay_rate: 0.003,
            prune_interval: 30.0,
            prune_threshold: 0.05,
            default_drift_rate: 0.02,
            need_emotion_weight: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Entities closer than this interact each tick (world units)
    pub interaction_radius: f64,

    /// Emotional contagion rate (fraction of the gap closed per second)
    ///
    /// The per-tick factor is capped at 0.25 so two partners can never
    /// overshoot each other, keeping their difference shrinking.
    pub contagion_rate: f64,

    /// Base salience of interaction memories before distance falloff
    pub interaction_salience: f64,

    /// Minimum world seconds between interaction memories for one pair
    pub interaction_memory_cooldown: f64,

    /// Relationship strength gained per second of proximity
    pub bond_rate: f64,

    /// Base attraction force between partners
    pub attraction: f64,

    /// Partners closer than this are not pulled any closer
    pub min_separation: f64,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            interaction_radius: 10.0,
            contagion_rate: 0.05,
            interaction_salience: 0.2,
            interaction_memory_cooldown: 5.0,
            bond_rate: 0.01,
            attraction: 0.05,
            min_separation: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    /// Delay before a queued message lands in an inbox (seconds)
    pub delivery_delay: f64,
    /// Inbox messages older than this expire (seconds)
    pub message_ttl: f64,
    /// Maximum messages held per inbox (oldest dropped)
    pub inbox_capacity: usize,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            delivery_delay: 0.0,
            message_ttl: 120.0,
            inbox_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitiveConfig {
    /// Idle seconds before a skill starts to rust
    pub skill_rust_after: f64,
    /// Skill loss per idle second past the threshold
    pub skill_rust_rate: f64,
    /// Skills never rust below this level
    pub skill_floor: f64,
    /// Ticks between consolidation cycles
    pub consolidation_every: u64,
    /// Combined salience a near-duplicate group needs to consolidate
    pub consolidation_threshold: f64,
    /// Token overlap (Jaccard) at which two memories count as duplicates
    pub duplicate_similarity: f64,
    /// Maximum raw memories replaced per cycle
    pub max_replacements: usize,
    /// Learned patterns not reinforced for this long are forgotten
    pub pattern_stale_after: f64,
}

impl Default for CognitiveConfig {
    fn default() -> Self {
        Self {
            skill_rust_after: 600.0,
            skill_rust_rate: 0.0001,
            skill_floor: 0.1,
            consolidation_every: 10,
            consolidation_threshold: 0.6,
            duplicate_similarity: 0.6,
            max_replacements: 3,
            pattern_stale_after: 900.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Relaxation rate toward neutral (per second)
    pub decay_rate: f64,
    /// How strongly per-tick entity sampling pulls vitality/tension/harmony
    pub sampling_rate: f64,
    /// Climate influence weight for a lone entity (per second)
    pub influence_weight: f64,
    /// Population at which the influence weight halves
    pub population_scale: f64,
    /// Fraction of the weight removed at full tension
    pub tension_damping: f64,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.02,
            sampling_rate: 0.05,
            influence_weight: 0.02,
            population_scale: 10.0,
            tension_damping: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldMindConfig {
    /// Ticks between aggregate recomputations (tick-count gated)
    pub every_ticks: u64,
    /// Distance within which positively bonded entities form a group
    pub group_radius: f64,
    /// Relationship strength needed to link two entities into a group
    pub group_bond: f64,
}

impl Default for WorldMindConfig {
    fn default() -> Self {
        Self {
            every_ticks: 10,
            group_radius: 15.0,
            group_bond: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrystallizerConfig {
    /// Analyze every N ticks
    pub analyze_every: u64,
    /// Occurrences before a phrase crystallizes
    pub min_usage: u32,
    /// Distinct speakers before a phrase crystallizes
    pub min_speakers: usize,
    /// Passes during which `warmup_min_usage` applies instead
    pub warmup_passes: u32,
    pub warmup_min_usage: u32,
    /// Phrases longer than this are not tracked
    pub max_phrase_words: usize,
    /// Entry weight decay per idle second
    pub decay_rate: f64,
    /// Entries below this weight are evicted
    pub evict_below: f64,
    /// Candidate tallies idle longer than this are dropped (seconds)
    pub candidate_ttl: f64,
    /// Hard cap on tracked candidates
    pub max_candidates: usize,
    /// Chance per pass of coining a synthetic term
    pub coin_chance: f64,
    /// Minimum entry weight for coining parents
    pub coin_min_weight: f64,
}

impl Default for CrystallizerConfig {
    fn default() -> Self {
        Self {
            analyze_every: 1,
            min_usage: 3,
            min_speakers: 2,
            warmup_passes: 0,
            warmup_min_usage: 2,
            max_phrase_words: 6,
            decay_rate: 0.001,
            evict_below: 0.05,
            candidate_ttl: 3600.0,
            max_candidates: 4096,
            coin_chance: 0.05,
            coin_min_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Maximum nesting of emit/say cascades inside one firing chain
    pub max_cascade_depth: u32,
    /// Maximum cascaded emissions (events and utterances) per budget window.
    /// A window opens at each tick and each host call; direct replies to
    /// the stimulus are not counted.
    pub max_emissions_per_tick: u32,
    /// Queued context broadcasts drained per outer broadcast
    pub max_context_drain: usize,
    /// Bounded world event log length
    pub event_log_capacity: usize,
    /// Periodic firings caught up per rule per tick. Firings beyond the cap
    /// are skipped with a warning, so a single step longer than
    /// `max_catch_up * interval` fires fewer than `elapsed / interval` times.
    pub max_catch_up: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 8,
            max_emissions_per_tick: 256,
            max_context_drain: 64,
            event_log_capacity: 256,
            max_catch_up: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveTimeConfig {
    pub enabled: bool,
    /// Dilation strength, clamped to [0, 1]
    pub k: f64,
    pub arousal_weight: f64,
    pub valence_weight: f64,
}

impl Default for AdaptiveTimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            k: 0.5,
            arousal_weight: 0.6,
            valence_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Half-life of the emergence smoother in world seconds
    pub half_life: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { half_life: 60.0 }
    }
}

/// Configuration for one world
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Seed for the world RNG (coining, proto-language fallback)
    pub seed: u64,
    /// Transcript ring capacity
    pub transcript_capacity: usize,
    pub phases: PhaseFlags,
    pub mental: MentalConfig,
    pub relational: RelationalConfig,
    pub communication: CommunicationConfig,
    pub cognitive: CognitiveConfig,
    pub climate: ClimateConfig,
    pub world_mind: WorldMindConfig,
    pub crystallizer: CrystallizerConfig,
    pub triggers: TriggerConfig,
    pub adaptive_time: AdaptiveTimeConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            transcript_capacity: 512,
            phases: PhaseFlags::default(),
            mental: MentalConfig::default(),
            relational: RelationalConfig::default(),
            communication: CommunicationConfig::default(),
            cognitive: CognitiveConfig::default(),
            climate: ClimateConfig::default(),
            world_mind: WorldMindConfig::default(),
            crystallizer: CrystallizerConfig::default(),
            triggers: TriggerConfig::default(),
            adaptive_time: AdaptiveTimeConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl WorldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: WorldConfig =
            toml::from_str(content).map_err(|e| MurmurError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.transcript_capacity == 0 {
            return Err(MurmurError::InvalidConfig(
                "transcript_capacity must be at least 1".into(),
            ));
        }

        let rates = [
            ("mental.memory_decay_rate", self.mental.memory_decay_rate),
            ("mental.default_drift_rate", self.mental.default_drift_rate),
            ("relational.contagion_rate", self.relational.contagion_rate),
            ("relational.interaction_radius", self.relational.interaction_radius),
            ("climate.decay_rate", self.climate.decay_rate),
            ("climate.influence_weight", self.climate.influence_weight),
            ("crystallizer.decay_rate", self.crystallizer.decay_rate),
            ("telemetry.half_life", self.telemetry.half_life),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(MurmurError::InvalidConfig(format!(
                    "{} must be a finite non-negative number (got {})",
                    name, value
                )));
            }
        }

        if self.telemetry.half_life <= 0.0 {
            return Err(MurmurError::InvalidConfig(
                "telemetry.half_life must be positive".into(),
            ));
        }

        if self.climate.population_scale <= 0.0 {
            return Err(MurmurError::InvalidConfig(
                "climate.population_scale must be positive".into(),
            ));
        }

        if self.crystallizer.min_usage == 0 || self.crystallizer.min_speakers == 0 {
            return Err(MurmurError::InvalidConfig(
                "crystallizer thresholds must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.crystallizer.coin_chance) {
            return Err(MurmurError::InvalidConfig(format!(
                "crystallizer.coin_chance ({}) must be within [0, 1]",
                self.crystallizer.coin_chance
            )));
        }

        if self.world_mind.every_ticks == 0 || self.crystallizer.analyze_every == 0 {
            return Err(MurmurError::InvalidConfig(
                "cadences must be at least one tick".into(),
            ));
        }

        Ok(())
    }
}
