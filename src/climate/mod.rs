//! World-wide emotional climate
//!
//! Four scalars summarize the mood of the whole world. They relax toward a
//! neutral point every mental phase, are nudged by sampling the population,
//! and jump on explicit injections (deaths, suffering). The relational phase
//! consumes a derived influence vector that pulls entities toward the
//! climate's mood.

pub mod world_mind;

use serde::{Deserialize, Serialize};

use crate::core::config::ClimateConfig;
use crate::entity::emotion::{sanitize, Emotion};

pub use world_mind::{detect_groups, Group, MindSample, WorldMind, WorldStats};

/// Neutral point the climate relaxes toward
const NEUTRAL: EmotionalClimate = EmotionalClimate {
    grief: 0.0,
    vitality: 0.5,
    tension: 0.0,
    harmony: 0.5,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionalClimate {
    pub grief: f64,
    pub vitality: f64,
    pub tension: f64,
    pub harmony: f64,
}

impl Default for EmotionalClimate {
    fn default() -> Self {
        NEUTRAL
    }
}

/// Pull applied to every entity during the relational phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateInfluence {
    pub target: Emotion,
    /// Blend weight per second
    pub weight: f64,
}

impl Default for ClimateInfluence {
    fn default() -> Self {
        Self {
            target: Emotion::neutral(),
            weight: 0.0,
        }
    }
}

fn nudge(value: f64, delta: f64) -> f64 {
    sanitize(value + delta, value, 0.0, 1.0)
}

impl EmotionalClimate {
    pub fn neutral() -> Self {
        NEUTRAL
    }

    /// Relax every scalar toward neutral by `exp(-rate * dt)`
    pub fn decay(&mut self, rate: f64, dt: f64) {
        let keep = sanitize((-rate * dt).exp(), 1.0, 0.0, 1.0);
        let relax = |value: f64, neutral: f64| sanitize(neutral + (value - neutral) * keep, value, 0.0, 1.0);
        self.grief = relax(self.grief, NEUTRAL.grief);
        self.vitality = relax(self.vitality, NEUTRAL.vitality);
        self.tension = relax(self.tension, NEUTRAL.tension);
        self.harmony = relax(self.harmony, NEUTRAL.harmony);
    }

    pub fn record_death(&mut self, intensity: f64) {
        let i = sanitize(intensity, 0.0, 0.0, 1.0);
        self.grief = nudge(self.grief, 0.6 * i);
        self.vitality = nudge(self.vitality, -0.2 * i);
        self.harmony = nudge(self.harmony, -0.1 * i);
    }

    pub fn record_suffering(&mut self, severity: f64) {
        let s = sanitize(severity, 0.0, 0.0, 1.0);
        self.tension = nudge(self.tension, 0.4 * s);
        self.grief = nudge(self.grief, 0.1 * s);
    }

    /// Pull vitality, tension and harmony toward what the population shows
    ///
    /// Grief only moves through explicit injections.
    pub fn sample(&mut self, emotions: &[Emotion], fraction: f64) {
        if emotions.is_empty() {
            return;
        }
        let f = sanitize(fraction, 0.0, 0.0, 1.0);
        let mean = Emotion::mean(emotions);

        let vitality = (mean.valence + 1.0) / 2.0 * 0.6 + mean.arousal * 0.4 - 0.2;
        let tension = (mean.arousal - 0.5).max(0.0) * 2.0 * (1.0 - mean.valence) / 2.0;
        let spread = emotions
            .iter()
            .map(|e| (e.valence - mean.valence).abs())
            .sum::<f64>()
            / emotions.len() as f64;
        let harmony = 1.0 - spread;

        let toward = |value: f64, target: f64| {
            let target = sanitize(target, value, 0.0, 1.0);
            sanitize(value + (target - value) * f, value, 0.0, 1.0)
        };
        self.vitality = toward(self.vitality, vitality);
        self.tension = toward(self.tension, tension);
        self.harmony = toward(self.harmony, harmony);
    }

    /// The mood the climate pulls entities toward
    pub fn mood(&self) -> Emotion {
        let vitality = self.vitality - NEUTRAL.vitality;
        let harmony = self.harmony - NEUTRAL.harmony;
        Emotion::new(
            vitality + harmony * 0.5 - self.grief * 0.8 - self.tension * 0.3,
            0.5 + self.tension * 0.4 + vitality * 0.3 - self.grief * 0.2,
            0.5 + harmony * 0.3 - self.grief * 0.2 - self.tension * 0.2,
        )
    }

    /// Influence for this tick; shrinks with population and tension
    pub fn influence(&self, population: usize, config: &ClimateConfig) -> ClimateInfluence {
        let crowd = 1.0 + population as f64 / config.population_scale;
        let damping = 1.0 - sanitize(config.tension_damping, 0.0, 0.0, 1.0) * self.tension;
        let weight = config.influence_weight / crowd * damping;
        ClimateInfluence {
            target: self.mood(),
            weight: sanitize(weight, 0.0, 0.0, f64::MAX),
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.grief, self.vitality, self.tension, self.harmony]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_mood_is_neutral_emotion() {
        let mood = EmotionalClimate::neutral().mood();
        assert!(mood.valence.abs() < 1e-12);
        assert!((mood.arousal - 0.5).abs() < 1e-12);
        assert!((mood.dominance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_death_then_decay_relaxes() {
        let mut climate = EmotionalClimate::neutral();
        climate.record_death(1.0);
        assert!((climate.grief - 0.6).abs() < 1e-12);
        assert!((climate.vitality - 0.3).abs() < 1e-12);

        let mut previous = climate.grief;
        for _ in 0..100 {
            climate.decay(0.02, 1.0);
            assert!(climate.grief <= previous);
            previous = climate.grief;
        }
        assert!(climate.grief < 0.6 * 0.2);
        assert!(climate.vitality > 0.3);
        assert!(climate.is_valid());
    }

    #[test]
    fn test_injections_clamp() {
        let mut climate = EmotionalClimate::neutral();
        for _ in 0..10 {
            climate.record_death(5.0);
            climate.record_suffering(f64::NAN);
            climate.record_suffering(1.0);
        }
        assert_eq!(climate.grief, 1.0);
        assert_eq!(climate.tension, 1.0);
        assert_eq!(climate.vitality, 0.0);
        assert!(climate.is_valid());
    }

    #[test]
    fn test_sampling_leaves_grief_alone() {
        let mut climate = EmotionalClimate::neutral();
        let agitated = [Emotion::new(-0.8, 1.0, 0.2), Emotion::new(0.8, 1.0, 0.2)];
        climate.sample(&agitated, 0.5);
        assert_eq!(climate.grief, 0.0);
        assert!(climate.tension > 0.0);
        assert!(climate.harmony < 0.5);
    }

    #[test]
    fn test_influence_weight_shrinks() {
        let config = ClimateConfig::default();
        let mut climate = EmotionalClimate::neutral();
        let lone = climate.influence(1, &config).weight;
        let crowd = climate.influence(100, &config).weight;
        assert!(crowd < lone);

        climate.record_suffering(1.0);
        climate.record_suffering(1.0);
        let tense = climate.influence(1, &config).weight;
        assert!(tense < lone);
        assert!(tense >= 0.0);
    }
}
