//! Resource needs that slowly pressure an entity's mood

use serde::{Deserialize, Serialize};

use crate::entity::emotion::sanitize;

/// Needs shared by every entity that declares a `[needs]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Needs {
    /// 0.0 = fully rested, 1.0 = exhausted
    pub rest: f64,
    /// 0.0 = socially satisfied, 1.0 = lonely
    pub social: f64,
    /// 0.0 = stimulated, 1.0 = bored
    pub novelty: f64,
    /// Growth per second for each need
    pub rest_rate: f64,
    pub social_rate: f64,
    pub novelty_rate: f64,
}

impl Default for Needs {
    fn default() -> Self {
        Self {
            rest: 0.2,
            social: 0.3,
            novelty: 0.3,
            rest_rate: 0.001,
            social_rate: 0.0005,
            novelty_rate: 0.0003,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeedType {
    Rest,
    Social,
    Novelty,
}

impl Needs {
    /// Get most pressing need
    pub fn most_pressing(&self) -> (NeedType, f64) {
        [
            (NeedType::Rest, self.rest),
            (NeedType::Social, self.social),
            (NeedType::Novelty, self.novelty),
        ]
        .into_iter()
        .fold((NeedType::Rest, f64::MIN), |best, n| if n.1 > best.1 { n } else { best })
    }

    /// Needs grow over time; arousal tires an entity faster
    pub fn grow(&mut self, dt: f64, arousal: f64) {
        let activity_mult = 0.5 + arousal;
        self.rest = sanitize(self.rest + self.rest_rate * dt * activity_mult, self.rest, 0.0, 1.0);
        self.social = sanitize(self.social + self.social_rate * dt, self.social, 0.0, 1.0);
        self.novelty = sanitize(self.novelty + self.novelty_rate * dt, self.novelty, 0.0, 1.0);
    }

    pub fn satisfy(&mut self, need: NeedType, amount: f64) {
        let slot = match need {
            NeedType::Rest => &mut self.rest,
            NeedType::Social => &mut self.social,
            NeedType::Novelty => &mut self.novelty,
        };
        *slot = sanitize(*slot - amount, *slot, 0.0, 1.0);
    }

    /// Valence pressure in [-1, 0]: how much unmet needs sour the mood
    pub fn valence_pressure(&self) -> f64 {
        let (_, worst) = self.most_pressing();
        if worst > 0.6 {
            -(worst - 0.6) / 0.4
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_grow_and_stay_bounded() {
        let mut needs = Needs::default();
        let initial = needs.rest;
        needs.grow(10.0, 0.5);
        assert!(needs.rest > initial);

        needs.grow(1.0e9, 1.0);
        assert_eq!(needs.rest, 1.0);
        assert_eq!(needs.social, 1.0);
    }

    #[test]
    fn test_satisfy_reduces_need() {
        let mut needs = Needs::default();
        needs.satisfy(NeedType::Social, 0.2);
        assert!((needs.social - 0.1).abs() < 1e-12);
        needs.satisfy(NeedType::Social, 5.0);
        assert_eq!(needs.social, 0.0);
    }

    #[test]
    fn test_pressure_only_when_pressing() {
        let mut needs = Needs::default();
        assert_eq!(needs.valence_pressure(), 0.0);
        needs.social = 1.0;
        assert_eq!(needs.most_pressing().0, NeedType::Social);
        assert!((needs.valence_pressure() + 1.0).abs() < 1e-12);
    }
}
