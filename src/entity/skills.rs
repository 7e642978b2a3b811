//! Skills and learned patterns
//!
//! Skills rust when idle; learned patterns (phrases an entity has heard)
//! are forgotten once they go stale.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::Seconds;
use crate::entity::emotion::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// 0.0 = untrained, 1.0 = mastered
    pub level: f64,
    pub last_used: Seconds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillSet {
    skills: AHashMap<String, Skill>,
}

impl SkillSet {
    pub fn from_levels(levels: &AHashMap<String, f64>, now: Seconds) -> Self {
        let skills = levels
            .iter()
            .map(|(name, level)| {
                (
                    name.clone(),
                    Skill {
                        level: sanitize(*level, 0.0, 0.0, 1.0),
                        last_used: now,
                    },
                )
            })
            .collect();
        Self { skills }
    }

    pub fn level(&self, name: &str) -> f64 {
        self.skills.get(name).map(|s| s.level).unwrap_or(0.0)
    }

    /// Practice raises the level with diminishing returns
    pub fn practice(&mut self, name: &str, amount: f64, now: Seconds) {
        let skill = self.skills.entry(name.to_string()).or_insert(Skill {
            level: 0.0,
            last_used: now,
        });
        let gain = amount * (1.0 - skill.level);
        skill.level = sanitize(skill.level + gain, skill.level, 0.0, 1.0);
        skill.last_used = now;
    }

    /// Rust skills idle past `rust_after`, never below `floor`
    pub fn apply_rust(&mut self, now: Seconds, dt: f64, rust_after: f64, rate: f64, floor: f64) {
        for skill in self.skills.values_mut() {
            if now - skill.last_used > rust_after && skill.level > floor {
                let rusted = (skill.level - rate * dt).max(floor);
                skill.level = sanitize(rusted, skill.level, 0.0, 1.0);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Skill)> {
        self.skills.iter()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn replace_all(&mut self, skills: AHashMap<String, Skill>) {
        self.skills = skills;
    }
}

/// A phrase picked up from conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub heard: u32,
    pub last_reinforced: Seconds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnedPatterns {
    patterns: AHashMap<String, LearnedPattern>,
}

impl LearnedPatterns {
    pub fn reinforce(&mut self, phrase: &str, now: Seconds) {
        let pattern = self
            .patterns
            .entry(phrase.to_string())
            .or_insert(LearnedPattern {
                heard: 0,
                last_reinforced: now,
            });
        pattern.heard = pattern.heard.saturating_add(1);
        pattern.last_reinforced = now;
    }

    /// Forget patterns not reinforced within `stale_after`; returns how many
    pub fn forget_stale(&mut self, now: Seconds, stale_after: f64) -> usize {
        let before = self.patterns.len();
        self.patterns
            .retain(|_, p| now - p.last_reinforced <= stale_after);
        before - self.patterns.len()
    }

    pub fn knows(&self, phrase: &str) -> bool {
        self.patterns.contains_key(phrase)
    }

    pub fn get(&self, phrase: &str) -> Option<&LearnedPattern> {
        self.patterns.get(phrase)
    }

    /// Patterns sorted by phrase
    pub fn sorted(&self) -> Vec<(&String, &LearnedPattern)> {
        let mut all: Vec<_> = self.patterns.iter().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_practice_has_diminishing_returns() {
        let mut skills = SkillSet::default();
        skills.practice("singing", 0.5, 0.0);
        assert!((skills.level("singing") - 0.5).abs() < 1e-12);
        skills.practice("singing", 0.5, 1.0);
        assert!((skills.level("singing") - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_rust_only_after_threshold() {
        let mut levels = AHashMap::new();
        levels.insert("singing".to_string(), 0.8);
        let mut skills = SkillSet::from_levels(&levels, 0.0);

        skills.apply_rust(100.0, 1.0, 600.0, 0.01, 0.1);
        assert!((skills.level("singing") - 0.8).abs() < 1e-12);

        skills.apply_rust(700.0, 10.0, 600.0, 0.01, 0.1);
        assert!((skills.level("singing") - 0.7).abs() < 1e-9);

        skills.apply_rust(800.0, 1.0e6, 600.0, 0.01, 0.1);
        assert!((skills.level("singing") - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_stale_patterns_forgotten() {
        let mut learned = LearnedPatterns::default();
        learned.reinforce("hello", 0.0);
        learned.reinforce("good night", 50.0);
        assert_eq!(learned.forget_stale(120.0, 100.0), 1);
        assert!(!learned.knows("hello"));
        assert!(learned.knows("good night"));
    }
}
