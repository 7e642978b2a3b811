//! Crystallized vocabulary shared by the whole world
//!
//! Anyone may read the lexicon; only the crystallizer writes it. The
//! mutators are `pub(super)` so nothing outside `linguistics` can.

use std::collections::BTreeMap;

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::types::{EntityId, Seconds};
use crate::entity::emotion::Emotion;
use crate::linguistics::normalize::tokens;

const GREETINGS: &[&str] = &[
    "hello", "hi", "hey", "greetings", "good morning", "good evening", "good night", "howdy",
    "yo", "bye", "goodbye", "farewell",
];

const INTERROGATIVES: &[&str] = &[
    "who", "what", "when", "where", "why", "how", "which", "is", "are", "do", "does", "can",
    "could", "would", "will", "should",
];

/// Related terms kept per entry
pub const MAX_RELATED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Greeting,
    Question,
    Expression,
    Affirmation,
    Concern,
    Statement,
    Coined,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::Greeting => "greeting",
            Category::Question => "question",
            Category::Expression => "expression",
            Category::Affirmation => "affirmation",
            Category::Concern => "concern",
            Category::Statement => "statement",
            Category::Coined => "coined",
        }
    }

    /// Fixed heuristic cascade; the first matching rule wins
    pub fn classify(term: &str, emotion: &Emotion) -> Category {
        let first_word = term.split_whitespace().next().unwrap_or("");
        let first_word = first_word.trim_end_matches(|c: char| !c.is_alphanumeric());
        let starts_with_phrase = |phrases: &[&str]| {
            phrases.iter().any(|p| {
                term == *p || first_word == *p || term.starts_with(&format!("{} ", p))
            })
        };

        if starts_with_phrase(GREETINGS) {
            Category::Greeting
        } else if term.ends_with('?') || INTERROGATIVES.contains(&first_word) {
            Category::Question
        } else if emotion.arousal > 0.7 {
            Category::Expression
        } else if emotion.valence > 0.3 {
            Category::Affirmation
        } else if emotion.valence < -0.3 {
            Category::Concern
        } else {
            Category::Statement
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    /// Normalized phrase, unique key
    pub term: String,
    /// First raw form heard (or the parents of a coined term)
    pub gloss: String,
    /// First speaker; `None` for coined terms
    pub origin_speaker: Option<EntityId>,
    pub category: Category,
    pub usage_count: u32,
    pub first_seen: Seconds,
    pub last_used: Seconds,
    /// Decays with idle time; evicted once negligible
    pub weight: f64,
    pub related_terms: Vec<String>,
    /// Running mean of the speakers' emotions
    pub emotion: Emotion,
    #[serde(default)]
    pub coined: bool,
}

impl LexiconEntry {
    /// Fold one more use into the entry
    pub(super) fn record_use(&mut self, emotion: &Emotion, now: Seconds) {
        self.usage_count = self.usage_count.saturating_add(1);
        let n = self.usage_count as f64;
        self.emotion = self.emotion.clamped(
            self.emotion.valence + (emotion.valence - self.emotion.valence) / n,
            self.emotion.arousal + (emotion.arousal - self.emotion.arousal) / n,
            self.emotion.dominance + (emotion.dominance - self.emotion.dominance) / n,
        );
        self.last_used = self.last_used.max(now);
        self.weight = 1.0;
    }
}

/// Summary returned by `World::lexicon_stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexiconStats {
    pub size: usize,
    pub total_usage: u64,
    pub coined: usize,
    pub mean_weight: f64,
    pub categories: BTreeMap<String, usize>,
    pub most_used: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: AHashMap<String, LexiconEntry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, term: &str) -> Option<&LexiconEntry> {
        self.entries.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LexiconEntry> {
        self.entries.values()
    }

    /// Entries sorted by term, for stable output
    pub fn sorted(&self) -> Vec<&LexiconEntry> {
        let mut entries: Vec<&LexiconEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.term.cmp(&b.term));
        entries
    }

    /// Entries with at least `min_usage`, most used first
    pub fn popular(&self, min_usage: u32) -> Vec<&LexiconEntry> {
        let mut entries: Vec<&LexiconEntry> = self
            .entries
            .values()
            .filter(|e| e.usage_count >= min_usage)
            .collect();
        entries.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.term.cmp(&b.term)));
        entries
    }

    pub fn stats(&self) -> LexiconStats {
        let mut categories = BTreeMap::new();
        for entry in self.entries.values() {
            *categories.entry(entry.category.name().to_string()).or_insert(0) += 1;
        }
        let size = self.entries.len();
        let mean_weight = if size == 0 {
            0.0
        } else {
            self.entries.values().map(|e| e.weight).sum::<f64>() / size as f64
        };
        LexiconStats {
            size,
            total_usage: self.entries.values().map(|e| e.usage_count as u64).sum(),
            coined: self.entries.values().filter(|e| e.coined).count(),
            mean_weight,
            categories,
            most_used: self.popular(0).first().map(|e| e.term.clone()),
        }
    }

    /// Usage distribution entropy normalized to [0, 1]
    pub fn diversity(&self) -> f64 {
        let total: f64 = self.entries.values().map(|e| e.usage_count as f64).sum();
        let n = self.entries.len();
        if n < 2 || total <= 0.0 {
            return 0.0;
        }
        let entropy: f64 = self
            .entries
            .values()
            .map(|e| e.usage_count as f64 / total)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        (entropy / (n as f64).ln()).clamp(0.0, 1.0)
    }

    pub(super) fn get_mut(&mut self, term: &str) -> Option<&mut LexiconEntry> {
        self.entries.get_mut(term)
    }

    /// Insert a new entry; an existing key is never overwritten
    pub(super) fn insert_new(&mut self, entry: LexiconEntry) -> bool {
        if self.entries.contains_key(&entry.term) {
            return false;
        }
        self.entries.insert(entry.term.clone(), entry);
        true
    }

    /// Apply idle decay and evict negligible entries; returns evicted terms
    pub(super) fn decay_and_evict(&mut self, now: Seconds, rate: f64, evict_below: f64) -> Vec<String> {
        for entry in self.entries.values_mut() {
            let idle = (now - entry.last_used).max(0.0);
            let weight = (-rate * idle).exp();
            if weight.is_finite() {
                entry.weight = weight.clamp(0.0, 1.0);
            }
        }
        let mut evicted: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.weight < evict_below)
            .map(|e| e.term.clone())
            .collect();
        evicted.sort();
        for term in &evicted {
            self.entries.remove(term);
        }
        evicted
    }

    /// Recompute related terms: entries sharing at least one token
    pub(super) fn relink(&mut self) {
        let mut by_token: AHashMap<String, Vec<String>> = AHashMap::new();
        for entry in self.entries.values() {
            for token in tokens(&entry.term) {
                by_token.entry(token).or_default().push(entry.term.clone());
            }
        }

        let usage: AHashMap<String, u32> = self
            .entries
            .values()
            .map(|e| (e.term.clone(), e.usage_count))
            .collect();

        for entry in self.entries.values_mut() {
            let mut related: Vec<String> = tokens(&entry.term)
                .filter_map(|t| by_token.get(&t))
                .flatten()
                .filter(|t| **t != entry.term)
                .cloned()
                .collect();
            related.sort();
            related.dedup();
            related.sort_by_key(|t| {
                (
                    std::cmp::Reverse(usage.get(t).copied().unwrap_or(0)),
                    t.clone(),
                )
            });
            related.truncate(MAX_RELATED);
            entry.related_terms = related;
        }
    }

    /// Highest-weight entry, ties broken by term
    pub fn strongest(&self) -> Option<&LexiconEntry> {
        self.entries
            .values()
            .max_by_key(|e| (OrderedFloat(e.weight), std::cmp::Reverse(e.term.clone())))
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }
}
