//! Salience-weighted memory buffer
//!
//! Memories fade exponentially with world time and are pruned once they
//! drop below a floor. A full buffer evicts its weakest memory, but only
//! for a stronger newcomer.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::types::Seconds;
use crate::entity::emotion::sanitize;
use crate::linguistics::normalize::tokens;

/// A single remembered thing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// World time the memory was formed
    pub timestamp: Seconds,
    /// What kind of memory this is (e.g. "interaction", "utterance")
    pub kind: String,
    /// Who or what it is about
    pub subject: String,
    pub content: String,
    /// Current importance, decays over time (0.0 to 1.0)
    pub salience: f64,
    /// Merged from near-duplicates during consolidation
    #[serde(default)]
    pub consolidated: bool,
}

impl Memory {
    pub fn new(
        timestamp: Seconds,
        kind: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
        salience: f64,
    ) -> Self {
        Self {
            timestamp,
            kind: kind.into(),
            subject: subject.into(),
            content: content.into(),
            salience: sanitize(salience, 0.0, 0.0, 1.0),
            consolidated: false,
        }
    }

    /// Exponential fade: `salience *= exp(-rate * dt)`
    pub fn decay(&mut self, rate: f64, dt: f64) {
        let faded = self.salience * (-rate * dt).exp();
        self.salience = sanitize(faded, self.salience, 0.0, 1.0);
    }

    /// Token overlap with another memory of the same kind and subject
    pub fn similarity(&self, other: &Memory) -> f64 {
        if self.kind != other.kind || self.subject != other.subject {
            return 0.0;
        }
        let a: ahash::AHashSet<String> = tokens(&self.content).collect();
        let b: ahash::AHashSet<String> = tokens(&other.content).collect();
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let shared = a.intersection(&b).count() as f64;
        let union = a.union(&b).count() as f64;
        if union == 0.0 {
            0.0
        } else {
            shared / union
        }
    }
}

/// Filter for recall queries
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub kind: Option<String>,
    pub subject: Option<String>,
    /// Only memories newer than `now - within`
    pub within: Option<Seconds>,
    pub limit: Option<usize>,
}

/// Bounded buffer of memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBuffer {
    memories: Vec<Memory>,
    capacity: usize,
    /// World time of the last low-salience sweep
    #[serde(default)]
    last_prune: Seconds,
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MemoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            memories: Vec::new(),
            capacity: capacity.max(1),
            last_prune: 0.0,
        }
    }

    /// Add a memory, evicting the weakest if full and the newcomer is stronger
    pub fn add(&mut self, memory: Memory) {
        if self.memories.len() >= self.capacity {
            if let Some(pos) = self.weakest_index() {
                if self.memories[pos].salience < memory.salience {
                    self.memories.remove(pos);
                } else {
                    return;
                }
            }
        }
        self.memories.push(memory);
    }

    fn weakest_index(&self) -> Option<usize> {
        self.memories
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| OrderedFloat(m.salience))
            .map(|(i, _)| i)
    }

    pub fn decay_all(&mut self, rate: f64, dt: f64) {
        for memory in &mut self.memories {
            memory.decay(rate, dt);
        }
    }

    /// Drop faded memories if a sweep is due; returns how many were removed
    pub fn prune_if_due(&mut self, now: Seconds, interval: Seconds, threshold: f64) -> usize {
        if now - self.last_prune < interval {
            return 0;
        }
        self.last_prune = now;
        let before = self.memories.len();
        self.memories.retain(|m| m.salience >= threshold);
        before - self.memories.len()
    }

    /// Newest-first query
    pub fn recall(&self, query: &MemoryQuery, now: Seconds) -> Vec<&Memory> {
        let mut found: Vec<&Memory> = self
            .memories
            .iter()
            .filter(|m| query.kind.as_deref().map_or(true, |k| m.kind == k))
            .filter(|m| query.subject.as_deref().map_or(true, |s| m.subject == s))
            .filter(|m| query.within.map_or(true, |w| m.timestamp >= now - w))
            .collect();
        found.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        found
    }

    /// Most recent memory about a subject of a given kind
    pub fn latest_about(&self, kind: &str, subject: &str) -> Option<&Memory> {
        self.memories
            .iter()
            .filter(|m| m.kind == kind && m.subject == subject)
            .max_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
    }

    pub fn count_about(&self, subject: &str) -> usize {
        self.memories.iter().filter(|m| m.subject == subject).count()
    }

    /// Merge near-duplicate raw memories
    ///
    /// Groups of raw memories whose combined salience reaches `threshold`
    /// collapse into one consolidated memory. The strongest groups go first
    /// and at most `max_replacements` raw memories are replaced per call.
    /// Returns the number of raw memories replaced.
    pub fn consolidate(&mut self, similarity: f64, threshold: f64, max_replacements: usize) -> usize {
        let raw: Vec<usize> = (0..self.memories.len())
            .filter(|&i| !self.memories[i].consolidated)
            .collect();

        let mut assigned = vec![false; self.memories.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (pos, &i) in raw.iter().enumerate() {
            if assigned[i] {
                continue;
            }
            let mut group = vec![i];
            for &j in &raw[pos + 1..] {
                if !assigned[j] && self.memories[i].similarity(&self.memories[j]) >= similarity {
                    group.push(j);
                }
            }
            if group.len() > 1 {
                let strength: f64 = group.iter().map(|&k| self.memories[k].salience).sum();
                if strength >= threshold {
                    for &k in &group {
                        assigned[k] = true;
                    }
                    groups.push(group);
                }
            }
        }

        groups.sort_by_key(|g| {
            std::cmp::Reverse(OrderedFloat(
                g.iter().map(|&k| self.memories[k].salience).sum::<f64>(),
            ))
        });

        let mut replaced = 0;
        let mut remove: Vec<usize> = Vec::new();
        let mut merged: Vec<Memory> = Vec::new();
        for mut group in groups {
            if replaced + group.len() > max_replacements {
                // Replace only the weakest members that still fit this cycle
                let room = max_replacements.saturating_sub(replaced);
                if room < 2 {
                    break;
                }
                group.sort_by_key(|&k| OrderedFloat(self.memories[k].salience));
                group.truncate(room);
            }

            let strongest = group
                .iter()
                .copied()
                .max_by_key(|&k| OrderedFloat(self.memories[k].salience))
                .unwrap_or(group[0]);
            let extra: f64 = group
                .iter()
                .filter(|&&k| k != strongest)
                .map(|&k| self.memories[k].salience)
                .sum();
            let newest = group
                .iter()
                .map(|&k| self.memories[k].timestamp)
                .fold(f64::MIN, f64::max);

            let source = &self.memories[strongest];
            let mut memory = Memory::new(
                newest,
                source.kind.clone(),
                source.subject.clone(),
                source.content.clone(),
                source.salience + extra * 0.5,
            );
            memory.consolidated = true;

            replaced += group.len();
            remove.extend(group);
            merged.push(memory);
        }

        remove.sort_unstable();
        for idx in remove.into_iter().rev() {
            self.memories.remove(idx);
        }
        self.memories.extend(merged);
        replaced
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Memory> {
        self.memories.iter()
    }

    /// Replace contents wholesale (snapshot restore)
    pub fn replace_all(&mut self, memories: Vec<Memory>) {
        self.memories = memories;
    }
}
