//! Aggregate view of the whole population
//!
//! Recomputed on a tick-count cadence so results do not depend on frame
//! timing. Groups are proximity clusters of entities with positive bonds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::climate::EmotionalClimate;
use crate::core::types::{EntityId, Seconds, Tick, Vec2};
use crate::entity::emotion::Emotion;
use crate::entity::relationships::RelationshipTable;

/// What the world mind needs to know about one entity
pub struct MindSample<'a> {
    pub id: &'a EntityId,
    pub position: Vec2,
    pub emotion: Emotion,
    pub relationships: &'a RelationshipTable,
    pub memories: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Sorted member ids
    pub members: Vec<EntityId>,
    pub centroid: Vec2,
    /// Mean mutual bond strength over linked pairs
    pub cohesion: f64,
    pub mood: Emotion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldStats {
    pub tick: Tick,
    pub time: Seconds,
    pub population: usize,
    pub collective: Emotion,
    pub mean_bond: f64,
    pub total_memories: usize,
    pub groups: Vec<Group>,
    pub climate: EmotionalClimate,
    pub lexicon_size: usize,
    pub utterances: usize,
}

/// Cadence state plus the cached results
#[derive(Debug, Clone, Default)]
pub struct WorldMind {
    ticks_since: u64,
    collective: Emotion,
    latest: Option<WorldStats>,
}

impl WorldMind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one tick; true when a recompute is due
    pub fn due(&mut self, every: u64) -> bool {
        self.ticks_since += 1;
        if self.ticks_since >= every.max(1) {
            self.ticks_since = 0;
            true
        } else {
            false
        }
    }

    pub fn collective(&self) -> Emotion {
        self.collective
    }

    pub fn latest(&self) -> Option<&WorldStats> {
        self.latest.as_ref()
    }

    pub fn update(&mut self, stats: WorldStats) {
        self.collective = stats.collective;
        self.latest = Some(stats);
    }

    /// Used on restore, before any stats have been recomputed
    pub fn set_collective(&mut self, collective: Emotion) {
        self.collective = collective;
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn mutual_bond(a: &MindSample, b: &MindSample) -> f64 {
    (a.relationships.strength(b.id) + b.relationships.strength(a.id)) / 2.0
}

/// Union entities within `radius` whose mutual bond reaches `min_bond`
///
/// Only clusters of two or more are reported, largest first.
pub fn detect_groups(samples: &[MindSample], radius: f64, min_bond: f64) -> Vec<Group> {
    let n = samples.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut links = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            if samples[i].position.distance(&samples[j].position) > radius {
                continue;
            }
            let bond = mutual_bond(&samples[i], &samples[j]);
            if bond >= min_bond && bond > 0.0 {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
                links.push((i, j, bond));
            }
        }
    }

    let roots: Vec<usize> = (0..n).map(|i| find(&mut parent, i)).collect();
    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, root) in roots.iter().enumerate() {
        clusters.entry(*root).or_default().push(i);
    }

    let mut groups: Vec<Group> = clusters
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(root, members)| {
            let bonds: Vec<f64> = links
                .iter()
                .filter(|(i, _, _)| roots[*i] == root)
                .map(|(_, _, b)| *b)
                .collect();
            let count = members.len() as f64;
            let sum = members
                .iter()
                .fold(Vec2::default(), |acc, &i| acc + samples[i].position);
            let mut ids: Vec<EntityId> = members.iter().map(|&i| samples[i].id.clone()).collect();
            ids.sort();
            Group {
                members: ids,
                centroid: sum * (1.0 / count),
                cohesion: if bonds.is_empty() {
                    0.0
                } else {
                    bonds.iter().sum::<f64>() / bonds.len() as f64
                },
                mood: Emotion::mean(members.iter().map(|&i| &samples[i].emotion)),
            }
        })
        .collect();

    groups.sort_by(|a, b| b.members.len().cmp(&a.members.len()).then_with(|| a.members.cmp(&b.members)));
    groups
}
