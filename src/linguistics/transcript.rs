//! Bounded rolling log of utterances
//!
//! Append-only: utterances are never edited once recorded. When the ring is
//! full the oldest utterance is evicted first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::types::{EntityId, Seconds, UtteranceId};
use crate::entity::emotion::Emotion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: UtteranceId,
    pub speaker_id: EntityId,
    pub text: String,
    pub listener_id: Option<EntityId>,
    pub timestamp: Seconds,
    /// Speaker's emotion when the utterance was recorded
    pub emotion: Emotion,
    pub mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    utterances: VecDeque<Utterance>,
    capacity: usize,
    evicted: u64,
}

impl Transcript {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            utterances: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, utterance: Utterance) {
        if self.utterances.len() >= self.capacity {
            self.utterances.pop_front();
            self.evicted += 1;
        }
        self.utterances.push_back(utterance);
    }

    /// Utterances recorded after `cursor`, oldest first
    pub fn since(&self, cursor: UtteranceId) -> impl Iterator<Item = &Utterance> {
        // Ids are monotonic, so everything after the first match qualifies
        let start = self.utterances.partition_point(|u| u.id <= cursor);
        self.utterances.range(start..)
    }

    /// Up to `n` most recent utterances, oldest first
    pub fn recent(&self, n: usize) -> Vec<&Utterance> {
        let skip = self.utterances.len().saturating_sub(n);
        self.utterances.iter().skip(skip).collect()
    }

    pub fn last(&self) -> Option<&Utterance> {
        self.utterances.back()
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total utterances evicted since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances.iter()
    }
}
