//! World events, the bounded event log and the cascade budget

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{MurmurError, Result};
use crate::core::types::Seconds;

/// Name of the event fired after every context broadcast
pub const CONTEXT_CHANGED: &str = "context.changed";
/// Injects a death into the climate (`payload.intensity`, default 0.5)
pub const ENTITY_DIED: &str = "entity.died";
/// Injects suffering into the climate (`payload.severity`, default 0.5)
pub const ENTITY_SUFFERING: &str = "entity.suffering";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub name: String,
    pub payload: Value,
    pub time: Seconds,
    /// 0 for host-injected events, +1 per cascade step
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<WorldEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, event: WorldEvent) {
        self.events.push_back(event);
        self.trim();
    }

    /// Drop the oldest events beyond capacity; returns how many
    pub fn trim(&mut self) -> usize {
        let excess = self.events.len().saturating_sub(self.capacity);
        self.events.drain(..excess);
        excess
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldEvent> {
        self.events.iter()
    }
}

/// Bounds emit/say recursion set off by one root stimulus
///
/// A window opens at every tick and at every host call. Replies made
/// directly to the stimulus (depth 1) are free; only emissions made in
/// answer to other rule output count toward `max_per_window`.
#[derive(Debug, Clone)]
pub struct CascadeBudget {
    max_depth: u32,
    max_per_window: u32,
    emitted: u32,
}

impl CascadeBudget {
    pub fn new(max_depth: u32, max_per_window: u32) -> Self {
        Self {
            max_depth,
            max_per_window,
            emitted: 0,
        }
    }

    /// Account for one emission produced at `depth`
    pub fn admit(&mut self, depth: u32) -> Result<()> {
        if depth > self.max_depth {
            return Err(MurmurError::CascadeBudgetExceeded {
                depth,
                emitted: self.emitted,
            });
        }
        if depth <= 1 {
            return Ok(());
        }
        if self.emitted >= self.max_per_window {
            return Err(MurmurError::CascadeBudgetExceeded {
                depth,
                emitted: self.emitted,
            });
        }
        self.emitted += 1;
        Ok(())
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    pub fn reset(&mut self) {
        self.emitted = 0;
    }
}
