//! Messages delivered to entities by the communication phase

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{EntityId, Seconds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// World-relayed event, delivered to everyone who listens
    System,
    /// Addressed speech from one entity to another
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: EntityId,
    /// `None` for broadcast messages
    pub recipient: Option<EntityId>,
    pub kind: MessageKind,
    pub body: Value,
    pub sent_at: Seconds,
    pub deliver_at: Seconds,
}

/// Bounded inbox; the oldest message is dropped when full
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbox {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: Message) {
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Drop messages older than `ttl`; returns how many expired
    pub fn expire(&mut self, now: Seconds, ttl: f64) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| now - m.deliver_at <= ttl);
        before - self.messages.len()
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(id: u64, at: Seconds) -> Message {
        Message {
            id,
            sender: EntityId::new("world"),
            recipient: None,
            kind: MessageKind::System,
            body: json!({"n": id}),
            sent_at: at,
            deliver_at: at,
        }
    }

    #[test]
    fn test_bounded_push() {
        let mut inbox = Inbox::new(2);
        for id in 0..3 {
            inbox.push(message(id, 0.0));
        }
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.iter().next().unwrap().id, 1);
        assert_eq!(inbox.latest().unwrap().id, 2);
    }

    #[test]
    fn test_expire() {
        let mut inbox = Inbox::new(8);
        inbox.push(message(0, 0.0));
        inbox.push(message(1, 50.0));
        assert_eq!(inbox.expire(130.0, 120.0), 1);
        assert_eq!(inbox.latest().unwrap().id, 1);
    }
}
