//! Observer registry for tick, context, event, analytics and utterance updates
//!
//! Handlers only see the notification, never the world, so they cannot
//! re-enter a tick.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::climate::WorldStats;
use crate::core::error::MurmurError;
use crate::linguistics::Utterance;
use crate::simulation::events::WorldEvent;
use crate::simulation::tick::TickReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Tick,
    Context,
    Event,
    Analytics,
    Utterance,
}

impl FromStr for NotificationKind {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tick" => Ok(NotificationKind::Tick),
            "context" => Ok(NotificationKind::Context),
            "event" => Ok(NotificationKind::Event),
            "analytics" => Ok(NotificationKind::Analytics),
            "utterance" | "speech" => Ok(NotificationKind::Utterance),
            _ => Err(MurmurError::UnknownNotification(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Notification {
    Tick(TickReport),
    /// Values merged by one context broadcast
    Context(Map<String, Value>),
    Event(WorldEvent),
    Analytics(WorldStats),
    Utterance(Utterance),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Tick(_) => NotificationKind::Tick,
            Notification::Context(_) => NotificationKind::Context,
            Notification::Event(_) => NotificationKind::Event,
            Notification::Analytics(_) => NotificationKind::Analytics,
            Notification::Utterance(_) => NotificationKind::Utterance,
        }
    }
}

pub type ListenerId = u64;

pub type Handler = Box<dyn FnMut(&Notification)>;

struct Listener {
    id: ListenerId,
    kind: NotificationKind,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
    next_id: ListenerId,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, kind: NotificationKind, once: bool, handler: Handler) -> ListenerId {
        self.next_id += 1;
        self.listeners.push(Listener {
            id: self.next_id,
            kind,
            once,
            handler,
        });
        self.next_id
    }

    pub fn on(&mut self, kind: NotificationKind, handler: Handler) -> ListenerId {
        self.add(kind, false, handler)
    }

    /// Listener removed after its first notification
    pub fn once(&mut self, kind: NotificationKind, handler: Handler) -> ListenerId {
        self.add(kind, true, handler)
    }

    /// Returns false when the id was not registered
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, notification: &Notification) {
        let kind = notification.kind();
        let mut fired_once = false;
        for listener in self.listeners.iter_mut().filter(|l| l.kind == kind) {
            (listener.handler)(notification);
            fired_once |= listener.once;
        }
        if fired_once {
            self.listeners.retain(|l| !(l.once && l.kind == kind));
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
