//! Murmur - emergent social agents
//!
//! Entities built from declarative materials feel, remember, bond and talk.
//! A fixed tick pipeline drives them, phrases they repeat crystallize into a
//! shared lexicon, and a small trigger DSL lets materials react to time,
//! mentions and world events.

pub mod climate;
pub mod core;
pub mod entity;
pub mod linguistics;
pub mod simulation;
pub mod triggers;

pub use crate::core::config::WorldConfig;
pub use crate::core::error::{MurmurError, Result};
pub use crate::core::types::{EntityId, Seconds, Tick, UtteranceId, Vec2};
pub use crate::entity::{Capability, Emotion, Entity, MaterialSpec};
pub use crate::simulation::{Notification, NotificationKind, TickReport, World, WorldSnapshot};
