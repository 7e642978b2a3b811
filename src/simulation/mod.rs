//! The world and its tick pipeline

pub mod adaptive_time;
pub mod broadcast;
pub mod cognitive;
pub mod communication;
pub mod events;
pub mod firing;
pub mod housekeeping;
pub mod mental;
pub mod notifications;
pub mod physical;
pub mod relational;
pub mod snapshot;
pub mod tick;
pub mod world;

pub use adaptive_time::effective_dt;
pub use events::{WorldEvent, CONTEXT_CHANGED, ENTITY_DIED, ENTITY_SUFFERING};
pub use notifications::{ListenerId, Notification, NotificationKind};
pub use snapshot::{EntitySnapshot, WorldSnapshot, SNAPSHOT_VERSION};
pub use tick::TickReport;
pub use world::World;
