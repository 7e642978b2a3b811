pub mod config;
pub mod error;
pub mod types;

pub use config::WorldConfig;
pub use error::{MurmurError, Result};
pub use types::{EntityId, Seconds, Tick, UtteranceId, Vec2};
