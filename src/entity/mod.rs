pub mod capabilities;
pub mod emotion;
pub mod inbox;
pub mod material;
pub mod memory;
pub mod needs;
pub mod relationships;
pub mod skills;
pub mod state;

pub use capabilities::{Capability, CapabilitySet};
pub use emotion::Emotion;
pub use material::MaterialSpec;
pub use state::Entity;
