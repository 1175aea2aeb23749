pub mod config;
pub mod crypto;
pub mod directory;
pub mod engine;
pub mod keyhelper;
pub mod pipeline;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;

// Re-export the surface most embedders wire together.
pub use config::EngineConfig;
pub use engine::{RegistrationStatus, ReplenishmentEngine, RotationError};
pub use pipeline::ProcessingGate;
pub use scheduler::ReplenishmentScheduler;
pub use types::Identity;
pub use types::events::RotationEvent;
