pub mod events;
pub mod identity;

pub use identity::Identity;
