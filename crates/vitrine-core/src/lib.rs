pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::VitrineConfig;
pub use error::{Result, VitrineError};
pub use events::DomainEvent;
pub use types::*;
