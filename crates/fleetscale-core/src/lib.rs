pub mod config;
pub mod types;

pub use config::{ConfigError, FleetscaleConfig};
pub use types::*;
