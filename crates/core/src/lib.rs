pub mod config;
pub mod error;

pub use config::{Config, QueueConfig, ServerConfig};
pub use error::*;
