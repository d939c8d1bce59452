pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod instance;
pub mod service;
pub mod types;

pub use error::SetupError;
pub use instance::{InstanceConfig, InstanceManager, RunState};
