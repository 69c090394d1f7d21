// Core modules
pub mod analytics;
pub mod api;
pub mod config;
pub mod db;
pub mod decision;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod scheduler;

// Re-export commonly used types
pub use gateway::Gateway;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
