pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod plans;
pub mod types;
pub mod usage;
