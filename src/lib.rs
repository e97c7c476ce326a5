pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod mapping;
pub mod middleware;
pub mod registry;
pub mod scheduler;
pub mod sheets;
pub mod sync;
pub mod testing;
pub mod types;
