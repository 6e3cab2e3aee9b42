// ABOUTME: Library root for caravel - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod health;
pub mod notify;
pub mod output;
pub mod ssh;
