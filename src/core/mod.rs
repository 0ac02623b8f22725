pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod mode;
pub mod models;
pub mod normalizer;
pub mod prompt;
pub mod state;
pub mod system;
