pub mod chat;
pub mod config;
pub mod models;
pub mod tasks;
pub mod utils;
