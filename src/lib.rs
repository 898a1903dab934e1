pub mod api;
pub mod assistant;
pub mod chat;
pub mod compliance;
pub mod config;
pub mod entity;
pub mod error;
pub mod relay;
pub mod store;
