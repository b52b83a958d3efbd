pub mod auth;
pub mod client;
pub mod database;
pub mod events;
pub mod models;
pub mod remote_config;
pub mod storage;
