pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod input;
pub mod observability;
pub mod server;
pub mod store;
