pub mod commands;
pub mod config;
pub mod db;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
