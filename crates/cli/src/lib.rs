pub mod browser;
pub mod callback_server;
pub mod commands;
pub mod config;
pub mod console;
pub mod onboarding;
pub mod render;

pub use config::Config;
