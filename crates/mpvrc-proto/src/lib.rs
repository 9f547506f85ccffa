pub mod config;
pub mod format;
pub mod platform;
pub mod protocol;
pub mod state;
