//! A plugin host for chat bots.
//!
//! Plugins declare the capabilities they implement (HTTP calls, message matching, storage,
//! scheduled work, queue access) and the host wires them into its lifecycle and dispatch loop.
pub mod bot;
pub mod command;
pub mod config;
pub mod consts;
pub mod context;
pub mod database;
mod error;
pub mod http;
pub mod mq;
pub mod plugin;
pub mod report;
pub mod schedule;
pub mod transport;
pub mod utils;

pub use bot::Bot;
pub use config::Config;
pub use error::Error;
pub use plugin::{Plugin, Registry};
