//! Bosun core library: message pump, handler registry, connections and bundled handlers
//! used by the CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod github;
pub mod message;
pub mod plugins;
