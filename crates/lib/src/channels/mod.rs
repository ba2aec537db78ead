//! Connections to chat services (the terminal, Slack RTM).
//!
//! Connection trait so the bot can start any transport and exchange messages with it over
//! channels. Transports own their per-turn bookkeeping and wire encoding.

mod connection;
mod slack;
mod stdio;

pub use connection::{Connection, ConnectionError, ErrorSink};
pub use slack::{format_slack_text, SlackConnection, SlackMessage};
pub use stdio::StdioConnection;
