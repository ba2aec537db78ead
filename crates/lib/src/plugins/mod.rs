//! Command handlers (plugins).
//!
//! Handler trait and registry so the bot can start handlers asynchronously and route
//! messages to them. Bundled handlers live in the submodules; `standard_handlers` builds the
//! set the CLI registers.

mod cats;
mod dice;
mod principles;
mod registry;
mod tableflip;

use crate::config::Config;
use crate::message::Message;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

pub use cats::CatsPlugin;
pub use dice::DicePlugin;
pub use principles::{Principle, PrinciplesPlugin};
pub use registry::{ActiveHandler, HandlerRegistry};
pub use tableflip::TableFlipPlugin;

/// Failure of a handler's startup hook.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("{0}")]
    Init(String),
}

/// A command handler. The bot matches `pattern` against inbound text and calls `handle`
/// for every match, in registration order.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Display name; also the argument accepted by `!help <name>` (case-insensitive).
    fn name(&self) -> &str;

    /// Usage text returned by `!help <name>`.
    fn usage(&self) -> &str;

    /// Command keywords advertised in the `!help` index (e.g. `!dice`).
    fn commands(&self) -> &[&str];

    /// Pattern an inbound message must match for `handle` to be called.
    fn pattern(&self) -> &Regex;

    /// Startup hook, run once before the handler becomes active. An error keeps the
    /// handler out of dispatch for the life of the process.
    async fn on_init(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Produce a reply. An empty reply is dropped; the correlation id and final flag are
    /// overwritten by the pump.
    async fn handle(&self, msg: &Message) -> Message;
}

/// Bundled handlers, minus any named in `plugins.disabled`.
pub fn standard_handlers(config: &Config) -> Vec<Arc<dyn Handler>> {
    let all: Vec<Arc<dyn Handler>> = vec![
        Arc::new(DicePlugin::new()),
        Arc::new(TableFlipPlugin::new()),
        Arc::new(CatsPlugin::new(&config.plugins.cats)),
        Arc::new(PrinciplesPlugin::new(
            &config.plugins.principles,
            crate::config::resolve_github_token(config),
        )),
    ];
    all.into_iter()
        .filter(|h| {
            let disabled = config
                .plugins
                .disabled
                .iter()
                .any(|d| d.trim().eq_ignore_ascii_case(h.name()));
            if disabled {
                log::info!("handler {} disabled by config", h.name());
            }
            !disabled
        })
        .collect()
}

/// Compile a built-in pattern. Patterns are literals checked by unit tests.
pub(crate) fn builtin_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => panic!("invalid built-in pattern {}: {}", pattern, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_handlers_skip_disabled_names() {
        let mut config = Config::default();
        config.plugins.disabled = vec!["tableflip".to_string(), " Engineering Principles ".to_string()];
        let names: Vec<String> = standard_handlers(&config)
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, vec!["Dice".to_string(), "Cats".to_string()]);
    }

    #[test]
    fn standard_handlers_do_not_claim_builtin_commands() {
        let config = Config::default();
        for h in standard_handlers(&config) {
            assert!(!h.pattern().is_match("!help"), "{} claims !help", h.name());
            assert!(!h.pattern().is_match("!who"), "{} claims !who", h.name());
        }
    }
}
