//! Built-in commands answered by the bot itself: `!help`, `!help <handler>` and `!who`.
//! Handlers never see these messages.

use crate::message::Message;
use crate::plugins::{ActiveHandler, HandlerRegistry};
use regex::Regex;

pub const HELP_HEADER: &str = "Here's a list of all known commands:";

pub struct Interceptor {
    bot_name: String,
    help: Regex,
    who: Regex,
}

impl Interceptor {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            help: crate::plugins::builtin_regex(r"(?i)^!help\s*(\S*)$"),
            who: crate::plugins::builtin_regex(r"(?i)^!who$"),
        }
    }

    /// Final reply for a built-in command, or None to pass the message on to handlers.
    pub async fn intercept(&self, registry: &HandlerRegistry, msg: &Message) -> Option<Message> {
        if let Some(caps) = self.help.captures(&msg.text) {
            let wanted = caps.get(1).map_or("", |m| m.as_str());
            let text = if wanted.is_empty() {
                help_index(&registry.snapshot().await)
            } else {
                registry
                    .find(wanted)
                    .await
                    .map(|h| help_usage(&h))
                    .unwrap_or_default()
            };
            return Some(Message::last(msg.id, text));
        }
        if self.who.is_match(&msg.text) {
            return Some(Message::last(msg.id, format!("Hello, I Am {}", self.bot_name)));
        }
        None
    }
}

/// Header plus one line per active handler, in registry order.
fn help_index(handlers: &[ActiveHandler]) -> String {
    let mut lines = vec![HELP_HEADER.to_string()];
    for h in handlers {
        let commands = h
            .handler
            .commands()
            .iter()
            .map(|c| format!("`{}`", c))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("• Plugin *{}* -- {}", h.name, commands));
    }
    lines.join("\n")
}

/// Usage block for one handler.
fn help_usage(h: &ActiveHandler) -> String {
    format!("**Usage for `{}` Plugin**\n{}", h.name, h.handler.usage())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{DicePlugin, TableFlipPlugin};
    use std::sync::Arc;

    async fn registry_with_builtins() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry.activate(Arc::new(DicePlugin::new())).await;
        registry.activate(Arc::new(TableFlipPlugin::new())).await;
        registry
    }

    #[tokio::test]
    async fn who_names_the_bot() {
        let i = Interceptor::new("Deckard");
        let out = i.intercept(&HandlerRegistry::new(), &Message::new(5, "!WHO")).await;
        assert_eq!(out, Some(Message::last(5, "Hello, I Am Deckard")));
    }

    #[tokio::test]
    async fn who_with_trailing_text_is_not_intercepted() {
        let i = Interceptor::new("Deckard");
        let out = i.intercept(&HandlerRegistry::new(), &Message::new(5, "!who are you")).await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn help_index_lists_handlers_in_order() {
        let i = Interceptor::new("Bosun");
        let registry = registry_with_builtins().await;
        let out = i.intercept(&registry, &Message::new(1, "!help")).await.unwrap();
        assert!(out.is_final);
        assert_eq!(
            out.text,
            "Here's a list of all known commands:\n\
             • Plugin *Dice* -- `!dice`\n\
             • Plugin *TableFlip* -- `!tableflip` `!tablechill`"
        );
    }

    #[tokio::test]
    async fn help_index_without_handlers_is_header_only() {
        let i = Interceptor::new("Bosun");
        let out = i.intercept(&HandlerRegistry::new(), &Message::new(1, "!help")).await.unwrap();
        assert_eq!(out.text, HELP_HEADER);
    }

    #[tokio::test]
    async fn help_for_named_handler_ignores_case() {
        let i = Interceptor::new("Bosun");
        let registry = registry_with_builtins().await;
        let out = i.intercept(&registry, &Message::new(2, "!Help  tableFLIP")).await.unwrap();
        assert!(out.text.starts_with("**Usage for `TableFlip` Plugin**\n`!tableflip`"));
    }

    #[tokio::test]
    async fn help_for_unknown_handler_is_empty_and_final() {
        let i = Interceptor::new("Bosun");
        let registry = registry_with_builtins().await;
        let out = i.intercept(&registry, &Message::new(3, "!help nosuch")).await;
        assert_eq!(out, Some(Message::end_of_turn(3)));
    }

    #[tokio::test]
    async fn help_with_two_words_is_not_intercepted() {
        let i = Interceptor::new("Bosun");
        let out = i.intercept(&HandlerRegistry::new(), &Message::new(3, "!help me please")).await;
        assert_eq!(out, None);
    }
}
