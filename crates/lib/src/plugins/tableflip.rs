//! Table flipping emoticons: `!tableflip` and `!tablechill`.

use super::{builtin_regex, Handler};
use crate::message::Message;
use async_trait::async_trait;
use regex::Regex;

const FLIP: &str = "(╯°□°）╯︵ ┻━┻";
const CHILL: &str = "┬─┬ノ( º _ ºノ)";

pub struct TableFlipPlugin {
    pattern: Regex,
}

impl Default for TableFlipPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFlipPlugin {
    pub fn new() -> Self {
        Self {
            pattern: builtin_regex(r"(?i)^!table(flip|chill)$"),
        }
    }
}

#[async_trait]
impl Handler for TableFlipPlugin {
    fn name(&self) -> &str {
        "TableFlip"
    }

    fn usage(&self) -> &str {
        "`!tableflip` to get some table flipping action!\n`!tablechill` to calm things down"
    }

    fn commands(&self) -> &[&str] {
        &["!tableflip", "!tablechill"]
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn handle(&self, msg: &Message) -> Message {
        let action = self
            .pattern
            .captures(&msg.text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase());
        match action.as_deref() {
            Some("flip") => Message::reply(FLIP),
            Some("chill") => Message::reply(CHILL),
            _ => Message::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flip_and_chill() {
        let p = TableFlipPlugin::new();
        assert_eq!(p.handle(&Message::new(1, "!tableflip")).await.text, FLIP);
        assert_eq!(p.handle(&Message::new(1, "!TableChill")).await.text, CHILL);
    }

    #[tokio::test]
    async fn unmatched_text_yields_empty_reply() {
        let p = TableFlipPlugin::new();
        assert!(p.handle(&Message::new(1, "!tableflips")).await.is_noop());
    }
}
