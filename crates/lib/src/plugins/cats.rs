//! Cat pictures and facts: `!cat image`, `!cat gif`, `!cat fact`.

use super::{builtin_regex, Handler};
use crate::config::CatsConfig;
use crate::message::Message;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

const USAGE: &str = "`!cat image` to generate new cat photo\n\
                     `!cat gif` to generate new cat gif\n\
                     `!cat fact` to generate new cat fact";

#[derive(Debug, Deserialize)]
struct FactResponse {
    fact: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    url: String,
}

/// What a `!cat` message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatRequest {
    Image,
    Gif,
    Fact,
    Usage,
}

pub struct CatsPlugin {
    pattern: Regex,
    kind: Regex,
    fact_url: String,
    image_url: String,
    client: reqwest::Client,
}

impl CatsPlugin {
    pub fn new(config: &CatsConfig) -> Self {
        Self {
            pattern: builtin_regex(r"(?i)^!cat"),
            kind: builtin_regex(r"(?i)^!cat (\w+)$"),
            fact_url: config.fact_url.clone(),
            image_url: config.image_url.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn parse(&self, text: &str) -> CatRequest {
        let cmd = self
            .kind
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase());
        log::debug!("cat cmd: {:?}", cmd);
        match cmd.as_deref() {
            Some("image") => CatRequest::Image,
            Some("gif") => CatRequest::Gif,
            Some("fact") => CatRequest::Fact,
            _ => CatRequest::Usage,
        }
    }

    async fn fact(&self) -> Result<String, reqwest::Error> {
        let res: FactResponse = self
            .client
            .get(&self.fact_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(res.fact)
    }

    async fn image(&self, mime: &str) -> Result<String, reqwest::Error> {
        let res: Vec<ImageResponse> = self
            .client
            .get(&self.image_url)
            .query(&[("mime_types", mime)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(res.into_iter().next().map(|i| i.url).unwrap_or_default())
    }
}

#[async_trait]
impl Handler for CatsPlugin {
    fn name(&self) -> &str {
        "Cats"
    }

    fn usage(&self) -> &str {
        USAGE
    }

    fn commands(&self) -> &[&str] {
        &["!cat"]
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn handle(&self, msg: &Message) -> Message {
        let result = match self.parse(&msg.text) {
            CatRequest::Usage => return Message::reply(USAGE),
            CatRequest::Fact => self.fact().await,
            CatRequest::Image => self.image("jpg").await,
            CatRequest::Gif => self.image("gif").await,
        };
        match result {
            Ok(text) => Message::reply(text),
            Err(e) => {
                log::debug!("cats: fetch failed: {}", e);
                Message::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sub_commands() {
        let p = CatsPlugin::new(&CatsConfig::default());
        assert_eq!(p.parse("!cat image"), CatRequest::Image);
        assert_eq!(p.parse("!CAT GIF"), CatRequest::Gif);
        assert_eq!(p.parse("!cat fact"), CatRequest::Fact);
        assert_eq!(p.parse("!cat"), CatRequest::Usage);
        assert_eq!(p.parse("!cat fact please"), CatRequest::Usage);
    }

    #[tokio::test]
    async fn bare_command_replies_with_usage() {
        let p = CatsPlugin::new(&CatsConfig::default());
        assert_eq!(p.handle(&Message::new(4, "!cat")).await.text, USAGE);
    }

    #[tokio::test]
    async fn unreachable_api_yields_empty_reply() {
        let config = CatsConfig {
            fact_url: "http://127.0.0.1:9/fact".to_string(),
            image_url: "http://127.0.0.1:9/images".to_string(),
        };
        let p = CatsPlugin::new(&config);
        assert!(p.handle(&Message::new(4, "!cat fact")).await.is_noop());
    }
}
