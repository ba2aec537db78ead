//! Engineering principles: fetched from a markdown file on GitHub at startup, then listed,
//! looked up by number, or fuzzy-searched by keyword.
//!
//! The document is a list of paragraphs of the form `1. **Title** Description...`,
//! separated by blank lines. Registration fails if the file cannot be fetched or contains
//! no principles, so the handler never receives traffic without data.

use super::{builtin_regex, Handler, HandlerError};
use crate::config::PrinciplesConfig;
use crate::github::{GitHubClient, GitHubError};
use crate::message::Message;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

const USAGE: &str = "`!principle` will give you some Engineering principles\n\
                     `!principles` will list all\n\
                     `!principle {digit}` will list the specified principle\n\
                     `!principle {keyword}` will search for a principle based on the keyword";

// Lower weight wins: title matches rank ahead of description matches.
const TITLE_WEIGHT: usize = 1;
const DESC_WEIGHT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principle {
    pub number: usize,
    pub title: String,
    pub description: String,
}

impl std::fmt::Display for Principle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}. *{}*: {}", self.number, self.title, self.description)
    }
}

pub struct PrinciplesPlugin {
    source: PrinciplesConfig,
    github: GitHubClient,
    list: OnceLock<Vec<Principle>>,
    pattern: Regex,
    all: Regex,
    number: Regex,
    keyword: Regex,
    format: Regex,
}

impl PrinciplesPlugin {
    pub fn new(source: &PrinciplesConfig, token: Option<String>) -> Self {
        Self::with_client(source, GitHubClient::new(token))
    }

    pub fn with_client(source: &PrinciplesConfig, github: GitHubClient) -> Self {
        Self {
            source: source.clone(),
            github,
            list: OnceLock::new(),
            pattern: builtin_regex(r"(?i)^!principle"),
            all: builtin_regex(r"(?i)^!principles?$"),
            number: builtin_regex(r"(?i)^!principles?\s+(\d+)"),
            keyword: builtin_regex(r"(?i)^!principles?\s+(.+)"),
            format: builtin_regex(r"^(\d+\.)\s+\*\*(\w.+?)\*\*\s+(.+)"),
        }
    }

    /// Plugin preloaded with principles, skipping the GitHub fetch.
    pub fn with_principles(list: Vec<Principle>) -> Self {
        let p = Self::new(&PrinciplesConfig::default(), None);
        let _ = p.list.set(list);
        p
    }

    /// Parse numbered `N. **Title** Description` paragraphs; numbering is reassigned from 1.
    pub fn parse(&self, document: &str) -> Vec<Principle> {
        document
            .split("\n\n")
            .filter_map(|para| {
                let joined = para.trim().replace('\n', " ");
                let caps = self.format.captures(&joined)?;
                Some((caps[2].trim().to_string(), caps[3].trim().to_string()))
            })
            .enumerate()
            .map(|(i, (title, description))| Principle {
                number: i + 1,
                title,
                description,
            })
            .collect()
    }

    fn reply_for(&self, list: &[Principle], text: &str) -> String {
        if self.all.is_match(text) {
            return list
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join("\n");
        }
        if let Some(caps) = self.number.captures(text) {
            let n: usize = caps[1].parse().unwrap_or(0);
            return match n.checked_sub(1).and_then(|i| list.get(i)) {
                Some(p) => p.to_string(),
                None => "Sorry, the principle you requested does not exist".to_string(),
            };
        }
        if let Some(caps) = self.keyword.captures(text) {
            let keyword = caps[1].trim();
            return match fuzzy_search(list, keyword) {
                Some(p) => p.to_string(),
                None => format!("Sorry, no principles match keyword `{}`", keyword),
            };
        }
        USAGE.to_string()
    }
}

#[async_trait]
impl Handler for PrinciplesPlugin {
    fn name(&self) -> &str {
        "Engineering Principles"
    }

    fn usage(&self) -> &str {
        USAGE
    }

    fn commands(&self) -> &[&str] {
        &["!principle"]
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn on_init(&self) -> Result<(), HandlerError> {
        if self.list.get().is_some() {
            return Ok(());
        }
        let s = &self.source;
        let data = self
            .github
            .get_file(&s.owner, &s.repo, &s.path)
            .await
            .map_err(|e| match e {
                GitHubError::Request(e) => HandlerError::Request(e),
                other => HandlerError::Init(format!("getting principles: {}", other)),
            })?;
        let document = String::from_utf8(data).map_err(|e| HandlerError::Decode(e.to_string()))?;
        let list = self.parse(&document);
        if list.is_empty() {
            return Err(HandlerError::Init(
                "building principles: no principles found".to_string(),
            ));
        }
        log::debug!("principles: loaded {} principle(s)", list.len());
        let _ = self.list.set(list);
        Ok(())
    }

    async fn handle(&self, msg: &Message) -> Message {
        match self.list.get() {
            Some(list) if !list.is_empty() => Message::reply(self.reply_for(list, &msg.text)),
            _ => Message::reply("Sorry, there are no principles loaded at this time."),
        }
    }
}

/// Best principle for `keyword`: subsequence matches on title or description, ranked by
/// weighted edit distance. On equal rank the later candidate wins (title before description,
/// principles in document order).
fn fuzzy_search<'a>(list: &'a [Principle], keyword: &str) -> Option<&'a Principle> {
    log::debug!("principles: searching for keyword `{}`", keyword);
    let mut best: Option<(usize, &Principle)> = None;
    for p in list {
        let title = rank_match_fold(keyword, &p.title).map(|r| r * TITLE_WEIGHT);
        let desc = rank_match_fold(keyword, &p.description).map(|r| r * DESC_WEIGHT);
        for rank in [title, desc].into_iter().flatten() {
            if best.map_or(true, |(r, _)| rank <= r) {
                best = Some((rank, p));
            }
        }
    }
    if best.is_none() {
        log::debug!("principles: no matches for keyword `{}`", keyword);
    }
    best.map(|(_, p)| p)
}

/// Case-insensitive fuzzy rank: None unless every char of `source` appears in `target` in
/// order; otherwise the Levenshtein distance between the two.
fn rank_match_fold(source: &str, target: &str) -> Option<usize> {
    let source: Vec<char> = source.to_lowercase().chars().collect();
    let target: Vec<char> = target.to_lowercase().chars().collect();
    let mut rest = target.iter();
    for c in &source {
        rest.find(|t| *t == c)?;
    }
    Some(levenshtein(&source, &target))
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
