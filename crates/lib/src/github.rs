//! Minimal GitHub contents API client: fetch a single file from a repository.

use base64::Engine;
use serde::Deserialize;

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("bosun/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("github request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("github api error: {0}")]
    Api(String),
    #[error("github content decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

pub struct GitHubClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(GITHUB_API_BASE, token)
    }

    /// Client against a custom API base (GitHub Enterprise or tests).
    pub fn with_base_url(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Contents of `path` in `owner/repo` on the default branch.
    pub async fn get_file(&self, owner: &str, repo: &str, path: &str) -> Result<Vec<u8>, GitHubError> {
        let url = format!("{}/repos/{}/{}/contents/{}", self.base_url, owner, repo, path);
        let mut req = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(ref t) = self.token {
            req = req.bearer_auth(t);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GitHubError::Api(format!("get contents failed: {} {}", status, body)));
        }
        let data: ContentsResponse = res.json().await?;
        decode_content(&data)
    }
}

fn decode_content(data: &ContentsResponse) -> Result<Vec<u8>, GitHubError> {
    if data.encoding != "base64" {
        return Err(GitHubError::Decode(format!(
            "unsupported encoding: {:?}",
            data.encoding
        )));
    }
    // The API wraps base64 at 60 columns.
    let compact: String = data.content.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GitHubError::Decode(e.to_string()))
}
