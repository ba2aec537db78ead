//! Slack connection over the Real Time Messaging API.
//!
//! `start` spawns one session task: it looks up the bot's own user id (auth.test), opens the
//! RTM websocket (rtm.connect), then reads events and writes replies on that socket. Replies
//! go back to the channel of the message that started their turn, mentioning its author.

use crate::channels::connection::{Connection, ConnectionError, ErrorSink};
use crate::config::{self, Config};
use crate::message::{CorrelationId, Message};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as Frame};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// A `message` event as Slack delivers it over RTM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
}

/// Slack messages whose turn has not finished yet, keyed by correlation id.
type Inbox = Arc<Mutex<HashMap<CorrelationId, SlackMessage>>>;

#[derive(Debug, PartialEq)]
enum RtmEvent {
    Hello,
    /// Slack acknowledging one of our frames.
    Ack(u64),
    Message(SlackMessage),
    Other(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Web API client for the two calls a session needs.
#[derive(Clone)]
struct SlackApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl SlackApi {
    async fn call(&self, method: &str) -> Result<ApiResponse, ConnectionError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ConnectionError::Api("slack token not configured".to_string()))?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), method);
        let res = self.client.post(&url).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ConnectionError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        // Slack reports failures inside the body with ok: false.
        let data: ApiResponse = res.json().await?;
        if !data.ok {
            let code = data.error.as_deref().unwrap_or("unknown_error");
            return Err(ConnectionError::Api(describe_api_error(method, code)));
        }
        Ok(data)
    }

    /// User id of the account the token belongs to.
    async fn auth_test(&self) -> Result<String, ConnectionError> {
        self.call("auth.test")
            .await?
            .user_id
            .ok_or_else(|| ConnectionError::Api("auth.test: response has no user_id".to_string()))
    }

    /// Websocket URL for a new RTM session.
    async fn rtm_connect(&self) -> Result<String, ConnectionError> {
        self.call("rtm.connect")
            .await?
            .url
            .ok_or_else(|| ConnectionError::Api("rtm.connect: response has no url".to_string()))
    }
}

fn describe_api_error(method: &str, code: &str) -> String {
    let reason = match code {
        "migration_in_progress" => "team is being migrated between servers",
        "not_authed" => "no authentication token provided",
        "invalid_auth" => "invalid authentication token",
        "account_inactive" => "authentication token is for a deleted user or team",
        other => return format!("{}: request not ok: {}", method, other),
    };
    format!("{}: {}", method, reason)
}

/// RTM connector for a Slack bot user.
pub struct SlackConnection {
    id: String,
    api: SlackApi,
    capacity: usize,
    inbox: Inbox,
    session: Option<JoinHandle<()>>,
}

impl SlackConnection {
    pub fn new(token: Option<String>, api_url: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: "slack".to_string(),
            api: SlackApi {
                client: reqwest::Client::new(),
                base_url: api_url.into(),
                token,
            },
            capacity: capacity.max(1),
            inbox: Arc::new(Mutex::new(HashMap::new())),
            session: None,
        }
    }

    /// Token (SLACK_TOKEN env or config), API URL and channel capacity from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config::resolve_slack_token(config),
            config.channels.slack.api_url.clone(),
            config.bot.channel_capacity,
        )
    }
}

#[async_trait]
impl Connection for SlackConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&mut self, errors: ErrorSink) -> (mpsc::Receiver<Message>, mpsc::Sender<Message>) {
        let (rx_tx, rx) = mpsc::channel::<Message>(self.capacity);
        let (tx, tx_rx) = mpsc::channel::<Message>(self.capacity);
        log::info!("slack connection: starting");
        self.session = Some(tokio::spawn(run_session(
            self.api.clone(),
            self.inbox.clone(),
            rx_tx,
            tx_rx,
            errors,
        )));
        (rx, tx)
    }

    async fn finish(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.await {
                log::debug!("slack session task ended abnormally: {}", e);
            }
        }
        log::info!("slack connection: stopped");
    }
}

async fn run_session(
    api: SlackApi,
    inbox: Inbox,
    rx: mpsc::Sender<Message>,
    tx: mpsc::Receiver<Message>,
    errors: ErrorSink,
) {
    if let Err(e) = session(api, inbox, rx, tx, errors.clone()).await {
        let _ = errors.send(e);
    }
}

async fn session(
    api: SlackApi,
    inbox: Inbox,
    rx: mpsc::Sender<Message>,
    tx: mpsc::Receiver<Message>,
    errors: ErrorSink,
) -> Result<(), ConnectionError> {
    let bot_id = api.auth_test().await?;
    let url = api.rtm_connect().await?;
    log::info!("slack connection: authenticated as {}, opening rtm socket", bot_id);
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (sink, stream) = ws.split();
    let reader = tokio::spawn(read_events(stream, bot_id, inbox.clone(), rx, errors));
    let res = write_replies(sink, inbox, tx, KEEPALIVE_INTERVAL).await;
    reader.abort();
    res
}

fn parse_event(raw: &str) -> Result<RtmEvent, serde_json::Error> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default, rename = "type")]
        kind: String,
        #[serde(default)]
        reply_to: Option<u64>,
    }

    let envelope: Envelope = serde_json::from_str(raw)?;
    Ok(match envelope.kind.as_str() {
        "" => RtmEvent::Ack(envelope.reply_to.unwrap_or_default()),
        "hello" => RtmEvent::Hello,
        "message" => RtmEvent::Message(serde_json::from_str(raw)?),
        other => RtmEvent::Other(other.to_string()),
    })
}

fn slack_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| crate::plugins::builtin_regex(r"<https?://(\S+)\|(\S+)>"))
}

/// Undo Slack's link markup: `<http://example.com|example.com>` becomes `example.com`.
pub fn format_slack_text(text: &str) -> String {
    let fixed = slack_link().replace_all(text, "$2");
    if fixed != text {
        log::debug!("slack: unwrapped links: {:?} -> {:?}", text, fixed);
    }
    fixed.into_owned()
}

async fn read_events<S>(
    mut stream: S,
    bot_id: String,
    inbox: Inbox,
    rx: mpsc::Sender<Message>,
    errors: ErrorSink,
) where
    S: Stream<Item = Result<Frame, tungstenite::Error>> + Unpin,
{
    let mut counter: CorrelationId = 0;
    while let Some(frame) = stream.next().await {
        let raw = match frame {
            Ok(Frame::Text(raw)) => raw,
            Ok(Frame::Close(_)) => {
                let _ = errors.send(ConnectionError::Closed("slack closed the rtm socket".to_string()));
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = errors.send(ConnectionError::WebSocket(e));
                return;
            }
        };
        let event = match parse_event(&raw) {
            Ok(RtmEvent::Message(m)) => m,
            Ok(RtmEvent::Ack(id)) => {
                log::debug!("slack: frame {} acknowledged", id);
                continue;
            }
            Ok(RtmEvent::Hello) => {
                log::debug!("slack: hello");
                continue;
            }
            Ok(RtmEvent::Other(kind)) => {
                log::debug!("slack: ignoring {} event", kind);
                continue;
            }
            Err(e) => {
                log::warn!("slack: skipping malformed event: {}", e);
                continue;
            }
        };
        // Edits and bot posts carry no top-level user; our own messages must not loop back.
        if event.user.is_empty() || event.user == bot_id || event.text.is_empty() {
            continue;
        }
        let msg = Message::new(counter, format_slack_text(&event.text));
        log::debug!("slack: message {} from {} in {} at {}", counter, event.user, event.channel, event.ts);
        inbox.lock().await.insert(counter, event);
        counter += 1;
        if rx.send(msg).await.is_err() {
            log::debug!("slack: inbound channel closed, stopping reader");
            return;
        }
    }
    let _ = errors.send(ConnectionError::Closed("slack rtm stream ended".to_string()));
}

/// RTM frame for `msg`, or None when there is nothing to send. Releases the turn on its final message.
async fn outbound_frame(inbox: &Inbox, msg: &Message, frame_id: u64) -> Option<serde_json::Value> {
    let mut g = inbox.lock().await;
    let frame = if msg.text.is_empty() {
        None
    } else if let Some(origin) = g.get(&msg.id) {
        Some(serde_json::json!({
            "id": frame_id,
            "type": "message",
            "channel": origin.channel,
            "text": format!("<@{}>: {}", origin.user, msg.text),
        }))
    } else {
        log::warn!("slack: reply for unknown message id {}", msg.id);
        None
    };
    if msg.is_final {
        g.remove(&msg.id);
        log::debug!("slack: inbox size: {}", g.len());
    }
    frame
}

async fn write_replies<S>(
    mut sink: S,
    inbox: Inbox,
    mut tx: mpsc::Receiver<Message>,
    keepalive: Duration,
) -> Result<(), ConnectionError>
where
    S: Sink<Frame, Error = tungstenite::Error> + Unpin,
{
    let mut frame_id: u64 = 0;
    let mut ping = tokio::time::interval(keepalive);
    loop {
        let frame = tokio::select! {
            msg = tx.recv() => match msg {
                Some(msg) => match outbound_frame(&inbox, &msg, frame_id).await {
                    Some(frame) => frame,
                    None => continue,
                },
                None => break,
            },
            _ = ping.tick() => serde_json::json!({ "id": frame_id, "type": "ping" }),
        };
        frame_id += 1;
        sink.send(Frame::Text(frame.to_string())).await?;
    }
    if let Err(e) = sink.close().await {
        log::debug!("slack: closing rtm socket: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slack_message(channel: &str, user: &str, text: &str) -> SlackMessage {
        SlackMessage {
            channel: channel.to_string(),
            user: user.to_string(),
            text: text.to_string(),
            ts: "1500000000.000100".to_string(),
        }
    }

    #[test]
    fn format_slack_text_unwraps_links() {
        assert_eq!(format_slack_text("<http://handwriting.io|handwriting.io>"), "handwriting.io");
        assert_eq!(
            format_slack_text("see <https://a.io|a.io> and <http://b.io|b.io>"),
            "see a.io and b.io"
        );
    }

    #[test]
    fn format_slack_text_leaves_other_text_alone() {
        assert_eq!(format_slack_text("the brown dog"), "the brown dog");
        assert_eq!(format_slack_text(""), "");
        assert_eq!(format_slack_text("<@U2934234|caitlin>"), "<@U2934234|caitlin>");
    }

    #[test]
    fn parses_rtm_envelopes() {
        assert_eq!(parse_event(r#"{"type":"hello"}"#).unwrap(), RtmEvent::Hello);
        assert_eq!(
            parse_event(r#"{"ok":true,"reply_to":4,"ts":"1.2","text":"hi"}"#).unwrap(),
            RtmEvent::Ack(4)
        );
        assert_eq!(
            parse_event(r#"{"type":"user_typing","channel":"C1","user":"U1"}"#).unwrap(),
            RtmEvent::Other("user_typing".to_string())
        );
        assert_eq!(
            parse_event(r#"{"type":"message","channel":"C1","user":"U1","text":"!who","ts":"1500000000.000100"}"#)
                .unwrap(),
            RtmEvent::Message(slack_message("C1", "U1", "!who"))
        );
        assert!(parse_event("not json").is_err());
    }

    #[tokio::test]
    async fn reader_skips_own_and_userless_messages() {
        let frames: Vec<Result<Frame, tungstenite::Error>> = vec![
            Ok(Frame::Text(r#"{"type":"hello"}"#.to_string())),
            Ok(Frame::Text(r#"{"type":"message","channel":"C1","user":"UBOT","text":"echo"}"#.to_string())),
            Ok(Frame::Text(r#"{"type":"message","subtype":"message_changed","channel":"C1"}"#.to_string())),
            Ok(Frame::Text("{ broken".to_string())),
            Ok(Frame::Text(
                r#"{"type":"message","channel":"C1","user":"U1","text":"!cat <http://a.io|a.io>"}"#.to_string(),
            )),
            Ok(Frame::Text(r#"{"type":"message","channel":"C2","user":"U2","text":"!who"}"#.to_string())),
        ];
        let inbox: Inbox = Arc::new(Mutex::new(HashMap::new()));
        let (rx_tx, mut rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        read_events(
            futures_util::stream::iter(frames),
            "UBOT".to_string(),
            inbox.clone(),
            rx_tx,
            err_tx,
        )
        .await;

        assert_eq!(rx.recv().await, Some(Message::new(0, "!cat a.io")));
        assert_eq!(rx.recv().await, Some(Message::new(1, "!who")));
        assert_eq!(rx.recv().await, None);
        let g = inbox.lock().await;
        assert_eq!(g.get(&0).map(|m| m.channel.as_str()), Some("C1"));
        assert_eq!(g.get(&1).map(|m| m.user.as_str()), Some("U2"));
        assert!(matches!(err_rx.try_recv(), Ok(ConnectionError::Closed(_))));
    }

    #[tokio::test]
    async fn reader_reports_close_frame() {
        let frames: Vec<Result<Frame, tungstenite::Error>> = vec![Ok(Frame::Close(None))];
        let inbox: Inbox = Arc::new(Mutex::new(HashMap::new()));
        let (rx_tx, _rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        read_events(futures_util::stream::iter(frames), "UBOT".to_string(), inbox, rx_tx, err_tx).await;
        match err_rx.try_recv() {
            Ok(ConnectionError::Closed(reason)) => assert!(reason.contains("closed the rtm socket")),
            other => panic!("expected closed error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn replies_mention_the_author_and_release_the_turn() {
        let inbox: Inbox = Arc::new(Mutex::new(HashMap::new()));
        inbox.lock().await.insert(3, slack_message("C9", "U7", "!dice"));

        let frame = outbound_frame(&inbox, &Message::new(3, "you rolled `4`"), 11).await;
        assert_eq!(
            frame,
            Some(serde_json::json!({
                "id": 11,
                "type": "message",
                "channel": "C9",
                "text": "<@U7>: you rolled `4`",
            }))
        );
        assert!(inbox.lock().await.contains_key(&3));

        assert_eq!(outbound_frame(&inbox, &Message::end_of_turn(3), 12).await, None);
        assert!(inbox.lock().await.is_empty());
    }

    #[tokio::test]
    async fn reply_for_unknown_turn_is_dropped() {
        let inbox: Inbox = Arc::new(Mutex::new(HashMap::new()));
        assert_eq!(outbound_frame(&inbox, &Message::last(8, "late"), 0).await, None);
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let conn = SlackConnection::new(None, "http://127.0.0.1:9", 4);
        match conn.api.auth_test().await {
            Err(ConnectionError::Api(reason)) => assert_eq!(reason, "slack token not configured"),
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[test]
    fn api_error_codes_read_as_sentences() {
        assert_eq!(
            describe_api_error("auth.test", "invalid_auth"),
            "auth.test: invalid authentication token"
        );
        assert_eq!(
            describe_api_error("rtm.connect", "ratelimited"),
            "rtm.connect: request not ok: ratelimited"
        );
    }
}
