//! Terminal connection: one inbound message per stdin line, replies printed to stdout.

use crate::channels::connection::{Connection, ConnectionError, ErrorSink};
use crate::message::{CorrelationId, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const COLOR_RED_BOLD: &str = "\x1b[1;31m";
const COLOR_YELLOW: &str = "\x1b[0;33m";
const COLOR_RESET: &str = "\x1b[0m";

/// Inbound messages whose turn has not finished yet, keyed by correlation id.
type Inbox = Arc<Mutex<HashMap<CorrelationId, Message>>>;

/// Stdin/stdout connector. Replies are prefixed with `{LABEL} RESPONSE:`.
pub struct StdioConnection {
    id: String,
    label: String,
    capacity: usize,
    inbox: Inbox,
    writer: Option<JoinHandle<()>>,
}

impl StdioConnection {
    pub fn new(bot_name: &str, capacity: usize) -> Self {
        Self {
            id: "stdio".to_string(),
            label: bot_name.to_uppercase(),
            capacity: capacity.max(1),
            inbox: Arc::new(Mutex::new(HashMap::new())),
            writer: None,
        }
    }
}

#[async_trait]
impl Connection for StdioConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn start(&mut self, errors: ErrorSink) -> (mpsc::Receiver<Message>, mpsc::Sender<Message>) {
        let (rx_tx, rx) = mpsc::channel::<Message>(self.capacity);
        let (tx, tx_rx) = mpsc::channel::<Message>(self.capacity);
        log::info!("stdio connection: starting");
        tokio::spawn(read_lines(
            BufReader::new(tokio::io::stdin()),
            self.inbox.clone(),
            rx_tx,
            errors.clone(),
        ));
        let prefix = response_prefix(&self.label, std::io::stdout().is_terminal());
        self.writer = Some(tokio::spawn(write_replies(
            BufWriter::new(tokio::io::stdout()),
            prefix,
            self.inbox.clone(),
            tx_rx,
            errors,
        )));
        (rx, tx)
    }

    async fn finish(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                log::debug!("stdio writer task ended abnormally: {}", e);
            }
        }
        log::info!("stdio connection: stopped");
    }
}

/// Returns (label prefix, reset suffix) for printed replies.
fn response_prefix(label: &str, color: bool) -> (String, &'static str) {
    if color {
        (
            format!("{}{} RESPONSE: {}", COLOR_RED_BOLD, label, COLOR_YELLOW),
            COLOR_RESET,
        )
    } else {
        (format!("{} RESPONSE: ", label), "")
    }
}

async fn read_lines<R>(reader: R, inbox: Inbox, rx: mpsc::Sender<Message>, errors: ErrorSink)
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut counter: CorrelationId = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let msg = Message::new(counter, line.trim_end_matches('\r'));
                counter += 1;
                // Empty lines never start a turn, so they get no final message to release them.
                if !msg.text.is_empty() {
                    inbox.lock().await.insert(msg.id, msg.clone());
                }
                if rx.send(msg).await.is_err() {
                    log::debug!("stdio: inbound channel closed, stopping reader");
                    return;
                }
            }
            Ok(None) => {
                log::info!("stdio: end of input");
                return;
            }
            Err(e) => {
                let _ = errors.send(ConnectionError::Io(e));
                return;
            }
        }
    }
}

async fn write_replies<W>(
    mut writer: W,
    (prefix, suffix): (String, &'static str),
    inbox: Inbox,
    mut tx: mpsc::Receiver<Message>,
    errors: ErrorSink,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(msg) = tx.recv().await {
        if !msg.text.is_empty() {
            let out = format!("{}{}{}\n\n", prefix, msg.text, suffix);
            let res = match writer.write_all(out.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = res {
                let _ = errors.send(ConnectionError::Io(e));
                return;
            }
        }
        if msg.is_final {
            let mut g = inbox.lock().await;
            g.remove(&msg.id);
            log::debug!("stdio: inbox size: {}", g.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_assigns_sequential_ids_and_fills_inbox() {
        let input: &[u8] = b"!who\r\n\n!dice 1d6\n";
        let inbox: Inbox = Arc::new(Mutex::new(HashMap::new()));
        let (rx_tx, mut rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        read_lines(BufReader::new(input), inbox.clone(), rx_tx, err_tx).await;

        assert_eq!(rx.recv().await, Some(Message::new(0, "!who")));
        assert_eq!(rx.recv().await, Some(Message::new(1, "")));
        assert_eq!(rx.recv().await, Some(Message::new(2, "!dice 1d6")));
        assert_eq!(rx.recv().await, None);
        assert_eq!(inbox.lock().await.len(), 2);
        assert!(!inbox.lock().await.contains_key(&1));
    }

    #[tokio::test]
    async fn writer_prints_text_and_releases_finished_turns() {
        let inbox: Inbox = Arc::new(Mutex::new(HashMap::new()));
        inbox.lock().await.insert(0, Message::new(0, "!a"));
        inbox.lock().await.insert(1, Message::new(1, "!b"));
        let (tx, tx_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        tx.send(Message::new(0, "one")).await.unwrap();
        tx.send(Message::end_of_turn(0)).await.unwrap();
        tx.send(Message::new(1, "two")).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        write_replies(
            &mut out,
            response_prefix("BOSUN", false),
            inbox.clone(),
            tx_rx,
            err_tx,
        )
        .await;

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "BOSUN RESPONSE: one\n\nBOSUN RESPONSE: two\n\n"
        );
        let g = inbox.lock().await;
        assert!(!g.contains_key(&0));
        assert!(g.contains_key(&1));
    }

    #[test]
    fn colored_prefix_wraps_text() {
        let (prefix, suffix) = response_prefix("BOSUN", true);
        assert!(prefix.starts_with(COLOR_RED_BOLD));
        assert!(prefix.ends_with(COLOR_YELLOW));
        assert_eq!(suffix, COLOR_RESET);
    }
}
