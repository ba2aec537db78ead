//! Message pump: turns each inbound message into zero or more replies plus one final
//! message, one inbound message at a time.

use super::internal::Interceptor;
use crate::message::Message;
use crate::plugins::{ActiveHandler, HandlerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;

/// Everything one turn needs: the interceptor, the live registry and the handler timeout.
#[derive(Clone)]
pub struct Dispatcher {
    interceptor: Arc<Interceptor>,
    registry: HandlerRegistry,
    handler_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        bot_name: impl Into<String>,
        registry: HandlerRegistry,
        handler_timeout: Option<Duration>,
    ) -> Self {
        Self {
            interceptor: Arc::new(Interceptor::new(bot_name)),
            registry,
            handler_timeout,
        }
    }

    /// Run one turn for `inbound`, writing replies to `tx`.
    ///
    /// Empty text is not a turn and produces nothing. Otherwise the last message written
    /// is always final and carries `inbound.id`.
    pub async fn dispatch(
        &self,
        inbound: &Message,
        tx: &mpsc::Sender<Message>,
    ) -> Result<(), SendError<Message>> {
        if inbound.text.is_empty() {
            return Ok(());
        }

        if let Some(reply) = self.interceptor.intercept(&self.registry, inbound).await {
            return tx.send(reply).await;
        }

        // Handlers activated mid-turn are picked up on the next turn.
        let handlers = self.registry.snapshot().await;
        for h in &handlers {
            if !h.handler.pattern().is_match(&inbound.text) {
                log::debug!("message did not match pattern for handler {}, skipping", h.name);
                continue;
            }
            log::debug!("message matches pattern for handler {}, calling it", h.name);
            let mut out = self.call(h, inbound).await;
            out.id = inbound.id;
            out.is_final = false;
            if out.is_noop() {
                continue;
            }
            log::debug!("incoming message: {:?}", inbound);
            log::debug!("outgoing message: {:?}", out);
            tx.send(out).await?;
        }

        tx.send(Message::end_of_turn(inbound.id)).await
    }

    /// Call one handler in its own task so a panic or an overrun costs only its reply.
    async fn call(&self, h: &ActiveHandler, inbound: &Message) -> Message {
        let handler = h.handler.clone();
        let msg = inbound.clone();
        let mut task = tokio::spawn(async move { handler.handle(&msg).await });

        let joined = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    log::warn!(
                        "handler {} did not reply within {:?}, dropping its reply",
                        h.name,
                        limit
                    );
                    return Message::empty();
                }
            },
            None => task.await,
        };
        match joined {
            Ok(out) => out,
            Err(e) => {
                log::warn!("handler {} failed: {}", h.name, e);
                Message::empty()
            }
        }
    }
}

/// Read inbound messages until the stream closes, dispatching each in turn.
pub async fn message_pump(
    dispatcher: Dispatcher,
    mut rx: mpsc::Receiver<Message>,
    tx: mpsc::Sender<Message>,
) {
    while let Some(inbound) = rx.recv().await {
        if dispatcher.dispatch(&inbound, &tx).await.is_err() {
            log::debug!("pump: outbound channel closed, stopping");
            return;
        }
    }
    log::debug!("pump: inbound channel closed, stopping");
}
