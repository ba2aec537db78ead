//! Bot: owns the handler registry, starts handlers asynchronously and runs the message pump
//! against a connection.
//!
//! Registration never blocks: each handler's startup hook runs in its own task and reports
//! back on a channel drained by a single task, which is the only writer of the registry.
//! The pump reads a snapshot of the registry at the start of every turn.

mod internal;
mod pump;

use crate::channels::{Connection, ConnectionError};
use crate::config::{self, Config};
use crate::plugins::{Handler, HandlerError, HandlerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

pub use internal::{Interceptor, HELP_HEADER};
pub use pump::{message_pump, Dispatcher};

/// Why `Bot::run` stopped.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("connection {id} failed: {source}")]
    Connection {
        id: String,
        #[source]
        source: ConnectionError,
    },
    #[error("message pump stopped unexpectedly: {0}")]
    Pump(String),
}

/// Outcome of one handler's startup hook.
struct InitResult {
    handler: Arc<dyn Handler>,
    result: Result<(), HandlerError>,
}

pub struct Bot {
    name: String,
    registry: HandlerRegistry,
    rejected: Arc<RwLock<Vec<String>>>,
    handler_timeout: Option<Duration>,
    init_tx: mpsc::UnboundedSender<InitResult>,
    drain: JoinHandle<()>,
}

impl Bot {
    /// Create a bot and start its registration drain task. Must be called inside a tokio runtime.
    pub fn new(name: impl Into<String>, handler_timeout: Option<Duration>) -> Self {
        let name = name.into();
        let registry = HandlerRegistry::new();
        let rejected = Arc::new(RwLock::new(Vec::new()));
        let (init_tx, init_rx) = mpsc::unbounded_channel();
        let drain = tokio::spawn(drain_init_results(
            registry.clone(),
            rejected.clone(),
            init_rx,
        ));
        log::info!("bot named {} created", name);
        Self {
            name,
            registry,
            rejected,
            handler_timeout,
            init_tx,
            drain,
        }
    }

    /// Bot named and configured from `config` (env overrides applied).
    pub fn from_config(config: &Config) -> Self {
        Self::new(config::resolve_bot_name(config), config.bot.handler_timeout())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active handlers. Read-only from the caller's point of view; only registration appends.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Names of handlers whose startup hook failed, in the order the failures arrived.
    pub async fn rejected(&self) -> Vec<String> {
        self.rejected.read().await.clone()
    }

    /// Start `handler` in the background. It becomes active once its startup hook succeeds;
    /// on failure (including a panic in the hook) it is logged and never receives traffic.
    pub fn register(&self, handler: Arc<dyn Handler>) {
        let init_tx = self.init_tx.clone();
        tokio::spawn(async move {
            let hook = handler.clone();
            let result = match tokio::spawn(async move { hook.on_init().await }).await {
                Ok(result) => result,
                Err(e) => Err(HandlerError::Init(format!("startup hook panicked: {}", e))),
            };
            if init_tx.send(InitResult { handler, result }).is_err() {
                log::debug!("registration result dropped: bot is gone");
            }
        });
    }

    pub fn register_all(&self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) {
        for h in handlers {
            self.register(h);
        }
    }

    /// Dispatcher bound to this bot's name, registry and handler timeout.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.name.clone(), self.registry.clone(), self.handler_timeout)
    }

    /// Start `conn` and pump messages until it fails or its inbound stream ends.
    ///
    /// Any error reported by the connection is fatal and returned. When the inbound stream
    /// simply ends, the remaining replies are flushed and `Ok(())` is returned.
    pub async fn run<C>(&self, conn: &mut C) -> Result<(), BotError>
    where
        C: Connection + ?Sized,
    {
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<ConnectionError>();
        let (rx, tx) = conn.start(err_tx);
        let id = conn.id().to_string();
        log::info!("bot {} running on connection {}", self.name, id);

        let mut pump = tokio::spawn(message_pump(self.dispatcher(), rx, tx));
        let pumped = tokio::select! {
            Some(e) = err_rx.recv() => {
                pump.abort();
                log::error!("connection {} failed: {}", id, e);
                return Err(BotError::Connection { id, source: e });
            }
            res = &mut pump => res,
        };
        if let Err(e) = pumped {
            log::error!("message pump failed: {}", e);
            return Err(BotError::Pump(e.to_string()));
        }

        conn.finish().await;
        if let Ok(e) = err_rx.try_recv() {
            log::error!("connection {} failed while flushing: {}", id, e);
            return Err(BotError::Connection { id, source: e });
        }
        log::info!("connection {} closed", id);
        Ok(())
    }
}

impl Drop for Bot {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

/// Promote handlers whose startup hook succeeded, in the order results arrive.
async fn drain_init_results(
    registry: HandlerRegistry,
    rejected: Arc<RwLock<Vec<String>>>,
    mut init_rx: mpsc::UnboundedReceiver<InitResult>,
) {
    while let Some(InitResult { handler, result }) = init_rx.recv().await {
        match result {
            Ok(()) => {
                log::info!("handler registered: {}", handler.name());
                registry.activate(handler).await;
            }
            Err(e) => {
                log::warn!("handler registration failed: {}: {}", handler.name(), e);
                rejected.write().await.push(handler.name().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_applies_name_and_timeout() {
        let mut config = Config::default();
        config.bot.name = "Deckard".to_string();
        config.bot.handler_timeout_secs = 0;
        let bot = Bot::from_config(&config);
        if std::env::var("BOSUN_BOT_NAME").is_err() {
            assert_eq!(bot.name(), "Deckard");
        }
        assert_eq!(bot.handler_timeout, None);
        assert!(bot.registry().is_empty().await);
    }

    struct PanicsOnInit {
        re: regex::Regex,
    }

    #[async_trait::async_trait]
    impl Handler for PanicsOnInit {
        fn name(&self) -> &str {
            "Fragile"
        }
        fn usage(&self) -> &str {
            ""
        }
        fn commands(&self) -> &[&str] {
            &[]
        }
        fn pattern(&self) -> &regex::Regex {
            &self.re
        }
        async fn on_init(&self) -> Result<(), HandlerError> {
            panic!("remote data missing");
        }
        async fn handle(&self, _msg: &crate::message::Message) -> crate::message::Message {
            crate::message::Message::reply("never")
        }
    }

    #[tokio::test]
    async fn panicking_startup_hook_is_reported_as_failed() {
        let bot = Bot::new("Bosun", None);
        bot.register(Arc::new(PanicsOnInit {
            re: regex::Regex::new("^!").unwrap(),
        }));
        for _ in 0..100 {
            if !bot.rejected().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(bot.rejected().await, vec!["Fragile".to_string()]);
        assert!(bot.registry().is_empty().await);
    }
}
