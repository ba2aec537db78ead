//! Handler registry: the ordered set of active handlers, shared between the registration
//! drain task (writer) and the message pump (reader).

use super::Handler;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A handler whose startup hook succeeded.
#[derive(Clone)]
pub struct ActiveHandler {
    pub name: String,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for ActiveHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveHandler").field("name", &self.name).finish()
    }
}

/// Active handlers in activation order. Cloning shares the same underlying list.
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<Vec<ActiveHandler>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a handler to the end of the active list. There is no removal.
    pub async fn activate(&self, handler: Arc<dyn Handler>) {
        let entry = ActiveHandler {
            name: handler.name().to_string(),
            handler,
        };
        self.inner.write().await.push(entry);
    }

    /// Copy of the active list. Callers iterate and call handlers without holding the lock.
    pub async fn snapshot(&self) -> Vec<ActiveHandler> {
        self.inner.read().await.clone()
    }

    /// Active handler by name (case-insensitive).
    pub async fn find(&self, name: &str) -> Option<ActiveHandler> {
        let g = self.inner.read().await;
        let name = name.to_lowercase();
        g.iter().find(|h| h.name.to_lowercase() == name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let g = self.inner.read().await;
        g.iter().map(|h| h.name.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
