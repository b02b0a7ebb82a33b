//! Application instances controlled by the gateway.
//!
//! The registry is shared by every gateway generation. Whichever one
//! activates last becomes the controller and tells each subscribed
//! instance that a new version is live.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages pushed to application instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A new gateway version took control; the instance should offer a reload.
    SwUpdated { version: String },
}

struct RegistryInner {
    controller: RwLock<Option<String>>,
    sender: broadcast::Sender<ClientMessage>,
}

/// Shared set of application instances.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { inner: Arc::new(RegistryInner { controller: RwLock::new(None), sender }) }
    }

    /// Register an application instance.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.inner.sender.subscribe()
    }

    /// Number of instances currently listening.
    pub fn client_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Version of the gateway in control, if any has activated.
    pub fn controller(&self) -> Option<String> {
        self.inner
            .controller
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Take control of every instance and announce `version`.
    ///
    /// Returns how many instances were notified.
    pub(crate) fn claim(&self, version: &str) -> usize {
        {
            let mut controller = self
                .inner
                .controller
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *controller = Some(version.to_string());
        }

        match self
            .inner
            .sender
            .send(ClientMessage::SwUpdated { version: version.to_string() })
        {
            Ok(notified) => notified,
            Err(_) => {
                tracing::debug!(version, "no application instances to notify");
                0
            }
        }
    }
}
