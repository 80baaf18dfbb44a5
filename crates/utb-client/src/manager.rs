//! Session ownership and settings-driven restarts
//!
//! The manager owns the one current [`Client`] session. It generates the
//! client id once, at construction, and carries it and the log channels
//! across every replacement. A replacement session is fully built and
//! published before the old one is disposed, so `client()` never returns a
//! disposed session while the manager is live.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use utb_core::config::ClientConfig;
use utb_core::{ClientId, Endpoint};

use crate::channels::LogChannel;
use crate::client::{Client, SessionOptions};

/// Owner of the current client session
pub struct ClientManager {
    client_id: ClientId,
    channels: Vec<Arc<dyn LogChannel>>,
    options: SessionOptions,
    current: RwLock<Arc<Client>>,
    /// Serializes restarts
    restart: Mutex<()>,
    torn_down: CancellationToken,
}

impl ClientManager {
    /// Generate the client id and open the first session from `config`
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: &ClientConfig, channels: Vec<Arc<dyn LogChannel>>) -> Self {
        Self::with_client_id(config, ClientId::generate(), channels)
    }

    /// Like [`ClientManager::new`] with a caller-chosen id
    pub fn with_client_id(
        config: &ClientConfig,
        client_id: ClientId,
        channels: Vec<Arc<dyn LogChannel>>,
    ) -> Self {
        let options = SessionOptions::from(config);
        let first = Client::open(
            config.server.clone(),
            client_id.clone(),
            channels.clone(),
            options.clone(),
        );

        tracing::info!(%client_id, endpoint = %config.server, "Client manager started");

        Self {
            client_id,
            channels,
            options,
            current: RwLock::new(first),
            restart: Mutex::new(()),
            torn_down: CancellationToken::new(),
        }
    }

    /// The current session
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.current.read())
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.is_cancelled()
    }

    /// Replace the session if `endpoint` differs from the current one
    ///
    /// Returns whether a restart happened.
    pub fn on_settings_changed(&self, endpoint: Endpoint) -> bool {
        let _serial = self.restart.lock();
        if self.is_torn_down() {
            return false;
        }

        let current = self.client();
        if current.endpoint() == &endpoint {
            tracing::debug!(%endpoint, "Connection settings unchanged");
            return false;
        }

        tracing::info!(
            from = %current.endpoint(),
            to = %endpoint,
            "Connection settings changed, restarting client"
        );
        self.replace(endpoint);
        true
    }

    /// Replace the session unconditionally, keeping its endpoint
    ///
    /// Returns `false` once the manager is torn down.
    pub fn restart_client(&self) -> bool {
        let _serial = self.restart.lock();
        if self.is_torn_down() {
            return false;
        }

        let endpoint = self.client().endpoint().clone();
        tracing::info!(%endpoint, "Restarting client");
        self.replace(endpoint);
        true
    }

    /// Apply every endpoint published on `settings` until the sender is
    /// dropped or the manager is torn down
    pub fn watch_settings(self: &Arc<Self>, mut settings: watch::Receiver<Endpoint>) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let torn_down = self.torn_down.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = torn_down.cancelled() => break,
                    changed = settings.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let endpoint = settings.borrow_and_update().clone();
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.on_settings_changed(endpoint);
            }
            tracing::debug!("Settings watcher stopped");
        })
    }

    /// Dispose the current session; the manager is unusable afterwards
    pub fn teardown(&self) {
        let _serial = self.restart.lock();
        if self.torn_down.is_cancelled() {
            return;
        }
        self.torn_down.cancel();
        self.current.read().dispose();
        tracing::info!(client_id = %self.client_id, "Client manager torn down");
    }

    /// Build, publish, then dispose; caller holds the restart lock
    fn replace(&self, endpoint: Endpoint) {
        let fresh = Client::open(
            endpoint,
            self.client_id.clone(),
            self.channels.clone(),
            self.options.clone(),
        );
        let old = std::mem::replace(&mut *self.current.write(), fresh);
        old.dispose();
    }
}

impl Drop for ClientManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("client_id", &self.client_id)
            .field("current", &*self.current.read())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
