//! Multi-network connection manager.
//!
//! Owns one session per connected network and the in-memory view of the
//! network roster. Database edits (add/remove/modify) call [`NetworkManager::reload`]
//! to refresh the roster; live sessions keep their old config until
//! reconnected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::db::{Db, NetworkConfig};
use crate::plugin::PluginManager;
use crate::scheduler::Scheduler;
use crate::session::{self, SessionDeps, SessionHandle, SessionState};

/// Point-in-time view of one network for status displays.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tls: bool,
    pub connected: bool,
    pub nick: Option<String>,
    pub channels: Vec<String>,
}

pub struct NetworkManager {
    db: Arc<Db>,
    scheduler: Scheduler,
    networks: Mutex<HashMap<i64, NetworkConfig>>,
    sessions: Mutex<HashMap<i64, SessionHandle>>,
}

impl NetworkManager {
    pub fn new(db: Arc<Db>, scheduler: Scheduler) -> Arc<Self> {
        Arc::new(Self {
            db,
            scheduler,
            networks: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Refresh the roster from the database.
    pub fn reload(&self) -> Result<()> {
        let configs = self.db.networks()?;
        let mut networks = self.networks.lock().unwrap();
        networks.clear();
        for config in configs {
            networks.insert(config.id, config);
        }
        tracing::info!(count = networks.len(), "IRC network configurations loaded");
        Ok(())
    }

    /// Configured networks, sorted by id.
    pub fn list(&self) -> Vec<NetworkConfig> {
        let networks = self.networks.lock().unwrap();
        let mut list: Vec<NetworkConfig> = networks.values().cloned().collect();
        list.sort_by_key(|n| n.id);
        list
    }

    pub fn get(&self, id: i64) -> Option<NetworkConfig> {
        self.networks.lock().unwrap().get(&id).cloned()
    }

    pub fn is_connected(&self, id: i64) -> bool {
        self.sessions.lock().unwrap().contains_key(&id)
    }

    /// Status for one network, or `None` if unknown.
    pub fn status(&self, id: i64) -> Option<NetworkStatus> {
        let config = self.get(id)?;
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(&id);
        let connected = session
            .map(|s| s.connected.load(Ordering::SeqCst))
            .unwrap_or(false);
        Some(NetworkStatus {
            id: config.id,
            name: config.name,
            address: config.address,
            port: config.port,
            tls: config.tls,
            connected,
            nick: session.filter(|_| connected).map(|s| s.state.nick()),
            channels: session
                .map(|s| s.state.joined_channels())
                .unwrap_or_default(),
        })
    }

    /// Start a session for a network. Returns false if the network is
    /// unknown or already connected.
    pub fn connect(self: &Arc<Self>, id: i64) -> Result<bool> {
        let Some(config) = self.get(id) else {
            tracing::warn!(network_id = id, "Network not found");
            return Ok(false);
        };
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&id) {
            tracing::warn!(network = %config.name, "Already connected");
            return Ok(false);
        }

        let plugins = Arc::new(PluginManager::new());
        for name in self.db.enabled_plugins(id)? {
            if let Err(e) = plugins.load(&name) {
                tracing::error!(network = %config.name, plugin = %name, error = %e, "Failed to load plugin");
            }
        }

        let state = Arc::new(SessionState::new(config.primary_nickname()));
        let handle = session::spawn(SessionDeps {
            config,
            db: self.db.clone(),
            scheduler: self.scheduler.clone(),
            plugins,
            networks: self.clone(),
            state,
            connected: Arc::new(AtomicBool::new(false)),
        });
        sessions.insert(id, handle);
        Ok(true)
    }

    /// Start sessions for every configured network.
    pub fn connect_all(self: &Arc<Self>) -> Result<usize> {
        let mut count = 0;
        for config in self.list() {
            if self.connect(config.id)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Stop a network's session. Returns false if it wasn't connected.
    pub async fn disconnect(&self, id: i64) -> bool {
        let session = self.sessions.lock().unwrap().remove(&id);
        match session {
            Some(session) => {
                session.shutdown().await;
                tracing::info!(network_id = id, "Disconnected from network");
                true
            }
            None => {
                tracing::warn!(network_id = id, "Not connected");
                false
            }
        }
    }

    /// Disconnect and reconnect, picking up any config changes. The work
    /// runs detached so that reconnecting the network the request came in
    /// on survives its own session's teardown.
    pub async fn reconnect(self: &Arc<Self>, id: i64) -> Result<bool> {
        if !self.is_connected(id) {
            tracing::warn!(network_id = id, "Not connected");
            return Ok(false);
        }
        let manager = self.clone();
        tokio::spawn(async move {
            manager.disconnect(id).await;
            if let Err(e) = manager.reload() {
                tracing::error!(error = %e, "Reload failed during reconnect");
                return;
            }
            if let Err(e) = manager.connect(id) {
                tracing::error!(network_id = id, error = %e, "Reconnect failed");
            }
        });
        Ok(true)
    }

    /// Shut down every session (process exit).
    pub async fn shutdown(&self) {
        let sessions: Vec<(i64, SessionHandle)> =
            self.sessions.lock().unwrap().drain().collect();
        for (id, session) in sessions {
            tracing::info!(network_id = id, "Shutting down session");
            session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewNetwork;

    fn seeded() -> (Arc<Db>, Arc<NetworkManager>, i64) {
        let db = Arc::new(Db::open_memory().unwrap());
        let id = db
            .add_network(&NewNetwork {
                name: "test".to_string(),
                address: "127.0.0.1".to_string(),
                port: 1, // never connected in these tests
                ..NewNetwork::default()
            })
            .unwrap();
        let mgr = NetworkManager::new(db.clone(), Scheduler::new());
        mgr.reload().unwrap();
        (db, mgr, id)
    }

    #[test]
    fn reload_populates_roster() {
        let (_db, mgr, id) = seeded();
        assert_eq!(mgr.list().len(), 1);
        assert!(mgr.get(id).is_some());
        assert!(mgr.get(id + 1).is_none());
    }

    #[test]
    fn status_for_unconnected_network() {
        let (_db, mgr, id) = seeded();
        let status = mgr.status(id).unwrap();
        assert!(!status.connected);
        assert!(status.nick.is_none());
        assert!(status.channels.is_empty());
        assert!(mgr.status(9999).is_none());
    }

    #[tokio::test]
    async fn connect_tracks_sessions() {
        let (_db, mgr, id) = seeded();
        assert!(!mgr.is_connected(id));
        assert!(mgr.connect(id).unwrap());
        assert!(mgr.is_connected(id));
        // Double connect is refused
        assert!(!mgr.connect(id).unwrap());
        assert!(mgr.disconnect(id).await);
        assert!(!mgr.is_connected(id));
        assert!(!mgr.disconnect(id).await);
    }

    #[tokio::test]
    async fn connect_unknown_network() {
        let (_db, mgr, _id) = seeded();
        assert!(!mgr.connect(555).unwrap());
    }
}
