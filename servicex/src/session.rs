//! Per-network bot session.
//!
//! A session owns one network's connection lifecycle: it drives the
//! client with automatic reconnect, identifies with services, joins the
//! persisted channel list, tracks live state, and dispatches incoming
//! commands to the plugin registry.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use tokio::task::JoinHandle;

use servicex_client::client::{self, ClientHandle, ConnectConfig, ReconnectConfig};
use servicex_client::event::Event;

use crate::command::{self, SplitError};
use crate::db::{Db, NetworkConfig};
use crate::network::NetworkManager;
use crate::plugin::{Context, PluginManager};
use crate::scheduler::Scheduler;

const CTCP_VERSION: &str = "\u{1}VERSION\u{1}";

/// Live, connection-scoped state shared with plugins.
pub struct SessionState {
    nick: RwLock<String>,
    joined: RwLock<BTreeSet<String>>,
    client: Mutex<Option<ClientHandle>>,
}

impl SessionState {
    pub fn new(nick: &str) -> Self {
        Self {
            nick: RwLock::new(nick.to_string()),
            joined: RwLock::new(BTreeSet::new()),
            client: Mutex::new(None),
        }
    }

    /// Our current nick on this network.
    pub fn nick(&self) -> String {
        self.nick.read().unwrap().clone()
    }

    pub fn set_nick(&self, nick: &str) {
        *self.nick.write().unwrap() = nick.to_string();
    }

    /// Channels we are currently in, sorted.
    pub fn joined_channels(&self) -> Vec<String> {
        self.joined.read().unwrap().iter().cloned().collect()
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.joined.read().unwrap().contains(channel)
    }

    fn mark_joined(&self, channel: &str) {
        self.joined.write().unwrap().insert(channel.to_string());
    }

    fn mark_parted(&self, channel: &str) {
        self.joined.write().unwrap().remove(channel);
    }

    fn clear_joined(&self) {
        self.joined.write().unwrap().clear();
    }

    /// Handle for the current connection, if any.
    pub fn client(&self) -> Option<ClientHandle> {
        self.client.lock().unwrap().clone()
    }

    fn set_client(&self, client: Option<ClientHandle>) {
        *self.client.lock().unwrap() = client;
    }
}

/// Everything a session needs, bundled for the event handler.
pub struct SessionDeps {
    pub config: NetworkConfig,
    pub db: Arc<Db>,
    pub scheduler: Scheduler,
    pub plugins: Arc<PluginManager>,
    pub networks: Arc<NetworkManager>,
    pub state: Arc<SessionState>,
    pub connected: Arc<AtomicBool>,
}

/// A running session, owned by the network manager.
pub struct SessionHandle {
    pub state: Arc<SessionState>,
    pub connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Tear the session down: QUIT the current connection if one is up,
    /// then stop reconnecting. QUIT goes first so a session shutting
    /// itself down (a `network disconnect` issued on that network) still
    /// leaves cleanly.
    pub async fn shutdown(&self) {
        if let Some(client) = self.state.client() {
            let _ = client.quit(Some("Disconnecting")).await;
        }
        self.task.abort();
        self.state.set_client(None);
        self.state.clear_joined();
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Spawn a session for one network. The session reconnects forever until
/// shut down.
pub fn spawn(deps: SessionDeps) -> SessionHandle {
    let connect_config = ConnectConfig {
        server_addr: deps.config.server_addr(),
        nicks: deps.config.nicknames.clone(),
        user: deps.config.ident.clone(),
        realname: deps.config.realname.clone(),
        tls: deps.config.tls,
        tls_insecure: false,
    };

    let state = deps.state.clone();
    let connected = deps.connected.clone();
    let network_name = deps.config.name.clone();
    let deps = Arc::new(deps);

    let task = tokio::spawn(async move {
        let handler_deps = deps.clone();
        let result = client::run_with_reconnect(
            connect_config,
            ReconnectConfig::default(),
            move |handle, event| {
                let deps = handler_deps.clone();
                Box::pin(async move { handle_event(&deps, &handle, event).await })
            },
        )
        .await;
        if let Err(e) = result {
            tracing::error!(network = %deps.config.name, error = %e, "Session ended");
        }
    });

    tracing::info!(network = %network_name, "Connecting to IRC network");
    SessionHandle {
        state,
        connected,
        task,
    }
}

async fn handle_event(deps: &SessionDeps, client: &ClientHandle, event: Event) -> Result<()> {
    let config = &deps.config;
    match event {
        Event::Connected => {
            tracing::info!(
                network = %config.name,
                address = %config.server_addr(),
                "Connected"
            );
            deps.state.set_client(Some(client.clone()));
        }

        Event::Registered { nick } => {
            tracing::info!(network = %config.name, nick = %nick, "Registered");
            deps.state.set_nick(&nick);
            deps.connected.store(true, Ordering::SeqCst);

            if !config.services_username.is_empty() {
                tracing::info!(
                    network = %config.name,
                    account = %config.services_username,
                    "Identifying with NickServ"
                );
                client
                    .privmsg(
                        "NickServ",
                        &format!(
                            "IDENTIFY {} {}",
                            config.services_username, config.services_password
                        ),
                    )
                    .await?;
            }

            for channel in deps.db.channels(config.id)? {
                tracing::info!(network = %config.name, channel = %channel, "Joining channel");
                client.join(&channel).await?;
            }
        }

        Event::Joined { channel, nick } => {
            if nick == deps.state.nick() {
                tracing::info!(network = %config.name, channel = %channel, "Joined channel");
                deps.state.mark_joined(&channel);
            }
        }

        Event::Parted { channel, nick } => {
            if nick == deps.state.nick() {
                tracing::info!(network = %config.name, channel = %channel, "Left channel");
                deps.state.mark_parted(&channel);
            }
        }

        Event::Kicked {
            channel,
            nick,
            by,
            reason,
        } => {
            if nick == deps.state.nick() {
                tracing::warn!(
                    network = %config.name,
                    channel = %channel,
                    by = %by,
                    reason = %reason,
                    "Kicked from channel"
                );
                deps.state.mark_parted(&channel);
            }
        }

        Event::NickChanged { old_nick, new_nick } => {
            if old_nick == deps.state.nick() {
                tracing::info!(network = %config.name, nick = %new_nick, "Nick changed");
                deps.state.set_nick(&new_nick);
            }
        }

        Event::Notice { from, text, .. } => {
            if from == "NickServ" {
                if text.contains("Password accepted") {
                    tracing::info!(network = %config.name, "Identified with NickServ");
                } else if text.contains("isn't registered") {
                    tracing::error!(network = %config.name, "Failed to identify with NickServ");
                }
            }
        }

        Event::ServerNotice { text } => {
            tracing::debug!(network = %config.name, text = %text, "Server notice");
        }

        Event::Message { from, target, text } => {
            handle_message(deps, client, from, target, text).await?;
        }

        Event::Disconnected { reason } => {
            tracing::warn!(network = %config.name, reason = %reason, "Connection lost");
            deps.connected.store(false, Ordering::SeqCst);
            deps.state.clear_joined();
            deps.state.set_client(None);
        }

        Event::UserQuit { .. } | Event::RawLine(_) => {}
    }
    Ok(())
}

async fn handle_message(
    deps: &SessionDeps,
    client: &ClientHandle,
    from: String,
    target: String,
    text: String,
) -> Result<()> {
    let own_nick = deps.state.nick();
    if from == own_nick {
        return Ok(());
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    if text == CTCP_VERSION {
        client
            .notice(&from, &format!("\u{1}VERSION {}\u{1}", crate::VERSION_REPLY))
            .await?;
        return Ok(());
    }

    // PMs are implicit commands; channel messages need the trigger
    let is_pm = target == own_nick;
    let reply_target = if is_pm { from.clone() } else { target };

    let line = if is_pm {
        text
    } else {
        match text.strip_prefix(&deps.config.command_trigger) {
            Some(rest) => rest,
            None => return Ok(()),
        }
    };

    dispatch_command(deps, client, &reply_target, &from, line).await
}

async fn dispatch_command(
    deps: &SessionDeps,
    client: &ClientHandle,
    target: &str,
    sender: &str,
    line: &str,
) -> Result<()> {
    let ctx = Context {
        client: client.clone(),
        network: deps.config.clone(),
        db: deps.db.clone(),
        scheduler: deps.scheduler.clone(),
        plugins: deps.plugins.clone(),
        networks: deps.networks.clone(),
        state: deps.state.clone(),
        target: target.to_string(),
        sender: sender.to_string(),
    };

    let parts = match command::split_args(line) {
        Ok(parts) => parts,
        Err(SplitError::UnterminatedQuote) => {
            ctx.reply("Missing closing quotation mark").await?;
            return Ok(());
        }
    };
    let Some((name, args)) = parts.split_first() else {
        return Ok(());
    };

    match deps.plugins.execute(&ctx, name, args).await {
        Ok(true) => {
            tracing::info!(command = %name, sender, "Executed command");
        }
        Ok(false) => {
            tracing::info!(command = %name, sender, "Unknown command");
            ctx.reply("Command not found").await?;
        }
        Err(e) => {
            tracing::error!(command = %name, sender, error = %e, "Command failed");
            ctx.reply(&format!("Error: {e}")).await?;
        }
    }
    Ok(())
}
