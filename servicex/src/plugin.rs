//! Plugin architecture: trait, execution context, and the registry.
//!
//! Plugins are compiled into the binary and activated per network from
//! the database. Each plugin contributes commands (dispatched on the
//! network's trigger) and optionally variables (`$name` placeholders
//! expanded in command output).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Result, bail};
use async_trait::async_trait;

use servicex_client::client::ClientHandle;

use crate::db::{Db, NetworkConfig};
use crate::network::NetworkManager;
use crate::output;
use crate::scheduler::Scheduler;
use crate::session::SessionState;

/// Static metadata describing a plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Everything a command handler may need, scoped to one incoming command.
pub struct Context {
    pub client: ClientHandle,
    pub network: NetworkConfig,
    pub db: Arc<Db>,
    pub scheduler: Scheduler,
    pub plugins: Arc<PluginManager>,
    pub networks: Arc<NetworkManager>,
    pub state: Arc<SessionState>,
    /// Where replies go: the channel, or the sender's nick for a PM.
    pub target: String,
    /// Nick of the user who issued the command.
    pub sender: String,
}

impl Context {
    /// Send a reply to the command issuer. In channels the text is
    /// prefixed with their nick; multi-line text becomes one IRC line per
    /// text line, wrapped to stay under the message size limit.
    pub async fn reply(&self, text: &str) -> Result<()> {
        let is_pm = self.target == self.sender;
        for line in text.lines() {
            for wrapped in output::wrap_line(line, 400) {
                let msg = if is_pm {
                    wrapped
                } else {
                    format!("{}: {}", self.sender, wrapped)
                };
                self.client.privmsg(&self.target, &msg).await?;
            }
        }
        Ok(())
    }

    /// Send unprefixed text to an arbitrary target.
    pub async fn send(&self, target: &str, text: &str) -> Result<()> {
        for line in text.lines() {
            for wrapped in output::wrap_line(line, 400) {
                self.client.privmsg(target, &wrapped).await?;
            }
        }
        Ok(())
    }

    /// Join a channel, optionally persisting it to the auto-join list.
    /// Joining a channel we are already in is a logged no-op.
    pub async fn join_channel(&self, channel: &str, save: bool) -> Result<()> {
        let Some(channel) = channel.split_whitespace().next() else {
            return Ok(());
        };
        if self.state.is_joined(channel) {
            tracing::info!(channel, "Already in channel");
            return Ok(());
        }
        tracing::info!(channel, "Joining channel");
        self.client.join(channel).await?;
        if save {
            self.db.add_channel(self.network.id, channel)?;
        }
        Ok(())
    }

    /// Leave a channel, optionally removing it from the auto-join list.
    pub async fn part_channel(&self, channel: &str, save: bool) -> Result<()> {
        let Some(channel) = channel.split_whitespace().next() else {
            return Ok(());
        };
        if !self.state.is_joined(channel) {
            tracing::info!(channel, "Not in channel");
            return Ok(());
        }
        tracing::info!(channel, "Leaving channel");
        self.client.part(channel).await?;
        if save {
            self.db.remove_channel(self.network.id, channel)?;
        }
        Ok(())
    }
}

/// A unit of bot functionality: a named set of commands and variables.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// Command words this plugin answers to.
    fn commands(&self) -> &'static [&'static str];

    /// Variable names this plugin can expand (without the `$`).
    fn variables(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run one of this plugin's commands.
    async fn execute(&self, ctx: &Context, command: &str, args: &[String]) -> Result<()>;

    /// Expand one of this plugin's variables.
    fn expand(&self, _ctx: &Context, _variable: &str) -> Option<String> {
        None
    }
}

/// Registry of available plugins and the loaded subset.
pub struct PluginManager {
    available: Vec<Arc<dyn Plugin>>,
    loaded: RwLock<HashMap<String, Arc<dyn Plugin>>>,
    /// command word → plugin name
    commands: RwLock<HashMap<String, String>>,
    /// variable name → plugin name
    variables: RwLock<HashMap<String, String>>,
}

impl PluginManager {
    /// A manager over the built-in plugin set.
    pub fn new() -> Self {
        Self::with_plugins(crate::plugins::builtin())
    }

    pub fn with_plugins(available: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            available,
            loaded: RwLock::new(HashMap::new()),
            commands: RwLock::new(HashMap::new()),
            variables: RwLock::new(HashMap::new()),
        }
    }

    /// Activate a plugin and register its commands and variables.
    pub fn load(&self, name: &str) -> Result<()> {
        if self.loaded.read().unwrap().contains_key(name) {
            bail!("Plugin {name} already loaded");
        }
        let Some(plugin) = self
            .available
            .iter()
            .find(|p| p.info().name == name)
            .cloned()
        else {
            bail!("Plugin {name} not found");
        };

        let mut commands = self.commands.write().unwrap();
        for cmd in plugin.commands() {
            if let Some(owner) = commands.get(*cmd) {
                tracing::warn!(command = cmd, old = %owner, new = name, "Command re-registered");
            }
            commands.insert(cmd.to_string(), name.to_string());
            tracing::info!(command = cmd, plugin = name, "Registered command");
        }
        let mut variables = self.variables.write().unwrap();
        for var in plugin.variables() {
            variables.insert(var.to_string(), name.to_string());
            tracing::info!(variable = var, plugin = name, "Registered variable");
        }
        self.loaded
            .write()
            .unwrap()
            .insert(name.to_string(), plugin);
        tracing::info!(plugin = name, "Loaded plugin");
        Ok(())
    }

    /// Deactivate a plugin, unregister its features, and drop its
    /// scheduled tasks.
    pub fn unload(&self, name: &str, scheduler: &Scheduler) -> bool {
        let Some(plugin) = self.loaded.write().unwrap().remove(name) else {
            tracing::warn!(plugin = name, "Plugin not loaded");
            return false;
        };
        let mut commands = self.commands.write().unwrap();
        for cmd in plugin.commands() {
            if commands.get(*cmd).map(String::as_str) == Some(name) {
                commands.remove(*cmd);
            }
        }
        let mut variables = self.variables.write().unwrap();
        for var in plugin.variables() {
            if variables.get(*var).map(String::as_str) == Some(name) {
                variables.remove(*var);
            }
        }
        scheduler.remove_plugin_tasks(name);
        tracing::info!(plugin = name, "Unloaded plugin");
        true
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().unwrap().contains_key(name)
    }

    /// Names of loaded plugins, sorted.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of all compiled-in plugins, sorted.
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .available
            .iter()
            .map(|p| p.info().name.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        self.available
            .iter()
            .find(|p| p.info().name == name)
            .map(|p| p.info())
    }

    /// Registered command words, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a command if some loaded plugin registers it.
    /// Returns false for unknown commands.
    pub async fn execute(&self, ctx: &Context, command: &str, args: &[String]) -> Result<bool> {
        let plugin = {
            let commands = self.commands.read().unwrap();
            let Some(owner) = commands.get(command) else {
                return Ok(false);
            };
            self.loaded.read().unwrap().get(owner).cloned()
        };
        match plugin {
            Some(plugin) => {
                plugin.execute(ctx, command, args).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace `$variable` placeholders with plugin-provided values.
    pub fn expand_variables(&self, ctx: &Context, text: &str) -> String {
        let mut out = text.to_string();
        let variables = self.variables.read().unwrap();
        for (var, owner) in variables.iter() {
            let placeholder = format!("${var}");
            if !out.contains(&placeholder) {
                continue;
            }
            let plugin = self.loaded.read().unwrap().get(owner).cloned();
            if let Some(value) = plugin.and_then(|p| p.expand(ctx, var)) {
                out = out.replace(&placeholder, &value);
            }
        }
        out
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        name: &'static str,
        cmds: &'static [&'static str],
    }

    #[async_trait]
    impl Plugin for Dummy {
        fn info(&self) -> PluginInfo {
            PluginInfo {
                name: self.name,
                version: "1.0",
                description: "test plugin",
            }
        }

        fn commands(&self) -> &'static [&'static str] {
            self.cmds
        }

        fn variables(&self) -> &'static [&'static str] {
            &["answer"]
        }

        async fn execute(&self, _ctx: &Context, _command: &str, _args: &[String]) -> Result<()> {
            Ok(())
        }

        fn expand(&self, _ctx: &Context, variable: &str) -> Option<String> {
            (variable == "answer").then(|| "42".to_string())
        }
    }

    fn manager() -> PluginManager {
        PluginManager::with_plugins(vec![
            Arc::new(Dummy {
                name: "alpha",
                cmds: &["hello", "bye"],
            }),
            Arc::new(Dummy {
                name: "beta",
                cmds: &["ping"],
            }),
        ])
    }

    #[test]
    fn load_registers_commands() {
        let mgr = manager();
        mgr.load("alpha").unwrap();
        assert!(mgr.is_loaded("alpha"));
        assert_eq!(mgr.command_names(), vec!["bye", "hello"]);
        assert_eq!(mgr.loaded_names(), vec!["alpha"]);
        assert_eq!(mgr.available_names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn double_load_is_rejected() {
        let mgr = manager();
        mgr.load("alpha").unwrap();
        assert!(mgr.load("alpha").is_err());
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        let mgr = manager();
        assert!(mgr.load("ghost").is_err());
    }

    #[test]
    fn unload_unregisters_commands() {
        let mgr = manager();
        let scheduler = Scheduler::new();
        mgr.load("alpha").unwrap();
        mgr.load("beta").unwrap();

        assert!(mgr.unload("alpha", &scheduler));
        assert!(!mgr.is_loaded("alpha"));
        assert_eq!(mgr.command_names(), vec!["ping"]);

        // Unloading twice fails quietly
        assert!(!mgr.unload("alpha", &scheduler));
    }

    #[test]
    fn plugin_info_lookup() {
        let mgr = manager();
        assert_eq!(mgr.info("beta").unwrap().description, "test plugin");
        assert!(mgr.info("ghost").is_none());
    }
}
