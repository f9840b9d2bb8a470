//! SQLite persistence layer.
//!
//! Stores the IRC network roster, per-network auto-join channel lists,
//! and per-network plugin enablement. The database is the bot's only
//! configuration surface: commands that change behavior write here.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension, params};

/// Connection parameters for one IRC network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tls: bool,
    /// Nicknames in preference order; the first is the primary.
    pub nicknames: Vec<String>,
    pub ident: String,
    pub realname: String,
    pub services_username: String,
    pub services_password: String,
    pub oper_username: String,
    pub oper_password: String,
    /// Prefix that marks a channel message as a command.
    pub command_trigger: String,
}

impl NetworkConfig {
    pub fn primary_nickname(&self) -> &str {
        self.nicknames.first().map(String::as_str).unwrap_or("servicex")
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// A network row to insert (everything but the id).
#[derive(Debug, Clone)]
pub struct NewNetwork {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tls: bool,
    pub nicknames: Vec<String>,
    pub ident: String,
    pub realname: String,
    pub services_username: String,
    pub services_password: String,
    pub oper_username: String,
    pub oper_password: String,
    pub command_trigger: String,
}

impl Default for NewNetwork {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            port: 6667,
            tls: false,
            nicknames: vec!["ServiceX".to_string()],
            ident: "servicex".to_string(),
            realname: "ServiceX IRC Bot".to_string(),
            services_username: String::new(),
            services_password: String::new(),
            oper_username: String::new(),
            oper_password: String::new(),
            command_trigger: "!".to_string(),
        }
    }
}

/// Partial update for a network row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct NetworkUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub nicknames: Option<Vec<String>>,
    pub ident: Option<String>,
    pub realname: Option<String>,
    pub services_username: Option<String>,
    pub services_password: Option<String>,
    pub oper_username: Option<String>,
    pub oper_password: Option<String>,
    pub command_trigger: Option<String>,
}

/// Database handle wrapping a SQLite connection.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS networks (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                name              TEXT NOT NULL UNIQUE,
                address           TEXT NOT NULL,
                port              INTEGER NOT NULL,
                tls               INTEGER NOT NULL DEFAULT 0,
                nicknames         TEXT NOT NULL,
                ident             TEXT NOT NULL,
                realname          TEXT NOT NULL,
                services_username TEXT NOT NULL DEFAULT '',
                services_password TEXT NOT NULL DEFAULT '',
                oper_username     TEXT NOT NULL DEFAULT '',
                oper_password     TEXT NOT NULL DEFAULT '',
                command_trigger   TEXT NOT NULL DEFAULT '!'
            );

            CREATE TABLE IF NOT EXISTS channels (
                network_id INTEGER NOT NULL,
                name       TEXT NOT NULL,
                UNIQUE(network_id, name)
            );

            CREATE TABLE IF NOT EXISTS plugins (
                network_id INTEGER NOT NULL,
                name       TEXT NOT NULL,
                enabled    INTEGER NOT NULL DEFAULT 1,
                UNIQUE(network_id, name)
            );
            ",
        )?;
        Ok(())
    }

    // ── Networks ───────────────────────────────────────────────────────

    /// All configured networks, in id order.
    pub fn networks(&self) -> Result<Vec<NetworkConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, port, tls, nicknames, ident, realname,
                    services_username, services_password, oper_username, oper_password,
                    command_trigger
             FROM networks ORDER BY id ASC",
        )?;
        let networks = stmt
            .query_map([], map_network_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(networks)
    }

    pub fn network(&self, id: i64) -> Result<Option<NetworkConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, port, tls, nicknames, ident, realname,
                    services_username, services_password, oper_username, oper_password,
                    command_trigger
             FROM networks WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], map_network_row).optional()?)
    }

    /// Insert a network; returns the new row id.
    pub fn add_network(&self, network: &NewNetwork) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO networks (name, address, port, tls, nicknames, ident, realname,
                                   services_username, services_password,
                                   oper_username, oper_password, command_trigger)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                network.name,
                network.address,
                network.port,
                network.tls,
                network.nicknames.join(", "),
                network.ident,
                network.realname,
                network.services_username,
                network.services_password,
                network.oper_username,
                network.oper_password,
                network.command_trigger,
            ],
        )
        .with_context(|| format!("Failed to add network {}", network.name))?;
        Ok(conn.last_insert_rowid())
    }

    /// Remove a network and its channels/plugin rows.
    /// Returns false if the network did not exist.
    pub fn remove_network(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM networks WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Ok(false);
        }
        conn.execute("DELETE FROM channels WHERE network_id = ?1", params![id])?;
        conn.execute("DELETE FROM plugins WHERE network_id = ?1", params![id])?;
        tracing::info!(network_id = id, "Removed network from database");
        Ok(true)
    }

    /// Apply a partial update. Returns false if the network did not exist.
    pub fn update_network(&self, id: i64, update: &NetworkUpdate) -> Result<bool> {
        use rusqlite::types::Value;

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        macro_rules! set {
            ($field:expr, $column:literal, $to:expr) => {
                if let Some(ref v) = $field {
                    sets.push(format!("{} = ?{}", $column, sets.len() + 1));
                    values.push($to(v));
                }
            };
        }

        let text = |v: &String| Value::Text(v.clone());
        set!(update.name, "name", text);
        set!(update.address, "address", text);
        set!(update.port, "port", |v: &u16| Value::Integer(*v as i64));
        set!(update.tls, "tls", |v: &bool| Value::Integer(*v as i64));
        set!(update.nicknames, "nicknames", |v: &Vec<String>| Value::Text(v.join(", ")));
        set!(update.ident, "ident", text);
        set!(update.realname, "realname", text);
        set!(update.services_username, "services_username", text);
        set!(update.services_password, "services_password", text);
        set!(update.oper_username, "oper_username", text);
        set!(update.oper_password, "oper_password", text);
        set!(update.command_trigger, "command_trigger", text);

        if sets.is_empty() {
            return Ok(self.network(id)?.is_some());
        }

        let sql = format!(
            "UPDATE networks SET {} WHERE id = ?{}",
            sets.join(", "),
            sets.len() + 1
        );
        values.push(Value::Integer(id));

        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(changed > 0)
    }

    // ── Channels ───────────────────────────────────────────────────────

    /// Auto-join channels for a network.
    pub fn channels(&self, network_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM channels WHERE network_id = ?1 ORDER BY name ASC")?;
        let channels = stmt
            .query_map(params![network_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    /// Add a channel to the auto-join list. Duplicates are a logged no-op.
    pub fn add_channel(&self, network_id: i64, channel: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO channels (network_id, name) VALUES (?1, ?2)",
            params![network_id, channel],
        )?;
        if inserted > 0 {
            tracing::info!(network_id, channel, "Added channel to database");
        } else {
            tracing::info!(network_id, channel, "Channel already in database");
        }
        Ok(())
    }

    pub fn remove_channel(&self, network_id: i64, channel: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM channels WHERE network_id = ?1 AND name = ?2",
            params![network_id, channel],
        )?;
        tracing::info!(network_id, channel, "Removed channel from database");
        Ok(())
    }

    // ── Plugins ────────────────────────────────────────────────────────

    /// Names of plugins enabled for a network.
    pub fn enabled_plugins(&self, network_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name FROM plugins WHERE network_id = ?1 AND enabled = 1 ORDER BY name ASC",
        )?;
        let plugins = stmt
            .query_map(params![network_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plugins)
    }

    /// Enable or disable a plugin for a network, inserting the row if new.
    pub fn set_plugin_enabled(&self, network_id: i64, plugin: &str, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO plugins (network_id, name, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(network_id, name) DO UPDATE SET enabled = ?3",
            params![network_id, plugin, enabled],
        )?;
        Ok(())
    }
}

fn map_network_row(row: &rusqlite::Row) -> rusqlite::Result<NetworkConfig> {
    let nicknames: String = row.get(5)?;
    Ok(NetworkConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        port: row.get::<_, i64>(3)? as u16,
        tls: row.get(4)?,
        nicknames: nicknames
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        ident: row.get(6)?,
        realname: row.get(7)?,
        services_username: row.get(8)?,
        services_password: row.get(9)?,
        oper_username: row.get(10)?,
        oper_password: row.get(11)?,
        command_trigger: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_network(name: &str) -> NewNetwork {
        NewNetwork {
            name: name.to_string(),
            address: "irc.example.net".to_string(),
            port: 6697,
            tls: true,
            nicknames: vec!["svc".to_string(), "svc-alt".to_string()],
            services_username: "svc".to_string(),
            services_password: "hunter2".to_string(),
            ..NewNetwork::default()
        }
    }

    #[test]
    fn roundtrip_network() {
        let db = Db::open_memory().unwrap();
        let id = db.add_network(&sample_network("libera")).unwrap();

        let networks = db.networks().unwrap();
        assert_eq!(networks.len(), 1);
        let net = &networks[0];
        assert_eq!(net.id, id);
        assert_eq!(net.name, "libera");
        assert_eq!(net.address, "irc.example.net");
        assert_eq!(net.port, 6697);
        assert!(net.tls);
        assert_eq!(net.nicknames, vec!["svc", "svc-alt"]);
        assert_eq!(net.primary_nickname(), "svc");
        assert_eq!(net.server_addr(), "irc.example.net:6697");
        assert_eq!(net.command_trigger, "!");
    }

    #[test]
    fn update_network_partial() {
        let db = Db::open_memory().unwrap();
        let id = db.add_network(&sample_network("oftc")).unwrap();

        let ok = db
            .update_network(
                id,
                &NetworkUpdate {
                    port: Some(6667),
                    tls: Some(false),
                    command_trigger: Some("~".to_string()),
                    ..NetworkUpdate::default()
                },
            )
            .unwrap();
        assert!(ok);

        let net = db.network(id).unwrap().unwrap();
        assert_eq!(net.port, 6667);
        assert!(!net.tls);
        assert_eq!(net.command_trigger, "~");
        // Untouched fields survive
        assert_eq!(net.address, "irc.example.net");
        assert_eq!(net.nicknames, vec!["svc", "svc-alt"]);

        assert!(!db.update_network(999, &NetworkUpdate {
            name: Some("nope".to_string()),
            ..NetworkUpdate::default()
        }).unwrap());
    }

    #[test]
    fn remove_network_clears_related_rows() {
        let db = Db::open_memory().unwrap();
        let id = db.add_network(&sample_network("efnet")).unwrap();
        db.add_channel(id, "#lounge").unwrap();
        db.set_plugin_enabled(id, "fun", true).unwrap();

        assert!(db.remove_network(id).unwrap());
        assert!(db.network(id).unwrap().is_none());
        assert!(db.channels(id).unwrap().is_empty());
        assert!(db.enabled_plugins(id).unwrap().is_empty());

        assert!(!db.remove_network(id).unwrap());
    }

    #[test]
    fn duplicate_channel_is_a_no_op() {
        let db = Db::open_memory().unwrap();
        let id = db.add_network(&sample_network("rizon")).unwrap();
        db.add_channel(id, "#lounge").unwrap();
        db.add_channel(id, "#lounge").unwrap();
        db.add_channel(id, "#dev").unwrap();

        assert_eq!(db.channels(id).unwrap(), vec!["#dev", "#lounge"]);

        db.remove_channel(id, "#lounge").unwrap();
        assert_eq!(db.channels(id).unwrap(), vec!["#dev"]);
    }

    #[test]
    fn channels_are_scoped_per_network() {
        let db = Db::open_memory().unwrap();
        let a = db.add_network(&sample_network("a")).unwrap();
        let b = db.add_network(&sample_network("b")).unwrap();
        db.add_channel(a, "#only-a").unwrap();

        assert_eq!(db.channels(a).unwrap(), vec!["#only-a"]);
        assert!(db.channels(b).unwrap().is_empty());
    }

    #[test]
    fn plugin_enablement_filters() {
        let db = Db::open_memory().unwrap();
        let id = db.add_network(&sample_network("snoonet")).unwrap();
        db.set_plugin_enabled(id, "fun", true).unwrap();
        db.set_plugin_enabled(id, "channel", true).unwrap();
        db.set_plugin_enabled(id, "network", false).unwrap();

        assert_eq!(db.enabled_plugins(id).unwrap(), vec!["channel", "fun"]);

        db.set_plugin_enabled(id, "fun", false).unwrap();
        assert_eq!(db.enabled_plugins(id).unwrap(), vec!["channel"]);

        db.set_plugin_enabled(id, "network", true).unwrap();
        assert_eq!(db.enabled_plugins(id).unwrap(), vec!["channel", "network"]);
    }

    #[test]
    fn open_on_disk_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servicex.db");
        {
            let db = Db::open(&path).unwrap();
            db.add_network(&sample_network("disk")).unwrap();
        }
        let db = Db::open(&path).unwrap();
        assert_eq!(db.networks().unwrap().len(), 1);
    }
}
