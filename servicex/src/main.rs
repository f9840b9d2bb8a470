//! servicex: a modular, database-driven IRC bot.
//!
//! Runs one session per configured network; all configuration lives in
//! the SQLite database. Subcommands cover the bootstrap problem (an
//! empty database has no network to receive IRC commands on):
//!
//!   servicex                      — run the bot
//!   servicex add-network ...      — add a network to the database
//!   servicex list-networks        — show the configured roster

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use servicex::db::{Db, NewNetwork};
use servicex::network::NetworkManager;
use servicex::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "servicex", about = "Modular, database-driven IRC bot")]
struct Args {
    /// SQLite database path
    #[arg(long, default_value = "servicex.db", env = "SERVICEX_DB")]
    db: PathBuf,

    /// Directory for daily log files (in addition to stderr)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Only connect to the named network (default: all)
    #[arg(long)]
    network: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Add an IRC network to the database
    AddNetwork {
        #[arg(long)]
        name: String,
        /// Server hostname or IP
        #[arg(long)]
        address: String,
        /// Defaults to 6697 with --tls, 6667 without
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        tls: bool,
        /// Comma-separated nicknames; the first is primary
        #[arg(long, default_value = "ServiceX")]
        nicks: String,
        #[arg(long, default_value = "servicex")]
        ident: String,
        #[arg(long, default_value = "ServiceX IRC Bot")]
        realname: String,
        #[arg(long, default_value = "")]
        services_user: String,
        #[arg(long, default_value = "")]
        services_pass: String,
        /// Command trigger prefix for channel messages
        #[arg(long, default_value = "!")]
        trigger: String,
        /// Comma-separated channels to auto-join
        #[arg(long, default_value = "")]
        channels: String,
        /// Comma-separated plugins to enable
        #[arg(long, default_value = "utilities,channel,fun,network")]
        plugins: String,
    },
    /// List configured networks
    ListNetworks,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_dir.as_deref())?;

    let db = Arc::new(Db::open(&args.db)?);
    tracing::info!(db = %args.db.display(), "Opened database");

    match args.command {
        Some(Cmd::AddNetwork {
            name,
            address,
            port,
            tls,
            nicks,
            ident,
            realname,
            services_user,
            services_pass,
            trigger,
            channels,
            plugins,
        }) => {
            let network = NewNetwork {
                name: name.clone(),
                address,
                port: port.unwrap_or(if tls { 6697 } else { 6667 }),
                tls,
                nicknames: split_list(&nicks),
                ident,
                realname,
                services_username: services_user,
                services_password: services_pass,
                command_trigger: trigger,
                ..NewNetwork::default()
            };
            let id = db.add_network(&network)?;
            for channel in split_list(&channels) {
                db.add_channel(id, &channel)?;
            }
            for plugin in split_list(&plugins) {
                db.set_plugin_enabled(id, &plugin, true)?;
            }
            println!("Added network '{name}' (ID: {id})");
            Ok(())
        }
        Some(Cmd::ListNetworks) => {
            let networks = db.networks()?;
            if networks.is_empty() {
                println!("No networks configured");
            }
            for net in networks {
                println!(
                    "ID: {}, Name: {}, Address: {}:{}, TLS: {}, Trigger: '{}'",
                    net.id,
                    net.name,
                    net.address,
                    net.port,
                    if net.tls { "yes" } else { "no" },
                    net.command_trigger
                );
            }
            Ok(())
        }
        None => run(db, args.network).await,
    }
}

async fn run(db: Arc<Db>, only: Option<String>) -> Result<()> {
    tracing::info!(version = %servicex::VERSION_REPLY, "ServiceX starting");

    let scheduler = Scheduler::new();
    let networks = NetworkManager::new(db, scheduler.clone());
    networks.reload()?;

    if networks.list().is_empty() {
        anyhow::bail!(
            "No networks configured. Add one with: servicex add-network --name NAME --address HOST"
        );
    }

    let count = match only {
        Some(name) => {
            let Some(config) = networks.list().into_iter().find(|n| n.name == name) else {
                anyhow::bail!("Network not found: {name}");
            };
            usize::from(networks.connect(config.id)?)
        }
        None => networks.connect_all()?,
    };
    tracing::info!(count, "Sessions started. Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.stop_all();
    networks.shutdown().await;
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn init_tracing(log_dir: Option<&Path>) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "servicex=info,servicex_client=info".into());

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}
