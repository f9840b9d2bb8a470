//! Minimal SDK example — connects, joins a channel, and echoes
//! `!ping` with automatic reconnect.
//!
//! Usage:
//!   cargo run --example echo_bot -- --server 127.0.0.1:6667 --channel "#test"

use anyhow::Result;
use clap::Parser;
use servicex_client::client::{self, ConnectConfig, ReconnectConfig};
use servicex_client::event::Event;

#[derive(Parser)]
#[command(name = "echo-bot", about = "ServiceX SDK echo bot example")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:6667")]
    server: String,
    #[arg(long, default_value = "echobot")]
    nick: String,
    #[arg(long, default_value = "#test")]
    channel: String,
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = ConnectConfig {
        server_addr: args.server.clone(),
        nicks: vec![args.nick.clone(), format!("{}_", args.nick)],
        user: args.nick.clone(),
        realname: "ServiceX SDK example".to_string(),
        tls: args.tls,
        tls_insecure: false,
    };

    let channel = args.channel.clone();
    client::run_with_reconnect(config, ReconnectConfig::default(), move |handle, event| {
        let channel = channel.clone();
        Box::pin(async move {
            match event {
                Event::Registered { nick } => {
                    tracing::info!(nick, "Registered, joining {channel}");
                    handle.join(&channel).await?;
                }
                Event::Message { from, target, text } => {
                    if text.trim() == "!ping" {
                        handle.privmsg(&target, &format!("{from}: pong")).await?;
                    }
                }
                Event::Disconnected { reason } => {
                    tracing::warn!(reason, "Disconnected");
                }
                _ => {}
            }
            Ok(())
        })
    })
    .await
}
