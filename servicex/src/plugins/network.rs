//! Network roster management over IRC: list, inspect, connect,
//! disconnect, and edit the database-backed network table.

use anyhow::Result;
use async_trait::async_trait;

use crate::db::{NetworkUpdate, NewNetwork};
use crate::network::NetworkStatus;
use crate::plugin::{Context, Plugin, PluginInfo};

pub struct Network;

#[async_trait]
impl Plugin for Network {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "network",
            version: "1.0",
            description: "IRC network management commands",
        }
    }

    fn commands(&self) -> &'static [&'static str] {
        &["network"]
    }

    async fn execute(&self, ctx: &Context, _command: &str, args: &[String]) -> Result<()> {
        const SUBCOMMANDS: &str =
            "list, info, current, connect, disconnect, reconnect, add, remove, modify";

        let Some(subcommand) = args.first() else {
            return ctx
                .reply(&format!("Usage: requires a subcommand: {SUBCOMMANDS}"))
                .await;
        };
        let subargs = &args[1..];

        match subcommand.to_lowercase().as_str() {
            "list" => list(ctx).await,
            "info" => info(ctx, subargs).await,
            "current" => current(ctx).await,
            "connect" => connect(ctx, subargs).await,
            "disconnect" => disconnect(ctx, subargs).await,
            "reconnect" => reconnect(ctx, subargs).await,
            "add" => add(ctx, subargs).await,
            "remove" => remove(ctx, subargs).await,
            "modify" => modify(ctx, subargs).await,
            other => {
                ctx.reply(&format!(
                    "Error: unknown subcommand: {other} - available: {SUBCOMMANDS}"
                ))
                .await
            }
        }
    }
}

fn format_status(status: &NetworkStatus) -> String {
    let mut lines = vec![
        format!("Network: {} (ID: {})", status.name, status.id),
        format!("  Address: {}:{}", status.address, status.port),
        format!("  TLS: {}", if status.tls { "Yes" } else { "No" }),
        format!(
            "  Status: {}",
            if status.connected { "Connected" } else { "Disconnected" }
        ),
    ];
    if let Some(ref nick) = status.nick {
        lines.push(format!("  Nickname: {nick}"));
    }
    if !status.channels.is_empty() {
        lines.push(format!("  Channels: {}", status.channels.join(", ")));
    }
    lines.join("\n")
}

/// Parse the leading NETWORK_ID argument, complaining to the user on
/// bad input.
async fn parse_id(ctx: &Context, args: &[String], usage: &str) -> Result<Option<i64>> {
    let Some(raw) = args.first() else {
        ctx.reply(usage).await?;
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            ctx.reply(&format!("Error: invalid network ID: {raw}")).await?;
            Ok(None)
        }
    }
}

async fn list(ctx: &Context) -> Result<()> {
    let networks = ctx.networks.list();
    if networks.is_empty() {
        return ctx.reply("No networks configured").await;
    }
    let lines: Vec<String> = networks
        .iter()
        .map(|n| {
            format!(
                "ID: {}, Name: {}, Address: {}, Port: {}",
                n.id, n.name, n.address, n.port
            )
        })
        .collect();
    ctx.reply(&lines.join("\n")).await
}

async fn info(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(id) = parse_id(ctx, args, "Usage: network info NETWORK_ID").await? else {
        return Ok(());
    };
    match ctx.networks.status(id) {
        Some(status) => ctx.reply(&format_status(&status)).await,
        None => ctx.reply(&format!("Error: network not found: {id}")).await,
    }
}

async fn current(ctx: &Context) -> Result<()> {
    match ctx.networks.status(ctx.network.id) {
        Some(status) => ctx.reply(&format_status(&status)).await,
        None => ctx.reply("Error: current network not found").await,
    }
}

async fn connect(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(id) = parse_id(ctx, args, "Usage: network connect NETWORK_ID").await? else {
        return Ok(());
    };
    if ctx.networks.connect(id)? {
        let name = ctx.networks.get(id).map(|n| n.name).unwrap_or_default();
        ctx.reply(&format!("Success: connecting to network: {name}"))
            .await
    } else {
        ctx.reply(&format!("Error: failed to connect to network: {id}"))
            .await
    }
}

async fn disconnect(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(id) = parse_id(ctx, args, "Usage: network disconnect NETWORK_ID").await? else {
        return Ok(());
    };
    if ctx.networks.disconnect(id).await {
        let name = ctx.networks.get(id).map(|n| n.name).unwrap_or_default();
        ctx.reply(&format!("Success: disconnected from network: {name}"))
            .await
    } else {
        ctx.reply(&format!("Error: failed to disconnect from network: {id}"))
            .await
    }
}

async fn reconnect(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(id) = parse_id(ctx, args, "Usage: network reconnect NETWORK_ID").await? else {
        return Ok(());
    };
    if ctx.networks.reconnect(id).await? {
        let name = ctx.networks.get(id).map(|n| n.name).unwrap_or_default();
        ctx.reply(&format!("Success: reconnecting to network: {name}"))
            .await
    } else {
        ctx.reply(&format!("Error: failed to reconnect to network: {id}"))
            .await
    }
}

async fn add(ctx: &Context, args: &[String]) -> Result<()> {
    let mut draft = NewNetwork::default();
    let mut name = None;
    let mut address = None;
    let mut port = None;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        macro_rules! value {
            () => {
                match it.next() {
                    Some(v) => v.clone(),
                    None => {
                        return ctx
                            .reply(&format!("Error: option {arg} requires a value"))
                            .await;
                    }
                }
            };
        }
        match arg.as_str() {
            "-n" | "--name" => name = Some(value!()),
            "-a" | "--address" => address = Some(value!()),
            "-p" | "--port" => match value!().parse::<u16>() {
                Ok(p) => port = Some(p),
                Err(_) => return ctx.reply("Error: port must be a number").await,
            },
            "-s" | "--ssl" => draft.tls = true,
            "--nick" => draft.nicknames = split_nicks(&value!()),
            "--ident" => draft.ident = value!(),
            "--realname" => draft.realname = value!(),
            "--services-user" => draft.services_username = value!(),
            "--services-pass" => draft.services_password = value!(),
            "--oper-user" => draft.oper_username = value!(),
            "--oper-pass" => draft.oper_password = value!(),
            "--trigger" => draft.command_trigger = value!(),
            other => return ctx.reply(&format!("Error: invalid option: {other}")).await,
        }
    }

    let Some(name) = name else {
        return ctx.reply("Error: network name required (-n NAME)").await;
    };
    let Some(address) = address else {
        return ctx.reply("Error: server address required (-a ADDRESS)").await;
    };
    draft.name = name.clone();
    draft.address = address;
    draft.port = port.unwrap_or(if draft.tls { 6697 } else { 6667 });

    let id = ctx.db.add_network(&draft)?;
    ctx.networks.reload()?;
    ctx.reply(&format!(
        "Success: added network '{name}' (ID: {id}). Use 'network connect {id}' to connect."
    ))
    .await
}

async fn remove(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(id) = parse_id(ctx, args, "Usage: network remove NETWORK_ID").await? else {
        return Ok(());
    };

    if ctx.networks.is_connected(id) {
        return ctx
            .reply(&format!(
                "Error: cannot remove connected network. Disconnect first with 'network disconnect {id}'"
            ))
            .await;
    }

    let name = ctx
        .networks
        .get(id)
        .map(|n| n.name)
        .unwrap_or_else(|| id.to_string());
    if ctx.db.remove_network(id)? {
        ctx.networks.reload()?;
        ctx.reply(&format!("Success: removed network '{name}' (ID: {id})"))
            .await
    } else {
        ctx.reply(&format!("Error: network {id} not found")).await
    }
}

async fn modify(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(id) = parse_id(ctx, args, "Usage: network modify NETWORK_ID [OPTIONS]").await? else {
        return Ok(());
    };
    let rest = &args[1..];
    if rest.is_empty() {
        return ctx.reply("Error: no modifications specified").await;
    }

    let mut update = NetworkUpdate::default();
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        macro_rules! value {
            () => {
                match it.next() {
                    Some(v) => v.clone(),
                    None => {
                        return ctx
                            .reply(&format!("Error: option {arg} requires a value"))
                            .await;
                    }
                }
            };
        }
        match arg.as_str() {
            "-n" | "--name" => update.name = Some(value!()),
            "-a" | "--address" => update.address = Some(value!()),
            "-p" | "--port" => match value!().parse::<u16>() {
                Ok(p) => update.port = Some(p),
                Err(_) => return ctx.reply("Error: port must be a number").await,
            },
            "-s" | "--ssl" => {
                let v = value!().to_lowercase();
                update.tls = Some(matches!(v.as_str(), "true" | "yes" | "1"));
            }
            "--nick" => update.nicknames = Some(split_nicks(&value!())),
            "--ident" => update.ident = Some(value!()),
            "--realname" => update.realname = Some(value!()),
            "--services-user" => update.services_username = Some(value!()),
            "--services-pass" => update.services_password = Some(value!()),
            "--oper-user" => update.oper_username = Some(value!()),
            "--oper-pass" => update.oper_password = Some(value!()),
            "--trigger" => update.command_trigger = Some(value!()),
            other => return ctx.reply(&format!("Error: invalid option: {other}")).await,
        }
    }

    if ctx.networks.is_connected(id) {
        ctx.reply(&format!(
            "Warning: network {id} is currently connected. Changes will take effect after reconnect."
        ))
        .await?;
    }

    if ctx.db.update_network(id, &update)? {
        ctx.networks.reload()?;
        ctx.reply(&format!("Success: modified network: {id}")).await
    } else {
        ctx.reply(&format!("Error: network not found: {id}")).await
    }
}

fn split_nicks(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
