//! Channel management commands: join/part/cycle plus the persisted
//! auto-join list.

use anyhow::Result;
use async_trait::async_trait;

use crate::output;
use crate::plugin::{Context, Plugin, PluginInfo};

pub struct Channel;

#[async_trait]
impl Plugin for Channel {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "channel",
            version: "2.0",
            description: "IRC channel management and information commands",
        }
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "chanjoin", "chanpart", "chancycle", "chanlist", "chaninfo", "chansave", "chanunsave",
        ]
    }

    async fn execute(&self, ctx: &Context, command: &str, args: &[String]) -> Result<()> {
        match command {
            "chanjoin" => chanjoin(ctx, args).await,
            "chanpart" => chanpart(ctx, args).await,
            "chancycle" => chancycle(ctx, args).await,
            "chanlist" => chanlist(ctx, args).await,
            "chaninfo" => chaninfo(ctx, args).await,
            "chansave" => chansave(ctx, args).await,
            "chanunsave" => chanunsave(ctx, args).await,
            _ => Ok(()),
        }
    }
}

/// Resolve the channel argument: explicit argument first, else the
/// current channel. Replies with usage/validation errors itself.
async fn resolve_channel(
    ctx: &Context,
    args: &[String],
    usage: &str,
) -> Result<Option<String>> {
    let channel = match args.first() {
        Some(c) => c.clone(),
        None if ctx.target.starts_with('#') => ctx.target.clone(),
        None => {
            ctx.reply(usage).await?;
            return Ok(None);
        }
    };
    if !channel.starts_with('#') {
        ctx.reply(&format!("Invalid channel name: {channel}")).await?;
        return Ok(None);
    }
    Ok(Some(channel))
}

async fn chanjoin(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(channel) = resolve_channel(ctx, args, "Usage: chanjoin [channel]").await? else {
        return Ok(());
    };
    ctx.reply(&format!("Joining channel: {channel}")).await?;
    ctx.join_channel(&channel, true).await
}

async fn chanpart(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(channel) = resolve_channel(ctx, args, "Usage: chanpart [channel]").await? else {
        return Ok(());
    };
    ctx.reply(&format!("Parting channel: {channel}")).await?;
    ctx.part_channel(&channel, true).await
}

async fn chancycle(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(channel) = resolve_channel(ctx, args, "Usage: chancycle [channel]").await? else {
        return Ok(());
    };
    ctx.reply(&format!("Cycling channel: {channel}")).await?;
    ctx.client.part(&channel).await?;
    ctx.client.join(&channel).await
}

async fn chanlist(ctx: &Context, args: &[String]) -> Result<()> {
    let mode = args
        .first()
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "simple".to_string());
    let channels = ctx.state.joined_channels();

    match mode.as_str() {
        "count" => ctx.reply(&channels.len().to_string()).await,
        "fancy" => ctx.reply(&output::channel_summary(&channels)).await,
        "simple" => {
            if channels.is_empty() {
                ctx.reply("Not in any channels").await
            } else {
                ctx.reply(&channels.join(", ")).await
            }
        }
        other => {
            ctx.reply(&format!("Unknown mode: {other}. Use: simple, count, or fancy"))
                .await
        }
    }
}

async fn chaninfo(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(channel) = resolve_channel(ctx, args, "Usage: chaninfo [channel]").await? else {
        return Ok(());
    };

    let status = if ctx.state.is_joined(&channel) {
        "Joined"
    } else {
        "Not joined"
    };
    let saved = ctx.db.channels(ctx.network.id)?.contains(&channel);
    let autojoin = if saved { "Yes" } else { "No" };

    ctx.reply(&format!(
        "Channel: {channel}\nStatus: {status}\nAuto-join: {autojoin}"
    ))
    .await
}

async fn chansave(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(channel) = resolve_channel(ctx, args, "Usage: chansave [channel]").await? else {
        return Ok(());
    };

    if ctx.db.channels(ctx.network.id)?.contains(&channel) {
        ctx.reply(&format!("Channel {channel} already saved")).await
    } else {
        ctx.db.add_channel(ctx.network.id, &channel)?;
        ctx.reply(&format!("Saved channel {channel} for auto-join"))
            .await
    }
}

async fn chanunsave(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(channel) = resolve_channel(ctx, args, "Usage: chanunsave [channel]").await? else {
        return Ok(());
    };

    if !ctx.db.channels(ctx.network.id)?.contains(&channel) {
        ctx.reply(&format!("Channel {channel} not in auto-join list"))
            .await
    } else {
        ctx.db.remove_channel(ctx.network.id, &channel)?;
        ctx.reply(&format!("Removed {channel} from auto-join list"))
            .await
    }
}
