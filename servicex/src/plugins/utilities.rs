//! Core utility commands: help, command listing, date, host info, echo,
//! nick control, plugin management, reminders, and task control.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;

use crate::output;
use crate::plugin::{Context, Plugin, PluginInfo};
use crate::scheduler::{TaskSnapshot, TaskSpec};
use crate::timefmt;

pub struct Utilities;

#[async_trait]
impl Plugin for Utilities {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "utilities",
            version: "2.0",
            description: "Core utility commands",
        }
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "help", "commands", "date", "uname", "echo", "nick", "plugin", "remind", "tasks",
        ]
    }

    fn variables(&self) -> &'static [&'static str] {
        &["nick", "date", "time"]
    }

    async fn execute(&self, ctx: &Context, command: &str, args: &[String]) -> Result<()> {
        match command {
            "help" => help(ctx).await,
            "commands" => commands(ctx).await,
            "date" => date(ctx, args).await,
            "uname" => uname(ctx, args).await,
            "echo" => echo(ctx, args).await,
            "nick" => nick(ctx, args).await,
            "plugin" => plugin(ctx, args).await,
            "remind" => remind(ctx, args).await,
            "tasks" => tasks(ctx, args).await,
            _ => Ok(()),
        }
    }

    fn expand(&self, ctx: &Context, variable: &str) -> Option<String> {
        match variable {
            "nick" => Some(ctx.state.nick()),
            "date" => Some(Local::now().format("%Y-%m-%d").to_string()),
            "time" => Some(Local::now().format("%H:%M:%S").to_string()),
            _ => None,
        }
    }
}

async fn help(ctx: &Context) -> Result<()> {
    let text = format!(
        "Hello there, I am a ServiceX bot called {}. For a list of commands, \
         send '{}commands' into a channel or 'commands' to me as a PM.",
        ctx.state.nick(),
        ctx.network.command_trigger
    );
    ctx.reply(&text).await
}

async fn commands(ctx: &Context) -> Result<()> {
    let commands = ctx.plugins.command_names();
    if commands.is_empty() {
        return ctx.reply("No commands available").await;
    }

    let plugin_count = ctx.plugins.loaded_names().len();
    let mut desc = if commands.len() == 1 {
        "is 1 command".to_string()
    } else {
        format!("are {} commands", commands.len())
    };
    if plugin_count == 1 {
        desc.push_str(" from a single plugin");
    } else {
        desc.push_str(&format!(" from {plugin_count} plugins"));
    }

    let listing = output::grid(&commands, 2);
    ctx.reply(&format!("There {desc} available, these commands are:\n{listing}"))
        .await
}

async fn date(ctx: &Context, args: &[String]) -> Result<()> {
    let mut offset = None;
    let mut fmt = None;
    let mut preset = None;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-t" | "--timezone" => offset = it.next().cloned(),
            "-f" | "--format" => fmt = it.next().cloned(),
            "-p" | "--preset" => preset = it.next().cloned(),
            other => {
                return ctx.reply(&format!("Invalid option: {other}")).await;
            }
        }
    }

    // Bare `date` behaves like the datetime preset
    let preset = preset.or_else(|| fmt.is_none().then(|| "datetime".to_string()));

    match timefmt::now_formatted(offset.as_deref(), preset.as_deref(), fmt.as_deref()) {
        Ok(out) => ctx.reply(&out).await,
        Err(e) => ctx.reply(&e.to_string()).await,
    }
}

async fn uname(ctx: &Context, args: &[String]) -> Result<()> {
    use sysinfo::System;

    let mut show = [false; 6]; // system, node, release, version, machine, os
    if args.is_empty() {
        show = [true; 6];
    }
    for arg in args {
        match arg.as_str() {
            "-s" | "--kernel-name" => show[0] = true,
            "-n" | "--nodename" => show[1] = true,
            "-r" | "--kernel-release" => show[2] = true,
            "-v" | "--kernel-version" => show[3] = true,
            "-m" | "--machine" => show[4] = true,
            "-o" | "--operating-system" => show[5] = true,
            "-a" | "--all" => show = [true; 6],
            other => {
                return ctx.reply(&format!("Invalid option: {other}")).await;
            }
        }
    }

    let unknown = || "unknown".to_string();
    let mut parts = Vec::new();
    if show[0] {
        parts.push(System::name().unwrap_or_else(unknown));
    }
    if show[1] {
        parts.push(System::host_name().unwrap_or_else(unknown));
    }
    if show[2] {
        parts.push(System::kernel_version().unwrap_or_else(unknown));
    }
    if show[3] {
        parts.push(System::os_version().unwrap_or_else(unknown));
    }
    if show[4] {
        parts.push(System::cpu_arch());
    }
    if show[5] {
        parts.push(System::long_os_version().unwrap_or_else(unknown));
    }
    ctx.reply(&parts.join(" ")).await
}

async fn echo(ctx: &Context, args: &[String]) -> Result<()> {
    let mut enable_escapes = false;
    let mut rest = args;
    while let Some(first) = rest.first() {
        match first.as_str() {
            "-e" => enable_escapes = true,
            // Accepted for familiarity; IRC lines have no trailing newline
            "-n" => {}
            _ => break,
        }
        rest = &rest[1..];
    }

    let message = rest.join(" ");
    let message = ctx.plugins.expand_variables(ctx, &message);

    if enable_escapes {
        let message = message.replace("\\t", "    ");
        for line in message.split("\\n") {
            ctx.reply(line).await?;
        }
        Ok(())
    } else {
        ctx.reply(&message).await
    }
}

async fn nick(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(new_nick) = args.first() else {
        return ctx.reply("Usage: nick NEWNICK").await;
    };
    ctx.client.set_nick(new_nick).await?;
    ctx.reply(&format!("Changing nickname to: {new_nick}")).await
}

async fn plugin(ctx: &Context, args: &[String]) -> Result<()> {
    let Some(subcommand) = args.first() else {
        return ctx.reply("Usage: plugin list|load|unload|enable|disable").await;
    };
    let names = &args[1..];

    match subcommand.as_str() {
        "list" => {
            let loaded = ctx.plugins.loaded_names();
            if loaded.is_empty() {
                ctx.reply("No plugins loaded").await
            } else {
                ctx.reply(&format!("Loaded plugins: {}", loaded.join(", ")))
                    .await
            }
        }
        "load" => {
            if names.is_empty() {
                return ctx.reply("Specify plugin(s) to load").await;
            }
            for name in names {
                match ctx.plugins.load(name) {
                    Ok(()) => ctx.reply(&format!("Loaded plugin: {name}")).await?,
                    Err(e) => ctx.reply(&format!("Failed to load {name}: {e}")).await?,
                }
            }
            Ok(())
        }
        "unload" => {
            if names.is_empty() {
                return ctx.reply("Specify plugin(s) to unload").await;
            }
            for name in names {
                if ctx.plugins.unload(name, &ctx.scheduler) {
                    ctx.reply(&format!("Unloaded plugin: {name}")).await?;
                } else {
                    ctx.reply(&format!("Failed to unload: {name}")).await?;
                }
            }
            Ok(())
        }
        "enable" => {
            if names.is_empty() {
                return ctx.reply("Specify plugin(s) to enable").await;
            }
            for name in names {
                ctx.db.set_plugin_enabled(ctx.network.id, name, true)?;
                ctx.reply(&format!("Enabled plugin: {name}")).await?;
            }
            Ok(())
        }
        "disable" => {
            if names.is_empty() {
                return ctx.reply("Specify plugin(s) to disable").await;
            }
            for name in names {
                ctx.db.set_plugin_enabled(ctx.network.id, name, false)?;
                ctx.reply(&format!("Disabled plugin: {name}")).await?;
            }
            Ok(())
        }
        other => ctx.reply(&format!("Unknown subcommand: {other}")).await,
    }
}

async fn remind(ctx: &Context, args: &[String]) -> Result<()> {
    let usage = "Usage: remind SECONDS MESSAGE";
    let Some(seconds) = args.first() else {
        return ctx.reply(usage).await;
    };
    let Ok(seconds) = seconds.parse::<u64>() else {
        return ctx.reply(&format!("Invalid delay: {seconds}")).await;
    };
    let message = args[1..].join(" ");
    if message.is_empty() {
        return ctx.reply(usage).await;
    }

    let client = ctx.client.clone();
    let target = ctx.target.clone();
    let text = format!("{}: Reminder: {message}", ctx.sender);
    let id = ctx.scheduler.add_started(
        TaskSpec {
            name: format!("remind-{}", ctx.sender),
            periodic: false,
            delay: Duration::from_secs(seconds),
            plugin: Some("utilities".to_string()),
            description: message,
            ..TaskSpec::default()
        },
        Arc::new(move || {
            let client = client.clone();
            let target = target.clone();
            let text = text.clone();
            Box::pin(async move { client.privmsg(&target, &text).await })
        }),
    )?;

    ctx.reply(&format!("Reminder set in {seconds}s (task {id})")).await
}

fn task_line(task: &TaskSnapshot) -> String {
    let kind = if task.periodic { "periodic" } else { "one-shot" };
    format!(
        "{}  {:<9}  {}  runs:{}  {}",
        task.id,
        task.state.as_str(),
        kind,
        task.run_count,
        task.name
    )
}

async fn tasks(ctx: &Context, args: &[String]) -> Result<()> {
    let subcommand = args.first().map(String::as_str).unwrap_or("list");
    let id = args.get(1).map(String::as_str);

    match (subcommand, id) {
        ("list", _) => {
            let tasks = ctx.scheduler.list(None, None);
            if tasks.is_empty() {
                return ctx.reply("No scheduled tasks").await;
            }
            let lines: Vec<String> = tasks.iter().map(task_line).collect();
            ctx.reply(&lines.join("\n")).await
        }
        ("info", Some(id)) => match ctx.scheduler.get(id) {
            Some(task) => {
                let interval = task
                    .interval
                    .map(|i| format!("{}s", i.as_secs()))
                    .unwrap_or_else(|| "-".to_string());
                let max = task
                    .max_runs
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "unlimited".to_string());
                let detail = format!(
                    "Task: {} ({})\nState: {}\nInterval: {interval}\nRuns: {}/{max}\nPlugin: {}\nDescription: {}",
                    task.name,
                    task.id,
                    task.state.as_str(),
                    task.run_count,
                    task.plugin.as_deref().unwrap_or("-"),
                    if task.description.is_empty() { "-" } else { &task.description },
                );
                ctx.reply(&detail).await
            }
            None => ctx.reply(&format!("Task not found: {id}")).await,
        },
        ("start", Some(id)) => reply_result(ctx, ctx.scheduler.start(id), "Started", id).await,
        ("stop", Some(id)) => reply_result(ctx, ctx.scheduler.stop(id), "Stopped", id).await,
        ("pause", Some(id)) => reply_result(ctx, ctx.scheduler.pause(id), "Paused", id).await,
        ("resume", Some(id)) => reply_result(ctx, ctx.scheduler.resume(id), "Resumed", id).await,
        ("remove", Some(id)) => reply_result(ctx, ctx.scheduler.remove(id), "Removed", id).await,
        _ => {
            ctx.reply("Usage: tasks [list|info ID|start ID|stop ID|pause ID|resume ID|remove ID]")
                .await
        }
    }
}

async fn reply_result(ctx: &Context, ok: bool, verb: &str, id: &str) -> Result<()> {
    if ok {
        ctx.reply(&format!("{verb} task {id}")).await
    } else {
        ctx.reply(&format!("Could not {} task {id}", verb.to_lowercase()))
            .await
    }
}
