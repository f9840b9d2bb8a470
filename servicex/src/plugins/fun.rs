//! Entertainment commands: dice, coins, the 8-ball, block-digit art, and
//! developer excuses.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use regex::Regex;

use crate::plugin::{Context, Plugin, PluginInfo};
use crate::timefmt;

pub struct Fun;

#[async_trait]
impl Plugin for Fun {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "fun",
            version: "2.0",
            description: "Entertainment and novelty commands",
        }
    }

    fn commands(&self) -> &'static [&'static str] {
        &["dice", "coin", "8ball", "digits", "digiclock", "why"]
    }

    async fn execute(&self, ctx: &Context, command: &str, args: &[String]) -> Result<()> {
        match command {
            "dice" => dice(ctx, args).await,
            "coin" => coin(ctx, args).await,
            "8ball" => eight_ball(ctx, args).await,
            "digits" => digits(ctx, args).await,
            "digiclock" => digiclock(ctx, args).await,
            "why" => why(ctx).await,
            _ => Ok(()),
        }
    }
}

// ── Dice ───────────────────────────────────────────────────────────────

const MAX_DICE: u32 = 100;
const MAX_SIDES: u32 = 1000;

/// Validate a roll request. Returns a user-facing complaint on bad input.
fn check_roll(count: i64, sides: i64) -> Option<&'static str> {
    if count <= 0 {
        return Some("You appear to be rolling thin air.");
    }
    if count > MAX_DICE as i64 {
        return Some("That's too many dice! Maximum is 100.");
    }
    if sides < 2 {
        return Some("A one sided die is not possible, however a two sided die is.");
    }
    if sides > MAX_SIDES as i64 {
        return Some("That's too many sides! Maximum is 1000.");
    }
    None
}

fn format_rolls(sides: i64, results: &[u32]) -> String {
    match results {
        [only] => format!("You rolled a single die with {sides} sides and got a {only}."),
        [first, last] => {
            format!(
                "You rolled 2 dice with {sides} sides and got a {first} and a {last}. Total: {}",
                *first as u64 + *last as u64
            )
        }
        _ => {
            let total: u64 = results.iter().map(|r| *r as u64).sum();
            let head: Vec<String> = results[..results.len() - 1]
                .iter()
                .map(u32::to_string)
                .collect();
            format!(
                "You rolled {} dice with {sides} sides and got {}, and a {}. Total: {total}",
                results.len(),
                head.join(", "),
                results[results.len() - 1]
            )
        }
    }
}

async fn dice(ctx: &Context, args: &[String]) -> Result<()> {
    let mut count: i64 = 1;
    let mut sides: i64 = 6;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-c" | "--count" => match it.next().map(|v| v.parse()) {
                Some(Ok(v)) => count = v,
                _ => return ctx.reply("Invalid count").await,
            },
            "-s" | "--sides" => match it.next().map(|v| v.parse()) {
                Some(Ok(v)) => sides = v,
                _ => return ctx.reply("Invalid sides").await,
            },
            other => return ctx.reply(&format!("Invalid option: {other}")).await,
        }
    }

    if let Some(complaint) = check_roll(count, sides) {
        return ctx.reply(complaint).await;
    }

    let results: Vec<u32> = {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| rng.gen_range(1..=sides as u32)).collect()
    };
    ctx.reply(&format_rolls(sides, &results)).await
}

// ── Coins ──────────────────────────────────────────────────────────────

fn format_flips(results: &[&'static str]) -> String {
    if let [only] = results {
        return format!("You flipped: {only}");
    }
    let heads = results.iter().filter(|r| **r == "Heads").count();
    let tails = results.len() - heads;
    let head: Vec<&str> = results[..results.len() - 1].to_vec();
    format!(
        "You flipped {} coins: {}, and {}. (Heads: {heads}, Tails: {tails})",
        results.len(),
        head.join(", "),
        results[results.len() - 1]
    )
}

async fn coin(ctx: &Context, args: &[String]) -> Result<()> {
    let mut count: i64 = 1;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-c" | "--count" => match it.next().map(|v| v.parse()) {
                Some(Ok(v)) => count = v,
                _ => return ctx.reply("Invalid count").await,
            },
            other => return ctx.reply(&format!("Invalid option: {other}")).await,
        }
    }

    if count <= 0 {
        return ctx.reply("You need to flip at least one coin!").await;
    }
    if count > 100 {
        return ctx.reply("That's too many coins! Maximum is 100.").await;
    }

    let results: Vec<&'static str> = {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| if rng.gen_range(0..2) == 0 { "Heads" } else { "Tails" })
            .collect()
    };
    ctx.reply(&format_flips(&results)).await
}

// ── 8-ball ─────────────────────────────────────────────────────────────

const EIGHT_BALL_RESPONSES: &[&str] = &[
    // Positive
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes, definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    // Non-committal
    "Reply hazy, try again.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    // Negative
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

async fn eight_ball(ctx: &Context, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return ctx.reply("Ask me a question!").await;
    }
    let answer = {
        let mut rng = rand::thread_rng();
        EIGHT_BALL_RESPONSES[rng.gen_range(0..EIGHT_BALL_RESPONSES.len())]
    };
    ctx.reply(answer).await
}

// ── Block digits ───────────────────────────────────────────────────────

const ART_HEIGHT: usize = 5;

fn digit_art(c: char) -> Option<[&'static str; ART_HEIGHT]> {
    Some(match c {
        '0' => ["██████", "██  ██", "██  ██", "██  ██", "██████"],
        '1' => ["    ██", "    ██", "    ██", "    ██", "    ██"],
        '2' => ["██████", "    ██", "██████", "██    ", "██████"],
        '3' => ["██████", "    ██", "██████", "    ██", "██████"],
        '4' => ["██  ██", "██  ██", "██████", "    ██", "    ██"],
        '5' => ["██████", "██    ", "██████", "    ██", "██████"],
        '6' => ["██████", "██    ", "██████", "██  ██", "██████"],
        '7' => ["██████", "    ██", "    ██", "    ██", "    ██"],
        '8' => ["██████", "██  ██", "██████", "██  ██", "██████"],
        '9' => ["██████", "██  ██", "██████", "    ██", "██████"],
        ':' => ["      ", "  ██  ", "      ", "  ██  ", "      "],
        _ => return None,
    })
}

/// Render supported characters as block art, one output line per row.
fn render_art(text: &str) -> Vec<String> {
    let glyphs: Vec<[&'static str; ART_HEIGHT]> = text.chars().filter_map(digit_art).collect();
    if glyphs.is_empty() {
        return Vec::new();
    }
    (0..ART_HEIGHT)
        .map(|row| {
            glyphs
                .iter()
                .map(|g| g[row])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

async fn digits(ctx: &Context, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return ctx.reply("Usage: digits NUMBER [NUMBER...]").await;
    }
    let text: String = args.concat().chars().filter(char::is_ascii_digit).collect();
    if text.is_empty() {
        return ctx.reply("No valid digits provided").await;
    }
    if text.len() > 20 {
        return ctx.reply("Too many digits! Maximum is 20.").await;
    }
    for line in render_art(&text) {
        ctx.reply(&line).await?;
    }
    Ok(())
}

async fn digiclock(ctx: &Context, args: &[String]) -> Result<()> {
    let mut offset = None;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-t" | "--timezone" => offset = it.next().cloned(),
            other => return ctx.reply(&format!("Invalid option: {other}")).await,
        }
    }

    let time = match timefmt::now_formatted(offset.as_deref(), Some("time"), None) {
        Ok(t) => t,
        Err(e) => return ctx.reply(&e.to_string()).await,
    };
    for line in render_art(&time) {
        ctx.reply(&line).await?;
    }
    Ok(())
}

// ── Developer excuses ──────────────────────────────────────────────────

const EXCUSE_URL: &str = "http://developerexcuses.com/";

static EXCUSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a\s[^>]*>([^<]+)</a>").unwrap());

async fn fetch_excuse() -> String {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => return format!("Failed to fetch excuse: {e}"),
    };
    let body = match client.get(EXCUSE_URL).send().await {
        Ok(resp) => match resp.error_for_status() {
            Ok(resp) => match resp.text().await {
                Ok(body) => body,
                Err(e) => return format!("Failed to fetch excuse: {e}"),
            },
            Err(e) => return format!("Failed to fetch excuse: {e}"),
        },
        Err(e) => return format!("Failed to fetch excuse: {e}"),
    };
    match EXCUSE_RE.captures(&body) {
        Some(caps) => caps[1].trim().to_string(),
        None => "Could not parse excuse from website".to_string(),
    }
}

async fn why(ctx: &Context) -> Result<()> {
    let excuse = fetch_excuse().await;
    ctx.reply(&excuse).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_validation() {
        assert!(check_roll(1, 6).is_none());
        assert!(check_roll(100, 1000).is_none());
        assert_eq!(check_roll(0, 6), Some("You appear to be rolling thin air."));
        assert!(check_roll(101, 6).unwrap().contains("too many dice"));
        assert!(check_roll(1, 1).unwrap().contains("one sided die"));
        assert!(check_roll(1, 1001).unwrap().contains("too many sides"));
    }

    #[test]
    fn roll_formatting() {
        assert_eq!(
            format_rolls(6, &[4]),
            "You rolled a single die with 6 sides and got a 4."
        );
        assert_eq!(
            format_rolls(6, &[2, 5]),
            "You rolled 2 dice with 6 sides and got a 2 and a 5. Total: 7"
        );
        assert_eq!(
            format_rolls(20, &[1, 2, 3]),
            "You rolled 3 dice with 20 sides and got 1, 2, and a 3. Total: 6"
        );
    }

    #[test]
    fn flip_formatting() {
        assert_eq!(format_flips(&["Heads"]), "You flipped: Heads");
        assert_eq!(
            format_flips(&["Heads", "Tails", "Heads"]),
            "You flipped 3 coins: Heads, Tails, and Heads. (Heads: 2, Tails: 1)"
        );
    }

    #[test]
    fn art_dimensions() {
        let lines = render_art("12:34");
        assert_eq!(lines.len(), ART_HEIGHT);
        // Five glyphs of width 6, four single-space separators
        for line in &lines {
            assert_eq!(line.chars().count(), 5 * 6 + 4);
        }
    }

    #[test]
    fn art_skips_unsupported_chars() {
        assert!(render_art("abc").is_empty());
        assert_eq!(render_art("1a2").len(), ART_HEIGHT);
    }

    #[test]
    fn excuse_extraction() {
        let html = r#"<html><body><center><a href="/" rel="nofollow">It works on my machine</a></center></body></html>"#;
        let caps = EXCUSE_RE.captures(html).unwrap();
        assert_eq!(&caps[1], "It works on my machine");
    }
}
