//! IRC client connection management.
//!
//! This is the main entry point for SDK consumers. It manages the TCP
//! connection, IRC registration, keepalive, and emits events. Supports
//! both plaintext and TLS connections.
//!
//! ## Nick collisions
//!
//! The config carries the full list of nicknames the operator registered
//! for the bot. On `433` the client walks the alternates in order, then
//! falls back to numeric suffixes on the primary nick, and finally gives
//! up and disconnects so reconnect logic can retry later.
//!
//! ## Reconnection
//!
//! [`run_with_reconnect`] wraps the connection in an exponential-backoff
//! loop (2s doubling to a 30s cap, with jitter). Consumers that need
//! finer control can drive [`establish_connection`] +
//! [`connect_with_stream`] themselves and listen for
//! [`Event::Disconnected`].

use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::event::Event;
use crate::irc::{Message, nick_from_prefix};

/// Errors produced while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("TCP connect to {addr} failed: {source}")]
    Tcp {
        addr: String,
        source: std::io::Error,
    },
    #[error("invalid TLS server name {name:?}")]
    ServerName { name: String },
    #[error("TLS handshake with {addr} failed: {source}")]
    Tls {
        addr: String,
        source: std::io::Error,
    },
}

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Nicknames in preference order; the first is the primary.
    pub nicks: Vec<String>,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
}

impl ConnectConfig {
    pub fn primary_nick(&self) -> &str {
        self.nicks.first().map(String::as_str).unwrap_or("servicex")
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nicks: vec!["servicex".to_string()],
            user: "servicex".to_string(),
            realname: "ServiceX IRC Bot".to_string(),
            tls: false,
            tls_insecure: false,
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug)]
pub enum Command {
    Join(String),
    Part(String),
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Nick(String),
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running IRC client connection.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    pub async fn join(&self, channel: &str) -> Result<()> {
        self.cmd_tx.send(Command::Join(channel.to_string())).await?;
        Ok(())
    }

    pub async fn part(&self, channel: &str) -> Result<()> {
        self.cmd_tx.send(Command::Part(channel.to_string())).await?;
        Ok(())
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Notice {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn set_nick(&self, nick: &str) -> Result<()> {
        self.cmd_tx.send(Command::Nick(nick.to_string())).await?;
        Ok(())
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.cmd_tx.send(Command::Raw(line.to_string())).await?;
        Ok(())
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx
            .send(Command::Quit(message.map(|s| s.to_string())))
            .await?;
        Ok(())
    }
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Establish TCP (and optionally TLS) connection to the server.
///
/// Connection errors surface here, before the protocol task spawns.
pub async fn establish_connection(
    config: &ConnectConfig,
) -> Result<EstablishedConnection, ConnectError> {
    // Auto-detect TLS from the conventional port if not explicitly set
    let use_tls = config.tls || config.server_addr.ends_with(":6697");
    let mode = if use_tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .map_err(|e| ConnectError::Tcp {
            addr: config.server_addr.clone(),
            source: e,
        })?;
    tracing::debug!("TCP connected to {} ({mode})", config.server_addr);

    if use_tls {
        let tls_config = if config.tls_insecure {
            tracing::debug!("TLS: insecure mode (skipping cert verification)");
            rustls_insecure_config()
        } else {
            rustls_default_config()
        };
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = config
            .server_addr
            .split(':')
            .next()
            .unwrap_or("localhost")
            .to_string();
        let dns_name = rustls::pki_types::ServerName::try_from(server_name.clone())
            .map_err(|_| ConnectError::ServerName { name: server_name })?;
        let tls_stream =
            connector
                .connect(dns_name, tcp)
                .await
                .map_err(|e| ConnectError::Tls {
                    addr: config.server_addr.clone(),
                    source: e,
                })?;
        tracing::debug!("TLS handshake complete");
        Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
    } else {
        Ok(EstablishedConnection::Plain(tcp))
    }
}

/// Connect using an already-established connection.
///
/// Returns a handle for sending commands and a receiver for events.
/// The IRC protocol runs in a spawned task.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    let handle = ClientHandle {
        cmd_tx: cmd_tx.clone(),
    };

    tokio::spawn(async move {
        let _ = event_tx.send(Event::Connected).await;
        let result = match conn {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tokio::io::split(tcp);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(*tls);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
        };
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

fn rustls_default_config() -> rustls::ClientConfig {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}

/// Pick the next nick to try after a `433` collision.
///
/// Walks the configured alternates first, then numeric suffixes on the
/// primary nick. Returns `None` once both pools are exhausted.
fn fallback_nick(nicks: &[String], tries: usize) -> Option<String> {
    let alternates = nicks.len().saturating_sub(1);
    if tries < alternates {
        return Some(nicks[tries + 1].clone());
    }
    let n = tries - alternates;
    if n < 5 {
        let primary = nicks.first().map(String::as_str).unwrap_or("servicex");
        return Some(format!("{primary}{}", n + 1));
    }
    None
}

async fn run_irc<R, W>(
    mut reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    writer
        .write_all(format!("NICK {}\r\n", config.primary_nick()).as_bytes())
        .await?;
    writer
        .write_all(format!("USER {} 0 * :{}\r\n", config.user, config.realname).as_bytes())
        .await?;

    let mut registered = false;
    let mut nick_tries: usize = 0;
    let mut pending_commands: Vec<Command> = Vec::new();
    let mut line_buf = String::new();
    let mut last_activity = tokio::time::Instant::now();
    let ping_interval = tokio::time::Duration::from_secs(60);
    let ping_timeout = tokio::time::Duration::from_secs(120);

    loop {
        tokio::select! {
            result = reader.read_line(&mut line_buf) => {
                let n = result?;
                if n == 0 {
                    let _ = event_tx.send(Event::Disconnected { reason: "EOF".to_string() }).await;
                    break;
                }

                last_activity = tokio::time::Instant::now();
                let raw = line_buf.trim_end().to_string();
                if event_tx.send(Event::RawLine(raw)).await.is_err() {
                    // Consumer is gone — no point keeping the socket alive
                    break;
                }

                if let Some(msg) = Message::parse(&line_buf) {
                    match msg.command.as_str() {
                        // ERR_NICKNAMEINUSE
                        "433" => {
                            match fallback_nick(&config.nicks, nick_tries) {
                                Some(alt) => {
                                    nick_tries += 1;
                                    tracing::info!(nick = %alt, "Nickname taken, trying alternate");
                                    writer.write_all(format!("NICK {alt}\r\n").as_bytes()).await?;
                                }
                                None => {
                                    let _ = event_tx.send(Event::Disconnected { reason: "All nicknames in use".to_string() }).await;
                                    break;
                                }
                            }
                        }
                        "PING" => {
                            let token = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                            writer.write_all(format!("PONG :{token}\r\n").as_bytes()).await?;
                        }
                        "001" => {
                            let nick = msg.params.first().cloned().unwrap_or_default();
                            let _ = event_tx.send(Event::Registered { nick }).await;
                            registered = true;
                            // Flush any commands that were queued before registration
                            for cmd in pending_commands.drain(..) {
                                execute_command(&mut writer, cmd).await?;
                            }
                        }
                        "JOIN" => {
                            let channel = msg.params.first().cloned().unwrap_or_default();
                            let nick = msg.prefix.as_deref().map(nick_from_prefix).unwrap_or("").to_string();
                            let _ = event_tx.send(Event::Joined { channel, nick }).await;
                        }
                        "PART" => {
                            let channel = msg.params.first().cloned().unwrap_or_default();
                            let nick = msg.prefix.as_deref().map(nick_from_prefix).unwrap_or("").to_string();
                            let _ = event_tx.send(Event::Parted { channel, nick }).await;
                        }
                        "KICK" => {
                            if msg.params.len() >= 2 {
                                let channel = msg.params[0].clone();
                                let nick = msg.params[1].clone();
                                let reason = msg.params.get(2).cloned().unwrap_or_default();
                                let by = msg.prefix.as_deref().map(nick_from_prefix).unwrap_or("server").to_string();
                                let _ = event_tx.send(Event::Kicked { channel, nick, by, reason }).await;
                            }
                        }
                        "NICK" => {
                            let old_nick = msg.prefix.as_deref().map(nick_from_prefix).unwrap_or("").to_string();
                            let new_nick = msg.params.first().cloned().unwrap_or_default();
                            if !old_nick.is_empty() && !new_nick.is_empty() {
                                let _ = event_tx.send(Event::NickChanged { old_nick, new_nick }).await;
                            }
                        }
                        "QUIT" => {
                            let nick = msg.prefix.as_deref().map(nick_from_prefix).unwrap_or("").to_string();
                            let reason = msg.params.first().cloned().unwrap_or_default();
                            let _ = event_tx.send(Event::UserQuit { nick, reason }).await;
                        }
                        "PRIVMSG" | "NOTICE" => {
                            if msg.params.len() >= 2 {
                                let prefix = msg.prefix.as_deref().unwrap_or("");
                                let is_server_notice = msg.command == "NOTICE" && !prefix.contains('!');
                                if is_server_notice {
                                    let text = msg.params[1].clone();
                                    let _ = event_tx.send(Event::ServerNotice { text }).await;
                                } else {
                                    let from = nick_from_prefix(prefix).to_string();
                                    let target = msg.params[0].clone();
                                    let text = msg.params[1].clone();
                                    let event = if msg.command == "NOTICE" {
                                        Event::Notice { from, target, text }
                                    } else {
                                        Event::Message { from, target, text }
                                    };
                                    let _ = event_tx.send(event).await;
                                }
                            }
                        }
                        _ => {
                            // Surface server error numerics so the bot can log them
                            if let Ok(num) = msg.command.parse::<u16>()
                                && (400..600).contains(&num)
                            {
                                let text = if msg.params.len() > 1 {
                                    msg.params[1..].join(" ")
                                } else {
                                    msg.params.join(" ")
                                };
                                let _ = event_tx.send(Event::ServerNotice { text }).await;
                            }
                        }
                    }
                }

                line_buf.clear();
            }
            Some(cmd) = cmd_rx.recv() => {
                if registered || matches!(cmd, Command::Quit(_)) {
                    let is_quit = matches!(cmd, Command::Quit(_));
                    execute_command(&mut writer, cmd).await?;
                    if is_quit && !registered {
                        break; // Quit before registration
                    }
                } else {
                    // Queue until registered — commands silently wait
                    pending_commands.push(cmd);
                }
            }
            // Periodic client-to-server PING and timeout detection
            _ = tokio::time::sleep_until(last_activity + ping_interval) => {
                if last_activity.elapsed() > ping_timeout {
                    let _ = event_tx.send(Event::Disconnected { reason: "Ping timeout".to_string() }).await;
                    break;
                }
                writer.write_all(b"PING :keepalive\r\n").await?;
            }
        }
    }

    Ok(())
}

/// Execute a single IRC command on the wire.
async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<()> {
    match cmd {
        Command::Join(channel) => {
            writer
                .write_all(format!("JOIN {channel}\r\n").as_bytes())
                .await?;
        }
        Command::Part(channel) => {
            writer
                .write_all(format!("PART {channel}\r\n").as_bytes())
                .await?;
        }
        Command::Privmsg { target, text } => {
            writer
                .write_all(format!("PRIVMSG {target} :{text}\r\n").as_bytes())
                .await?;
        }
        Command::Notice { target, text } => {
            writer
                .write_all(format!("NOTICE {target} :{text}\r\n").as_bytes())
                .await?;
        }
        Command::Nick(nick) => {
            writer
                .write_all(format!("NICK {nick}\r\n").as_bytes())
                .await?;
        }
        Command::Raw(line) => {
            writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        }
        Command::Quit(msg) => {
            let quit_line = match msg {
                Some(m) => format!("QUIT :{m}\r\n"),
                None => "QUIT\r\n".to_string(),
            };
            writer.write_all(quit_line.as_bytes()).await?;
        }
    }
    Ok(())
}

// ── Reconnect helper ──

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: std::time::Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: std::time::Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: std::time::Duration::from_secs(2),
            max_delay: std::time::Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// Run an event loop with automatic reconnection.
///
/// The `handler` is called for each event. When disconnected, the loop
/// reconnects with exponential backoff. The consumer is responsible for
/// re-joining channels when it sees [`Event::Registered`] again.
///
/// Returns only if the connection loop is aborted from outside.
pub async fn run_with_reconnect<F>(
    config: ConnectConfig,
    reconnect_config: ReconnectConfig,
    handler: F,
) -> Result<()>
where
    F: Fn(
            ClientHandle,
            Event,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
{
    let mut delay = reconnect_config.initial_delay;
    let mut consecutive_failures = 0u32;

    loop {
        let conn = match establish_connection(&config).await {
            Ok(c) => {
                consecutive_failures = 0;
                delay = reconnect_config.initial_delay;
                c
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    error = %e,
                    attempt = consecutive_failures,
                    delay_secs = delay.as_secs(),
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, &reconnect_config);
                continue;
            }
        };

        let (handle, mut events) = connect_with_stream(conn, config.clone());

        let mut disconnected = false;
        while let Some(event) = events.recv().await {
            if matches!(&event, Event::Disconnected { .. }) {
                disconnected = true;
            }
            if let Err(e) = handler(handle.clone(), event).await {
                // Non-fatal: keep the session alive
                tracing::error!(error = %e, "Handler error");
            }
            if disconnected {
                break;
            }
        }

        tracing::info!(delay_secs = delay.as_secs(), "Disconnected, will reconnect");
        tokio::time::sleep(delay).await;
        delay = next_delay(delay, &reconnect_config);
    }
}

/// Exponential backoff with jitter, capped at `max_delay`.
fn next_delay(current: std::time::Duration, config: &ReconnectConfig) -> std::time::Duration {
    let jitter = rand_jitter(current.as_millis() as u64 / 4);
    std::time::Duration::from_millis(
        ((current.as_millis() as f64 * config.backoff_factor) as u64 + jitter)
            .min(config.max_delay.as_millis() as u64),
    )
}

/// Random value in 0..max (0 when max is 0).
fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max)
}
