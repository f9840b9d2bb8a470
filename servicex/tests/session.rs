//! End-to-end session test against a scripted IRC server on loopback:
//! registration, services identify, auto-join from the database, and
//! command dispatch through the plugin registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use servicex::db::{Db, NewNetwork};
use servicex::network::NetworkManager;
use servicex::scheduler::Scheduler;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Read lines until one satisfies `pred`; panics on EOF or timeout.
async fn expect_line<F>(reader: &mut BufReader<OwnedReadHalf>, what: &str, pred: F) -> String
where
    F: Fn(&str) -> bool,
{
    tokio::time::timeout(STEP_TIMEOUT, async {
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await.expect("read failed");
            assert!(n > 0, "EOF while waiting for {what}");
            let trimmed = line.trim_end();
            if pred(trimmed) {
                return trimmed.to_string();
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) {
    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .expect("write failed");
}

#[tokio::test]
async fn session_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let db = Arc::new(Db::open_memory().unwrap());
    let id = db
        .add_network(&NewNetwork {
            name: "loopback".to_string(),
            address: "127.0.0.1".to_string(),
            port,
            nicknames: vec!["svc".to_string()],
            ident: "svc".to_string(),
            services_username: "svcacct".to_string(),
            services_password: "hunter2".to_string(),
            ..NewNetwork::default()
        })
        .unwrap();
    db.add_channel(id, "#lounge").unwrap();
    for plugin in ["utilities", "channel", "fun"] {
        db.set_plugin_enabled(id, plugin, true).unwrap();
    }

    let manager = NetworkManager::new(db, Scheduler::new());
    manager.reload().unwrap();
    assert!(manager.connect(id).unwrap());

    let (sock, _) = tokio::time::timeout(STEP_TIMEOUT, listener.accept())
        .await
        .expect("bot never connected")
        .unwrap();
    let (read_half, mut writer) = sock.into_split();
    let mut reader = BufReader::new(read_half);

    // Registration
    expect_line(&mut reader, "NICK", |l| l == "NICK svc").await;
    expect_line(&mut reader, "USER", |l| l.starts_with("USER svc ")).await;
    send(&mut writer, ":test.server 001 svc :Welcome to the test network").await;

    // Services identify, then the persisted channel join
    expect_line(&mut reader, "NickServ IDENTIFY", |l| {
        l == "PRIVMSG NickServ :IDENTIFY svcacct hunter2"
    })
    .await;
    expect_line(&mut reader, "JOIN", |l| l == "JOIN #lounge").await;
    send(&mut writer, ":svc!svc@test JOIN #lounge").await;

    // Wait until the session has recorded the join
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let status = manager.status(id).unwrap();
            if status.connected && status.channels == vec!["#lounge".to_string()] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never recorded the join");
    assert_eq!(manager.status(id).unwrap().nick.as_deref(), Some("svc"));

    // Triggered channel command, prefixed reply
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :!dice").await;
    expect_line(&mut reader, "dice reply", |l| {
        l.starts_with("PRIVMSG #lounge :alice: You rolled a single die with 6 sides")
    })
    .await;

    // Untriggered channel chatter is ignored; unknown commands are not
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :just chatting").await;
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :!bogus").await;
    expect_line(&mut reader, "unknown command reply", |l| {
        l == "PRIVMSG #lounge :alice: Command not found"
    })
    .await;

    // chanlist sees the live joined set
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :!chanlist").await;
    expect_line(&mut reader, "chanlist reply", |l| {
        l == "PRIVMSG #lounge :alice: #lounge"
    })
    .await;

    // Variable expansion through echo
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :!echo I am $nick").await;
    expect_line(&mut reader, "echo reply", |l| {
        l == "PRIVMSG #lounge :alice: I am svc"
    })
    .await;

    // PMs are implicit commands and replies are unprefixed
    send(&mut writer, ":alice!a@test PRIVMSG svc :help").await;
    expect_line(&mut reader, "help reply", |l| {
        l.starts_with("PRIVMSG alice :Hello there, I am a ServiceX bot called svc")
    })
    .await;

    // Unterminated quotes get a user-visible complaint
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :!echo \"oops").await;
    expect_line(&mut reader, "quote complaint", |l| {
        l == "PRIVMSG #lounge :alice: Missing closing quotation mark"
    })
    .await;

    // CTCP VERSION gets a NOTICE back
    send(&mut writer, ":alice!a@test PRIVMSG svc :\u{1}VERSION\u{1}").await;
    expect_line(&mut reader, "CTCP VERSION reply", |l| {
        l.starts_with("NOTICE alice :\u{1}VERSION ServiceX")
    })
    .await;

    // chansave persists to the database from IRC
    send(&mut writer, ":alice!a@test PRIVMSG #lounge :!chansave #backroom").await;
    expect_line(&mut reader, "chansave reply", |l| {
        l == "PRIVMSG #lounge :alice: Saved channel #backroom for auto-join"
    })
    .await;

    // Shutdown QUITs the live connection
    assert!(manager.disconnect(id).await);
    expect_line(&mut reader, "QUIT", |l| l.starts_with("QUIT")).await;
    assert!(!manager.is_connected(id));
}
