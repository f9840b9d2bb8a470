//! RFC 1459 message framing.
//!
//! A line is `[:prefix] COMMAND [params...] [:trailing]`. Parsing is
//! lenient: malformed lines yield `None` rather than an error, since a
//! live network sends plenty of garbage worth ignoring.

use std::fmt;

/// A single parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Origin of the message (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Command word or three-digit numeric.
    pub command: String,
    /// Parameters, with any trailing parameter last.
    pub params: Vec<String>,
}

impl Message {
    /// Parse one line (with or without the CR LF terminator).
    pub fn parse(line: &str) -> Option<Message> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }

        let mut rest = line;
        let mut prefix = None;

        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, r) = stripped.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = r.trim_start();
        }

        let mut params = Vec::new();
        let command;
        match rest.split_once(' ') {
            Some((cmd, mut tail)) => {
                command = cmd.to_string();
                loop {
                    tail = tail.trim_start();
                    if tail.is_empty() {
                        break;
                    }
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((param, next)) => {
                            params.push(param.to_string());
                            tail = next;
                        }
                        None => {
                            params.push(tail.to_string());
                            break;
                        }
                    }
                }
            }
            None => command = rest.to_string(),
        }

        if command.is_empty() {
            return None;
        }

        Some(Message {
            prefix,
            command,
            params,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        for (i, param) in self.params.iter().enumerate() {
            let last = i == self.params.len() - 1;
            if last && (param.contains(' ') || param.starts_with(':') || param.is_empty()) {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

/// Extract the nick portion of a `nick!user@host` prefix.
/// Server prefixes (no `!`) are returned whole.
pub fn nick_from_prefix(prefix: &str) -> &str {
    prefix.split('!').next().unwrap_or(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_privmsg_with_prefix() {
        let msg = Message::parse(":alice!a@example.net PRIVMSG #chan :hello there\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!a@example.net"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hello there"]);
    }

    #[test]
    fn parse_without_prefix() {
        let msg = Message::parse("PING :irc.example.net").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn parse_numeric_with_many_params() {
        let msg = Message::parse(":server 433 * ServiceX :Nickname is already in use").unwrap();
        assert_eq!(msg.command, "433");
        assert_eq!(msg.params, vec!["*", "ServiceX", "Nickname is already in use"]);
    }

    #[test]
    fn parse_command_only() {
        let msg = Message::parse("QUIT").unwrap();
        assert_eq!(msg.command, "QUIT");
        assert!(msg.params.is_empty());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Message::parse("").is_none());
        assert!(Message::parse("\r\n").is_none());
        assert!(Message::parse(":prefix-without-command").is_none());
    }

    #[test]
    fn display_round_trips() {
        for line in [
            ":alice!a@host PRIVMSG #chan :hello there",
            "PING :token",
            "JOIN #chan",
            ":server 001 nick :Welcome to the network",
        ] {
            let msg = Message::parse(line).unwrap();
            assert_eq!(msg.to_string(), line);
        }
    }

    #[test]
    fn display_escapes_trailing_with_spaces() {
        let msg = Message {
            prefix: None,
            command: "PRIVMSG".to_string(),
            params: vec!["#chan".to_string(), "two words".to_string()],
        };
        assert_eq!(msg.to_string(), "PRIVMSG #chan :two words");
    }

    #[test]
    fn nick_extraction() {
        assert_eq!(nick_from_prefix("alice!a@example.net"), "alice");
        assert_eq!(nick_from_prefix("irc.example.net"), "irc.example.net");
    }
}
