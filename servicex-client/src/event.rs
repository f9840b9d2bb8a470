//! Events emitted by the IRC client for the bot layer to consume.

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone)]
pub enum Event {
    /// TCP (and TLS, if any) connection established.
    Connected,

    /// IRC registration complete. `nick` is our confirmed nick.
    Registered { nick: String },

    /// Someone joined a channel (possibly us).
    Joined { channel: String, nick: String },

    /// Someone left a channel.
    Parted { channel: String, nick: String },

    /// Someone was kicked from a channel.
    Kicked {
        channel: String,
        nick: String,
        by: String,
        reason: String,
    },

    /// A PRIVMSG in a channel or directly to us.
    Message {
        from: String,
        target: String,
        text: String,
    },

    /// A NOTICE from a user or services bot.
    Notice {
        from: String,
        target: String,
        text: String,
    },

    /// A NOTICE or error numeric from the server itself.
    ServerNotice { text: String },

    /// A user changed nick (possibly us).
    NickChanged { old_nick: String, new_nick: String },

    /// Someone quit the server.
    UserQuit { nick: String, reason: String },

    /// Connection was closed.
    Disconnected { reason: String },

    /// Raw server line (for debugging).
    RawLine(String),
}
