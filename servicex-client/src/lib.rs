//! Async IRC client SDK for ServiceX.
//!
//! Provides the wire-format types, connection management, and the event
//! stream that the bot process consumes. The SDK knows nothing about
//! plugins or persistence — it speaks RFC 1459 and hands everything else
//! to the consumer as [`event::Event`]s.

pub mod client;
pub mod event;
pub mod irc;
