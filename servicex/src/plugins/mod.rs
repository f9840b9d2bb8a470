//! Built-in plugin set.
//!
//! Every plugin the binary ships is constructed here; the database
//! decides which of them are active on each network.

use std::sync::Arc;

use crate::plugin::Plugin;

pub mod channel;
pub mod fun;
pub mod network;
pub mod utilities;

/// All compiled-in plugins.
pub fn builtin() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(utilities::Utilities),
        Arc::new(channel::Channel),
        Arc::new(fun::Fun),
        Arc::new(network::Network),
    ]
}
