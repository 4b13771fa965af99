//! Real-time activity stream: transport seams, backoff, connection manager.

pub mod backoff;
pub mod manager;
pub mod powertrack;
pub mod types;

pub use manager::{ManagerSettings, StreamConnectionManager};
pub use powertrack::{PowertrackRules, PowertrackStream};
pub use types::{RuleSync, StreamEvent, StreamRule, StreamTransport, TransportSession};
