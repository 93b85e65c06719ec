//! TCP Logging Proxy
//!
//! A transparent TCP forwarding proxy. Every client connection is paired with a
//! fresh connection to a fixed remote, bytes are relayed both ways untouched, and
//! each relayed write can be recorded as a structured log event.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod listener;
pub mod logger;
pub mod logging;
pub mod relay;
pub mod session;

// Re-export commonly used types and functions
pub use cli::Args;
pub use config::{Config, LogOptions, SessionOptions, Settings, load_config};
pub use dispatcher::{Accepted, Dispatcher};
pub use event::{Direction, Encoding, Event, EventSink, RecordingSink, SessionId, TracingSink};
pub use listener::{Proxy, serve};
pub use logger::LoggingStream;
pub use relay::{Closer, CopyTracker, Relay, Remaining, duplex};
pub use session::{Peer, SessionHandler};
