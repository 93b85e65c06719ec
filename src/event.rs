use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tracing::{error, info};

/// Target for per-session records (established, data, closed, failed).
pub const SESSION_TARGET: &str = "logproxy::session";
/// Target for listener and dispatcher lifecycle records.
pub const LISTENER_TARGET: &str = "logproxy::listener";

/// Display identity of a session: the configured prefix followed by the
/// dispatcher's counter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionId(Arc<str>);

impl SessionId {
    #[must_use]
    pub fn new(prefix: &str, number: u64) -> Self {
        Self(format!("{prefix}{number}").into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Party the logged bytes came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Client,
    Server,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

/// How payload bytes are rendered in data records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Printable ASCII kept as is, everything else escaped (`\n`, `\x00`).
    #[default]
    Raw,
    /// Lowercase hex, two characters per byte.
    Hex,
}

impl Encoding {
    #[must_use]
    pub fn render(self, data: &[u8]) -> String {
        match self {
            Self::Raw => data.escape_ascii().to_string(),
            Self::Hex => hex::encode(data),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    ListenFailed {
        listen: SocketAddr,
        error: String,
    },
    ListenerStarted {
        listen: SocketAddr,
        remote: SocketAddr,
        prefix: Option<String>,
    },
    Accepted {
        client: SocketAddr,
    },
    AcceptFailed {
        error: String,
    },
    DialFailed {
        client: SocketAddr,
        error: String,
    },
    Established {
        session: SessionId,
        client: SocketAddr,
        server: SocketAddr,
    },
    Data {
        session: SessionId,
        src: Direction,
        data: Vec<u8>,
        encoding: Encoding,
        error: Option<String>,
    },
    Closed {
        session: SessionId,
        client: SocketAddr,
        server: SocketAddr,
        error: Option<String>,
    },
    /// The session task ended without reaching `Closed`, e.g. by panicking.
    SessionFailed {
        session: SessionId,
        error: String,
    },
}

impl Event {
    /// Session the event belongs to, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&SessionId> {
        match self {
            Self::Established { session, .. }
            | Self::Data { session, .. }
            | Self::Closed { session, .. }
            | Self::SessionFailed { session, .. } => Some(session),
            _ => None,
        }
    }
}

/// Destination for structured proxy events. Shared by every session, so
/// implementations must tolerate concurrent calls.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Forwards events to `tracing`, one record per event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: Event) {
        match event {
            Event::ListenFailed { listen, error } => {
                error!(target: LISTENER_TARGET, listen_addr = %listen, err = %error, "failed to start listener");
            }
            Event::ListenerStarted {
                listen,
                remote,
                prefix,
            } => {
                info!(
                    target: LISTENER_TARGET,
                    id_prefix = prefix.as_deref(),
                    listen_addr = %listen,
                    remote_addr = %remote,
                    "listener started"
                );
            }
            Event::Accepted { client } => {
                info!(target: LISTENER_TARGET, client_addr = %client, "connection accepted");
            }
            Event::AcceptFailed { error } => {
                error!(target: LISTENER_TARGET, err = %error, "accept connection failed");
            }
            Event::DialFailed { client, error } => {
                error!(target: LISTENER_TARGET, client_addr = %client, err = %error, "connect to server failed");
            }
            Event::Established {
                session,
                client,
                server,
            } => {
                info!(
                    target: SESSION_TARGET,
                    session = session.as_str(),
                    client_addr = %client,
                    server_addr = %server,
                    "connection established"
                );
            }
            Event::Data {
                session,
                src,
                data,
                encoding,
                error,
            } => {
                info!(
                    target: SESSION_TARGET,
                    session = session.as_str(),
                    src = src.as_str(),
                    data = %encoding.render(&data),
                    err = error.as_deref()
                );
            }
            Event::Closed {
                session,
                client,
                server,
                error,
            } => {
                info!(
                    target: SESSION_TARGET,
                    session = session.as_str(),
                    client_addr = %client,
                    server_addr = %server,
                    err = error.as_deref(),
                    "connection closed"
                );
            }
            Event::SessionFailed { session, error } => {
                error!(target: SESSION_TARGET, session = session.as_str(), err = %error, "session task failed");
            }
        }
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events belonging to one session, in the order they were recorded.
    #[must_use]
    pub fn session_events(&self, session: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.session().is_some_and(|id| id.as_str() == session))
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn session_id_appends_counter_to_prefix() {
        assert_eq!(SessionId::new("", 1).as_str(), "1");
        assert_eq!(SessionId::new("web-", 42).to_string(), "web-42");
    }

    #[test]
    fn hex_encoding_is_lowercase_pairs() {
        assert_eq!(Encoding::Hex.render(b"ping"), "70696e67");
        assert_eq!(Encoding::Hex.render(&[0x00, 0xff]), "00ff");
    }

    #[test]
    fn raw_encoding_escapes_non_printable_bytes() {
        assert_eq!(Encoding::Raw.render(b"pong"), "pong");
        assert_eq!(Encoding::Raw.render(b"a\r\n\x00"), "a\\r\\n\\x00");
    }

    #[test]
    fn direction_tags() {
        assert_eq!(Direction::Client.as_str(), "client");
        assert_eq!(Direction::Server.as_str(), "server");
    }

    #[test]
    fn recording_sink_filters_by_session() {
        let sink = RecordingSink::new();
        sink.record(Event::Accepted { client: addr(1) });
        sink.record(Event::Established {
            session: SessionId::new("", 1),
            client: addr(1),
            server: addr(2),
        });
        sink.record(Event::Established {
            session: SessionId::new("", 2),
            client: addr(3),
            server: addr(2),
        });

        assert_eq!(sink.events().len(), 3);
        let first = sink.session_events("1");
        assert_eq!(first.len(), 1);
        assert!(matches!(&first[0], Event::Established { client, .. } if *client == addr(1)));
    }

    #[test]
    fn tracing_sink_accepts_every_event_kind() {
        let session = SessionId::new("p", 7);
        let events = [
            Event::ListenFailed {
                listen: addr(1),
                error: "in use".into(),
            },
            Event::ListenerStarted {
                listen: addr(1),
                remote: addr(2),
                prefix: None,
            },
            Event::Accepted { client: addr(3) },
            Event::AcceptFailed {
                error: "too many files".into(),
            },
            Event::DialFailed {
                client: addr(3),
                error: "refused".into(),
            },
            Event::Established {
                session: session.clone(),
                client: addr(3),
                server: addr(2),
            },
            Event::Data {
                session: session.clone(),
                src: Direction::Client,
                data: b"ping".to_vec(),
                encoding: Encoding::Hex,
                error: None,
            },
            Event::Closed {
                session: session.clone(),
                client: addr(3),
                server: addr(2),
                error: None,
            },
            Event::SessionFailed {
                session,
                error: "task 1 panicked".into(),
            },
        ];
        for event in events {
            TracingSink.record(event);
        }
    }
}
