use std::{net::SocketAddr, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    config::SessionOptions,
    event::{Direction, Event, EventSink, SessionId},
    logger::LoggingStream,
    relay::{CopyTracker, duplex},
};

/// One end of a session: the connected stream and the address of the party
/// behind it.
pub struct Peer<S> {
    pub stream: S,
    pub addr: SocketAddr,
}

impl<S> Peer<S> {
    pub const fn new(stream: S, addr: SocketAddr) -> Self {
        Self { stream, addr }
    }
}

/// Runs client/server pairs from establishment to close.
pub struct SessionHandler {
    options: SessionOptions,
    sink: Arc<dyn EventSink>,
    copies: CopyTracker,
}

impl SessionHandler {
    pub fn new(options: SessionOptions, sink: Arc<dyn EventSink>, copies: CopyTracker) -> Self {
        Self {
            options,
            sink,
            copies,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Relays between `client` and `server` until either side ends, then
    /// closes both. Returns once the session is over.
    #[tracing::instrument(skip_all, fields(id = id))]
    pub async fn handle<C, S>(&self, client: Peer<C>, server: Peer<S>, id: u64)
    where
        C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let session = SessionId::new(&self.options.prefix, id);
        let (client_addr, server_addr) = (client.addr, server.addr);
        self.sink.record(Event::Established {
            session: session.clone(),
            client: client_addr,
            server: server_addr,
        });

        let (relay, closer) = if self.options.log_data {
            // Each wrapper logs what is written into it, so it is tagged with
            // the party the bytes came from.
            let client = LoggingStream::new(
                client.stream,
                self.sink.clone(),
                session.clone(),
                Direction::Server,
                self.options.encoding,
            );
            let server = LoggingStream::new(
                server.stream,
                self.sink.clone(),
                session.clone(),
                Direction::Client,
                self.options.encoding,
            );
            duplex(client, server, &self.copies)
        } else {
            duplex(client.stream, server.stream, &self.copies)
        };

        let (result, remaining) = relay.first_finished().await;
        closer.close();
        // The closed record is the last one of the session, so the other
        // direction must have stopped writing first.
        remaining.join().await;
        self.sink.record(Event::Closed {
            session,
            client: client_addr,
            server: server_addr,
            error: result.err().map(|e| e.to_string()),
        });
    }
}
