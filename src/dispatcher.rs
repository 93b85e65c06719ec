use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc,
};
use tracing::debug;

use crate::{
    event::{Event, EventSink, SessionId},
    session::{Peer, SessionHandler},
};

/// A client connection handed over by the listener.
pub struct Accepted {
    pub stream: TcpStream,
    pub addr: SocketAddr,
}

/// Turns accepted clients into sessions by dialing the remote for each one.
pub struct Dispatcher {
    remote: SocketAddr,
    handler: Arc<SessionHandler>,
    sink: Arc<dyn EventSink>,
    sessions: u64,
}

impl Dispatcher {
    /// Sessions run one at a time when the handler's options ask for it.
    pub fn new(remote: SocketAddr, handler: Arc<SessionHandler>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            remote,
            handler,
            sink,
            sessions: 0,
        }
    }

    /// Consumes the queue until every sender is gone.
    pub async fn run(mut self, mut incoming: mpsc::Receiver<Accepted>) {
        while let Some(client) = incoming.recv().await {
            self.dispatch(client).await;
        }
    }

    async fn dispatch(&mut self, mut client: Accepted) {
        let server = match TcpStream::connect(self.remote).await {
            Ok(server) => server,
            Err(e) => {
                self.sink.record(Event::DialFailed {
                    client: client.addr,
                    error: e.to_string(),
                });
                // Nothing else holds the client; close it now rather than
                // waiting for the peer to give up.
                if let Err(e) = client.stream.shutdown().await {
                    debug!(client_addr = %client.addr, err = %e, "client shutdown failed");
                }
                return;
            }
        };

        self.sessions += 1;
        let id = self.sessions;
        let server_addr = server.peer_addr().unwrap_or(self.remote);
        let handler = self.handler.clone();
        let session = tokio::spawn(async move {
            handler
                .handle(
                    Peer::new(client.stream, client.addr),
                    Peer::new(server, server_addr),
                    id,
                )
                .await;
        });

        // A panic stays inside the session task and comes back as a join error.
        let sink = self.sink.clone();
        let session_id = SessionId::new(&self.handler.options().prefix, id);
        let supervised = async move {
            if let Err(e) = session.await {
                sink.record(Event::SessionFailed {
                    session: session_id,
                    error: e.to_string(),
                });
            }
        };
        if self.handler.options().synchronous {
            supervised.await;
        } else {
            tokio::spawn(supervised);
        }
    }
}
