use anyhow::{Context, Result, anyhow};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::mpsc};

use crate::{
    config::Config,
    dispatcher::{Accepted, Dispatcher},
    event::{Event, EventSink},
    relay::CopyTracker,
    session::SessionHandler,
};

/// A bound proxy listener, ready to accept clients.
pub struct Proxy {
    listener: TcpListener,
    config: Config,
    sink: Arc<dyn EventSink>,
    copies: CopyTracker,
}

impl Proxy {
    pub async fn bind(config: Config, sink: Arc<dyn EventSink>) -> Result<Self> {
        let listener = match TcpListener::bind(config.listen).await {
            Ok(listener) => listener,
            Err(e) => {
                sink.record(Event::ListenFailed {
                    listen: config.listen,
                    error: e.to_string(),
                });
                return Err(e)
                    .with_context(|| format!("Failed to bind to address {}", config.listen));
            }
        };

        Ok(Self {
            listener,
            config,
            sink,
            copies: CopyTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to get listener local address")
    }

    /// Tracker shared by every relay this proxy starts.
    #[must_use]
    pub fn copies(&self) -> CopyTracker {
        self.copies.clone()
    }

    /// Accepts clients forever. Only returns if the dispatcher stops.
    pub async fn run(self) -> Result<()> {
        let listen = self.local_addr()?;
        let remote = self.config.remote;
        let prefix = &self.config.session.prefix;
        self.sink.record(Event::ListenerStarted {
            listen,
            remote,
            prefix: (!prefix.is_empty()).then(|| prefix.clone()),
        });

        let handler = Arc::new(SessionHandler::new(
            self.config.session.clone(),
            self.sink.clone(),
            self.copies.clone(),
        ));
        let dispatcher = Dispatcher::new(remote, handler, self.sink.clone());
        let (queue, incoming) = mpsc::channel(1);
        let dispatcher = tokio::spawn(dispatcher.run(incoming));

        loop {
            // Only accept once the dispatcher has room, so a busy dispatcher
            // holds back the accept loop.
            let Ok(slot) = queue.reserve().await else {
                break;
            };
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    self.sink.record(Event::Accepted { client: addr });
                    slot.send(Accepted { stream, addr });
                }
                Err(e) => {
                    self.sink.record(Event::AcceptFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        dispatcher.await.context("Dispatcher task failed")?;
        Err(anyhow!("Dispatcher stopped accepting connections"))
    }
}

/// Binds `config.listen` and proxies every client to `config.remote`.
pub async fn serve(config: Config, sink: Arc<dyn EventSink>) -> Result<()> {
    Proxy::bind(config, sink).await?.run().await
}
