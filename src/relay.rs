use futures_util::future::{Either, select};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Notify, watch},
    task::JoinHandle,
};

/// Counts relay copy tasks that have not finished yet.
///
/// A relay returns as soon as one direction ends; the other copy task keeps
/// running until it sees the close signal. The tracker makes that tail
/// observable.
#[derive(Clone, Debug, Default)]
pub struct CopyTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    idle: Notify,
}

impl CopyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of copy tasks currently running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Resolves once no copy task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn enter(&self) -> CopyGuard {
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        CopyGuard {
            inner: self.inner.clone(),
        }
    }
}

struct CopyGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for CopyGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// The two running copy directions of one relay.
pub struct Relay {
    left_to_right: JoinHandle<io::Result<u64>>,
    right_to_left: JoinHandle<io::Result<u64>>,
}

impl Relay {
    /// Waits until either direction ends and returns its outcome together
    /// with the direction still running. That one stops when the [`Closer`]
    /// fires.
    pub async fn first_finished(self) -> (io::Result<()>, Remaining) {
        let (finished, remaining) = match select(self.left_to_right, self.right_to_left).await {
            Either::Left((result, other)) | Either::Right((result, other)) => (result, other),
        };
        let result = match finished {
            Ok(copied) => copied.map(|_| ()),
            Err(join_error) => Err(io::Error::other(join_error)),
        };
        (result, Remaining(remaining))
    }
}

/// The copy direction that outlived the first one.
pub struct Remaining(JoinHandle<io::Result<u64>>);

impl Remaining {
    /// Waits for the copy task to stop. Only the first direction's outcome
    /// is reported, so this one is discarded. Dropping instead of joining
    /// leaves the task to finish on its own.
    pub async fn join(self) {
        let _ = self.0.await;
    }
}

/// Closes both streams of a relay by telling every copy task still running to
/// drop its halves. Fires on drop as well, including during unwinding.
pub struct Closer {
    signal: watch::Sender<bool>,
}

impl Closer {
    pub fn close(self) {}
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.signal.send_replace(true);
    }
}

/// Starts copying `left` to `right` and `right` to `left` on two tasks.
///
/// Both streams are moved into the tasks; the returned [`Closer`] is the only
/// way to close them before the copies end on their own.
pub fn duplex<L, R>(left: L, right: R, tracker: &CopyTracker) -> (Relay, Closer)
where
    L: AsyncRead + AsyncWrite + Send + 'static,
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let (signal, closed) = watch::channel(false);
    let (left_reader, left_writer) = tokio::io::split(left);
    let (right_reader, right_writer) = tokio::io::split(right);

    let relay = Relay {
        left_to_right: spawn_copy(left_reader, right_writer, closed.clone(), tracker.enter()),
        right_to_left: spawn_copy(right_reader, left_writer, closed, tracker.enter()),
    };
    (relay, Closer { signal })
}

fn spawn_copy<Rd, Wr>(
    mut reader: Rd,
    mut writer: Wr,
    mut closed: watch::Receiver<bool>,
    guard: CopyGuard,
) -> JoinHandle<io::Result<u64>>
where
    Rd: AsyncRead + Unpin + Send + 'static,
    Wr: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _guard = guard;
        // Close wins over a copy that is still making progress.
        tokio::select! {
            biased;
            _ = closed.wait_for(|done| *done) => Ok(0),
            copied = tokio::io::copy(&mut reader, &mut writer) => copied,
        }
    })
}
