use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::event::{Direction, Encoding, Event, EventSink, SessionId};

/// Stream decorator that records every completed write as an [`Event::Data`].
///
/// Reads, flushes and shutdowns go straight to the inner stream. Write results
/// are returned to the caller untouched; the record is a side effect only.
pub struct LoggingStream<S> {
    inner: S,
    sink: Arc<dyn EventSink>,
    session: SessionId,
    src: Direction,
    encoding: Encoding,
}

impl<S> LoggingStream<S> {
    pub fn new(
        inner: S,
        sink: Arc<dyn EventSink>,
        session: SessionId,
        src: Direction,
        encoding: Encoding,
    ) -> Self {
        Self {
            inner,
            sink,
            session,
            src,
            encoding,
        }
    }

    fn record(&self, data: &[u8], error: Option<String>) {
        self.sink.record(Event::Data {
            session: self.session.clone(),
            src: self.src,
            data: data.to_vec(),
            encoding: self.encoding,
            error,
        });
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for LoggingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for LoggingStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = Pin::new(&mut self.inner).poll_write(cx, buf);
        match &result {
            Poll::Ready(Ok(n)) => self.record(&buf[..*n], None),
            Poll::Ready(Err(e)) => self.record(buf, Some(e.to_string())),
            Poll::Pending => {}
        }
        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecordingSink;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_test::io::Builder;

    fn wrap<S>(inner: S, sink: &Arc<RecordingSink>, encoding: Encoding) -> LoggingStream<S> {
        LoggingStream::new(
            inner,
            sink.clone(),
            SessionId::new("t", 1),
            Direction::Client,
            encoding,
        )
    }

    fn data_records(sink: &RecordingSink) -> Vec<(Vec<u8>, Option<String>)> {
        sink.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Data { data, error, .. } => Some((data, error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn records_one_event_per_write() {
        let sink = RecordingSink::new();
        let mock = Builder::new().write(b"ping").write(b"second").build();
        let mut stream = wrap(mock, &sink, Encoding::Raw);

        stream.write_all(b"ping").await.unwrap();
        stream.write_all(b"second").await.unwrap();

        let records = data_records(&sink);
        assert_eq!(
            records,
            vec![(b"ping".to_vec(), None), (b"second".to_vec(), None)]
        );
    }

    #[tokio::test]
    async fn carries_session_direction_and_encoding() {
        let sink = RecordingSink::new();
        let mock = Builder::new().write(b"\x01\x02").build();
        let mut stream = wrap(mock, &sink, Encoding::Hex);

        stream.write_all(b"\x01\x02").await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Data {
                session,
                src,
                encoding,
                ..
            } => {
                assert_eq!(session.as_str(), "t1");
                assert_eq!(*src, Direction::Client);
                assert_eq!(*encoding, Encoding::Hex);
            }
            other => panic!("expected data event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passes_write_errors_through_and_records_them() {
        let sink = RecordingSink::new();
        let mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let mut stream = wrap(mock, &sink, Encoding::Raw);

        let err = stream.write(b"lost").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let records = data_records(&sink);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, b"lost");
        assert!(records[0].1.as_deref().unwrap().contains("peer gone"));
    }

    #[tokio::test]
    async fn reads_are_not_recorded() {
        let sink = RecordingSink::new();
        let mock = Builder::new().read(b"pong").build();
        let mut stream = wrap(mock, &sink, Encoding::Raw);

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"pong");
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn partial_writes_record_only_accepted_bytes() {
        let sink = RecordingSink::new();
        let (near, mut far) = tokio::io::duplex(4);
        let mut stream = wrap(near, &sink, Encoding::Raw);

        let n = stream.write(b"abcdefgh").await.unwrap();
        assert_eq!(n, 4);

        let mut buf = [0u8; 4];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(data_records(&sink), vec![(b"abcd".to_vec(), None)]);
    }
}
