//! Stream adapter between a byte connection and Bifrost message channels.
//!
//! An [`IoClient`] owns the connection and the internal side of a message
//! [`Duplex`]; its owner holds the matching [`Endpoint`]. Running the client
//! drives two loops:
//! - **read**: lines from the connection → parsed messages → owner
//! - **write**: messages from owner → packed lines → connection
//!
//! Problems are reported on an error sink. The sink closes only once both
//! loops have exited, so draining it to `None` means the adapter has stopped.

use std::io;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use super::codec::BifrostCodec;
use super::message::Message;
use super::parse::ParseError;
use crate::comm::duplex::{self, Duplex};

/// Owner-facing side of an [`IoClient`]: sends outbound messages, receives
/// inbound ones.
pub type Endpoint = Duplex<Message, Message>;

/// Conditions reported on the error sink.
#[derive(Debug, thiserror::Error)]
pub enum IoClientError {
    /// Peer closed the connection cleanly between lines.
    #[error("peer hung up")]
    HungUp,
    /// A single line failed to parse; reading continues.
    #[error("invalid message: {0}")]
    Parse(#[from] ParseError),
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
}

impl IoClientError {
    pub fn is_hung_up(&self) -> bool {
        matches!(self, Self::HungUp)
    }
}

pub struct IoClient<R, W> {
    reader: R,
    writer: W,
    link: Duplex<Message, Message>,
}

impl<S> IoClient<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Wraps a bidirectional stream such as a `TcpStream`.
    pub fn from_stream(stream: S) -> (Self, Endpoint) {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl<R, W> IoClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> (Self, Endpoint) {
        let (link, endpoint) = duplex::pair();
        (
            Self {
                reader,
                writer,
                link,
            },
            endpoint,
        )
    }

    /// Runs both loops until they have each finished.
    ///
    /// The read loop stops on hangup, on connection errors, on cancellation, or
    /// as soon as the owner drops its endpoint. The write loop stops when the owner
    /// closes its send side, on write errors, or on cancellation. Dropping the
    /// connection halves on return closes the connection.
    pub async fn run(self, cancel: CancellationToken, errors: mpsc::Sender<IoClientError>) {
        let (to_owner, from_owner) = self.link.into_parts();

        tokio::join!(
            read_loop(self.reader, to_owner, &cancel, errors.clone()),
            write_loop(self.writer, from_owner, &cancel, errors),
        );

        tracing::debug!("IoClient stopped");
    }
}

async fn report(errors: &mpsc::Sender<IoClientError>, error: IoClientError) {
    if errors.send(error).await.is_err() {
        tracing::debug!("IoClient error sink dropped");
    }
}

async fn read_loop<R>(
    reader: R,
    to_owner: Option<mpsc::Sender<Message>>,
    cancel: &CancellationToken,
    errors: mpsc::Sender<IoClientError>,
) where
    R: AsyncRead + Unpin,
{
    let Some(to_owner) = to_owner else {
        return;
    };
    let mut lines = FramedRead::new(reader, BifrostCodec::new());

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            () = to_owner.closed() => {
                tracing::debug!("Endpoint dropped, stopping read loop");
                break;
            }
            frame = lines.next() => frame,
        };

        match frame {
            Some(Ok(Ok(msg))) => {
                tracing::trace!(origin = msg.origin(), verb = msg.verb(), "Received message");
                let delivered = tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = to_owner.send(msg) => sent.is_ok(),
                };
                if !delivered {
                    tracing::debug!("Endpoint dropped, stopping read loop");
                    break;
                }
            }
            Some(Ok(Err(e))) => {
                tracing::debug!(error = %e, "Skipping malformed line");
                report(&errors, IoClientError::Parse(e)).await;
            }
            Some(Err(e)) => {
                report(&errors, IoClientError::Io(e)).await;
                break;
            }
            None => {
                report(&errors, IoClientError::HungUp).await;
                break;
            }
        }
    }
}

async fn write_loop<W>(
    writer: W,
    mut from_owner: mpsc::Receiver<Message>,
    cancel: &CancellationToken,
    errors: mpsc::Sender<IoClientError>,
) where
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedWrite::new(writer, BifrostCodec::new());

    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => return,
            msg = from_owner.recv() => msg,
        };
        let Some(msg) = msg else {
            break;
        };

        let written = tokio::select! {
            () = cancel.cancelled() => return,
            written = lines.send(msg) => written,
        };
        if let Err(e) = written {
            report(&errors, IoClientError::Io(e)).await;
            return;
        }
    }

    // Owner closed its side: flush and shut the write half down.
    if let Err(e) = lines.close().await {
        tracing::debug!(error = %e, "Failed to shut down writer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;

    struct Harness {
        endpoint: Endpoint,
        peer: DuplexStream,
        errors: mpsc::Receiver<IoClientError>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    fn start() -> Harness {
        let (server, peer) = tokio::io::duplex(1024);
        let (client, endpoint) = IoClient::from_stream(server);
        let (err_tx, errors) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(client.run(cancel.clone(), err_tx));
        Harness {
            endpoint,
            peer,
            errors,
            cancel,
            task,
        }
    }

    #[tokio::test]
    async fn inbound_lines_become_messages() {
        let mut h = start();

        let cases = [
            (
                "! IAMA saucepan\n",
                Message::new("!", "IAMA").with_arg("saucepan"),
            ),
            (
                "f00f STOP 'hammer time'\n",
                Message::new("f00f", "STOP").with_arg("hammer time"),
            ),
            (
                "? foobar 'qu'u'x' 'x'y'z'z'y'\n",
                Message::new("?", "foobar").with_args(["quux", "xyzzy"]),
            ),
        ];

        for (input, expected) in cases {
            h.peer.write_all(input.as_bytes()).await.unwrap();
            assert_eq!(h.endpoint.recv().await, Some(expected));
        }

        drop(h.peer);
        assert!(h.errors.recv().await.unwrap().is_hung_up());
        h.endpoint.close();
        assert!(h.errors.recv().await.is_none());
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn outbound_messages_become_lines() {
        let h = start();
        let mut peer = BufReader::new(h.peer);

        let cases = [
            (
                Message::new("!", "IAMA").with_arg("saucepan"),
                "! IAMA saucepan",
            ),
            (
                Message::new("!", "IAMA").with_arg("chest of drawers"),
                "! IAMA 'chest of drawers'",
            ),
            (
                Message::new("?", "make").with_args(["me", "a 'sandwich'"]),
                r"? make me 'a '\''sandwich'\'''",
            ),
            (Message::new("i386", "blorf"), "i386 blorf"),
        ];

        for (input, expected) in cases {
            h.endpoint.send(input).await.unwrap();
            let mut line = String::new();
            peer.read_line(&mut line).await.unwrap();
            assert_eq!(line, format!("{expected}\n"));
        }

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_lines_are_reported_and_skipped() {
        let mut h = start();

        h.peer
            .write_all(b"x auto 'on\nx dump\\\nx dump\n")
            .await
            .unwrap();

        assert!(matches!(
            h.errors.recv().await,
            Some(IoClientError::Parse(ParseError::UnterminatedQuote))
        ));
        assert!(matches!(
            h.errors.recv().await,
            Some(IoClientError::Parse(ParseError::DanglingEscape))
        ));
        assert_eq!(h.endpoint.recv().await, Some(Message::new("x", "dump")));

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn eof_mid_line_is_a_generic_error() {
        let mut h = start();

        h.peer.write_all(b"! IAMA sauce").await.unwrap();
        drop(h.peer);

        let err = h.errors.recv().await.unwrap();
        assert!(matches!(&err, IoClientError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(!err.is_hung_up());

        h.endpoint.close();
        assert!(h.errors.recv().await.is_none());
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn sink_closes_only_after_both_loops_stop() {
        let mut h = start();

        // Reader stops on hangup, writer is still waiting on the endpoint.
        drop(h.peer);
        assert!(h.errors.recv().await.unwrap().is_hung_up());
        assert!(h.endpoint.recv().await.is_none());

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            h.errors.recv(),
        )
        .await;
        assert!(pending.is_err(), "sink closed while the writer was running");

        h.endpoint.close();
        assert!(h.errors.recv().await.is_none());
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_both_loops() {
        let mut h = start();

        h.cancel.cancel();
        h.task.await.unwrap();

        assert!(h.errors.recv().await.is_none());
        assert!(h.endpoint.recv().await.is_none());

        // Connection halves were dropped, so the peer sees EOF.
        let mut rest = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut h.peer, &mut rest)
            .await
            .unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_endpoint_stops_both_loops() {
        let mut h = start();

        drop(h.endpoint);

        // Nothing was written and no line arrived, so nothing is reported.
        assert!(h.errors.recv().await.is_none());
        h.task.await.unwrap();

        let mut rest = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut h.peer, &mut rest)
            .await
            .unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn closing_the_endpoint_shuts_the_writer_down() {
        let mut h = start();

        h.endpoint.send(Message::new("!", "BYE")).await.unwrap();
        h.endpoint.close();

        let mut peer = BufReader::new(&mut h.peer);
        let mut line = String::new();
        peer.read_line(&mut line).await.unwrap();
        assert_eq!(line, "! BYE\n");

        line.clear();
        assert_eq!(peer.read_line(&mut line).await.unwrap(), 0);

        h.cancel.cancel();
        h.task.await.unwrap();
    }
}
