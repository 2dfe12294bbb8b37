//! Cross-wired channel pairs.
//!
//! [`pair`] builds two [`Duplex`] handles over two bounded channels so that
//! each handle's send side feeds the other's receive side. The same
//! construction links a stream adapter to its owner and a client to the hub.

use tokio::sync::mpsc;

/// Default buffer size for every linked channel.
pub const CHANNEL_CAPACITY: usize = 64;

/// The peer has closed its receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("peer hung up")]
pub struct HungUp;

/// One side of a linked pair: sends `S`, receives `R`.
#[derive(Debug)]
pub struct Duplex<S, R> {
    tx: Option<mpsc::Sender<S>>,
    rx: mpsc::Receiver<R>,
}

/// Creates two linked handles with the default capacity.
pub fn pair<A, B>() -> (Duplex<A, B>, Duplex<B, A>) {
    pair_with_capacity(CHANNEL_CAPACITY)
}

pub fn pair_with_capacity<A, B>(capacity: usize) -> (Duplex<A, B>, Duplex<B, A>) {
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (
        Duplex {
            tx: Some(a_tx),
            rx: b_rx,
        },
        Duplex {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

impl<S, R> Duplex<S, R> {
    /// Sends to the peer, waiting for buffer space.
    pub async fn send(&self, item: S) -> Result<(), HungUp> {
        let tx = self.tx.as_ref().ok_or(HungUp)?;
        tx.send(item).await.map_err(|_| HungUp)
    }

    /// Receives from the peer; `None` once the peer has closed its send side
    /// and everything buffered has been drained.
    pub async fn recv(&mut self) -> Option<R> {
        self.rx.recv().await
    }

    /// Closes this side's send channel. The peer sees `None` after draining.
    /// Receiving keeps working, so responses still in flight can be drained.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(mpsc::Sender::is_closed)
    }

    /// Splits into the raw channel halves, for tasks that drive each
    /// direction separately.
    pub fn into_parts(self) -> (Option<mpsc::Sender<S>>, mpsc::Receiver<R>) {
        (self.tx, self.rx)
    }
}
