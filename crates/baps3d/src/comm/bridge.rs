//! Bridge between Bifrost message endpoints and hub clients.
//!
//! Inbound messages become [`Request`]s; hub [`Response`]s become one or more
//! outbound messages. The request tag is the message origin, so replies carry
//! the tag back as their origin while broadcasts use `!`.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::duplex::CHANNEL_CAPACITY;
use super::hub::Client;
use super::request::{Delivery, Request, RequestBody, Responder, Response};
use crate::bifrost::{Endpoint, IoClient, IoClientError, Message};

/// Origin used for messages that are not replies to a particular request.
pub const BROADCAST_ORIGIN: &str = "!";

/// Why an inbound message could not become a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
    #[error("{verb} takes {expected} argument(s), got {got}")]
    BadArity {
        verb: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("bad argument to {verb}: {arg}")]
    BadArgument { verb: &'static str, arg: String },
}

pub fn message_to_request(msg: &Message) -> Result<Request, RequestError> {
    let body = match msg.verb() {
        "auto" => {
            let [mode] = args::<1>("auto", msg)?;
            let auto_mode = match mode.as_str() {
                "on" => true,
                "off" => false,
                _ => {
                    return Err(RequestError::BadArgument {
                        verb: "auto",
                        arg: mode.clone(),
                    });
                }
            };
            RequestBody::SetAutoMode { auto_mode }
        }
        "enqueue" => {
            let [index, item] = args::<2>("enqueue", msg)?;
            RequestBody::Enqueue {
                index: parse_index("enqueue", index)?,
                item: item.clone(),
            }
        }
        "dequeue" => {
            let [index] = args::<1>("dequeue", msg)?;
            RequestBody::Dequeue {
                index: parse_index("dequeue", index)?,
            }
        }
        "dump" => {
            let [] = args::<0>("dump", msg)?;
            RequestBody::Dump
        }
        other => return Err(RequestError::UnknownVerb(other.to_string())),
    };
    Ok(Request::new(msg.origin(), body))
}

fn args<'m, const N: usize>(
    verb: &'static str,
    msg: &'m Message,
) -> Result<[&'m String; N], RequestError> {
    let args = msg.args();
    if args.len() != N {
        return Err(RequestError::BadArity {
            verb,
            expected: N,
            got: args.len(),
        });
    }
    Ok(std::array::from_fn(|i| &args[i]))
}

fn parse_index(verb: &'static str, arg: &str) -> Result<usize, RequestError> {
    arg.parse().map_err(|_| RequestError::BadArgument {
        verb,
        arg: arg.to_string(),
    })
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// Renders a hub response as the messages sent to the front-end.
pub fn response_to_messages(response: &Response) -> Vec<Message> {
    let origin = match &response.delivery {
        Delivery::Broadcast => BROADCAST_ORIGIN,
        Delivery::Reply(tag) => tag.as_str(),
    };
    let msg = |verb: &str| Message::new(origin, verb);

    match &response.body {
        Responder::AutoMode(auto_mode) => vec![msg("AUTO").with_arg(on_off(*auto_mode))],
        Responder::Enqueued { index, item } => {
            vec![msg("ENQUEUE").with_args([index.to_string(), item.clone()])]
        }
        Responder::Dequeued { index, item } => {
            vec![msg("DEQUEUE").with_args([index.to_string(), item.clone()])]
        }
        Responder::Dump { auto_mode, items } => {
            let mut out = Vec::with_capacity(items.len() + 2);
            out.push(msg("AUTO").with_arg(on_off(*auto_mode)));
            out.push(msg("COUNT").with_arg(items.len().to_string()));
            out.extend(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| msg("ITEM").with_args([i.to_string(), item.clone()])),
            );
            out
        }
        Responder::Failed(reason) => vec![msg("WHAT").with_arg(reason.clone())],
    }
}

fn greeting(identity: &str) -> [Message; 2] {
    [
        Message::new(BROADCAST_ORIGIN, "OHAI")
            .with_args([identity.to_string(), format!("baps3d-{}", crate::BAPS3D_VERSION)]),
        Message::new(BROADCAST_ORIGIN, "IAMA").with_arg("list"),
    ]
}

/// Sends to the endpoint unless the session is cancelled first.
async fn deliver(
    to_peer: &mpsc::Sender<Message>,
    msg: Message,
    session: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = session.cancelled() => false,
        sent = to_peer.send(msg) => sent.is_ok(),
    }
}

/// One front-end session between an endpoint and a hub client.
///
/// Runs two pumps: inbound (endpoint -> hub) and outbound (hub -> endpoint).
/// The outbound pump drains hub responses no matter how long the inbound
/// pump waits on the hub, so a busy peer cannot stall the hub.
pub struct Bridge {
    identity: String,
    endpoint: Endpoint,
    client: Client,
}

impl Bridge {
    pub fn new(identity: impl Into<String>, endpoint: Endpoint, client: Client) -> Self {
        Self {
            identity: identity.into(),
            endpoint,
            client,
        }
    }

    /// Runs until cancellation, hub detach, or the endpoint stops accepting
    /// messages. Once the endpoint's inbound side hangs up the bridge detaches
    /// from the hub and forwards the remaining responses first.
    ///
    /// Returning drops both the endpoint and the hub client, which stops the
    /// stream adapter and detaches this session from the hub.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            identity,
            endpoint,
            client,
        } = self;
        let (to_peer, mut from_peer) = endpoint.into_parts();
        let Some(to_peer) = to_peer else {
            tracing::debug!(%identity, "Endpoint closed before greeting");
            return;
        };
        let (to_hub, mut from_hub) = client.into_parts();
        // Ends both pumps once either side of the session is gone.
        let session = cancel.child_token();

        for msg in greeting(&identity) {
            if !deliver(&to_peer, msg, &session).await {
                tracing::debug!(%identity, "Endpoint closed before greeting");
                return;
            }
        }

        let inbound = async {
            let to_hub = to_hub;
            loop {
                let msg = tokio::select! {
                    biased;
                    () = session.cancelled() => break,
                    msg = from_peer.recv() => msg,
                };
                let Some(msg) = msg else {
                    tracing::debug!(%identity, "Endpoint hung up");
                    break;
                };

                match message_to_request(&msg) {
                    Ok(request) => {
                        let Some(tx) = &to_hub else { break };
                        let sent = tokio::select! {
                            biased;
                            () = session.cancelled() => break,
                            sent = tx.send(request) => sent.is_ok(),
                        };
                        if !sent {
                            tracing::debug!(%identity, "Hub unreachable");
                            session.cancel();
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            %identity,
                            origin = msg.origin(),
                            verb = msg.verb(),
                            error = %e,
                            "Rejected request"
                        );
                        let what = Message::new(msg.origin(), "WHAT").with_arg(e.to_string());
                        if !deliver(&to_peer, what, &session).await {
                            session.cancel();
                            break;
                        }
                    }
                }
            }
            // The hub answers everything already sent, then detaches us and
            // the outbound pump sees the end of its responses.
            drop(to_hub);
        };

        let outbound = async {
            'pump: loop {
                let response = tokio::select! {
                    biased;
                    () = session.cancelled() => break,
                    response = from_hub.recv() => response,
                };
                let Some(response) = response else {
                    tracing::debug!(%identity, "Hub detached bridge");
                    break;
                };
                for msg in response_to_messages(&response) {
                    if !deliver(&to_peer, msg, &session).await {
                        tracing::debug!(%identity, "Endpoint closed, dropping response");
                        break 'pump;
                    }
                }
            }
            session.cancel();
        };

        tokio::join!(inbound, outbound);
        tracing::debug!(%identity, "Bridge stopped");
    }
}

/// Runs a full front-end session over a stream adapter: the adapter itself,
/// a bridge to the hub, and a drain for the adapter's error sink.
///
/// `report` sees every adapter error, including the final hangup. Returns once
/// all three have finished.
pub async fn serve<R, W, F>(
    io: IoClient<R, W>,
    endpoint: Endpoint,
    client: Client,
    identity: impl Into<String>,
    cancel: CancellationToken,
    mut report: F,
) where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    F: FnMut(IoClientError),
{
    let (err_tx, mut err_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let bridge = Bridge::new(identity, endpoint, client);

    tokio::join!(io.run(cancel.clone(), err_tx), bridge.run(cancel), async {
        while let Some(e) = err_rx.recv().await {
            report(e);
        }
    });
}
