//! Hub - single-writer actor that owns the list.
//!
//! Flow:
//! 1. `Hub::new` builds the hub plus its first client
//! 2. More clients attach via `Hub::attach` (before start) or `Client::copy`
//! 3. `Hub::run` waits on the control channel and every client's requests
//! 4. Each request is dispatched to the list; the outcome is broadcast or
//!    replied to the requester
//! 5. A client whose request channel closes is detached; once none remain,
//!    the loop exits
//!
//! The list is only touched from inside `run`, so no locking is needed.

use std::collections::HashMap;
use std::fmt;

use futures::future;
use futures::stream::{self, BoxStream, SelectAll, StreamExt};
use tokio::sync::mpsc;

use super::duplex::{self, Duplex};
use super::request::{Delivery, Request, RequestBody, Responder, Response};
use crate::list::List;

/// Hub-side view of a client link: sends responses, receives requests.
type CoClient = Duplex<Response, Request>;

/// Identifies an attached client for the lifetime of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("hub has stopped")]
    Stopped,
    #[error("client is not connected to a running hub")]
    Disconnected,
}

/// External handle to the hub.
///
/// Requests go in through [`Client::send`]; responses come out of
/// [`Client::recv`], which must be drained for as long as the client is
/// attached or the hub will block on it.
#[derive(Debug)]
pub struct Client {
    link: Duplex<Request, Response>,
    control: mpsc::UnboundedSender<CoClient>,
}

impl Client {
    pub async fn send(&self, request: Request) -> Result<(), HubError> {
        self.link
            .send(request)
            .await
            .map_err(|_| HubError::Disconnected)
    }

    /// Next response; `None` once the hub has detached this client.
    pub async fn recv(&mut self) -> Option<Response> {
        self.link.recv().await
    }

    /// Attaches a new client to the same hub.
    ///
    /// Works while the hub is running. If the hub stops before it processes
    /// the attach, the new client's responses end immediately.
    pub fn copy(&self) -> Result<Client, HubError> {
        let (link, co) = duplex::pair();
        self.control.send(co).map_err(|_| HubError::Stopped)?;
        Ok(Client {
            link,
            control: self.control.clone(),
        })
    }

    /// Closes the request channel. The hub detaches this client and then
    /// closes its response channel, so keep calling `recv` until `None`.
    pub fn shutdown(&mut self) {
        self.link.close();
    }

    /// Splits into the raw request sender and response receiver, so that
    /// sending and draining can run as separate loops.
    pub(crate) fn into_parts(self) -> (Option<mpsc::Sender<Request>>, mpsc::Receiver<Response>) {
        self.link.into_parts()
    }
}

enum Inbound {
    Request(ClientId, Request),
    HungUp(ClientId),
}

/// Turns a client's request channel into a stream that ends with `HungUp`.
fn inbound_stream(id: ClientId, requests: mpsc::Receiver<Request>) -> BoxStream<'static, Inbound> {
    stream::unfold(requests, |mut requests| async move {
        let request = requests.recv().await?;
        Some((request, requests))
    })
    .map(move |request| Inbound::Request(id, request))
    .chain(stream::once(future::ready(Inbound::HungUp(id))))
    .boxed()
}

pub struct Hub {
    list: List,
    /// Response senders of attached clients. Removing an entry closes that
    /// client's response channel.
    clients: HashMap<ClientId, mpsc::Sender<Response>>,
    requests: SelectAll<BoxStream<'static, Inbound>>,
    control_tx: mpsc::UnboundedSender<CoClient>,
    control_rx: mpsc::UnboundedReceiver<CoClient>,
    next_id: u64,
}

impl Hub {
    pub fn new(list: List) -> (Self, Client) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let mut hub = Self {
            list,
            clients: HashMap::new(),
            requests: SelectAll::new(),
            control_tx,
            control_rx,
            next_id: 0,
        };
        let client = hub.attach();
        (hub, client)
    }

    /// Attaches a client before the event loop starts.
    pub fn attach(&mut self) -> Client {
        let (link, co) = duplex::pair();
        self.register(co);
        Client {
            link,
            control: self.control_tx.clone(),
        }
    }

    fn register(&mut self, co: CoClient) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;

        let (responses, requests) = co.into_parts();
        if let Some(responses) = responses {
            self.clients.insert(id, responses);
        }
        self.requests.push(inbound_stream(id, requests));

        tracing::debug!(client = %id, clients = self.clients.len(), "Client attached");
        id
    }

    /// Runs the event loop until every client has detached.
    pub async fn run(mut self) {
        tracing::info!(clients = self.clients.len(), "Hub starting");

        loop {
            tokio::select! {
                biased;

                Some(co) = self.control_rx.recv() => {
                    self.register(co);
                }

                inbound = self.requests.next() => match inbound {
                    Some(Inbound::Request(id, request)) => {
                        self.handle_request(id, request).await;
                    }
                    Some(Inbound::HungUp(id)) => {
                        self.detach(id);
                        if self.clients.is_empty() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.hangup_clients();
        tracing::info!("Hub exiting");
    }

    fn detach(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            tracing::debug!(client = %id, clients = self.clients.len(), "Client detached");
        }
    }

    fn hangup_clients(&mut self) {
        for (id, _) in self.clients.drain() {
            tracing::debug!(client = %id, "Hanging up client");
        }
    }

    async fn handle_request(&mut self, from: ClientId, request: Request) {
        let Request { tag, body } = request;
        tracing::debug!(client = %from, %tag, ?body, "Handling request");

        let response = self.dispatch(tag, body);
        match response.delivery {
            Delivery::Broadcast => self.broadcast(response).await,
            Delivery::Reply(_) => self.unicast(from, response).await,
        }
    }

    /// Applies a request to the list. State changes are broadcast; queries
    /// and failures go back to the requester only.
    fn dispatch(&mut self, tag: String, body: RequestBody) -> Response {
        match body {
            RequestBody::SetAutoMode { auto_mode } => {
                self.list.set_auto_mode(auto_mode);
                Response::broadcast(Responder::AutoMode(auto_mode))
            }
            RequestBody::Enqueue { index, item } => {
                match self.list.enqueue(index, item.clone()) {
                    Ok(()) => Response::broadcast(Responder::Enqueued { index, item }),
                    Err(e) => Response::reply(tag, Responder::Failed(e.to_string())),
                }
            }
            RequestBody::Dequeue { index } => match self.list.dequeue(index) {
                Ok(item) => Response::broadcast(Responder::Dequeued { index, item }),
                Err(e) => Response::reply(tag, Responder::Failed(e.to_string())),
            },
            RequestBody::Dump => Response::reply(
                tag,
                Responder::Dump {
                    auto_mode: self.list.auto_mode(),
                    items: self.list.items().to_vec(),
                },
            ),
        }
    }

    // The fan-out helpers take `&mut self`: `Hub` is not `Sync`, and a shared
    // borrow held across an await would make `run` non-`Send`.
    async fn broadcast(&mut self, response: Response) {
        for (id, tx) in &self.clients {
            if tx.send(response.clone()).await.is_err() {
                tracing::debug!(client = %id, "Response receiver dropped");
            }
        }
    }

    async fn unicast(&mut self, to: ClientId, response: Response) {
        match self.clients.get(&to) {
            Some(tx) => {
                if tx.send(response).await.is_err() {
                    tracing::debug!(client = %to, "Response receiver dropped");
                }
            }
            None => tracing::warn!(client = %to, "Reply for detached client dropped"),
        }
    }
}
