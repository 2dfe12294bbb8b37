//! Client/hub communication.
//!
//! # Architecture
//!
//! - **duplex**: cross-wired bounded channel pairs
//! - **request**: typed requests and responses
//! - **hub**: the actor owning the list, with fan-out to attached clients
//! - **bridge**: Bifrost messages <-> requests for one front-end session

pub mod bridge;
pub mod duplex;
pub mod hub;
pub mod request;

pub use bridge::{Bridge, RequestError, message_to_request, response_to_messages};
pub use duplex::{CHANNEL_CAPACITY, Duplex, HungUp};
pub use hub::{Client, ClientId, Hub, HubError};
pub use request::{Delivery, Request, RequestBody, Responder, Response};
