//! baps3d: playout list daemon speaking the Bifrost protocol.

mod version;

pub mod bifrost;
pub mod comm;
pub mod list;
pub mod transport;

pub use bifrost::{IoClient, IoClientError, Message, ParseError};
pub use comm::{Client, Hub, HubError, Request, RequestBody, Responder, Response};
pub use list::{List, ListError};
pub use transport::{Server, ServerConfig};
pub use version::BAPS3D_VERSION;
