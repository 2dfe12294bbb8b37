//! Front-ends for baps3d.
//!
//! Each front-end runs Bifrost bridge sessions against a hub client: the TCP
//! server runs one per connection, the console one over stdin/stdout.

pub mod console;
pub mod net;

pub use net::{ConnectionId, Server, ServerConfig};
