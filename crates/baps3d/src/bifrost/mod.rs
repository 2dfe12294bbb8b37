//! Bifrost: the line-oriented wire protocol spoken by baps3d front-ends.
//!
//! A line is `<origin> <verb> [arg]*`, split with shell single-quote rules.
//!
//! # Architecture
//!
//! - **message**: the [`Message`] value type and its serializer
//! - **parse**: tokenizer and parser ([`line_to_message`])
//! - **codec**: newline framing codec for AsyncRead/AsyncWrite
//! - **io_client**: stream adapter turning a byte connection into message channels

pub mod codec;
pub mod io_client;
pub mod message;
pub mod parse;

pub use codec::BifrostCodec;
pub use io_client::{Endpoint, IoClient, IoClientError};
pub use message::Message;
pub use parse::{ParseError, line_to_message, parse, tokenize};
