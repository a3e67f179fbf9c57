//! reef-proto - RFC 1459 protocol plumbing for reefd.
//!
//! This crate knows nothing about server state: it converts between byte
//! streams and [`Message`] values, folds identifiers per the RFC 1459
//! casemapping, validates nicknames and channel names, and formats numeric
//! replies. The server and the integration-test client both build on it.

pub mod casemap;
pub mod line;
pub mod message;
pub mod reply;
pub mod response;
pub mod valid;

pub use casemap::{irc_eq, irc_lower_char, irc_to_lower};
pub use line::{CodecError, LineCodec, MAX_LINE_LEN, MAX_PENDING_BYTES};
pub use message::{Message, ParseError};
pub use reply::Reply;
pub use response::Response;
pub use valid::{is_valid_channel_name, is_valid_nick, CHANNEL_NAME_MAX, NICK_MAX};
