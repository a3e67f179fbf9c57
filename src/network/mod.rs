//! Connection I/O: framed reader/writer tasks per client socket.

mod connection;

pub use connection::{spawn_connection, Event};
