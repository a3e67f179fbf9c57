//! Per-connection I/O tasks.
//!
//! Each accepted socket gets a reader task and a writer task; the core
//! never touches the socket. The reader frames and parses inbound bytes
//! and forwards them as [`Event`]s into the central loop. The writer
//! drains the user's send-q into the socket; when the world drops the
//! sender, the writer flushes whatever is still queued and lets the
//! socket close, which is the flush-before-close guarantee QUIT relies
//! on.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use reef_proto::{CodecError, LineCodec, Message, ParseError};

use crate::state::Uid;

/// What a connection reports into the central loop.
#[derive(Debug)]
pub enum Event {
    /// A complete, parsed line.
    Line { uid: Uid, message: Message },
    /// A complete line whose command token is malformed.
    BadToken { uid: Uid, token: String },
    /// Framing fault (recv-q overflow, invalid UTF-8). Session-fatal.
    Fault { uid: Uid, reason: &'static str },
    /// The socket reached EOF or failed; no more events will follow.
    Closed { uid: Uid },
}

/// Start the reader and writer tasks for an accepted connection.
pub fn spawn_connection(
    uid: Uid,
    stream: TcpStream,
    events: mpsc::Sender<Event>,
    outgoing: mpsc::Receiver<Message>,
) {
    let (read_half, write_half) = stream.into_split();

    tokio::spawn(async move {
        let mut writer = FramedWrite::new(write_half, LineCodec::default());
        let mut outgoing = outgoing;
        while let Some(msg) = outgoing.recv().await {
            if let Err(err) = writer.send(msg).await {
                debug!(uid = %uid, error = %err, "write failed");
                return;
            }
        }
        // Sender dropped: everything queued has been written.
        let _ = writer.flush().await;
    });

    tokio::spawn(async move {
        let mut reader = FramedRead::new(read_half, LineCodec::default());
        while let Some(item) = reader.next().await {
            match item {
                Ok(line) => match line.parse::<Message>() {
                    Ok(message) => {
                        if events.send(Event::Line { uid, message }).await.is_err() {
                            return;
                        }
                    }
                    // Empty lines are discarded silently.
                    Err(ParseError::Empty) => {}
                    Err(ParseError::BadCommand(token)) => {
                        if events.send(Event::BadToken { uid, token }).await.is_err() {
                            return;
                        }
                    }
                },
                Err(err) => {
                    let reason = match &err {
                        CodecError::RecvQExceeded(_) => "RecvQ exceeded",
                        CodecError::InvalidUtf8 => "Malformed line",
                        CodecError::Io(_) => {
                            debug!(uid = %uid, error = %err, "read failed");
                            break;
                        }
                    };
                    warn!(uid = %uid, reason, "framing fault");
                    let _ = events.send(Event::Fault { uid, reason }).await;
                    return;
                }
            }
        }
        let _ = events.send(Event::Closed { uid }).await;
    });
}
