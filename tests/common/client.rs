//! Test IRC client: raw lines in, parsed messages out.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use reef_proto::Message;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    nick: String,
}

impl TestClient {
    pub async fn connect(address: &str, nick: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            nick: nick.to_string(),
        })
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Send one raw line; CRLF is appended when absent.
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one raw line, CRLF stripped. Errors on EOF or timeout.
    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            anyhow::bail!("connection closed");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let line = self.recv_line().await?;
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("unparseable line {line:?}: {e}"))
    }

    /// Receive messages until the predicate matches; returns everything
    /// read, the match last.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Message>>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = predicate(&msg);
            messages.push(msg);
            if done {
                return Ok(messages);
            }
        }
    }

    /// Receive until a numeric with the given code arrives.
    pub async fn recv_code(&mut self, code: u16) -> anyhow::Result<Message> {
        let mut msgs = self
            .recv_until(|m| m.command.parse::<u16>() == Ok(code))
            .await?;
        Ok(msgs.pop().expect("recv_until returns the match"))
    }

    /// Assert nothing arrives for a quarter second.
    pub async fn expect_silence(&mut self) -> anyhow::Result<()> {
        let mut line = String::new();
        match timeout(Duration::from_millis(250), self.reader.read_line(&mut line)).await {
            Err(_) => Ok(()), // timed out: silence
            Ok(Ok(0)) => anyhow::bail!("connection closed while expecting silence"),
            Ok(Ok(_)) => anyhow::bail!("unexpected line: {line:?}"),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// True when the server closes the connection within the timeout.
    pub async fn expect_close(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            timeout(Duration::from_secs(2), self.reader.read_line(&mut line)).await,
            Ok(Ok(0))
        )
    }

    /// PASS/NICK/USER handshake. Returns the whole welcome burst, which
    /// ends at 376 so the stream is clean for the test body.
    pub async fn register(&mut self, password: &str) -> anyhow::Result<Vec<Message>> {
        self.send(&format!("PASS {password}")).await?;
        let nick = self.nick.clone();
        self.send(&format!("NICK {nick}")).await?;
        self.send(&format!("USER {nick} 0 * :{nick} of the reef"))
            .await?;
        let burst = self.recv_until(|m| m.command == "376").await?;
        anyhow::ensure!(
            burst.iter().any(|m| m.command == "001"),
            "welcome burst missing 001"
        );
        Ok(burst)
    }

    /// Join a channel and wait for the end-of-names marker.
    pub async fn join(&mut self, channel: &str) -> anyhow::Result<()> {
        self.send(&format!("JOIN {channel}")).await?;
        self.recv_code(366).await?;
        Ok(())
    }
}
