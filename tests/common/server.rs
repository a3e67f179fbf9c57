//! Test server management.

#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use super::client::TestClient;

/// Default connection password used by the test fleet.
pub const PASSWORD: &str = "secret";

/// A spawned reefd instance.
pub struct TestServer {
    child: Child,
    port: u16,
    password: String,
}

impl TestServer {
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_password(PASSWORD).await
    }

    pub async fn spawn_with_password(password: &str) -> anyhow::Result<Self> {
        let port = free_port().await?;
        let child = Command::new(env!("CARGO_BIN_EXE_reefd"))
            .arg(port.to_string())
            .arg(password)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            password: password.to_string(),
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..100 {
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not start listening on port {}", self.port)
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Open a raw connection without registering.
    pub async fn connect(&self, nick: &str) -> anyhow::Result<TestClient> {
        TestClient::connect(&self.address(), nick).await
    }

    /// Connect and complete the PASS/NICK/USER handshake.
    pub async fn register(&self, nick: &str) -> anyhow::Result<TestClient> {
        let mut client = self.connect(nick).await?;
        client.register(&self.password).await?;
        Ok(client)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Ask the OS for a free port. The listener is dropped before the server
/// binds it; the window is small enough for test purposes.
async fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    Ok(listener.local_addr()?.port())
}
