//! Integration test infrastructure: spawn a real server binary and drive
//! it over TCP like a client would.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
