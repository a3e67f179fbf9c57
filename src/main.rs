//! reefd - a small RFC 1459 IRC server.
//!
//! One cooperative event loop owns all server state; connections feed it
//! parsed lines and drain their own send queues. See DESIGN.md for the
//! architecture notes.

mod config;
mod error;
mod handlers;
mod network;
mod server;
mod state;

use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::server::Server;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    // Current-thread flavor: the multiplexer, every connection task, and
    // the state loop share one cooperatively scheduled thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start runtime");
            return ExitCode::from(3);
        }
    };

    runtime.block_on(async {
        let server = match Server::bind(config).await {
            Ok(server) => server,
            Err(err) => {
                error!(error = %err, "bind failed");
                return ExitCode::from(2);
            }
        };
        match server.run().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "fatal runtime error");
                ExitCode::from(3)
            }
        }
    })
}
