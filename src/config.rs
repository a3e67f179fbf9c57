//! Runtime configuration.
//!
//! The server is configured entirely from the command line (`reefd <port>
//! <password>`), with `PORT` and `PASSWORD` environment variables filling
//! in for absent positional arguments. There is no config file and no
//! persisted state.

use std::time::Duration;

use thiserror::Error;

/// Default idle interval before the server probes a quiet connection.
const PING_INTERVAL: Duration = Duration::from_secs(120);

/// Grace period after a probe before the connection is declared dead.
const PING_GRACE: Duration = Duration::from_secs(30);

/// Everything the server needs to run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server name used as the prefix of every numeric.
    pub server_name: String,
    /// Network name advertised in 001/005.
    pub network: String,
    /// Version string for 002/004/351.
    pub version: String,
    /// Human-readable startup time for 003.
    pub created: String,
    pub port: u16,
    /// Connection password. Empty means no PASS is required.
    pub password: String,
    /// Message-of-the-day lines; an empty list yields 422.
    pub motd: Vec<String>,
    pub ping_interval: Duration,
    pub ping_grace: Duration,
}

/// Bad command-line invocation. Maps to exit code 1.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("usage: reefd <port> <password>")]
    Missing,
    #[error("invalid port {0:?}: expected 1-65535")]
    BadPort(String),
}

impl Config {
    /// Build a config from positional arguments, falling back to the
    /// `PORT` and `PASSWORD` environment variables.
    pub fn from_args<I>(mut args: I) -> Result<Self, UsageError>
    where
        I: Iterator<Item = String>,
    {
        let port = args
            .next()
            .or_else(|| std::env::var("PORT").ok())
            .ok_or(UsageError::Missing)?;
        let password = args
            .next()
            .or_else(|| std::env::var("PASSWORD").ok())
            .ok_or(UsageError::Missing)?;

        let port = match port.parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(UsageError::BadPort(port)),
        };

        Ok(Self::new(port, password))
    }

    /// Config with defaults for everything but the CLI-provided values.
    pub fn new(port: u16, password: String) -> Self {
        Self {
            server_name: "reef.local".to_string(),
            network: "ReefNet".to_string(),
            version: format!("reefd-{}", env!("CARGO_PKG_VERSION")),
            created: chrono::Utc::now()
                .format("%a %b %e %Y at %H:%M:%S UTC")
                .to_string(),
            port,
            password,
            motd: vec![
                "Welcome to the reef.".to_string(),
                "Mind the currents; be kind to the fish.".to_string(),
            ],
            ping_interval: PING_INTERVAL,
            ping_grace: PING_GRACE,
        }
    }

    /// Whether clients must send a matching PASS before registering.
    pub fn password_required(&self) -> bool {
        !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> impl Iterator<Item = String> {
        v.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_port_and_password() {
        let cfg = Config::from_args(args(&["6667", "secret"])).unwrap();
        assert_eq!(cfg.port, 6667);
        assert_eq!(cfg.password, "secret");
        assert!(cfg.password_required());
    }

    #[test]
    fn empty_password_disables_pass() {
        let cfg = Config::from_args(args(&["6667", ""])).unwrap();
        assert!(!cfg.password_required());
    }

    #[test]
    fn rejects_bad_ports() {
        assert!(matches!(
            Config::from_args(args(&["0", "pw"])),
            Err(UsageError::BadPort(_))
        ));
        assert!(matches!(
            Config::from_args(args(&["65536", "pw"])),
            Err(UsageError::BadPort(_))
        ));
        assert!(matches!(
            Config::from_args(args(&["sixty", "pw"])),
            Err(UsageError::BadPort(_))
        ));
    }
}
