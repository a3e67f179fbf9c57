//! Per-connection session state.

use std::collections::BTreeSet;
use std::fmt;

use tokio::sync::mpsc;
use tokio::time::Instant;

use reef_proto::Message;

/// Outbound queue depth per user. At the 512-byte line cap this bounds
/// the send-q at 64 KiB.
pub const SENDQ_LINES: usize = 128;

/// Stable integer handle for a session. Handles are never reused within a
/// server lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u64);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session is in the registration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected; a server password is configured and not yet presented.
    AwaitingPass,
    /// Password satisfied (or not required); NICK/USER still incomplete.
    AwaitingNickUser,
    /// Handshake complete; welcome numerics sent.
    Registered,
    /// Marked for teardown; no further commands are processed.
    QuittingSoon,
}

/// User modes. `o` is server-granted only and never settable by the user.
#[derive(Debug, Default, Clone)]
pub struct UserModes {
    pub invisible: bool,     // +i
    pub server_notices: bool, // +s
    pub wallops: bool,       // +w
    pub oper: bool,          // +o
}

impl UserModes {
    /// Render as `+isw`-style string; bare `+` when no mode is set.
    pub fn as_mode_string(&self) -> String {
        let mut s = String::from("+");
        if self.invisible {
            s.push('i');
        }
        if self.server_notices {
            s.push('s');
        }
        if self.wallops {
            s.push('w');
        }
        if self.oper {
            s.push('o');
        }
        s
    }
}

/// An outstanding liveness probe.
#[derive(Debug)]
pub struct PingProbe {
    pub cookie: String,
    pub deadline: Instant,
}

/// A connected session and its identity.
#[derive(Debug)]
pub struct User {
    pub uid: Uid,
    /// Remote host as presented in prefixes.
    pub host: String,
    pub state: SessionState,
    /// Empty until NICK succeeds.
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub pass_accepted: bool,
    /// Channels this user is in, by casefolded name. Ordered so fan-out
    /// is deterministic.
    pub channels: BTreeSet<String>,
    pub modes: UserModes,
    pub last_activity: Instant,
    pub probe: Option<PingProbe>,
    /// The send-q: the writer task drains this into the socket.
    pub sender: mpsc::Sender<Message>,
    /// Set when the session must be torn down after the current event;
    /// carries the QUIT reason shown to peers.
    pub doomed: Option<String>,
}

impl User {
    pub fn new(uid: Uid, host: String, sender: mpsc::Sender<Message>, needs_pass: bool) -> Self {
        Self {
            uid,
            host,
            state: if needs_pass {
                SessionState::AwaitingPass
            } else {
                SessionState::AwaitingNickUser
            },
            nick: String::new(),
            username: String::new(),
            realname: String::new(),
            pass_accepted: !needs_pass,
            channels: BTreeSet::new(),
            modes: UserModes::default(),
            last_activity: Instant::now(),
            probe: None,
            sender,
            doomed: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Registered
    }

    /// Nick as shown in numeric recipients: `*` until one is set.
    pub fn display_nick(&self) -> &str {
        if self.nick.is_empty() {
            "*"
        } else {
            &self.nick
        }
    }

    /// Full originator prefix, `nick!user@host`.
    pub fn prefix(&self) -> String {
        format!("{}!{}@{}", self.nick, self.username, self.host)
    }

    /// NICK and USER both observed. Registration additionally requires
    /// the password gate to have been satisfied.
    pub fn handshake_complete(&self) -> bool {
        !self.nick.is_empty() && !self.username.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(needs_pass: bool) -> User {
        let (tx, _rx) = mpsc::channel(1);
        User::new(Uid(1), "host".into(), tx, needs_pass)
    }

    #[test]
    fn initial_state_depends_on_password() {
        assert_eq!(test_user(true).state, SessionState::AwaitingPass);
        assert_eq!(test_user(false).state, SessionState::AwaitingNickUser);
        assert!(test_user(false).pass_accepted);
    }

    #[test]
    fn display_nick_is_star_until_set() {
        let mut u = test_user(false);
        assert_eq!(u.display_nick(), "*");
        u.nick = "alice".into();
        assert_eq!(u.display_nick(), "alice");
    }

    #[test]
    fn mode_string_rendering() {
        let mut m = UserModes::default();
        assert_eq!(m.as_mode_string(), "+");
        m.invisible = true;
        m.wallops = true;
        assert_eq!(m.as_mode_string(), "+iw");
    }
}
