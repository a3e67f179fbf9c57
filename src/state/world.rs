//! The registry: every user, nickname, and channel on the server.
//!
//! The `World` is owned by the event loop and mutated only there. Both
//! sides of the user↔channel relation are kept behind mutation helpers so
//! they can never drift apart: a user is in a channel's member set exactly
//! when the channel is in the user's membership set, and a channel with no
//! members does not exist.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use reef_proto::{irc_to_lower, Message};

use super::channel::Channel;
use super::user::{SessionState, Uid, User};

#[derive(Debug, Default)]
pub struct World {
    users: HashMap<Uid, User>,
    /// Casefolded nick → uid.
    nicks: HashMap<String, Uid>,
    /// Casefolded name → channel.
    channels: HashMap<String, Channel>,
    next_uid: u64,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for a freshly accepted connection.
    pub fn add_session(
        &mut self,
        host: String,
        sender: mpsc::Sender<Message>,
        needs_pass: bool,
    ) -> Uid {
        self.next_uid += 1;
        let uid = Uid(self.next_uid);
        self.users.insert(uid, User::new(uid, host, sender, needs_pass));
        uid
    }

    pub fn user(&self, uid: Uid) -> Option<&User> {
        self.users.get(&uid)
    }

    pub fn user_mut(&mut self, uid: Uid) -> Option<&mut User> {
        self.users.get_mut(&uid)
    }

    pub fn uids(&self) -> Vec<Uid> {
        self.users.keys().copied().collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn uid_by_nick(&self, nick: &str) -> Option<Uid> {
        self.nicks.get(&irc_to_lower(nick)).copied()
    }

    /// Bind (or rebind) a user's nickname in the index. The caller has
    /// already checked uniqueness.
    pub fn bind_nick(&mut self, uid: Uid, nick: &str) {
        let user = self.users.get_mut(&uid).expect("bind_nick on live user");
        if !user.nick.is_empty() {
            self.nicks.remove(&irc_to_lower(&user.nick));
        }
        user.nick = nick.to_string();
        self.nicks.insert(irc_to_lower(nick), uid);
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&irc_to_lower(name))
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Channel by casefolded name, creating it empty on first join.
    /// Returns true when the channel was created.
    pub fn channel_entry(&mut self, name: &str, created_at: i64) -> (&mut Channel, bool) {
        let key = irc_to_lower(name);
        let created = !self.channels.contains_key(&key);
        let chan = self
            .channels
            .entry(key)
            .or_insert_with(|| Channel::new(name.to_string(), created_at));
        (chan, created)
    }

    /// Add a user to a channel, maintaining both sides of the relation.
    pub fn join_channel(&mut self, uid: Uid, name: &str) {
        let key = irc_to_lower(name);
        if let Some(chan) = self.channels.get_mut(&key) {
            chan.members.insert(uid);
        }
        if let Some(user) = self.users.get_mut(&uid) {
            user.channels.insert(key);
        }
    }

    /// Remove a user from a channel; the channel is destroyed when its
    /// last member leaves.
    pub fn leave_channel(&mut self, uid: Uid, name: &str) {
        let key = irc_to_lower(name);
        if let Some(user) = self.users.get_mut(&uid) {
            user.channels.remove(&key);
        }
        if let Some(chan) = self.channels.get_mut(&key) {
            if chan.remove_member(uid) == 0 {
                debug!(channel = %key, "destroying empty channel");
                self.channels.remove(&key);
            }
        }
    }

    /// Every user sharing at least one channel with `uid`, each exactly
    /// once, in uid order.
    pub fn peers_of(&self, uid: Uid) -> BTreeSet<Uid> {
        let mut peers = BTreeSet::new();
        if let Some(user) = self.users.get(&uid) {
            for key in &user.channels {
                if let Some(chan) = self.channels.get(key) {
                    peers.extend(chan.members.iter().copied());
                }
            }
        }
        peers.remove(&uid);
        peers
    }

    /// Enqueue a line for one user. A full send-q dooms the connection.
    pub fn send(&mut self, uid: Uid, msg: Message) {
        let Some(user) = self.users.get(&uid) else {
            return;
        };
        match user.sender.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(uid = %uid, nick = %user.display_nick(), "send-q exceeded");
                self.doom(uid, "SendQ exceeded");
            }
            // Writer already gone; the Closed event will clean up.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Enqueue a line for every member of a channel, optionally skipping
    /// one uid (the originator).
    pub fn send_to_channel(&mut self, name: &str, msg: &Message, except: Option<Uid>) {
        let members: Vec<Uid> = match self.channel(name) {
            Some(chan) => chan.members.iter().copied().collect(),
            None => return,
        };
        for uid in members {
            if Some(uid) != except {
                self.send(uid, msg.clone());
            }
        }
    }

    /// Mark a session for teardown after the current event. The first
    /// reason sticks.
    pub fn doom(&mut self, uid: Uid, reason: &str) {
        if let Some(user) = self.users.get_mut(&uid) {
            if user.doomed.is_none() {
                user.doomed = Some(reason.to_string());
            }
            user.state = SessionState::QuittingSoon;
        }
    }

    /// Harvest sessions marked for teardown.
    pub fn take_doomed(&self) -> Vec<(Uid, String)> {
        self.users
            .values()
            .filter_map(|u| u.doomed.clone().map(|reason| (u.uid, reason)))
            .collect()
    }

    /// Tear a user down: broadcast QUIT to peers (once each), scrub all
    /// memberships, release the nickname, and drop the session. Dropping
    /// the session drops the send-q sender, which lets the writer task
    /// flush pending lines and close the socket.
    pub fn remove_user(&mut self, uid: Uid, reason: &str) {
        let Some(user) = self.users.get(&uid) else {
            return;
        };
        let registered = user.is_registered() || user.handshake_complete();
        let prefix = user.prefix();
        let channel_keys: Vec<String> = user.channels.iter().cloned().collect();

        if registered {
            let quit = Message::cmd("QUIT").trailing(reason).with_prefix(prefix);
            for peer in self.peers_of(uid) {
                self.send(peer, quit.clone());
            }
        }

        for key in channel_keys {
            self.leave_channel(uid, &key);
        }
        if let Some(user) = self.users.get(&uid) {
            if !user.nick.is_empty() {
                self.nicks.remove(&irc_to_lower(&user.nick));
            }
        }
        self.users.remove(&uid);
    }

    /// Debug-build consistency check over the registry invariants.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (key, chan) in &self.channels {
            assert!(!chan.members.is_empty(), "empty channel {key} in registry");
            assert!(chan.ops.is_subset(&chan.members), "ops ⊄ members in {key}");
            for uid in &chan.members {
                let user = self.users.get(uid).expect("member exists");
                assert!(user.channels.contains(key), "membership asymmetry in {key}");
            }
        }
        for user in self.users.values() {
            for key in &user.channels {
                let chan = self.channels.get(key).expect("channel exists");
                assert!(chan.members.contains(&user.uid));
            }
        }
        for (folded, uid) in &self.nicks {
            let user = self.users.get(uid).expect("nick maps to live user");
            assert_eq!(&irc_to_lower(&user.nick), folded);
        }
    }
}
