//! Command handlers and the dispatcher.
//!
//! Each IRC command has one handler. The [`Registry`] maps the uppercased
//! command token to it; [`Registry::dispatch`] enforces the registration
//! gate and the per-command parameter arity before the handler runs, and
//! renders any [`HandlerError`] the handler returns. Handlers are
//! synchronous: they mutate the world and enqueue outbound lines, and
//! never touch a socket.

mod channel;
mod connection;
mod messaging;
mod mode;
mod server_query;

use std::collections::HashMap;

use reef_proto::{Message, Reply, Response};

use crate::config::Config;
use crate::error::{HandlerError, HandlerResult};
use crate::state::{SessionState, Uid, User, World};

use channel::{InviteHandler, JoinHandler, KickHandler, NamesHandler, PartHandler};
use connection::{
    CapHandler, NickHandler, PassHandler, PingHandler, PongHandler, QuitHandler, UserHandler,
};
use messaging::{NoticeHandler, PrivmsgHandler};
use mode::{ModeHandler, TopicHandler};
use server_query::{
    InfoHandler, ListHandler, MotdHandler, VersionHandler, WhoHandler, WhoisHandler,
};

/// Everything a handler may touch: the acting session and the world.
pub struct Context<'a> {
    pub world: &'a mut World,
    pub config: &'a Config,
    pub uid: Uid,
}

impl Context<'_> {
    /// The acting user. Sessions outlive every dispatch that names them,
    /// so a missing entry is an invariant violation.
    pub fn user(&self) -> &User {
        self.world.user(self.uid).expect("acting session is live")
    }

    pub fn user_mut(&mut self) -> &mut User {
        let uid = self.uid;
        self.world.user_mut(uid).expect("acting session is live")
    }

    /// The acting user's nick for numeric addressing (`*` before NICK).
    pub fn nick(&self) -> String {
        self.user().display_nick().to_string()
    }

    /// Start a numeric reply addressed to the acting user.
    pub fn numeric(&self, code: Response) -> Reply {
        Reply::numeric(&self.config.server_name, self.user().display_nick(), code)
    }

    /// Enqueue a line for the acting user.
    pub fn send_self(&mut self, msg: Message) {
        let uid = self.uid;
        self.world.send(uid, msg);
    }

    /// Render a protocol error to the acting user; fatal ones also mark
    /// the session for teardown.
    pub fn fail(&mut self, err: &HandlerError) {
        let reply = err.to_reply(&self.config.server_name, self.user().display_nick());
        self.send_self(reply);
        if err.is_fatal() {
            let uid = self.uid;
            self.world.doom(uid, "Password incorrect");
        }
    }
}

/// One command's implementation plus its dispatch metadata.
pub trait Handler {
    /// Minimum parameter count (trailing included); fewer yields 461.
    fn min_params(&self) -> usize {
        0
    }

    /// Commands outside the pre-registration set yield 451 until the
    /// handshake completes.
    fn needs_registration(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult;
}

/// Command token → handler.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Connection and registration
        handlers.insert("PASS", Box::new(PassHandler));
        handlers.insert("NICK", Box::new(NickHandler));
        handlers.insert("USER", Box::new(UserHandler));
        handlers.insert("QUIT", Box::new(QuitHandler));
        handlers.insert("PING", Box::new(PingHandler));
        handlers.insert("PONG", Box::new(PongHandler));
        handlers.insert("CAP", Box::new(CapHandler));

        // Channel membership
        handlers.insert("JOIN", Box::new(JoinHandler));
        handlers.insert("PART", Box::new(PartHandler));
        handlers.insert("KICK", Box::new(KickHandler));
        handlers.insert("INVITE", Box::new(InviteHandler));
        handlers.insert("NAMES", Box::new(NamesHandler));

        // Messaging
        handlers.insert("PRIVMSG", Box::new(PrivmsgHandler));
        handlers.insert("NOTICE", Box::new(NoticeHandler));

        // Channel state
        handlers.insert("MODE", Box::new(ModeHandler));
        handlers.insert("TOPIC", Box::new(TopicHandler));

        // Queries
        handlers.insert("MOTD", Box::new(MotdHandler));
        handlers.insert("INFO", Box::new(InfoHandler));
        handlers.insert("VERSION", Box::new(VersionHandler));
        handlers.insert("LIST", Box::new(ListHandler));
        handlers.insert("WHO", Box::new(WhoHandler));
        handlers.insert("WHOIS", Box::new(WhoisHandler));

        Self { handlers }
    }

    /// Run one parsed message through the gate checks and its handler,
    /// rendering any resulting protocol error.
    pub fn dispatch(&self, ctx: &mut Context<'_>, msg: &Message) {
        if ctx.user().state == SessionState::QuittingSoon {
            return;
        }
        let registered = ctx.user().is_registered();
        let cmd = msg.command.clone();

        let result = match self.handlers.get(cmd.as_str()) {
            Some(handler) => {
                if handler.needs_registration() && !registered {
                    Err(HandlerError::NotRegistered)
                } else if msg.param_count() < handler.min_params() {
                    Err(HandlerError::NeedMoreParams(cmd.clone()))
                } else {
                    handler.handle(ctx, msg)
                }
            }
            None if registered => Err(HandlerError::UnknownCommand(cmd.clone())),
            None => Err(HandlerError::NotRegistered),
        };

        if let Err(err) = result {
            ctx.fail(&err);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional argument with trailing fallback: list-valued commands
/// (`JOIN :#a,#b`) may carry their last argument as the trailing param.
fn arg_or_trailing<'m>(msg: &'m Message, i: usize) -> Option<&'m str> {
    msg.arg(i)
        .or_else(|| (i == msg.params.len()).then_some(msg.trailing.as_deref()).flatten())
}
