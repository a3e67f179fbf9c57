//! Registration lifecycle and connection-level commands:
//! PASS, NICK, USER, QUIT, PING, PONG, CAP.

use reef_proto::{is_valid_nick, Message, Response};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::state::SessionState;

use super::server_query::send_motd;
use super::{Context, Handler};

/// Usernames longer than this are truncated, not rejected.
const USERNAME_MAX: usize = 10;

pub struct PassHandler;

impl Handler for PassHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn needs_registration(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.user().is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        if !ctx.config.password_required() {
            return Ok(());
        }
        let supplied = msg.text_or_arg(0).unwrap_or_default();
        if supplied != ctx.config.password {
            return Err(HandlerError::PasswdMismatch);
        }
        let user = ctx.user_mut();
        user.pass_accepted = true;
        if user.state == SessionState::AwaitingPass {
            user.state = SessionState::AwaitingNickUser;
        }
        try_register(ctx)
    }
}

pub struct NickHandler;

impl Handler for NickHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn needs_registration(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let nick = msg.text_or_arg(0).unwrap_or_default().to_string();
        if !is_valid_nick(&nick) {
            return Err(HandlerError::ErroneousNickname(nick));
        }
        if let Some(holder) = ctx.world.uid_by_nick(&nick) {
            if holder != ctx.uid {
                return Err(HandlerError::NicknameInUse(nick));
            }
            // Same owner: allow a case change, ignore an exact repeat.
            if ctx.user().nick == nick {
                return Ok(());
            }
        }

        let was_registered = ctx.user().is_registered();
        let old_prefix = ctx.user().prefix();
        ctx.world.bind_nick(ctx.uid, &nick);

        if was_registered {
            // Peers see the rename once each, the renamer included.
            let note = Message::cmd("NICK").trailing(&nick).with_prefix(old_prefix);
            ctx.send_self(note.clone());
            for peer in ctx.world.peers_of(ctx.uid) {
                ctx.world.send(peer, note.clone());
            }
            Ok(())
        } else {
            try_register(ctx)
        }
    }
}

pub struct UserHandler;

impl Handler for UserHandler {
    fn min_params(&self) -> usize {
        4
    }

    fn needs_registration(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.user().is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        let mut username = msg.arg(0).unwrap_or_default().to_string();
        username.truncate(USERNAME_MAX);
        let realname = msg.text_or_arg(3).unwrap_or_default().to_string();

        let user = ctx.user_mut();
        user.username = username;
        user.realname = realname;
        try_register(ctx)
    }
}

/// Complete registration once PASS (if required), NICK, and USER have all
/// been observed. A finished handshake without the password is the same
/// fatal 464 as a wrong PASS.
fn try_register(ctx: &mut Context<'_>) -> HandlerResult {
    let user = ctx.user();
    if user.is_registered() || user.state == SessionState::QuittingSoon {
        return Ok(());
    }
    if !user.handshake_complete() {
        return Ok(());
    }
    if ctx.config.password_required() && !user.pass_accepted {
        return Err(HandlerError::PasswdMismatch);
    }

    ctx.user_mut().state = SessionState::Registered;
    info!(uid = %ctx.uid, nick = %ctx.nick(), "user registered");
    send_welcome(ctx);
    Ok(())
}

/// The 001-005 burst plus MOTD, sent on entry to `Registered`.
fn send_welcome(ctx: &mut Context<'_>) {
    let prefix = ctx.user().prefix();
    let server = ctx.config.server_name.clone();
    let version = ctx.config.version.clone();

    let welcome = ctx
        .numeric(Response::RPL_WELCOME)
        .trailing(format!(
            "Welcome to the {} Network, {prefix}",
            ctx.config.network
        ))
        .build();
    ctx.send_self(welcome);

    let yourhost = ctx
        .numeric(Response::RPL_YOURHOST)
        .trailing(format!("Your host is {server}, running version {version}"))
        .build();
    ctx.send_self(yourhost);

    let created = ctx
        .numeric(Response::RPL_CREATED)
        .trailing(format!("This server was created {}", ctx.config.created))
        .build();
    ctx.send_self(created);

    let myinfo = ctx
        .numeric(Response::RPL_MYINFO)
        .param(&server)
        .param(&version)
        .param("iswo")
        .param("oitnkls")
        .build();
    ctx.send_self(myinfo);

    let isupport = ctx
        .numeric(Response::RPL_ISUPPORT)
        .param("CHANTYPES=#&")
        .param("PREFIX=(o)@")
        .param("CHANMODES=,k,l,itns")
        .param("NICKLEN=9")
        .param("CHANNELLEN=50")
        .param("CASEMAPPING=rfc1459")
        .param(format!("NETWORK={}", ctx.config.network))
        .trailing("are supported by this server")
        .build();
    ctx.send_self(isupport);

    send_motd(ctx);
}

pub struct QuitHandler;

impl Handler for QuitHandler {
    fn needs_registration(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let reason = msg.text_or_arg(0).unwrap_or("Client Quit").to_string();
        info!(uid = %ctx.uid, nick = %ctx.nick(), reason = %reason, "client quit");
        let uid = ctx.uid;
        ctx.world.doom(uid, &reason);
        Ok(())
    }
}

pub struct PingHandler;

impl Handler for PingHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn needs_registration(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let token = msg.text_or_arg(0).unwrap_or_default().to_string();
        let server = ctx.config.server_name.clone();
        let pong = Message::cmd("PONG")
            .param(&server)
            .trailing(token)
            .with_prefix(server);
        ctx.send_self(pong);
        Ok(())
    }
}

/// PONG carries no reply. Receipt of any line already counts as liveness,
/// so the handler has nothing left to do.
pub struct PongHandler;

impl Handler for PongHandler {
    fn handle(&self, _ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        Ok(())
    }
}

/// CAP LS/END no-op handshake: an empty capability list sends modern
/// clients straight on to NICK/USER.
pub struct CapHandler;

impl Handler for CapHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn needs_registration(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let sub = msg.arg(0).unwrap_or_default().to_ascii_uppercase();
        if sub == "LS" {
            let nick = ctx.nick();
            let server = ctx.config.server_name.clone();
            let ls = Message::cmd("CAP")
                .param(nick)
                .param("LS")
                .trailing("")
                .with_prefix(server);
            ctx.send_self(ls);
        }
        // END and anything else: nothing to negotiate.
        Ok(())
    }
}
