//! PRIVMSG and NOTICE.
//!
//! The two commands share their relay logic; the difference is that
//! NOTICE never generates a numeric, success or failure.

use reef_proto::Message;

use crate::error::{HandlerError, HandlerResult};

use super::{Context, Handler};

pub struct PrivmsgHandler;

impl Handler for PrivmsgHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        relay(ctx, msg, "PRIVMSG", true)
    }
}

pub struct NoticeHandler;

impl Handler for NoticeHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        relay(ctx, msg, "NOTICE", false)
    }
}

fn relay(ctx: &mut Context<'_>, msg: &Message, cmd: &str, numerics: bool) -> HandlerResult {
    // The target list must be a middle parameter; a line like
    // `PRIVMSG :hi` has a payload but nobody to deliver it to.
    let Some(targets) = msg.arg(0).map(str::to_string) else {
        return if numerics {
            Err(HandlerError::NoRecipient(cmd.to_string()))
        } else {
            Ok(())
        };
    };
    let text = match msg.text_or_arg(1) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            return if numerics {
                Err(HandlerError::NoTextToSend)
            } else {
                Ok(())
            }
        }
    };

    for target in targets.split(',') {
        if target.is_empty() {
            continue;
        }
        if let Err(err) = relay_one(ctx, target, &text, cmd) {
            if numerics {
                ctx.fail(&err);
            }
        }
    }
    Ok(())
}

fn relay_one(ctx: &mut Context<'_>, target: &str, text: &str, cmd: &str) -> HandlerResult {
    let uid = ctx.uid;
    let prefix = ctx.user().prefix();

    if target.starts_with('#') || target.starts_with('&') {
        let display = match ctx.world.channel(target) {
            None => return Err(HandlerError::NoSuchChannel(target.to_string())),
            Some(chan) => {
                // +n is always on: only members may speak.
                if !chan.is_member(uid) {
                    return Err(HandlerError::CannotSendToChan(chan.name.clone()));
                }
                chan.name.clone()
            }
        };
        let line = Message::cmd(cmd)
            .param(display)
            .trailing(text)
            .with_prefix(prefix);
        ctx.world.send_to_channel(target, &line, Some(uid));
    } else {
        let target_uid = ctx
            .world
            .uid_by_nick(target)
            .ok_or_else(|| HandlerError::NoSuchNick(target.to_string()))?;
        let nick = ctx
            .world
            .user(target_uid)
            .map(|u| u.nick.clone())
            .unwrap_or_else(|| target.to_string());
        let line = Message::cmd(cmd)
            .param(nick)
            .trailing(text)
            .with_prefix(prefix);
        ctx.world.send(target_uid, line);
    }
    Ok(())
}
