//! MODE (channel and user forms) and TOPIC.

use reef_proto::{irc_eq, Message, Response};

use crate::error::{HandlerError, HandlerResult};
use crate::state::Uid;

use super::{Context, Handler};

pub struct ModeHandler;

impl Handler for ModeHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg(0).unwrap_or_default().to_string();
        if target.starts_with('#') || target.starts_with('&') {
            channel_mode(ctx, msg, &target)
        } else {
            user_mode(ctx, msg, &target)
        }
    }
}

/// One channel-mode change, argument already resolved.
enum ChanAction {
    Flag { letter: char, on: bool }, // i t s
    SetKey(String),
    ClearKey,
    SetLimit(usize),
    ClearLimit,
    Op { target: Uid, nick: String, on: bool },
}

fn channel_mode(ctx: &mut Context<'_>, msg: &Message, name: &str) -> HandlerResult {
    let uid = ctx.uid;
    let (display, is_op, modes_now, created) = match ctx.world.channel(name) {
        None => return Err(HandlerError::NoSuchChannel(name.to_string())),
        Some(chan) => (
            chan.name.clone(),
            chan.is_op(uid),
            chan.mode_string(),
            chan.created_at,
        ),
    };

    let Some(modestring) = msg.arg(1).map(str::to_string) else {
        // Query form: current modes and creation time.
        let (modes, args) = modes_now;
        let mut reply = ctx
            .numeric(Response::RPL_CHANNELMODEIS)
            .param(&display)
            .param(modes);
        for arg in args {
            reply = reply.param(arg);
        }
        ctx.send_self(reply.build());
        let creation = ctx
            .numeric(Response::RPL_CREATIONTIME)
            .param(&display)
            .param(created.to_string())
            .build();
        ctx.send_self(creation);
        return Ok(());
    };

    // Ban-list query: bans are not kept, so the list is always empty.
    if matches!(modestring.as_str(), "b" | "+b" | "-b") && msg.params.len() <= 2 {
        let end = ctx
            .numeric(Response::RPL_ENDOFBANLIST)
            .param(&display)
            .trailing("End of channel ban list")
            .build();
        ctx.send_self(end);
        return Ok(());
    }

    if !is_op {
        return Err(HandlerError::ChanOpPrivsNeeded(display));
    }

    let (actions, deferred) = parse_channel_modes(ctx, name, &display, &modestring, &msg.params[2..])?;
    let applied = apply_channel_modes(ctx, name, actions);

    for err in &deferred {
        ctx.fail(err);
    }

    if !applied.is_empty() {
        let (modes, args) = normalize(&applied);
        let mut line = Message::cmd("MODE")
            .param(&display)
            .param(modes)
            .with_prefix(ctx.user().prefix());
        for arg in args {
            line = line.param(arg);
        }
        ctx.world.send_to_channel(name, &line, None);
    }
    Ok(())
}

/// Walk the modestring, pairing argument-taking letters with `args` by
/// position. Unknown letters and absent `o` targets become deferred
/// per-letter numerics; a missing required argument aborts with 461.
fn parse_channel_modes(
    ctx: &Context<'_>,
    name: &str,
    display: &str,
    modestring: &str,
    args: &[String],
) -> Result<(Vec<ChanAction>, Vec<HandlerError>), HandlerError> {
    let mut actions = Vec::new();
    let mut deferred = Vec::new();
    let mut args = args.iter();
    let mut adding = true;

    for letter in modestring.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            'i' | 't' | 's' => actions.push(ChanAction::Flag { letter, on: adding }),
            // No-external-messages is constitutive and cannot be toggled.
            'n' => {}
            'k' => {
                if adding {
                    let key = args
                        .next()
                        .ok_or_else(|| HandlerError::NeedMoreParams("MODE".into()))?;
                    actions.push(ChanAction::SetKey(key.clone()));
                } else {
                    // The unset form consumes a key argument but ignores it.
                    let _ = args.next();
                    actions.push(ChanAction::ClearKey);
                }
            }
            'l' => {
                if adding {
                    let raw = args
                        .next()
                        .ok_or_else(|| HandlerError::NeedMoreParams("MODE".into()))?;
                    match raw.parse::<usize>() {
                        Ok(limit) if limit > 0 => actions.push(ChanAction::SetLimit(limit)),
                        _ => {} // not a positive integer: the letter is dropped
                    }
                } else {
                    actions.push(ChanAction::ClearLimit);
                }
            }
            'o' => {
                let nick = args
                    .next()
                    .ok_or_else(|| HandlerError::NeedMoreParams("MODE".into()))?;
                let member = ctx
                    .world
                    .uid_by_nick(nick)
                    .filter(|t| ctx.world.channel(name).is_some_and(|c| c.is_member(*t)));
                match member {
                    Some(target) => {
                        let nick = ctx
                            .world
                            .user(target)
                            .map(|u| u.nick.clone())
                            .unwrap_or_else(|| nick.clone());
                        actions.push(ChanAction::Op {
                            target,
                            nick,
                            on: adding,
                        });
                    }
                    None => deferred.push(HandlerError::UserNotInChannel {
                        nick: nick.clone(),
                        channel: display.to_string(),
                    }),
                }
            }
            // Bans are not implemented; a mask argument is consumed so
            // later letters stay paired correctly.
            'b' => {
                let _ = args.next();
            }
            other => deferred.push(HandlerError::UnknownMode {
                mode: other,
                channel: display.to_string(),
            }),
        }
    }
    Ok((actions, deferred))
}

/// Apply actions, keeping only the ones that changed state. Returns
/// `(on, letter, arg)` tuples for the normalized broadcast.
fn apply_channel_modes(
    ctx: &mut Context<'_>,
    name: &str,
    actions: Vec<ChanAction>,
) -> Vec<(bool, char, Option<String>)> {
    let mut applied = Vec::new();
    let Some(chan) = ctx.world.channel_mut(name) else {
        return applied;
    };

    for action in actions {
        match action {
            ChanAction::Flag { letter, on } => {
                let flag = match letter {
                    'i' => &mut chan.modes.invite_only,
                    't' => &mut chan.modes.topic_locked,
                    's' => &mut chan.modes.secret,
                    _ => continue,
                };
                if *flag != on {
                    *flag = on;
                    applied.push((on, letter, None));
                }
            }
            ChanAction::SetKey(key) => {
                if chan.modes.key.as_deref() != Some(key.as_str()) {
                    chan.modes.key = Some(key.clone());
                    applied.push((true, 'k', Some(key)));
                }
            }
            ChanAction::ClearKey => {
                if chan.modes.key.take().is_some() {
                    applied.push((false, 'k', None));
                }
            }
            ChanAction::SetLimit(limit) => {
                if chan.modes.limit != Some(limit) {
                    chan.modes.limit = Some(limit);
                    applied.push((true, 'l', Some(limit.to_string())));
                }
            }
            ChanAction::ClearLimit => {
                if chan.modes.limit.take().is_some() {
                    applied.push((false, 'l', None));
                }
            }
            ChanAction::Op { target, nick, on } => {
                let changed = if on {
                    chan.ops.insert(target)
                } else {
                    chan.ops.remove(&target)
                };
                if changed {
                    applied.push((on, 'o', Some(nick)));
                }
            }
        }
    }
    applied
}

/// Collapse applied changes into one `+ab-c` modestring plus arguments.
fn normalize(applied: &[(bool, char, Option<String>)]) -> (String, Vec<String>) {
    let mut modes = String::new();
    let mut args = Vec::new();
    let mut sign: Option<bool> = None;
    for (on, letter, arg) in applied {
        if sign != Some(*on) {
            modes.push(if *on { '+' } else { '-' });
            sign = Some(*on);
        }
        modes.push(*letter);
        if let Some(arg) = arg {
            args.push(arg.clone());
        }
    }
    (modes, args)
}

fn user_mode(ctx: &mut Context<'_>, msg: &Message, target: &str) -> HandlerResult {
    if !irc_eq(target, &ctx.nick()) {
        return Err(HandlerError::UsersDontMatch);
    }

    if let Some(modestring) = msg.arg(1) {
        let mut adding = true;
        let mut unknown = Vec::new();
        {
            let user = ctx.user_mut();
            for letter in modestring.chars() {
                match letter {
                    '+' => adding = true,
                    '-' => adding = false,
                    'i' => user.modes.invisible = adding,
                    's' => user.modes.server_notices = adding,
                    'w' => user.modes.wallops = adding,
                    // Operator status is only ever granted by the server;
                    // +o from a user is dropped silently, -o is honored.
                    'o' => {
                        if !adding {
                            user.modes.oper = false;
                        }
                    }
                    _ => unknown.push(HandlerError::UmodeUnknownFlag),
                }
            }
        }
        for err in &unknown {
            ctx.fail(err);
        }
    }

    let modes = ctx.user().modes.as_mode_string();
    let reply = ctx.numeric(Response::RPL_UMODEIS).param(modes).build();
    ctx.send_self(reply);
    Ok(())
}

pub struct TopicHandler;

impl Handler for TopicHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.arg(0).unwrap_or_default().to_string();
        let uid = ctx.uid;

        let (chan_display, is_member, is_op, locked) = match ctx.world.channel(&name) {
            None => return Err(HandlerError::NoSuchChannel(name)),
            Some(chan) => (
                chan.name.clone(),
                chan.is_member(uid),
                chan.is_op(uid),
                chan.modes.topic_locked,
            ),
        };
        if !is_member {
            return Err(HandlerError::NotOnChannel(chan_display));
        }

        if msg.param_count() < 2 {
            // Query form.
            let topic = ctx.world.channel(&name).and_then(|c| c.topic.clone());
            if let Some(topic) = &topic {
                tracing::debug!(
                    channel = %chan_display,
                    set_by = %topic.set_by,
                    set_at = topic.set_at,
                    "topic queried"
                );
            }
            let reply = match topic {
                Some(topic) => ctx
                    .numeric(Response::RPL_TOPIC)
                    .param(&chan_display)
                    .trailing(topic.text),
                None => ctx
                    .numeric(Response::RPL_NOTOPIC)
                    .param(&chan_display)
                    .trailing("No topic is set"),
            }
            .build();
            ctx.send_self(reply);
            return Ok(());
        }

        // Set form. Topic changes are op-only under +t.
        if locked && !is_op {
            return Err(HandlerError::ChanOpPrivsNeeded(chan_display));
        }
        let text = msg.text_or_arg(1).unwrap_or_default().to_string();
        let setter = ctx.nick();
        if let Some(chan) = ctx.world.channel_mut(&name) {
            chan.topic = Some(crate::state::Topic {
                text: text.clone(),
                set_by: setter,
                set_at: chrono::Utc::now().timestamp(),
            });
        }

        let note = Message::cmd("TOPIC")
            .param(&chan_display)
            .trailing(text)
            .with_prefix(ctx.user().prefix());
        ctx.world.send_to_channel(&name, &note, None);
        Ok(())
    }
}
