//! Channel membership commands: JOIN, PART, KICK, INVITE, NAMES.

use reef_proto::{irc_to_lower, is_valid_channel_name, Message, Response};
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};

use super::{arg_or_trailing, Context, Handler};

pub struct JoinHandler;

impl Handler for JoinHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let chans = arg_or_trailing(msg, 0).unwrap_or_default().to_string();
        let keys = arg_or_trailing(msg, 1).unwrap_or_default().to_string();
        let keys: Vec<&str> = keys.split(',').collect();

        for (i, name) in chans.split(',').enumerate() {
            if name.is_empty() {
                continue;
            }
            let key = keys.get(i).copied().filter(|k| !k.is_empty());
            if let Err(err) = join_one(ctx, name, key) {
                ctx.fail(&err);
            }
        }
        Ok(())
    }
}

/// Join a single channel: validate, enforce key/limit/invite in that
/// order, then broadcast the JOIN and show topic and names.
fn join_one(ctx: &mut Context<'_>, name: &str, key: Option<&str>) -> HandlerResult {
    if !is_valid_channel_name(name) {
        return Err(HandlerError::BadChanMask(name.to_string()));
    }
    let uid = ctx.uid;
    let nick_folded = irc_to_lower(&ctx.nick());

    let display = match ctx.world.channel(name) {
        Some(chan) => {
            // Re-joining is a no-op: no state change, no broadcast.
            if chan.is_member(uid) {
                return Ok(());
            }
            if let Some(k) = &chan.modes.key {
                if key != Some(k.as_str()) {
                    return Err(HandlerError::BadChannelKey(chan.name.clone()));
                }
            }
            if let Some(limit) = chan.modes.limit {
                if chan.members.len() >= limit {
                    return Err(HandlerError::ChannelIsFull(chan.name.clone()));
                }
            }
            if chan.modes.invite_only && !chan.invited.contains(&nick_folded) {
                return Err(HandlerError::InviteOnlyChan(chan.name.clone()));
            }
            Some(chan.name.clone())
        }
        None => None,
    };

    let display = match display {
        Some(display) => {
            // Invitations are single-use.
            if let Some(chan) = ctx.world.channel_mut(name) {
                chan.invited.remove(&nick_folded);
            }
            display
        }
        None => {
            let now = chrono::Utc::now().timestamp();
            let (chan, _) = ctx.world.channel_entry(name, now);
            chan.ops.insert(uid);
            debug!(channel = %chan.name, nick = %nick_folded, "channel created");
            chan.name.clone()
        }
    };

    ctx.world.join_channel(uid, name);

    let join = Message::cmd("JOIN")
        .param(&display)
        .with_prefix(ctx.user().prefix());
    ctx.world.send_to_channel(name, &join, None);

    let topic = ctx.world.channel(name).and_then(|c| c.topic.clone());
    let reply = match topic {
        Some(topic) => ctx
            .numeric(Response::RPL_TOPIC)
            .param(&display)
            .trailing(topic.text),
        None => ctx
            .numeric(Response::RPL_NOTOPIC)
            .param(&display)
            .trailing("No topic is set"),
    }
    .build();
    ctx.send_self(reply);

    send_names(ctx, name);
    Ok(())
}

/// 353/366 for one channel.
pub(super) fn send_names(ctx: &mut Context<'_>, name: &str) {
    let Some(chan) = ctx.world.channel(name) else {
        return;
    };
    let display = chan.name.clone();
    let symbol = if chan.modes.secret { "@" } else { "=" };
    let members: Vec<(crate::state::Uid, bool)> =
        chan.members.iter().map(|&m| (m, chan.is_op(m))).collect();

    let mut nicks = Vec::new();
    for (member, is_op) in members {
        let Some(user) = ctx.world.user(member) else {
            continue;
        };
        let marker = if is_op { "@" } else { "" };
        nicks.push(format!("{marker}{}", user.nick));
    }

    let names = ctx
        .numeric(Response::RPL_NAMREPLY)
        .param(symbol)
        .param(&display)
        .trailing(nicks.join(" "))
        .build();
    ctx.send_self(names);

    let end = ctx
        .numeric(Response::RPL_ENDOFNAMES)
        .param(&display)
        .trailing("End of /NAMES list")
        .build();
    ctx.send_self(end);
}

pub struct PartHandler;

impl Handler for PartHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let chans = arg_or_trailing(msg, 0).unwrap_or_default().to_string();
        let reason = if msg.params.is_empty() {
            None
        } else {
            msg.trailing.clone()
        };

        for name in chans.split(',') {
            if name.is_empty() {
                continue;
            }
            if let Err(err) = part_one(ctx, name, reason.as_deref()) {
                ctx.fail(&err);
            }
        }
        Ok(())
    }
}

fn part_one(ctx: &mut Context<'_>, name: &str, reason: Option<&str>) -> HandlerResult {
    let uid = ctx.uid;
    let display = match ctx.world.channel(name) {
        None => return Err(HandlerError::NoSuchChannel(name.to_string())),
        Some(chan) => {
            if !chan.is_member(uid) {
                return Err(HandlerError::NotOnChannel(chan.name.clone()));
            }
            chan.name.clone()
        }
    };

    let mut part = Message::cmd("PART")
        .param(&display)
        .with_prefix(ctx.user().prefix());
    if let Some(reason) = reason {
        part = part.trailing(reason);
    }
    ctx.world.send_to_channel(name, &part, None);
    ctx.world.leave_channel(uid, name);
    Ok(())
}

pub struct KickHandler;

impl Handler for KickHandler {
    fn min_params(&self) -> usize {
        2
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.arg(0).unwrap_or_default().to_string();
        let target = arg_or_trailing(msg, 1).unwrap_or_default().to_string();
        let uid = ctx.uid;

        let display = match ctx.world.channel(&name) {
            None => return Err(HandlerError::NoSuchChannel(name)),
            Some(chan) => {
                if !chan.is_member(uid) {
                    return Err(HandlerError::NotOnChannel(chan.name.clone()));
                }
                if !chan.is_op(uid) {
                    return Err(HandlerError::ChanOpPrivsNeeded(chan.name.clone()));
                }
                chan.name.clone()
            }
        };

        let target_uid = ctx
            .world
            .uid_by_nick(&target)
            .filter(|t| {
                ctx.world
                    .channel(&name)
                    .is_some_and(|chan| chan.is_member(*t))
            })
            .ok_or_else(|| HandlerError::UserNotInChannel {
                nick: target.clone(),
                channel: display.clone(),
            })?;

        let target_nick = ctx
            .world
            .user(target_uid)
            .map(|u| u.nick.clone())
            .unwrap_or(target);
        let reason = if msg.params.len() >= 2 {
            msg.trailing.clone()
        } else {
            None
        };
        let reason = reason.unwrap_or_else(|| ctx.nick());

        let kick = Message::cmd("KICK")
            .param(&display)
            .param(&target_nick)
            .trailing(reason)
            .with_prefix(ctx.user().prefix());
        ctx.world.send_to_channel(&name, &kick, None);
        ctx.world.leave_channel(target_uid, &name);
        Ok(())
    }
}

pub struct InviteHandler;

impl Handler for InviteHandler {
    fn min_params(&self) -> usize {
        2
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg(0).unwrap_or_default().to_string();
        let name = arg_or_trailing(msg, 1).unwrap_or_default().to_string();
        let uid = ctx.uid;

        let target_uid = ctx
            .world
            .uid_by_nick(&target)
            .ok_or_else(|| HandlerError::NoSuchNick(target.clone()))?;

        let display = match ctx.world.channel(&name) {
            None => return Err(HandlerError::NoSuchChannel(name)),
            Some(chan) => {
                if !chan.is_member(uid) {
                    return Err(HandlerError::NotOnChannel(chan.name.clone()));
                }
                if chan.modes.invite_only && !chan.is_op(uid) {
                    return Err(HandlerError::ChanOpPrivsNeeded(chan.name.clone()));
                }
                chan.name.clone()
            }
        };

        let target_nick = ctx
            .world
            .user(target_uid)
            .map(|u| u.nick.clone())
            .unwrap_or(target);
        if let Some(chan) = ctx.world.channel_mut(&name) {
            chan.invited.insert(irc_to_lower(&target_nick));
        }

        let invite = Message::cmd("INVITE")
            .param(&target_nick)
            .trailing(&display)
            .with_prefix(ctx.user().prefix());
        ctx.world.send(target_uid, invite);

        let confirm = ctx
            .numeric(Response::RPL_INVITING)
            .param(&target_nick)
            .param(&display)
            .build();
        ctx.send_self(confirm);
        Ok(())
    }
}

pub struct NamesHandler;

impl Handler for NamesHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let uid = ctx.uid;
        match arg_or_trailing(msg, 0) {
            Some(list) => {
                for name in list.split(',').map(str::to_string).collect::<Vec<_>>() {
                    let visible = ctx
                        .world
                        .channel(&name)
                        .is_some_and(|c| !c.modes.secret || c.is_member(uid));
                    if visible {
                        send_names(ctx, &name);
                    }
                }
            }
            None => {
                let mut names: Vec<String> = ctx
                    .world
                    .channels()
                    .filter(|c| !c.modes.secret || c.is_member(uid))
                    .map(|c| c.name.clone())
                    .collect();
                names.sort();
                for name in names {
                    send_names(ctx, &name);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Rig;

    #[test]
    fn first_joiner_creates_the_channel_and_gets_ops() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        rig.line(&alice, "JOIN #dev");
        let lines = alice.drain_lines();
        assert_eq!(lines[0], ":alice!alice@test.host JOIN #dev");
        assert!(lines[1].contains(" 331 alice #dev "));
        assert!(lines[2].contains(" 353 alice = #dev :@alice"));
        assert!(lines[3].contains(" 366 alice #dev "));
        assert!(rig
            .world
            .channel("#dev")
            .unwrap()
            .is_op(alice.uid));
    }

    #[test]
    fn join_is_broadcast_to_existing_members() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        let bob = rig.register("bob");
        rig.line(&alice, "JOIN #dev");
        alice.drain();
        rig.line(&bob, "JOIN #dev");
        let lines = alice.drain_lines();
        assert_eq!(lines, vec![":bob!bob@test.host JOIN #dev"]);
    }

    #[test]
    fn rejoining_is_a_noop() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        rig.line(&alice, "JOIN #dev");
        alice.drain();
        rig.line(&alice, "JOIN #dev");
        assert!(alice.drain_lines().is_empty());
    }

    #[test]
    fn bad_channel_name_is_476() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        rig.line(&alice, "JOIN reef");
        assert_eq!(alice.drain_codes(), vec![476]);
    }

    #[test]
    fn join_pairs_keys_with_channels_by_position() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        rig.line(&alice, "JOIN #a,#b");
        rig.line(&alice, "MODE #b +k sesame");

        let mut bob = rig.register("bob");
        rig.line(&bob, "JOIN #a,#b ,sesame");
        let codes = bob.drain_codes();
        assert!(!codes.contains(&475));
        assert!(rig.world.channel("#b").unwrap().is_member(bob.uid));
    }

    #[test]
    fn wrong_key_is_475() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        rig.line(&alice, "JOIN #vault");
        rig.line(&alice, "MODE #vault +k sesame");
        let mut bob = rig.register("bob");
        rig.line(&bob, "JOIN #vault wrong");
        assert_eq!(bob.drain_codes(), vec![475]);
    }

    #[test]
    fn user_limit_gives_471_to_the_overflow_joiner() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        rig.line(&alice, "JOIN #tiny");
        rig.line(&alice, "MODE #tiny +l 2");
        let bob = rig.register("bob");
        rig.line(&bob, "JOIN #tiny");
        let mut carol = rig.register("carol");
        rig.line(&carol, "JOIN #tiny");
        assert_eq!(carol.drain_codes(), vec![471]);
    }

    #[test]
    fn part_broadcasts_then_removes() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        let mut bob = rig.register("bob");
        rig.line(&alice, "JOIN #dev");
        rig.line(&bob, "JOIN #dev");
        alice.drain();
        bob.drain();

        rig.line(&bob, "PART #dev :outta here");
        assert_eq!(
            alice.drain_lines(),
            vec![":bob!bob@test.host PART #dev :outta here"]
        );
        assert_eq!(
            bob.drain_lines(),
            vec![":bob!bob@test.host PART #dev :outta here"]
        );
        assert!(!rig.world.channel("#dev").unwrap().is_member(bob.uid));
        rig.world.assert_consistent();
    }

    #[test]
    fn parting_the_last_member_destroys_the_channel() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        rig.line(&alice, "JOIN #dev");
        rig.line(&alice, "PART #dev");
        assert!(rig.world.channel("#dev").is_none());
        rig.world.assert_consistent();
    }

    #[test]
    fn part_errors() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        rig.line(&alice, "PART #nowhere");
        assert_eq!(alice.drain_codes(), vec![403]);

        let bob = rig.register("bob");
        rig.line(&bob, "JOIN #dev");
        rig.line(&alice, "PART #dev");
        assert_eq!(alice.drain_codes(), vec![442]);
    }

    #[test]
    fn kick_requires_ops() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        let mut bob = rig.register("bob");
        let carol = rig.register("carol");
        for s in [&alice, &bob, &carol] {
            rig.line(s, "JOIN #chat");
        }
        rig.line(&bob, "KICK #chat carol :go");
        bob.drain();
        // 482 rendered, carol still present.
        rig.line(&bob, "KICK #chat carol");
        let lines = bob.drain_lines();
        assert_eq!(
            lines,
            vec![":reef.local 482 bob #chat :You're not channel operator"]
        );
        assert!(rig.world.channel("#chat").unwrap().is_member(carol.uid));
    }

    #[test]
    fn op_kick_broadcasts_to_everyone_then_removes() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        let mut bob = rig.register("bob");
        let mut carol = rig.register("carol");
        for s in [&alice, &bob, &carol] {
            rig.line(s, "JOIN #chat");
        }
        bob.drain();
        carol.drain();

        rig.line(&alice, "KICK #chat carol :spam");
        let expected = ":alice!alice@test.host KICK #chat carol :spam";
        assert!(bob.drain_lines().contains(&expected.to_string()));
        assert!(carol.drain_lines().contains(&expected.to_string()));
        assert!(!rig.world.channel("#chat").unwrap().is_member(carol.uid));
    }

    #[test]
    fn kick_unknown_target_is_441() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        rig.line(&alice, "JOIN #chat");
        alice.drain();
        rig.line(&alice, "KICK #chat ghost");
        let lines = alice.drain_lines();
        assert_eq!(
            lines,
            vec![":reef.local 441 alice ghost #chat :They aren't on that channel"]
        );
    }

    #[test]
    fn invite_flow_lets_target_through_plus_i() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        let mut bob = rig.register("bob");
        rig.line(&alice, "JOIN #dev");
        rig.line(&alice, "MODE #dev +i");
        alice.drain();

        rig.line(&bob, "JOIN #dev");
        assert_eq!(
            bob.drain_lines(),
            vec![":reef.local 473 bob #dev :Cannot join channel (+i)"]
        );

        rig.line(&alice, "INVITE bob #dev");
        assert_eq!(
            alice.drain_lines(),
            vec![":reef.local 341 alice bob #dev"]
        );
        assert_eq!(
            bob.drain_lines(),
            vec![":alice!alice@test.host INVITE bob :#dev"]
        );

        rig.line(&bob, "JOIN #dev");
        let lines = bob.drain_lines();
        assert_eq!(lines[0], ":bob!bob@test.host JOIN #dev");
    }

    #[test]
    fn invitations_are_single_use() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        let mut bob = rig.register("bob");
        rig.line(&alice, "JOIN #dev");
        rig.line(&alice, "MODE #dev +i");
        rig.line(&alice, "INVITE bob #dev");
        rig.line(&bob, "JOIN #dev");
        rig.line(&bob, "PART #dev");
        bob.drain();
        rig.line(&bob, "JOIN #dev");
        assert_eq!(bob.drain_codes(), vec![473]);
    }

    #[test]
    fn invite_requires_ops_only_on_invite_only_channels() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        let mut bob = rig.register("bob");
        let _carol = rig.register("carol");
        rig.line(&alice, "JOIN #open");
        rig.line(&bob, "JOIN #open");
        bob.drain();
        rig.line(&bob, "INVITE carol #open");
        assert_eq!(bob.drain_codes(), vec![341]);

        rig.line(&alice, "MODE #open +i");
        rig.line(&bob, "INVITE carol #open");
        assert_eq!(bob.drain_codes(), vec![482]);
    }

    #[test]
    fn names_marks_operators() {
        let mut rig = Rig::new();
        let mut alice = rig.register("alice");
        let bob = rig.register("bob");
        rig.line(&alice, "JOIN #dev");
        rig.line(&bob, "JOIN #dev");
        alice.drain();
        rig.line(&alice, "NAMES #dev");
        let lines = alice.drain_lines();
        assert!(lines[0].contains(" 353 alice = #dev :@alice bob"));
    }

    #[test]
    fn secret_channels_are_hidden_from_outsiders() {
        let mut rig = Rig::new();
        let alice = rig.register("alice");
        let mut bob = rig.register("bob");
        rig.line(&alice, "JOIN #sec");
        rig.line(&alice, "MODE #sec +s");
        rig.line(&bob, "NAMES #sec");
        assert!(bob.drain_lines().is_empty());
    }
}
