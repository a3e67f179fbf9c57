//! Server queries: MOTD, INFO, VERSION, LIST, WHO, WHOIS.

use reef_proto::{irc_to_lower, Message, Response};

use crate::error::{HandlerError, HandlerResult};
use crate::state::Uid;

use super::{arg_or_trailing, Context, Handler};

/// 375/372/376 burst, or 422 when no MOTD is configured. Also part of
/// the registration welcome.
pub(super) fn send_motd(ctx: &mut Context<'_>) {
    if ctx.config.motd.is_empty() {
        let missing = ctx
            .numeric(Response::ERR_NOMOTD)
            .trailing("MOTD File is missing")
            .build();
        ctx.send_self(missing);
        return;
    }

    let server = ctx.config.server_name.clone();
    let start = ctx
        .numeric(Response::RPL_MOTDSTART)
        .trailing(format!("- {server} Message of the day - "))
        .build();
    ctx.send_self(start);
    for line in ctx.config.motd.clone() {
        let body = ctx
            .numeric(Response::RPL_MOTD)
            .trailing(format!("- {line}"))
            .build();
        ctx.send_self(body);
    }
    let end = ctx
        .numeric(Response::RPL_ENDOFMOTD)
        .trailing("End of /MOTD command")
        .build();
    ctx.send_self(end);
}

pub struct MotdHandler;

impl Handler for MotdHandler {
    fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        send_motd(ctx);
        Ok(())
    }
}

pub struct InfoHandler;

impl Handler for InfoHandler {
    fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let lines = [
            ctx.config.version.clone(),
            format!("Serving the {} network", ctx.config.network),
            format!("Online since {}", ctx.config.created),
        ];
        for line in lines {
            let info = ctx.numeric(Response::RPL_INFO).trailing(line).build();
            ctx.send_self(info);
        }
        let end = ctx
            .numeric(Response::RPL_ENDOFINFO)
            .trailing("End of /INFO list")
            .build();
        ctx.send_self(end);
        Ok(())
    }
}

pub struct VersionHandler;

impl Handler for VersionHandler {
    fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let reply = ctx
            .numeric(Response::RPL_VERSION)
            .param(ctx.config.version.clone())
            .param(ctx.config.server_name.clone())
            .trailing("single event loop")
            .build();
        ctx.send_self(reply);
        Ok(())
    }
}

pub struct ListHandler;

impl Handler for ListHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let uid = ctx.uid;
        let filter: Option<Vec<String>> = arg_or_trailing(msg, 0)
            .map(|list| list.split(',').map(irc_to_lower).collect());

        let start = ctx
            .numeric(Response::RPL_LISTSTART)
            .param("Channel")
            .trailing("Users  Name")
            .build();
        ctx.send_self(start);

        let mut rows: Vec<(String, usize, String)> = ctx
            .world
            .channels()
            .filter(|c| !c.modes.secret || c.is_member(uid))
            .filter(|c| {
                filter
                    .as_ref()
                    .is_none_or(|f| f.contains(&irc_to_lower(&c.name)))
            })
            .map(|c| {
                (
                    c.name.clone(),
                    c.members.len(),
                    c.topic.as_ref().map(|t| t.text.clone()).unwrap_or_default(),
                )
            })
            .collect();
        rows.sort();

        for (name, count, topic) in rows {
            let row = ctx
                .numeric(Response::RPL_LIST)
                .param(name)
                .param(count.to_string())
                .trailing(topic)
                .build();
            ctx.send_self(row);
        }
        let end = ctx
            .numeric(Response::RPL_LISTEND)
            .trailing("End of /LIST")
            .build();
        ctx.send_self(end);
        Ok(())
    }
}

pub struct WhoHandler;

impl Handler for WhoHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let mask = arg_or_trailing(msg, 0).map(str::to_string);

        match mask.as_deref() {
            Some(mask) if mask.starts_with('#') || mask.starts_with('&') => {
                if let Some(chan) = ctx.world.channel(mask) {
                    let display = chan.name.clone();
                    let rows: Vec<(Uid, bool)> =
                        chan.members.iter().map(|&m| (m, chan.is_op(m))).collect();
                    for (member, is_op) in rows {
                        send_who_row(ctx, &display, member, is_op);
                    }
                }
            }
            Some(mask) => {
                if let Some(target) = ctx.world.uid_by_nick(mask) {
                    send_who_row(ctx, "*", target, false);
                }
            }
            None => {
                let mut visible: Vec<Uid> = ctx
                    .world
                    .uids()
                    .into_iter()
                    .filter(|&u| {
                        ctx.world
                            .user(u)
                            .is_some_and(|user| user.is_registered() && !user.modes.invisible)
                    })
                    .collect();
                visible.sort();
                for target in visible {
                    send_who_row(ctx, "*", target, false);
                }
            }
        }

        let end = ctx
            .numeric(Response::RPL_ENDOFWHO)
            .param(mask.unwrap_or_else(|| "*".to_string()))
            .trailing("End of /WHO list")
            .build();
        ctx.send_self(end);
        Ok(())
    }
}

fn send_who_row(ctx: &mut Context<'_>, channel: &str, target: Uid, is_op: bool) {
    let Some(user) = ctx.world.user(target) else {
        return;
    };
    let flags = if is_op { "H@" } else { "H" };
    let row = ctx
        .numeric(Response::RPL_WHOREPLY)
        .param(channel)
        .param(user.username.clone())
        .param(user.host.clone())
        .param(ctx.config.server_name.clone())
        .param(user.nick.clone())
        .param(flags)
        .trailing(format!("0 {}", user.realname))
        .build();
    ctx.send_self(row);
}

pub struct WhoisHandler;

impl Handler for WhoisHandler {
    fn min_params(&self) -> usize {
        1
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let uid = ctx.uid;
        let targets = arg_or_trailing(msg, 0).unwrap_or_default().to_string();

        for nick in targets.split(',') {
            if nick.is_empty() {
                continue;
            }
            let Some(target) = ctx.world.uid_by_nick(nick) else {
                ctx.fail(&HandlerError::NoSuchNick(nick.to_string()));
                continue;
            };
            let Some(user) = ctx.world.user(target) else {
                continue;
            };
            let (target_nick, username, host, realname) = (
                user.nick.clone(),
                user.username.clone(),
                user.host.clone(),
                user.realname.clone(),
            );

            let whois = ctx
                .numeric(Response::RPL_WHOISUSER)
                .param(&target_nick)
                .param(username)
                .param(host)
                .param("*")
                .trailing(realname)
                .build();
            ctx.send_self(whois);

            // Channel list, secret ones visible only to fellow members.
            let mut chans = Vec::new();
            if let Some(user) = ctx.world.user(target) {
                for key in user.channels.clone() {
                    if let Some(chan) = ctx.world.channel(&key) {
                        if chan.modes.secret && !chan.is_member(uid) {
                            continue;
                        }
                        let marker = if chan.is_op(target) { "@" } else { "" };
                        chans.push(format!("{marker}{}", chan.name));
                    }
                }
            }
            if !chans.is_empty() {
                let channels = ctx
                    .numeric(Response::RPL_WHOISCHANNELS)
                    .param(&target_nick)
                    .trailing(chans.join(" "))
                    .build();
                ctx.send_self(channels);
            }

            let server = ctx
                .numeric(Response::RPL_WHOISSERVER)
                .param(&target_nick)
                .param(ctx.config.server_name.clone())
                .trailing(format!("{} relay", ctx.config.network))
                .build();
            ctx.send_self(server);

            let end = ctx
                .numeric(Response::RPL_ENDOFWHOIS)
                .param(&target_nick)
                .trailing("End of /WHOIS list")
                .build();
            ctx.send_self(end);
        }
        Ok(())
    }
}
