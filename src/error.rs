//! The protocol-error taxonomy.
//!
//! Command handlers fail with a [`HandlerError`]; the dispatcher renders
//! each one into its RFC 1459 numeric addressed to the offending user and
//! nobody else. The set is closed: every variant knows its code and its
//! parameter layout, and `is_fatal` marks the few that tear the
//! connection down after the reply is flushed.

use reef_proto::{Message, Reply, Response};
use thiserror::Error;

/// A command failure with a defined numeric rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("no such nick: {0}")]
    NoSuchNick(String),
    #[error("no such channel: {0}")]
    NoSuchChannel(String),
    #[error("cannot send to channel {0}")]
    CannotSendToChan(String),
    #[error("no recipient for {0}")]
    NoRecipient(String),
    #[error("no text to send")]
    NoTextToSend,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),
    #[error("nickname in use: {0}")]
    NicknameInUse(String),
    #[error("{nick} is not on channel {channel}")]
    UserNotInChannel { nick: String, channel: String },
    #[error("not on channel {0}")]
    NotOnChannel(String),
    #[error("not registered")]
    NotRegistered,
    #[error("{0} needs more parameters")]
    NeedMoreParams(String),
    #[error("already registered")]
    AlreadyRegistered,
    #[error("password mismatch")]
    PasswdMismatch,
    #[error("channel {0} is full")]
    ChannelIsFull(String),
    #[error("unknown mode {mode} on {channel}")]
    UnknownMode { mode: char, channel: String },
    #[error("channel {0} is invite-only")]
    InviteOnlyChan(String),
    #[error("bad key for channel {0}")]
    BadChannelKey(String),
    #[error("bad channel mask: {0}")]
    BadChanMask(String),
    #[error("not channel operator on {0}")]
    ChanOpPrivsNeeded(String),
    #[error("unknown user mode flag")]
    UmodeUnknownFlag,
    #[error("cannot change mode for other users")]
    UsersDontMatch,
}

impl HandlerError {
    /// The numeric this error renders as.
    pub fn response(&self) -> Response {
        match self {
            Self::NoSuchNick(_) => Response::ERR_NOSUCHNICK,
            Self::NoSuchChannel(_) => Response::ERR_NOSUCHCHANNEL,
            Self::CannotSendToChan(_) => Response::ERR_CANNOTSENDTOCHAN,
            Self::NoRecipient(_) => Response::ERR_NORECIPIENT,
            Self::NoTextToSend => Response::ERR_NOTEXTTOSEND,
            Self::UnknownCommand(_) => Response::ERR_UNKNOWNCOMMAND,
            Self::ErroneousNickname(_) => Response::ERR_ERRONEUSNICKNAME,
            Self::NicknameInUse(_) => Response::ERR_NICKNAMEINUSE,
            Self::UserNotInChannel { .. } => Response::ERR_USERNOTINCHANNEL,
            Self::NotOnChannel(_) => Response::ERR_NOTONCHANNEL,
            Self::NotRegistered => Response::ERR_NOTREGISTERED,
            Self::NeedMoreParams(_) => Response::ERR_NEEDMOREPARAMS,
            Self::AlreadyRegistered => Response::ERR_ALREADYREGISTRED,
            Self::PasswdMismatch => Response::ERR_PASSWDMISMATCH,
            Self::ChannelIsFull(_) => Response::ERR_CHANNELISFULL,
            Self::UnknownMode { .. } => Response::ERR_UNKNOWNMODE,
            Self::InviteOnlyChan(_) => Response::ERR_INVITEONLYCHAN,
            Self::BadChannelKey(_) => Response::ERR_BADCHANNELKEY,
            Self::BadChanMask(_) => Response::ERR_BADCHANMASK,
            Self::ChanOpPrivsNeeded(_) => Response::ERR_CHANOPRIVSNEEDED,
            Self::UmodeUnknownFlag => Response::ERR_UMODEUNKNOWNFLAG,
            Self::UsersDontMatch => Response::ERR_USERSDONTMATCH,
        }
    }

    /// Errors that terminate the connection once the reply is flushed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PasswdMismatch)
    }

    /// Render the numeric line addressed to `recipient` (the user's nick,
    /// or `*` before one is set).
    pub fn to_reply(&self, server: &str, recipient: &str) -> Message {
        let reply = Reply::numeric(server, recipient, self.response());
        match self {
            Self::NoSuchNick(target) => reply.param(target).trailing("No such nick/channel"),
            Self::NoSuchChannel(chan) => reply.param(chan).trailing("No such channel"),
            Self::CannotSendToChan(chan) => reply.param(chan).trailing("Cannot send to channel"),
            Self::NoRecipient(cmd) => reply.trailing(format!("No recipient given ({cmd})")),
            Self::NoTextToSend => reply.trailing("No text to send"),
            Self::UnknownCommand(cmd) => reply.param(cmd).trailing("Unknown command"),
            Self::ErroneousNickname(nick) => reply.param(nick).trailing("Erroneous nickname"),
            Self::NicknameInUse(nick) => {
                reply.param(nick).trailing("Nickname is already in use")
            }
            Self::UserNotInChannel { nick, channel } => reply
                .param(nick)
                .param(channel)
                .trailing("They aren't on that channel"),
            Self::NotOnChannel(chan) => reply.param(chan).trailing("You're not on that channel"),
            Self::NotRegistered => reply.trailing("You have not registered"),
            Self::NeedMoreParams(cmd) => reply.param(cmd).trailing("Not enough parameters"),
            Self::AlreadyRegistered => reply.trailing("You may not reregister"),
            Self::PasswdMismatch => reply.trailing("Password incorrect"),
            Self::ChannelIsFull(chan) => {
                reply.param(chan).trailing("Cannot join channel (+l)")
            }
            Self::UnknownMode { mode, channel } => reply
                .param(mode.to_string())
                .trailing(format!("is unknown mode char to me for {channel}")),
            Self::InviteOnlyChan(chan) => {
                reply.param(chan).trailing("Cannot join channel (+i)")
            }
            Self::BadChannelKey(chan) => {
                reply.param(chan).trailing("Cannot join channel (+k)")
            }
            Self::BadChanMask(chan) => reply.param(chan).trailing("Bad Channel Mask"),
            Self::ChanOpPrivsNeeded(chan) => {
                reply.param(chan).trailing("You're not channel operator")
            }
            Self::UmodeUnknownFlag => reply.trailing("Unknown MODE flag"),
            Self::UsersDontMatch => reply.trailing("Cannot change mode for other users"),
        }
        .build()
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;
