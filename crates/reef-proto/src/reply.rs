//! Numeric reply builder.
//!
//! Every numeric line has the same skeleton:
//! `:<server> <code> <recipient> [params…] [:trailing]`. The builder
//! assembles exactly one such line; handlers chain params and finish with
//! [`Reply::build`].

use crate::message::Message;
use crate::response::Response;

/// Builder for one server-prefixed numeric line.
#[derive(Debug)]
pub struct Reply {
    server: String,
    code: Response,
    recipient: String,
    params: Vec<String>,
    trailing: Option<String>,
}

impl Reply {
    /// Start a numeric addressed to `recipient`. An unregistered session
    /// has no nickname yet; pass `*` as the recipient in that case.
    pub fn numeric(server: &str, recipient: &str, code: Response) -> Self {
        Self {
            server: server.to_string(),
            code,
            recipient: recipient.to_string(),
            params: Vec::new(),
            trailing: None,
        }
    }

    /// Append a middle parameter.
    #[must_use]
    pub fn param(mut self, p: impl Into<String>) -> Self {
        self.params.push(p.into());
        self
    }

    /// Set the trailing parameter.
    #[must_use]
    pub fn trailing(mut self, t: impl Into<String>) -> Self {
        self.trailing = Some(t.into());
        self
    }

    /// Assemble the message.
    pub fn build(self) -> Message {
        let mut msg = Message::cmd(self.code.token())
            .with_prefix(self.server)
            .param(self.recipient);
        for p in self.params {
            msg = msg.param(p);
        }
        if let Some(t) = self.trailing {
            msg = msg.trailing(t);
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_numeric_line() {
        let msg = Reply::numeric("reef.local", "alice", Response::RPL_TOPIC)
            .param("#reef")
            .trailing("today: tides")
            .build();
        assert_eq!(msg.to_string(), ":reef.local 332 alice #reef :today: tides");
    }

    #[test]
    fn star_recipient_before_registration() {
        let msg = Reply::numeric("reef.local", "*", Response::ERR_NOTREGISTERED)
            .trailing("You have not registered")
            .build();
        assert_eq!(msg.to_string(), ":reef.local 451 * :You have not registered");
    }
}
