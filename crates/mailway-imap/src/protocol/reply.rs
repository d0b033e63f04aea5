//! Server reply records.
//!
//! A reply is the unit the engine dispatches: the untagged info lines
//! and literal blobs that accumulated since the previous tagged reply,
//! plus the final tagged status line.

use std::sync::OnceLock;

use crate::parser::{self, Token};
use crate::types::Tag;

/// Receive state of a reply record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// An untagged info line (transient while assembling).
    Info,
    /// A `+` continuation request.
    Continue,
    /// Final tagged `OK`.
    Ready,
    /// Final tagged `NO`.
    Failure,
    /// Final tagged `BAD`.
    Error,
    /// The transport closed before the reply completed.
    Closed,
    /// A protocol-level failure (unparseable status word).
    Exception,
}

impl ReceiveState {
    /// Returns true for the states that conclude a reply.
    #[must_use]
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Info | Self::Continue)
    }
}

/// Final status word of a tagged reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// `OK` — command completed.
    Ok,
    /// `NO` — command failed.
    No,
    /// `BAD` — protocol or syntax error.
    Bad,
}

impl ReplyStatus {
    /// Parses a status word, case-insensitively.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("OK") {
            Some(Self::Ok)
        } else if word.eq_ignore_ascii_case("NO") {
            Some(Self::No)
        } else if word.eq_ignore_ascii_case("BAD") {
            Some(Self::Bad)
        } else {
            None
        }
    }

    /// Maps the status to the reply receive state.
    #[must_use]
    pub const fn receive_state(self) -> ReceiveState {
        match self {
            Self::Ok => ReceiveState::Ready,
            Self::No => ReceiveState::Failure,
            Self::Bad => ReceiveState::Error,
        }
    }
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
        })
    }
}

/// One untagged info line attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoLine {
    /// The status token (`OK`, `CAPABILITY`, a number, ...).
    pub status: String,
    /// The rest of the line, literal markers elided.
    pub message: String,
    /// Literal blobs carried by this line.
    pub literals: Vec<Vec<u8>>,
}

/// A complete server reply.
#[derive(Debug)]
pub struct Reply {
    tag: Tag,
    status: Option<ReplyStatus>,
    message: String,
    infos: Vec<InfoLine>,
    state: ReceiveState,
    tokens: OnceLock<Vec<Token>>,
}

impl Reply {
    /// Creates an empty record in the assembling state.
    #[must_use]
    pub(crate) fn assembling() -> Self {
        Self {
            tag: Tag::UNTAGGED,
            status: None,
            message: String::new(),
            infos: Vec::new(),
            state: ReceiveState::Info,
            tokens: OnceLock::new(),
        }
    }

    pub(crate) fn push_info(&mut self, info: InfoLine) {
        self.infos.push(info);
    }

    pub(crate) fn conclude(&mut self, tag: Tag, state: ReceiveState, message: String) {
        self.tag = tag;
        self.state = state;
        self.message = message;
        self.status = match state {
            ReceiveState::Ready => Some(ReplyStatus::Ok),
            ReceiveState::Failure => Some(ReplyStatus::No),
            ReceiveState::Error => Some(ReplyStatus::Bad),
            _ => None,
        };
    }

    /// The tag of the concluding line, or [`Tag::UNTAGGED`] for
    /// continuation and closed records.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// The final status, if the reply concluded with one.
    #[must_use]
    pub const fn status(&self) -> Option<ReplyStatus> {
        self.status
    }

    /// The receive state.
    #[must_use]
    pub const fn state(&self) -> ReceiveState {
        self.state
    }

    /// True iff the final status was `OK`.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == ReceiveState::Ready
    }

    /// The final tagged line's message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The untagged info lines, oldest first.
    #[must_use]
    pub fn infos(&self) -> &[InfoLine] {
        &self.infos
    }

    /// All literal blobs across the reply, in arrival order.
    pub fn literals(&self) -> impl Iterator<Item = &[u8]> {
        self.infos
            .iter()
            .flat_map(|info| info.literals.iter().map(Vec::as_slice))
    }

    /// Tokenises the final message, caching the result.
    ///
    /// Unparseable messages yield an empty token list; typed accessors
    /// treat that as "not present".
    pub fn tokens(&self) -> &[Token] {
        self.tokens.get_or_init(|| {
            parser::parse(&self.message).unwrap_or_else(|e| {
                tracing::debug!(message = self.message, %e, "reply message did not tokenise");
                Vec::new()
            })
        })
    }

    /// The bracketed response code of the final line, if present
    /// (e.g. `[APPENDUID 1 2]`, `[READ-ONLY]`).
    #[must_use]
    pub fn response_code(&self) -> Option<&str> {
        match self.tokens().first() {
            Some(Token::Bracketed(code)) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn completed(status: ReplyStatus, message: &str) -> Reply {
        let mut reply = Reply::assembling();
        reply.conclude(Tag::new(3), status.receive_state(), message.to_string());
        reply
    }

    #[test]
    fn test_ready_iff_ok() {
        assert!(completed(ReplyStatus::Ok, "done").succeeded());
        assert!(!completed(ReplyStatus::No, "nope").succeeded());
        assert!(!completed(ReplyStatus::Bad, "syntax").succeeded());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ReplyStatus::parse("OK"), Some(ReplyStatus::Ok));
        assert_eq!(ReplyStatus::parse("ok"), Some(ReplyStatus::Ok));
        assert_eq!(ReplyStatus::parse("No"), Some(ReplyStatus::No));
        assert_eq!(ReplyStatus::parse("BAD"), Some(ReplyStatus::Bad));
        assert_eq!(ReplyStatus::parse("WAT"), None);
    }

    #[test]
    fn test_lazy_tokens_cached() {
        let reply = completed(ReplyStatus::Ok, "[UIDNEXT 4392] Predicted next UID");
        let first = reply.tokens().as_ptr();
        let second = reply.tokens().as_ptr();
        assert_eq!(first, second);
        assert_eq!(reply.response_code(), Some("UIDNEXT 4392"));
    }

    #[test]
    fn test_literals_flatten_in_order() {
        let mut reply = Reply::assembling();
        reply.push_info(InfoLine {
            status: "1".to_string(),
            message: "FETCH ()".to_string(),
            literals: vec![b"one".to_vec(), b"two".to_vec()],
        });
        reply.push_info(InfoLine {
            status: "2".to_string(),
            message: "FETCH ()".to_string(),
            literals: vec![b"three".to_vec()],
        });

        let all: Vec<&[u8]> = reply.literals().collect();
        assert_eq!(all, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
    }
}
