//! Command objects: request builders and the command state machine.
//!
//! A command owns its wire arguments (a mixed sequence of text and
//! literal blobs), its assigned tag, its lifecycle state and, once
//! completed, its reply.

mod args;
mod kind;
pub mod typed;

pub use args::{FetchAttribute, FetchItems, SearchCriteria, StatusAttribute, StoreAction};
pub use kind::CommandKind;

use std::any::Any;

use crate::protocol::{Reply, SendFragment};
use crate::types::{Tag, encode_ids, encode_mailbox};
use crate::{Error, Result};

/// Unique identity of a command within its engine, assigned at
/// creation and stable across tag assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(pub(crate) u64);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a command.
///
/// Transitions are unidirectional except through reset, which returns
/// a completed or failed command to `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Built but not yet queued.
    Created,
    /// Attached to the engine's queue, not yet sent.
    Queued,
    /// Sent; awaiting the tagged reply.
    Running,
    /// Tagged reply arrived with `OK`.
    Completed,
    /// Tagged reply arrived with `NO`/`BAD`, or the reply errored.
    Failed,
    /// Detached; terminal.
    Disposed,
}

/// An IMAP command under construction or in flight.
pub struct Command {
    id: CommandId,
    kind: CommandKind,
    uid: bool,
    text: String,
    fragments: Vec<SendFragment>,
    list_depth: u32,
    tag: Option<Tag>,
    state: CommandState,
    reply: Option<Reply>,
    auto_dispose: bool,
    user_data: Option<Box<dyn Any + Send>>,
}

impl Command {
    pub(crate) fn attach(id: CommandId, kind: CommandKind, auto_dispose: bool) -> Self {
        Self {
            id,
            kind,
            uid: false,
            text: String::new(),
            fragments: Vec::new(),
            list_depth: 0,
            tag: None,
            state: CommandState::Created,
            reply: None,
            auto_dispose,
            user_data: None,
        }
    }

    /// The engine-assigned identity.
    #[must_use]
    pub const fn id(&self) -> CommandId {
        self.id
    }

    /// The command kind.
    #[must_use]
    pub const fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// The upper-case wire atom, without the `UID` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// The lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        self.state
    }

    /// The assigned tag, once the command has been sent.
    #[must_use]
    pub const fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// The reply, once the command completed or failed.
    #[must_use]
    pub const fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    /// True iff the command completed with a tagged `OK`.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.reply.as_ref().is_some_and(Reply::succeeded)
    }

    /// Whether the engine may dispose this command in a cascade.
    #[must_use]
    pub const fn auto_dispose(&self) -> bool {
        self.auto_dispose
    }

    /// Sets the auto-dispose flag.
    pub fn set_auto_dispose(&mut self, auto_dispose: bool) {
        self.auto_dispose = auto_dispose;
    }

    /// Attaches opaque user data to the command.
    pub fn set_user_data<T: Any + Send>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    /// Borrows previously attached user data.
    #[must_use]
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data
            .as_ref()
            .and_then(|data| data.downcast_ref::<T>())
    }

    /// Enables the `UID` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for commands outside the
    /// COPY/FETCH/STORE/SEARCH set.
    pub fn set_uid(&mut self, uid: bool) -> Result<()> {
        self.ensure_buildable()?;
        if uid && !self.kind.allows_uid() {
            return Err(Error::InvalidArgument(format!(
                "UID prefix is not valid for {}",
                self.kind
            )));
        }
        self.uid = uid;
        Ok(())
    }

    /// Whether the `UID` prefix is set.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        self.uid
    }

    // === Builder operations ===

    /// Appends a bare atom. `None` becomes `NIL`, the empty string
    /// becomes `""`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the atom contains a
    /// space, quote, backslash or any byte outside printable ASCII.
    pub fn add_atom(&mut self, atom: Option<&str>) -> Result<()> {
        self.ensure_buildable()?;
        match atom {
            None => {
                self.separator();
                self.text.push_str("NIL");
            }
            Some("") => {
                self.separator();
                self.text.push_str("\"\"");
            }
            Some(atom) => {
                if atom
                    .bytes()
                    .any(|b| b <= 0x20 || b >= 0x7f || b == b'"' || b == b'\\')
                {
                    return Err(Error::InvalidArgument(format!(
                        "not a valid atom: {atom:?}"
                    )));
                }
                self.separator();
                self.text.push_str(atom);
            }
        }
        Ok(())
    }

    /// Appends already-formatted text with no validation (numbers,
    /// sequence sets, fetch item lists).
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_raw(&mut self, raw: &str) -> Result<()> {
        self.ensure_buildable()?;
        self.separator();
        self.text.push_str(raw);
        Ok(())
    }

    /// Appends a message-number list encoded as an RFC 3501 sequence
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MustBeNonZero`] for zero ids and
    /// [`Error::InvalidArgument`] for an empty list.
    pub fn add_sequence(&mut self, ids: &[u32]) -> Result<()> {
        self.ensure_buildable()?;
        let encoded = encode_ids(ids)?;
        self.separator();
        self.text.push_str(&encoded);
        Ok(())
    }

    /// Appends a quoted string, or promotes to a literal when the text
    /// is not 7-bit safe and `allow_literal` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for 8-bit content without
    /// `allow_literal`.
    pub fn add_quoted(&mut self, value: &str, allow_literal: bool) -> Result<()> {
        self.ensure_buildable()?;
        if value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
            self.separator();
            self.text.push('"');
            for c in value.chars() {
                if c == '"' || c == '\\' {
                    self.text.push('\\');
                }
                self.text.push(c);
            }
            self.text.push('"');
            Ok(())
        } else if allow_literal {
            self.promote_literal(value.as_bytes());
            Ok(())
        } else {
            Err(Error::InvalidArgument(
                "quoted string is not 7-bit safe".to_string(),
            ))
        }
    }

    /// Appends a mailbox name, encoding it with modified UTF-7 first.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_mailbox(&mut self, name: &str) -> Result<()> {
        self.ensure_buildable()?;
        let encoded = encode_mailbox(name);
        self.add_quoted(&encoded, false)
    }

    /// Opens a nested list and returns the level to pass to
    /// [`Self::end_list`] to close it.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn begin_list(&mut self) -> Result<u32> {
        self.ensure_buildable()?;
        let level = self.list_depth;
        self.separator();
        self.text.push('(');
        self.list_depth += 1;
        Ok(level)
    }

    /// Closes open lists down to `level`; `end_list(0)` closes all.
    /// Sending a command implicitly closes all open lists.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn end_list(&mut self, level: u32) -> Result<()> {
        self.ensure_buildable()?;
        while self.list_depth > level {
            self.text.push(')');
            self.list_depth -= 1;
        }
        Ok(())
    }

    /// Appends a complete parenthesised list; items are written bare
    /// when atom-safe, quoted otherwise. An empty slice yields `()`.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_list(&mut self, items: &[&str]) -> Result<()> {
        self.ensure_buildable()?;
        self.separator();
        self.text.push('(');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.text.push(' ');
            }
            write_astring(&mut self.text, item);
        }
        self.text.push(')');
        Ok(())
    }

    /// Appends a literal byte blob, promoting the command to a
    /// fragmented send.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_literal(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_buildable()?;
        self.promote_literal(bytes);
        Ok(())
    }

    /// Appends rendered FETCH items.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_fetch_items(&mut self, items: &FetchItems) -> Result<()> {
        self.add_raw(&items.render())
    }

    /// Appends a rendered STORE action.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_store_action(&mut self, action: &StoreAction, silent: bool) -> Result<()> {
        self.add_raw(&action.render(silent))
    }

    /// Appends rendered SEARCH criteria.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_search(&mut self, criteria: &SearchCriteria) -> Result<()> {
        self.add_raw(&criteria.render())
    }

    /// Appends a STATUS counter list.
    ///
    /// # Errors
    ///
    /// Fails only when the command is not in a buildable state.
    pub fn add_status_items(&mut self, items: &[StatusAttribute]) -> Result<()> {
        let atoms: Vec<&str> = items.iter().map(|item| item.as_str()).collect();
        self.add_raw(&format!("({})", atoms.join(" ")))
    }

    /// True once any argument is carried as a literal.
    #[must_use]
    pub const fn has_literals(&self) -> bool {
        !self.fragments.is_empty()
    }

    // === State machine ===

    pub(crate) fn mark_queued(&mut self) -> Result<()> {
        match self.state {
            CommandState::Queued => Ok(()),
            CommandState::Created => {
                self.state = CommandState::Queued;
                Ok(())
            }
            CommandState::Running => Err(Error::CommandBusy("command is running")),
            CommandState::Disposed => Err(Error::DisposedObject("command")),
            _ => Err(Error::CommandState(format!(
                "cannot queue a command in state {:?}",
                self.state
            ))),
        }
    }

    pub(crate) fn mark_running(&mut self, tag: Tag) -> Result<()> {
        if self.state != CommandState::Queued {
            return Err(Error::CommandState(format!(
                "cannot execute a command in state {:?}",
                self.state
            )));
        }
        self.state = CommandState::Running;
        self.tag = Some(tag);
        Ok(())
    }

    /// Stores the matched reply and leaves the running state, exactly
    /// once.
    pub(crate) fn complete(&mut self, reply: Reply) -> Result<()> {
        if self.state != CommandState::Running {
            return Err(Error::CommandState(format!(
                "cannot complete a command in state {:?}",
                self.state
            )));
        }
        self.state = if reply.succeeded() {
            CommandState::Completed
        } else {
            CommandState::Failed
        };
        self.reply = Some(reply);
        Ok(())
    }

    /// Returns the command to `Created`, freeing arguments, the reply
    /// and user data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandBusy`] while queued or running.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            CommandState::Created | CommandState::Completed | CommandState::Failed => {
                self.clear();
                self.state = CommandState::Created;
                Ok(())
            }
            CommandState::Queued | CommandState::Running => {
                Err(Error::CommandBusy("cannot reset a queued or running command"))
            }
            CommandState::Disposed => Err(Error::DisposedObject("command")),
        }
    }

    /// Terminal transition; idempotent.
    pub(crate) fn mark_disposed(&mut self) {
        self.clear();
        self.state = CommandState::Disposed;
    }

    fn clear(&mut self) {
        self.text.clear();
        self.fragments.clear();
        self.list_depth = 0;
        self.uid = false;
        self.tag = None;
        self.reply = None;
        self.user_data = None;
    }

    // === Wire building ===

    /// Renders the full command line for a simple (literal-free) send.
    pub(crate) fn wire_line(&self) -> String {
        let mut line = self.head();
        if !self.text.is_empty() {
            line.push(' ');
            line.push_str(&self.text);
        }
        for _ in 0..self.list_depth {
            line.push(')');
        }
        line
    }

    /// Renders the fragment list for a literal-bearing send.
    pub(crate) fn wire_fragments(&self) -> Vec<SendFragment> {
        let mut fragments = self.fragments.clone();
        let mut tail = self.text.clone();
        for _ in 0..self.list_depth {
            tail.push(')');
        }
        if !tail.is_empty() {
            fragments.push(SendFragment::Text(tail));
        }

        let head = self.head();
        match fragments.first_mut() {
            Some(SendFragment::Text(first)) if first.is_empty() => *first = head,
            Some(SendFragment::Text(first)) => *first = format!("{head} {first}"),
            _ => fragments.insert(0, SendFragment::Text(head)),
        }
        fragments
    }

    fn head(&self) -> String {
        if self.uid {
            format!("UID {}", self.kind.name())
        } else {
            self.kind.name().to_string()
        }
    }

    fn ensure_buildable(&self) -> Result<()> {
        match self.state {
            CommandState::Created | CommandState::Queued => Ok(()),
            CommandState::Disposed => Err(Error::DisposedObject("command")),
            _ => Err(Error::CommandState(format!(
                "cannot modify arguments in state {:?}",
                self.state
            ))),
        }
    }

    /// Writes the separating space before a new argument. No space is
    /// needed at the start of the line or directly after an opening
    /// parenthesis; an empty buffer that continues after a literal
    /// blob does need one.
    fn separator(&mut self) {
        match self.text.chars().last() {
            Some('(') => {}
            Some(_) => self.text.push(' '),
            None => {
                if !self.fragments.is_empty() {
                    self.text.push(' ');
                }
            }
        }
    }

    /// Moves the accumulated text into the fragment list and appends a
    /// blob. The continuation line's `" {n}"` marker supplies the
    /// separator, so none is written here.
    fn promote_literal(&mut self, bytes: &[u8]) {
        self.fragments
            .push(SendFragment::Text(std::mem::take(&mut self.text)));
        self.fragments.push(SendFragment::Blob(bytes.to_vec()));
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("tag", &self.tag)
            .field("uid", &self.uid)
            .field("auto_dispose", &self.auto_dispose)
            .finish_non_exhaustive()
    }
}

/// Writes a string bare when it is atom-safe, quoted otherwise.
fn write_astring(out: &mut String, value: &str) {
    let atom_safe = !value.is_empty()
        && value
            .bytes()
            .all(|b| (0x21..0x7f).contains(&b) && b != b'"' && b != b'\\' && b != b'(' && b != b')');
    if atom_safe {
        out.push_str(value);
    } else {
        out.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
}
