//! Command factory and pipelining engine.
//!
//! The engine owns the ordered set of attached commands, moves them
//! through their lifecycle, pumps the protocol until a target command
//! (or all of them) completes, dispatches each reply to the command
//! whose tag matches, and runs the auto-dispose cascade over older
//! completed commands.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::callback::Hooks;
use crate::command::{Command, CommandId, CommandKind, CommandState, typed};
use crate::protocol::{Protocol, ReceiveState};
use crate::{Error, Result};

/// Command factory and pipelining engine for one connection.
pub struct Engine {
    /// Attached commands, most recently queued last.
    attached: Vec<Command>,
    next_id: u64,
    hooks: Hooks,
    capabilities: Option<Vec<String>>,
    delimiter: Option<Option<char>>,
    last_user: Option<String>,
    /// Default for new commands; doubles as the dispose reentrancy
    /// guard.
    auto_dispose: bool,
}

impl Engine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new(hooks: Hooks) -> Self {
        Self {
            attached: Vec::new(),
            next_id: 1,
            hooks,
            capabilities: None,
            delimiter: None,
            last_user: None,
            auto_dispose: true,
        }
    }

    /// Constructs a typed command by case-insensitive name and attaches
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotImplemented`] for names that are not valid
    /// command atoms.
    pub fn create(&mut self, name: &str) -> Result<CommandId> {
        let kind = CommandKind::from_name(name)?;
        Ok(self.create_kind(kind))
    }

    /// Constructs and attaches a command of a known kind.
    pub fn create_kind(&mut self, kind: CommandKind) -> CommandId {
        let id = CommandId(self.next_id);
        self.next_id += 1;
        self.attached
            .push(Command::attach(id, kind, self.auto_dispose));
        id
    }

    /// Borrows an attached command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisposedObject`] if the command is gone.
    pub fn command(&self, id: CommandId) -> Result<&Command> {
        self.attached
            .iter()
            .find(|cmd| cmd.id() == id)
            .ok_or(Error::DisposedObject("command"))
    }

    /// Mutably borrows an attached command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisposedObject`] if the command is gone.
    pub fn command_mut(&mut self, id: CommandId) -> Result<&mut Command> {
        self.attached
            .iter_mut()
            .find(|cmd| cmd.id() == id)
            .ok_or(Error::DisposedObject("command"))
    }

    /// All attached commands, oldest first.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.attached
    }

    /// Moves the command to the end of the queue and marks it queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandBusy`] while the command is running.
    pub fn queue(&mut self, id: CommandId) -> Result<()> {
        let position = self.position(id)?;
        self.attached[position].mark_queued()?;
        let command = self.attached.remove(position);
        self.attached.push(command);
        Ok(())
    }

    /// Removes the command from the engine, resetting it first unless
    /// it is already disposed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandBusy`] for queued or running commands.
    pub fn detach(&mut self, id: CommandId) -> Result<()> {
        let position = self.position(id)?;
        if self.attached[position].state() != CommandState::Disposed {
            self.attached[position].reset()?;
        }
        self.attached.remove(position);
        Ok(())
    }

    /// The default auto-dispose flag applied to new commands.
    #[must_use]
    pub const fn auto_dispose(&self) -> bool {
        self.auto_dispose
    }

    /// Sets the default auto-dispose flag.
    pub fn set_auto_dispose(&mut self, auto_dispose: bool) {
        self.auto_dispose = auto_dispose;
    }

    /// The user name of the last LOGIN issued on this connection.
    #[must_use]
    pub fn last_user(&self) -> Option<&str> {
        self.last_user.as_deref()
    }

    pub(crate) fn set_last_user(&mut self, user: &str) {
        self.last_user = Some(user.to_string());
    }

    /// Sends one command; with `wait`, pumps until its reply arrives.
    ///
    /// A command still in `Created` is queued implicitly. Commands
    /// carrying literals first drain all running traffic, because the
    /// continuation handshake cannot overlap other replies.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; returns [`Error::CommandState`]
    /// when the command is not executable.
    pub async fn execute<S>(
        &mut self,
        protocol: &mut Protocol<S>,
        id: CommandId,
        wait: bool,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        {
            let command = self.command_mut(id)?;
            if command.state() == CommandState::Created {
                command.mark_queued()?;
            }
            if command.state() != CommandState::Queued {
                return Err(Error::CommandState(format!(
                    "cannot execute a command in state {:?}",
                    command.state()
                )));
            }
        }

        let command = self.command(id)?;
        if command.has_literals() {
            let fragments = command.wire_fragments();
            self.execute_running(protocol, None).await?;
            let tag = protocol.send_fragments(&fragments).await?;
            self.command_mut(id)?.mark_running(tag)?;
        } else {
            let line = command.wire_line();
            let tag = protocol.send(&line).await?;
            self.command_mut(id)?.mark_running(tag)?;
        }

        if wait {
            self.execute_running(protocol, Some(id)).await?;
        }
        Ok(())
    }

    /// Sends every queued command in order; with `wait`, pumps until
    /// all of them complete.
    ///
    /// # Errors
    ///
    /// Propagates the first execution or receive error.
    pub async fn execute_all<S>(&mut self, protocol: &mut Protocol<S>, wait: bool) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let queued: Vec<CommandId> = self
            .attached
            .iter()
            .filter(|cmd| cmd.state() == CommandState::Queued)
            .map(Command::id)
            .collect();
        for id in queued {
            self.execute(protocol, id, false).await?;
        }
        if wait {
            self.execute_running(protocol, None).await?;
        }
        Ok(())
    }

    /// Pumps replies while commands are running, dispatching each
    /// reply by tag; with a target, stops once that command leaves
    /// the running state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedTag`] for replies that match no
    /// running command and [`Error::UnexpectedData`] for malformed
    /// status words.
    pub async fn execute_running<S>(
        &mut self,
        protocol: &mut Protocol<S>,
        target: Option<CommandId>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let done = match target {
                Some(id) => self.command(id)?.state() != CommandState::Running,
                None => !self
                    .attached
                    .iter()
                    .any(|cmd| cmd.state() == CommandState::Running),
            };
            if done {
                return Ok(());
            }

            let reply = protocol.receive_reply().await?;
            match reply.state() {
                ReceiveState::Closed => {
                    return Err(Error::receive_failed("connection closed by peer"));
                }
                ReceiveState::Continue => {
                    return Err(Error::UnexpectedData(
                        "unsolicited continuation request".to_string(),
                    ));
                }
                _ => {}
            }

            let exception = reply.state() == ReceiveState::Exception;
            let tag = reply.tag();
            let Some(position) = self
                .attached
                .iter()
                .position(|cmd| cmd.tag() == Some(tag) && cmd.state() == CommandState::Running)
            else {
                return Err(Error::UnexpectedTag(tag.to_string()));
            };

            self.hooks.result(&reply);
            self.attached[position].complete(reply)?;
            let completed = self.attached[position].id();

            if exception {
                return Err(Error::UnexpectedData(format!(
                    "unexpected status word in reply for tag {tag}"
                )));
            }

            self.cascade(completed);
        }
    }

    /// Disposes commands starting from the oldest: every command whose
    /// tag is at most `until`'s tag (all attached commands if `until`
    /// is `None`) and whose auto-dispose flag is set, or
    /// unconditionally with `force`.
    ///
    /// Reentrancy is guarded by toggling the engine's auto-dispose
    /// flag: a nested call is a no-op, as is any call while the flag
    /// is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `until` names a command
    /// that has never been sent.
    pub fn dispose(&mut self, until: Option<CommandId>, force: bool) -> Result<()> {
        if !self.auto_dispose {
            return Ok(());
        }
        let until_tag = match until {
            Some(id) => Some(
                self.command(id)?
                    .tag()
                    .ok_or_else(|| Error::InvalidArgument("command has no tag".to_string()))?,
            ),
            None => None,
        };

        self.auto_dispose = false;
        self.attached.retain_mut(|command| {
            let in_range = match until_tag {
                Some(limit) => command.tag().is_some_and(|tag| tag <= limit),
                None => true,
            };
            if in_range && (force || command.auto_dispose()) {
                command.mark_disposed();
                false
            } else {
                true
            }
        });
        self.auto_dispose = true;
        Ok(())
    }

    /// Auto-dispose cascade after a completion: disposes completed
    /// commands strictly older than the trigger, keeping the trigger
    /// itself visible to the application.
    fn cascade(&mut self, trigger: CommandId) {
        if !self.auto_dispose {
            return;
        }
        let Some(limit) = self
            .command(trigger)
            .ok()
            .and_then(Command::tag)
        else {
            return;
        };

        self.auto_dispose = false;
        self.attached.retain_mut(|command| {
            let older = command.tag().is_some_and(|tag| tag < limit);
            let finished = matches!(
                command.state(),
                CommandState::Completed | CommandState::Failed
            );
            if older && finished && command.auto_dispose() {
                command.mark_disposed();
                false
            } else {
                true
            }
        });
        self.auto_dispose = true;
    }

    /// The server capabilities, fetched with CAPABILITY on first use
    /// and cached.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the CAPABILITY round trip.
    pub async fn capabilities<S>(&mut self, protocol: &mut Protocol<S>) -> Result<Vec<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(capabilities) = &self.capabilities {
            return Ok(capabilities.clone());
        }

        let id = self.create_kind(CommandKind::Capability);
        self.execute(protocol, id, true).await?;
        let command = self.command(id)?;
        let succeeded = command.succeeded();
        let capabilities = command.reply().map(typed::capabilities).unwrap_or_default();
        self.detach(id)?;

        if succeeded {
            self.capabilities = Some(capabilities.clone());
        }
        Ok(capabilities)
    }

    /// Case-insensitive capability membership test.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the CAPABILITY round trip.
    pub async fn has_capability<S>(
        &mut self,
        protocol: &mut Protocol<S>,
        name: &str,
    ) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let capabilities = self.capabilities(protocol).await?;
        Ok(capabilities
            .iter()
            .any(|cap| cap.eq_ignore_ascii_case(name)))
    }

    /// The server's hierarchy delimiter, probed with `LIST "" ""` on
    /// first use and cached.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the LIST round trip.
    pub async fn hierarchy_delimiter<S>(
        &mut self,
        protocol: &mut Protocol<S>,
    ) -> Result<Option<char>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(delimiter) = self.delimiter {
            return Ok(delimiter);
        }

        let id = self.create_kind(CommandKind::List);
        {
            let command = self.command_mut(id)?;
            command.add_quoted("", false)?;
            command.add_quoted("", false)?;
        }
        self.execute(protocol, id, true).await?;
        let command = self.command(id)?;
        let succeeded = command.succeeded();
        let delimiter = command.reply().and_then(typed::hierarchy_delimiter);
        self.detach(id)?;

        if succeeded {
            self.delimiter = Some(delimiter);
        }
        Ok(delimiter)
    }

    /// Builds a ring of `size` preconstructed commands of the same
    /// kind, with auto-dispose off so results stay visible until the
    /// caller resets them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MustBeNonZero`] for an empty ring.
    pub fn bulk(&mut self, kind: CommandKind, size: usize) -> Result<BulkRing> {
        if size == 0 {
            return Err(Error::MustBeNonZero("bulk ring size"));
        }
        let ids = (0..size)
            .map(|_| {
                let id = self.create_kind(kind.clone());
                if let Ok(command) = self.command_mut(id) {
                    command.set_auto_dispose(false);
                }
                id
            })
            .collect();
        Ok(BulkRing {
            ids,
            next: 0,
            drain_pos: 0,
        })
    }

    fn position(&self, id: CommandId) -> Result<usize> {
        self.attached
            .iter()
            .position(|cmd| cmd.id() == id)
            .ok_or(Error::DisposedObject("command"))
    }

    #[cfg(test)]
    fn running_tags(&self) -> Vec<crate::types::Tag> {
        self.attached
            .iter()
            .filter(|cmd| cmd.state() == CommandState::Running)
            .filter_map(Command::tag)
            .collect()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("attached", &self.attached.len())
            .field("capabilities_cached", &self.capabilities.is_some())
            .field("auto_dispose", &self.auto_dispose)
            .finish_non_exhaustive()
    }
}

/// A ring of preconstructed same-kind commands for bulk pipelines.
///
/// The forward iterator hands out slots round-robin, pushing queued
/// commands onto the wire without waiting; the drain iterator walks
/// the still-pending commands once the input is exhausted.
#[derive(Debug)]
pub struct BulkRing {
    ids: Vec<CommandId>,
    next: usize,
    drain_pos: usize,
}

impl BulkRing {
    /// Number of slots in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false: rings are constructed non-empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The slot ids in creation order.
    #[must_use]
    pub fn ids(&self) -> &[CommandId] {
        &self.ids
    }

    /// Advances to the next slot. Before the slot is handed out, every
    /// queued-but-unsent command in the ring is executed without
    /// waiting, so replies stream in while the caller keeps building.
    ///
    /// # Errors
    ///
    /// Propagates execution errors.
    pub async fn advance<S>(
        &mut self,
        engine: &mut Engine,
        protocol: &mut Protocol<S>,
    ) -> Result<CommandId>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let queued: Vec<CommandId> = self
            .ids
            .iter()
            .copied()
            .filter(|id| {
                engine
                    .command(*id)
                    .is_ok_and(|cmd| cmd.state() == CommandState::Queued)
            })
            .collect();
        for id in queued {
            engine.execute(protocol, id, false).await?;
        }

        let id = self.ids[self.next % self.ids.len()];
        self.next += 1;
        Ok(id)
    }

    /// Returns the next still-pending command, executing queued ones
    /// and waiting for running ones; `None` once the ring is drained.
    ///
    /// # Errors
    ///
    /// Propagates execution and receive errors.
    pub async fn drain_next<S>(
        &mut self,
        engine: &mut Engine,
        protocol: &mut Protocol<S>,
    ) -> Result<Option<CommandId>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while self.drain_pos < self.ids.len() {
            let id = self.ids[self.drain_pos];
            self.drain_pos += 1;
            match engine.command(id)?.state() {
                CommandState::Queued => {
                    engine.execute(protocol, id, true).await?;
                    return Ok(Some(id));
                }
                CommandState::Running => {
                    engine.execute_running(protocol, Some(id)).await?;
                    return Ok(Some(id));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}
