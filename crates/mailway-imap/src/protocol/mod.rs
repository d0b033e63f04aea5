//! Reply assembly and the connection handshake.
//!
//! The protocol layer sits directly above the transport. It owns the
//! greeting and STARTTLS handover, assigns tags on send, runs the `+`
//! continuation handshake for literal payloads, and assembles transport
//! fragments into complete [`Reply`] records while tracking unsolicited
//! `BYE` and `EXISTS` events.

mod reply;
mod transmit;

pub use reply::{InfoLine, ReceiveState, Reply, ReplyStatus};
pub use transmit::{SendFragment, preview};

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::callback::{Hooks, MonitorLevel};
use crate::connection::TlsMode;
use crate::transport::{Fragment, TlsUpgrade, Transport};
use crate::types::{Tag, TagAllocator};
use crate::{Error, Result};

/// How long to wait for the server greeting before probing.
const GREETING_POLL_MS: u64 = 1000;

/// Protocol half of the state machine above the transport.
pub struct Protocol<S> {
    transport: Option<Transport<S>>,
    tags: TagAllocator,
    hooks: Hooks,
    greeting: Option<String>,
    bye_pending: bool,
    exists: Option<u32>,
    exists_reporting: bool,
    closed_notified: bool,
    /// Untagged fragments consumed while waiting for a `+`
    /// continuation; routed into the next assembled reply.
    pending: VecDeque<Fragment>,
}

impl<S> Protocol<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a protocol layer over a transport.
    pub fn new(transport: Transport<S>, hooks: Hooks) -> Self {
        Self {
            transport: Some(transport),
            tags: TagAllocator::new(),
            hooks,
            greeting: None,
            bye_pending: false,
            exists: None,
            exists_reporting: false,
            closed_notified: false,
            pending: VecDeque::new(),
        }
    }

    /// The server greeting text, once received.
    #[must_use]
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// The most recent untagged EXISTS count.
    #[must_use]
    pub const fn exists(&self) -> Option<u32> {
        self.exists
    }

    /// Enables or disables EXISTS reporting through the callback.
    pub fn set_exists_reporting(&mut self, enabled: bool) {
        self.exists_reporting = enabled;
    }

    /// Returns true once the transport is gone or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.transport.as_ref().is_none_or(Transport::is_closed)
    }

    /// Access to the transport for polling and state queries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisposedObject`] after close.
    pub fn transport_mut(&mut self) -> Result<&mut Transport<S>> {
        self.transport
            .as_mut()
            .ok_or(Error::DisposedObject("transport"))
    }

    /// Reads the server greeting, probing with NOOP if it is not
    /// volunteered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotConnect`] when no valid greeting arrives.
    pub async fn greet(&mut self) -> Result<()> {
        if self.greeting.is_some() {
            return Ok(());
        }

        if self.transport_mut()?.poll(GREETING_POLL_MS).await? {
            let fragment = self.next_fragment().await?;
            if fragment.tag == "*" && !fragment.status.eq_ignore_ascii_case("BYE") {
                let text = join_status_message(&fragment);
                self.hooks
                    .monitor(MonitorLevel::Info, "protocol", &format!("greeting: {text}"));
                self.greeting = Some(text);
                return Ok(());
            }
            return Err(Error::cannot_connect("Invalid or missing greeting"));
        }

        // No spontaneous greeting; probe and take the first untagged
        // line the probe flushes out.
        let tag = self.send("NOOP").await?;
        loop {
            let fragment = self.next_fragment().await?;
            if fragment.tag == "*" {
                if self.greeting.is_none() && !fragment.status.eq_ignore_ascii_case("BYE") {
                    self.greeting = Some(join_status_message(&fragment));
                }
                continue;
            }
            if Tag::parse(&fragment.tag) == Some(tag) {
                if fragment.status.eq_ignore_ascii_case("OK") && self.greeting.is_some() {
                    return Ok(());
                }
                return Err(Error::cannot_connect("Invalid or missing greeting"));
            }
            return Err(Error::cannot_connect("Invalid or missing greeting"));
        }
    }

    /// Assigns the next tag and writes `"<tag-hex> <text>\r\n"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendFailed`] on transport failure.
    pub async fn send(&mut self, text: &str) -> Result<Tag> {
        let tag = self.tags.next();
        self.hooks.request(tag, text);
        self.transport_mut()?.send_line(tag, text).await?;
        Ok(tag)
    }

    /// Sends a fragmented request, gating each literal blob on the
    /// server's `+` continuation.
    ///
    /// The caller must have drained all running commands first: a
    /// literal handshake cannot overlap other traffic. Untagged lines
    /// that arrive while waiting for `+` are buffered and routed into
    /// the next assembled reply rather than discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendFailed`] if the server answers the command
    /// tag instead of continuing.
    pub async fn send_fragments(&mut self, fragments: &[SendFragment]) -> Result<Tag> {
        let tag = self.tags.next();
        self.hooks.request(tag, &preview(fragments));

        let mut line: Option<String> = None;
        let mut sent_first = false;

        for fragment in fragments {
            match fragment {
                SendFragment::Text(text) => {
                    line.get_or_insert_default().push_str(text);
                }
                SendFragment::Blob(blob) => {
                    let mut text = line.take().unwrap_or_default();
                    text.push_str(&format!(" {{{}}}", blob.len()));
                    let line_tag = if sent_first { Tag::UNTAGGED } else { tag };
                    self.transport_mut()?.send_line(line_tag, &text).await?;
                    sent_first = true;
                    self.await_continuation(tag).await?;
                    self.transport_mut()?.send_bytes(blob).await?;
                }
            }
        }

        // Terminate the logical line; after a blob this may be a bare
        // CRLF.
        let text = line.unwrap_or_default();
        let line_tag = if sent_first { Tag::UNTAGGED } else { tag };
        self.transport_mut()?.send_line(line_tag, &text).await?;

        Ok(tag)
    }

    /// Assembles one complete reply: untagged info lines and their
    /// literals, concluded by a tagged status line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReceiveFailed`] on transport failure or
    /// timeout and [`Error::UnexpectedTag`] for unparseable tags.
    pub async fn receive_reply(&mut self) -> Result<Reply> {
        let mut reply = Reply::assembling();
        let mut exists_fired = false;

        loop {
            let fragment = match self.pending.pop_front() {
                Some(fragment) => fragment,
                None => match self.transport_mut()?.receive().await? {
                    Some(fragment) => fragment,
                    None => {
                        if self.transport_mut()?.is_timeout() {
                            return Err(Error::ReceiveFailed {
                                message: "read timed out".to_string(),
                                timeout: true,
                                source: None,
                            });
                        }
                        self.notify_closed();
                        reply.conclude(
                            Tag::UNTAGGED,
                            ReceiveState::Closed,
                            "connection closed by peer".to_string(),
                        );
                        return Ok(reply);
                    }
                },
            };

            match fragment.tag.as_str() {
                "*" | "0" => {
                    self.track_untagged(&fragment, &mut exists_fired);
                    reply.push_info(InfoLine {
                        status: fragment.status,
                        message: fragment.message,
                        literals: fragment.literals.into_iter().map(|b| b.data).collect(),
                    });
                }
                "+" => {
                    reply.conclude(
                        Tag::UNTAGGED,
                        ReceiveState::Continue,
                        join_status_message(&fragment),
                    );
                    return Ok(reply);
                }
                token => {
                    let Some(tag) = Tag::parse(token) else {
                        return Err(Error::UnexpectedTag(token.to_string()));
                    };
                    let state = ReplyStatus::parse(&fragment.status).map_or(
                        ReceiveState::Exception,
                        ReplyStatus::receive_state,
                    );
                    reply.conclude(tag, state, fragment.message);
                    if self.bye_pending && reply.succeeded() {
                        self.close_transport().await;
                    }
                    return Ok(reply);
                }
            }
        }
    }

    /// Closes the transport and fires the closed callback once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.as_mut() {
            transport.close().await?;
        }
        self.transport = None;
        self.notify_closed();
        Ok(())
    }

    /// Reads fragments until the `+` continuation for `tag` arrives.
    async fn await_continuation(&mut self, tag: Tag) -> Result<()> {
        loop {
            let Some(fragment) = self.transport_mut()?.receive().await? else {
                return Err(Error::send_failed(
                    "connection lost while waiting for continuation",
                ));
            };

            match fragment.tag.as_str() {
                "+" => return Ok(()),
                "*" | "0" => {
                    let mut exists_fired = true; // no reply in flight to report against
                    self.track_untagged(&fragment, &mut exists_fired);
                    self.pending.push_back(fragment);
                }
                token => {
                    if Tag::parse(token) == Some(tag) {
                        return Err(Error::SendFailed {
                            message: format!(
                                "literal continuation refused: {}",
                                join_status_message(&fragment)
                            ),
                            source: None,
                        });
                    }
                    return Err(Error::UnexpectedTag(token.to_string()));
                }
            }
        }
    }

    /// Notes BYE and EXISTS on an untagged fragment.
    fn track_untagged(&mut self, fragment: &Fragment, exists_fired: &mut bool) {
        if fragment.status.eq_ignore_ascii_case("BYE") {
            self.bye_pending = true;
            self.hooks.monitor(
                MonitorLevel::Info,
                "protocol",
                &format!("server BYE: {}", fragment.message),
            );
            return;
        }
        if let Ok(count) = fragment.status.parse::<u32>()
            && fragment
                .message
                .split(' ')
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case("EXISTS"))
        {
            self.exists = Some(count);
            if self.exists_reporting && !*exists_fired {
                self.hooks.message(count);
                *exists_fired = true;
            }
        }
    }

    async fn next_fragment(&mut self) -> Result<Fragment> {
        match self.transport_mut()?.receive().await? {
            Some(fragment) => Ok(fragment),
            None => Err(Error::cannot_connect("Invalid or missing greeting")),
        }
    }

    async fn close_transport(&mut self) {
        if let Some(transport) = self.transport.as_mut()
            && let Err(e) = transport.close().await
        {
            self.hooks
                .monitor(MonitorLevel::Warning, "protocol", &e.to_string());
        }
        self.transport = None;
        self.notify_closed();
    }

    fn notify_closed(&mut self) {
        if !self.closed_notified {
            self.closed_notified = true;
            self.hooks.closed();
        }
    }
}

impl<S> Protocol<S>
where
    S: AsyncRead + AsyncWrite + Unpin + TlsUpgrade,
{
    /// Runs the STARTTLS negotiation after the greeting.
    ///
    /// Returns the effective TLS mode: `Automatic` degrades to
    /// `Disabled` when the server refuses the upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotConnect`] when the upgrade is refused in
    /// `Required` mode or the handshake fails.
    pub async fn starttls(&mut self, mode: TlsMode, host: &str) -> Result<TlsMode> {
        if !matches!(mode, TlsMode::Automatic | TlsMode::Required) {
            return Ok(mode);
        }

        let tag = self.send("STARTTLS").await?;
        // Nothing may be running during the handshake, so the next
        // assembled reply must be ours.
        let reply = self.receive_reply().await?;
        if reply.tag() != tag {
            return Err(Error::UnexpectedTag(reply.tag().to_string()));
        }

        if reply.succeeded() {
            let transport = self
                .transport
                .take()
                .ok_or(Error::DisposedObject("transport"))?;
            let io_timeout = transport.io_timeout();
            let stream = transport.into_inner();
            let upgraded = stream
                .upgrade_tls(host, mode == TlsMode::Automatic)
                .await?;
            self.transport = Some(Transport::new(upgraded, io_timeout));
            Ok(mode)
        } else {
            match mode {
                TlsMode::Required => Err(Error::cannot_connect(format!(
                    "STARTTLS refused: {}",
                    reply.message()
                ))),
                _ => {
                    self.hooks.monitor(
                        MonitorLevel::Warning,
                        "protocol",
                        &format!("STARTTLS refused, continuing cleartext: {}", reply.message()),
                    );
                    Ok(TlsMode::Disabled)
                }
            }
        }
    }
}

fn join_status_message(fragment: &Fragment) -> String {
    if fragment.message.is_empty() {
        fragment.status.clone()
    } else if fragment.status.is_empty() {
        fragment.message.clone()
    } else {
        format!("{} {}", fragment.status, fragment.message)
    }
}
