//! Connection event callbacks.
//!
//! A single callback object observes everything the library does:
//! monitor messages, progress updates, unsolicited EXISTS counts,
//! connection closure, outgoing requests, incoming results and errors.
//! Each method returns a boolean; `true` suppresses the library's
//! default handling (forwarding to `tracing`, or surfacing the error).
//!
//! The callback is an explicit per-connection field, not process-wide
//! state. Install one with [`crate::connection::Connection::set_callback`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::Error;
use crate::protocol::Reply;
use crate::types::Tag;

/// Severity of a monitor message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MonitorLevel {
    /// Wire-level chatter.
    Debug,
    /// Normal progress information.
    Info,
    /// Something unusual that the library worked around.
    Warning,
    /// A failure that will surface as an error.
    Error,
}

impl MonitorLevel {
    const fn rank(self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
        }
    }
}

/// Receiver for connection events.
///
/// All methods have default implementations returning `false`, so an
/// implementation only overrides what it cares about.
pub trait Callback: Send {
    /// A diagnostic message from one of the layers.
    fn monitor(&mut self, level: MonitorLevel, source: &str, message: &str) -> bool {
        let _ = (level, source, message);
        false
    }

    /// An absolute progress percentage in `0..=100`.
    fn progress(&mut self, percent: u32) -> bool {
        let _ = percent;
        false
    }

    /// The mailbox message count reported by an untagged EXISTS.
    fn message(&mut self, exists: u32) -> bool {
        let _ = exists;
        false
    }

    /// The connection was closed (BYE or transport shutdown).
    fn closed(&mut self) -> bool {
        false
    }

    /// A command line is about to be transmitted.
    fn request(&mut self, tag: Tag, text: &str) -> bool {
        let _ = (tag, text);
        false
    }

    /// A complete reply was assembled.
    fn result(&mut self, reply: &Reply) -> bool {
        let _ = reply;
        false
    }

    /// An error is about to be raised; return `true` to swallow it.
    fn error(&mut self, error: &Error) -> bool {
        let _ = error;
        false
    }
}

/// A no-op callback that lets all default handling run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl Callback for NoopCallback {}

/// A callback that forwards every event to `tracing` and suppresses
/// nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl Callback for LoggingCallback {
    fn monitor(&mut self, level: MonitorLevel, source: &str, message: &str) -> bool {
        match level {
            MonitorLevel::Debug => tracing::debug!(source, message, "monitor"),
            MonitorLevel::Info => tracing::info!(source, message, "monitor"),
            MonitorLevel::Warning => tracing::warn!(source, message, "monitor"),
            MonitorLevel::Error => tracing::error!(source, message, "monitor"),
        }
        false
    }

    fn progress(&mut self, percent: u32) -> bool {
        tracing::trace!(percent, "progress");
        false
    }

    fn message(&mut self, exists: u32) -> bool {
        tracing::debug!(exists, "EXISTS");
        false
    }

    fn closed(&mut self) -> bool {
        tracing::info!("connection closed");
        false
    }

    fn request(&mut self, tag: Tag, text: &str) -> bool {
        tracing::trace!(%tag, text, "request");
        false
    }

    fn result(&mut self, reply: &Reply) -> bool {
        tracing::trace!(tag = %reply.tag(), message = reply.message(), "result");
        false
    }

    fn error(&mut self, error: &Error) -> bool {
        tracing::error!(%error, "error");
        false
    }
}

/// An event collected by [`CollectingCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    /// Monitor message.
    Monitor(MonitorLevel, String, String),
    /// Progress percentage.
    Progress(u32),
    /// EXISTS count.
    Message(u32),
    /// Connection closed.
    Closed,
    /// Outgoing request line.
    Request(Tag, String),
    /// Completed reply tag and final message.
    Result(Tag, String),
    /// Error display text.
    Error(String),
}

/// A callback that records events for later inspection.
///
/// Useful in tests and for batch processing.
#[derive(Debug, Default)]
pub struct CollectingCallback {
    /// Collected events, oldest first.
    pub events: Vec<CallbackEvent>,
}

impl CollectingCallback {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected events, leaving the collector empty.
    pub fn take(&mut self) -> Vec<CallbackEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Callback for CollectingCallback {
    fn monitor(&mut self, level: MonitorLevel, source: &str, message: &str) -> bool {
        self.events.push(CallbackEvent::Monitor(
            level,
            source.to_string(),
            message.to_string(),
        ));
        false
    }

    fn progress(&mut self, percent: u32) -> bool {
        self.events.push(CallbackEvent::Progress(percent));
        false
    }

    fn message(&mut self, exists: u32) -> bool {
        self.events.push(CallbackEvent::Message(exists));
        false
    }

    fn closed(&mut self) -> bool {
        self.events.push(CallbackEvent::Closed);
        false
    }

    fn request(&mut self, tag: Tag, text: &str) -> bool {
        self.events
            .push(CallbackEvent::Request(tag, text.to_string()));
        false
    }

    fn result(&mut self, reply: &Reply) -> bool {
        self.events
            .push(CallbackEvent::Result(reply.tag(), reply.message().to_string()));
        false
    }

    fn error(&mut self, error: &Error) -> bool {
        self.events.push(CallbackEvent::Error(error.to_string()));
        false
    }
}

/// Shared handle to the connection's callback.
///
/// Cloned into every layer; the lock is held for the duration of each
/// invocation, so implementations must be reentrant-safe.
#[derive(Clone)]
pub struct Hooks {
    inner: Arc<Mutex<Box<dyn Callback>>>,
    monitor_level: Arc<AtomicU8>,
}

impl Hooks {
    /// Wraps a callback object.
    #[must_use]
    pub fn new(callback: Box<dyn Callback>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(callback)),
            monitor_level: Arc::new(AtomicU8::new(MonitorLevel::Info.rank())),
        }
    }

    /// Sets the minimum severity for monitor events; lower ones are
    /// dropped before reaching the callback.
    pub fn set_monitor_level(&self, level: MonitorLevel) {
        self.monitor_level.store(level.rank(), Ordering::Relaxed);
    }

    /// A handle around [`NoopCallback`].
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(NoopCallback))
    }

    /// Replaces the callback object.
    pub fn set(&self, callback: Box<dyn Callback>) {
        if let Ok(mut cb) = self.inner.lock() {
            *cb = callback;
        }
    }

    /// Fires a monitor event; forwards to `tracing` unless suppressed.
    pub fn monitor(&self, level: MonitorLevel, source: &str, message: &str) {
        if level.rank() < self.monitor_level.load(Ordering::Relaxed) {
            return;
        }
        let handled = self
            .inner
            .lock()
            .map(|mut cb| cb.monitor(level, source, message))
            .unwrap_or(false);
        if !handled {
            match level {
                MonitorLevel::Debug => tracing::debug!(source, message, "imap"),
                MonitorLevel::Info => tracing::info!(source, message, "imap"),
                MonitorLevel::Warning => tracing::warn!(source, message, "imap"),
                MonitorLevel::Error => tracing::error!(source, message, "imap"),
            }
        }
    }

    /// Fires a progress event.
    pub fn progress(&self, percent: u32) {
        let _ = self.inner.lock().map(|mut cb| cb.progress(percent));
    }

    /// Fires an EXISTS event.
    pub fn message(&self, exists: u32) {
        let _ = self.inner.lock().map(|mut cb| cb.message(exists));
    }

    /// Fires a closed event.
    pub fn closed(&self) {
        let handled = self
            .inner
            .lock()
            .map(|mut cb| cb.closed())
            .unwrap_or(false);
        if !handled {
            tracing::debug!("connection closed");
        }
    }

    /// Fires a request event.
    pub fn request(&self, tag: Tag, text: &str) {
        let _ = self.inner.lock().map(|mut cb| cb.request(tag, text));
    }

    /// Fires a result event.
    pub fn result(&self, reply: &Reply) {
        let _ = self.inner.lock().map(|mut cb| cb.result(reply));
    }

    /// Fires an error event; returns true if the callback swallowed it.
    #[must_use]
    pub fn error(&self, error: &Error) -> bool {
        self.inner
            .lock()
            .map(|mut cb| cb.error(error))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_defaults_suppress_nothing() {
        let mut cb = NoopCallback;
        assert!(!cb.monitor(MonitorLevel::Info, "test", "hello"));
        assert!(!cb.progress(50));
        assert!(!cb.closed());
    }

    #[test]
    fn test_collecting_callback_records_in_order() {
        let mut cb = CollectingCallback::new();
        let _ = cb.message(42);
        let _ = cb.progress(10);
        let _ = cb.closed();

        assert_eq!(
            cb.events,
            vec![
                CallbackEvent::Message(42),
                CallbackEvent::Progress(10),
                CallbackEvent::Closed,
            ]
        );

        let taken = cb.take();
        assert_eq!(taken.len(), 3);
        assert!(cb.events.is_empty());
    }

    #[test]
    fn test_hooks_error_swallow() {
        struct Swallower;
        impl Callback for Swallower {
            fn error(&mut self, _error: &Error) -> bool {
                true
            }
        }

        let hooks = Hooks::new(Box::new(Swallower));
        assert!(hooks.error(&Error::receive_failed("boom")));

        let hooks = Hooks::noop();
        assert!(!hooks.error(&Error::receive_failed("boom")));
    }
}
