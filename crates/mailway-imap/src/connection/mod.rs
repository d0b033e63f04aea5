//! The connection facade.
//!
//! A [`Connection`] owns the whole stack for one server: the socket
//! and TLS state inside the transport, the protocol layer above it,
//! the command engine, the callback hooks and the progress stack. It
//! is created by [`Connection::open`] and torn down by
//! [`Connection::close`], which cascades through the layers.

mod config;
mod progress;

pub use config::{Config, ConfigBuilder, TlsMode, resolve_port};
pub use progress::ProgressStack;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::callback::{Callback, Hooks, NoopCallback};
use crate::command::{Command, CommandId, CommandKind};
use crate::engine::{BulkRing, Engine};
use crate::protocol::Protocol;
use crate::transport::{ImapStream, TlsUpgrade, Transport, connect_plain, connect_tls};
use crate::{Error, Result};

/// One authenticated IMAP connection.
pub struct Connection<S = ImapStream> {
    config: Config,
    tls_mode: TlsMode,
    protocol: Protocol<S>,
    engine: Engine,
    hooks: Hooks,
    progress: ProgressStack,
}

impl Connection<ImapStream> {
    /// Connects to the configured server with a no-op callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotConnect`] on TCP/TLS failure or a
    /// missing greeting.
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_callback(config, Box::new(NoopCallback)).await
    }

    /// Connects with an application callback installed from the first
    /// byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotConnect`] on TCP/TLS failure or a
    /// missing greeting.
    pub async fn open_with_callback(config: Config, callback: Box<dyn Callback>) -> Result<Self> {
        let stream = timeout(config.connect_timeout, async {
            match config.tls {
                TlsMode::ImplicitImaps => connect_tls(&config.host, config.port, false).await,
                _ => connect_plain(&config.host, config.port).await,
            }
        })
        .await
        .map_err(|_| Error::cannot_connect("connect timed out"))??;

        Self::from_stream(stream, config, callback).await
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + TlsUpgrade,
{
    /// Builds a connection over an already-established stream and runs
    /// the greeting and STARTTLS handshake on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotConnect`] when the greeting is missing
    /// or the required TLS upgrade is refused.
    pub async fn from_stream(
        stream: S,
        config: Config,
        callback: Box<dyn Callback>,
    ) -> Result<Self> {
        let hooks = Hooks::new(callback);
        let transport = Transport::new(stream, config.io_timeout);
        let mut protocol = Protocol::new(transport, hooks.clone());

        protocol.greet().await?;
        let tls_mode = protocol.starttls(config.tls, &config.host).await?;

        Ok(Self {
            config,
            tls_mode,
            protocol,
            engine: Engine::new(hooks.clone()),
            progress: ProgressStack::new(hooks.clone()),
            hooks,
        })
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The server host this connection talks to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// The effective TLS mode: `Automatic` degrades to `Disabled`
    /// when the server refused STARTTLS.
    #[must_use]
    pub const fn tls_mode(&self) -> TlsMode {
        self.tls_mode
    }

    /// The server greeting.
    #[must_use]
    pub fn greeting(&self) -> Option<&str> {
        self.protocol.greeting()
    }

    /// The most recent untagged EXISTS count.
    #[must_use]
    pub const fn exists(&self) -> Option<u32> {
        self.protocol.exists()
    }

    /// Enables EXISTS reporting through the callback's `message`
    /// method.
    pub fn set_exists_reporting(&mut self, enabled: bool) {
        self.protocol.set_exists_reporting(enabled);
    }

    /// True once the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.protocol.is_closed()
    }

    /// Replaces the connection callback.
    pub fn set_callback(&mut self, callback: Box<dyn Callback>) {
        self.hooks.set(callback);
    }

    /// Sets the minimum severity for monitor events.
    pub fn set_monitor_level(&mut self, level: crate::callback::MonitorLevel) {
        self.hooks.set_monitor_level(level);
    }

    /// The progress stack for this connection.
    pub fn progress(&mut self) -> &mut ProgressStack {
        &mut self.progress
    }

    /// The user of the last successful LOGIN.
    #[must_use]
    pub fn last_user(&self) -> Option<&str> {
        self.engine.last_user()
    }

    // === Command surface ===

    /// Creates a typed command by case-insensitive name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotImplemented`] for names that are not valid
    /// command atoms.
    pub fn create(&mut self, name: &str) -> Result<CommandId> {
        self.engine.create(name)
    }

    /// Creates a command of a known kind.
    pub fn create_kind(&mut self, kind: CommandKind) -> CommandId {
        self.engine.create_kind(kind)
    }

    /// Borrows an attached command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisposedObject`] if the command is gone.
    pub fn command(&self, id: CommandId) -> Result<&Command> {
        self.engine.command(id)
    }

    /// Mutably borrows an attached command for argument building.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DisposedObject`] if the command is gone.
    pub fn command_mut(&mut self, id: CommandId) -> Result<&mut Command> {
        self.engine.command_mut(id)
    }

    /// All attached commands, oldest first.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        self.engine.commands()
    }

    /// Queues a command for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandBusy`] while the command is running.
    pub fn queue(&mut self, id: CommandId) -> Result<()> {
        self.engine.queue(id)
    }

    /// Detaches a command from the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandBusy`] for queued or running commands.
    pub fn detach(&mut self, id: CommandId) -> Result<()> {
        self.engine.detach(id)
    }

    /// Sends one command; with `wait`, blocks until its reply is
    /// dispatched.
    ///
    /// # Errors
    ///
    /// Propagates transport errors unless the error callback swallows
    /// them.
    pub async fn execute(&mut self, id: CommandId, wait: bool) -> Result<()> {
        let result = self.engine.execute(&mut self.protocol, id, wait).await;
        self.swallow(result)
    }

    /// Sends every queued command in order; with `wait`, pumps until
    /// all complete.
    ///
    /// # Errors
    ///
    /// Propagates transport errors unless the error callback swallows
    /// them.
    pub async fn execute_all(&mut self, wait: bool) -> Result<()> {
        let result = self.engine.execute_all(&mut self.protocol, wait).await;
        self.swallow(result)
    }

    /// Pumps replies while commands are running; with a target, stops
    /// once that command completes.
    ///
    /// # Errors
    ///
    /// Propagates transport errors unless the error callback swallows
    /// them.
    pub async fn execute_running(&mut self, target: Option<CommandId>) -> Result<()> {
        let result = self.engine.execute_running(&mut self.protocol, target).await;
        self.swallow(result)
    }

    /// Disposes commands up to `until` (all when `None`); see
    /// [`Engine::dispose`].
    ///
    /// # Errors
    ///
    /// Propagates engine errors unless the error callback swallows
    /// them.
    pub fn dispose(&mut self, until: Option<CommandId>, force: bool) -> Result<()> {
        let result = self.engine.dispose(until, force);
        self.swallow(result)
    }

    /// The server capabilities, cached after the first CAPABILITY
    /// round trip.
    ///
    /// # Errors
    ///
    /// Propagates transport errors.
    pub async fn capabilities(&mut self) -> Result<Vec<String>> {
        let result = self.engine.capabilities(&mut self.protocol).await;
        self.notify(result)
    }

    /// Case-insensitive capability membership test.
    ///
    /// # Errors
    ///
    /// Propagates transport errors.
    pub async fn has_capability(&mut self, name: &str) -> Result<bool> {
        let result = self.engine.has_capability(&mut self.protocol, name).await;
        self.notify(result)
    }

    /// The server's hierarchy delimiter, cached after the first probe.
    ///
    /// # Errors
    ///
    /// Propagates transport errors.
    pub async fn hierarchy_delimiter(&mut self) -> Result<Option<char>> {
        let result = self.engine.hierarchy_delimiter(&mut self.protocol).await;
        self.notify(result)
    }

    /// Builds a bulk ring of same-kind commands; see [`Engine::bulk`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MustBeNonZero`] for an empty ring.
    pub fn bulk(&mut self, kind: CommandKind, size: usize) -> Result<BulkRing> {
        self.engine.bulk(kind, size)
    }

    /// Convenience LOGIN: quotes the credentials (promoting 8-bit
    /// ones to literals), waits for the reply, and records the user
    /// name on success. The returned command carries the reply.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; an authentication refusal is not
    /// an error and is read from the command's reply.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<CommandId> {
        let id = self.engine.create_kind(CommandKind::Login);
        {
            let command = self.engine.command_mut(id)?;
            command.add_quoted(user, true)?;
            command.add_quoted(password, true)?;
        }
        let result = self.engine.execute(&mut self.protocol, id, true).await;
        self.notify(result)?;

        if self.engine.command(id)?.succeeded() {
            self.engine.set_last_user(user);
        }
        Ok(id)
    }

    /// Convenience LOGOUT: the server BYE plus tagged OK close the
    /// transport.
    ///
    /// # Errors
    ///
    /// Propagates transport errors unless the error callback swallows
    /// them.
    pub async fn logout(&mut self) -> Result<()> {
        let id = self.engine.create_kind(CommandKind::Logout);
        let result = self.engine.execute(&mut self.protocol, id, true).await;
        let _ = self.engine.detach(id);
        self.swallow(result)
    }

    /// Access to the engine and protocol for advanced orchestration
    /// (bulk ring driving).
    pub fn engine_and_protocol(&mut self) -> (&mut Engine, &mut Protocol<S>) {
        (&mut self.engine, &mut self.protocol)
    }

    /// Closes the connection, cascading through engine, protocol and
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CloseFailed`] if the shutdown fails.
    pub async fn close(&mut self) -> Result<()> {
        let disposed = self.engine.dispose(None, true);
        self.swallow(disposed)?;
        let result = self.protocol.close().await;
        self.swallow(result)
    }

    /// Fires the error callback; a `true` return swallows the error.
    fn swallow(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                if self.hooks.error(&error) {
                    Ok(())
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Fires the error callback but always propagates: value-returning
    /// operations have nothing to substitute for the value.
    fn notify<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            let _ = self.hooks.error(error);
        }
        result
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("tls_mode", &self.tls_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // The trait is local, so the mock stream can implement the TLS
    // upgrade as a no-op for handshake-path tests.
    impl TlsUpgrade for tokio_test::io::Mock {
        async fn upgrade_tls(self, _host: &str, _accept_invalid: bool) -> Result<Self> {
            Ok(self)
        }
    }

    async fn connection_over(
        mock: tokio_test::io::Mock,
        tls: TlsMode,
    ) -> Result<Connection<tokio_test::io::Mock>> {
        let config = Config::builder("imap.example.com").tls(tls).build();
        Connection::from_stream(mock, config, Box::new(NoopCallback)).await
    }

    #[tokio::test]
    async fn test_open_reads_greeting() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK IMAP4rev1 Service Ready\r\n")
            .build();
        let connection = connection_over(mock, TlsMode::Disabled).await.unwrap();
        assert_eq!(connection.greeting(), Some("OK IMAP4rev1 Service Ready"));
        assert_eq!(connection.tls_mode(), TlsMode::Disabled);
    }

    #[tokio::test]
    async fn test_starttls_refused_automatic_degrades() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"1 STARTTLS\r\n")
            .read(b"1 NO not available\r\n")
            .build();
        let connection = connection_over(mock, TlsMode::Automatic).await.unwrap();
        assert_eq!(connection.tls_mode(), TlsMode::Disabled);
    }

    #[tokio::test]
    async fn test_starttls_refused_required_fails() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"1 STARTTLS\r\n")
            .read(b"1 NO not available\r\n")
            .build();
        let err = connection_over(mock, TlsMode::Required).await.unwrap_err();
        assert!(matches!(err, Error::CannotConnect { .. }));
    }

    #[tokio::test]
    async fn test_login_records_user() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"1 LOGIN \"alice\" \"pw\"\r\n")
            .read(b"1 OK LOGIN completed\r\n")
            .build();
        let mut connection = connection_over(mock, TlsMode::Disabled).await.unwrap();

        let id = connection.login("alice", "pw").await.unwrap();
        let command = connection.command(id).unwrap();
        assert!(command.succeeded());
        assert_eq!(command.reply().unwrap().message(), "LOGIN completed");
        assert_eq!(connection.last_user(), Some("alice"));
    }

    #[tokio::test]
    async fn test_login_refused_is_not_an_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"1 LOGIN \"alice\" \"wrong\"\r\n")
            .read(b"1 NO [AUTHENTICATIONFAILED] bad credentials\r\n")
            .build();
        let mut connection = connection_over(mock, TlsMode::Disabled).await.unwrap();

        let id = connection.login("alice", "wrong").await.unwrap();
        assert!(!connection.command(id).unwrap().succeeded());
        assert_eq!(connection.last_user(), None);
    }

    #[tokio::test]
    async fn test_error_callback_can_swallow() {
        struct Swallower;
        impl Callback for Swallower {
            fn error(&mut self, _error: &Error) -> bool {
                true
            }
        }

        let mock = tokio_test::io::Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"1 NOOP\r\n")
            .read(b"2f OK stranger\r\n")
            .build();
        let config = Config::builder("h").tls(TlsMode::Disabled).build();
        let mut connection = Connection::from_stream(mock, config, Box::new(Swallower))
            .await
            .unwrap();

        let id = connection.create("NOOP").unwrap();
        // The unmatched tag error is swallowed by the callback.
        connection.execute(id, true).await.unwrap();
    }
}
