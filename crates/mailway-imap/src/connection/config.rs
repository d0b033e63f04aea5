//! Connection configuration.

use std::time::Duration;

use crate::{Error, Result};

/// TLS negotiation mode for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Never negotiate TLS.
    Disabled,
    /// Attempt STARTTLS; on refusal or certificate trouble, log and
    /// continue in cleartext.
    #[default]
    Automatic,
    /// STARTTLS is mandatory and certificate errors are fatal.
    Required,
    /// TLS from the first byte (port 993). Fixed at construction.
    ImplicitImaps,
}

impl TlsMode {
    /// The default port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Disabled | Self::Automatic | Self::Required => 143,
            Self::ImplicitImaps => 993,
        }
    }
}

/// Resolves a port or service name.
///
/// Recognises `imap`/`imap2` (143), `imap3` (220) and `imaps` (993);
/// numeric strings parse directly.
///
/// # Errors
///
/// Returns [`Error::UnknownProtocol`] for anything else.
pub fn resolve_port(service: &str) -> Result<u16> {
    match service.to_ascii_lowercase().as_str() {
        "imap" | "imap2" => Ok(143),
        "imap3" => Ok(220),
        "imaps" => Ok(993),
        other => other
            .parse()
            .map_err(|_| Error::UnknownProtocol(service.to_string())),
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// TLS mode.
    pub tls: TlsMode,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout.
    pub io_timeout: Duration,
}

impl Config {
    /// Creates a configuration with STARTTLS-when-available on port
    /// 143.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 143,
            tls: TlsMode::Automatic,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    tls: Option<TlsMode>,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            tls: None,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the port from a service name (`imap`, `imaps`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProtocol`] for unrecognised names.
    pub fn service(mut self, service: &str) -> Result<Self> {
        self.port = Some(resolve_port(service)?);
        Ok(self)
    }

    /// Sets the TLS mode.
    #[must_use]
    pub const fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Builds the configuration. Port 993 implies implicit TLS unless
    /// a mode was chosen explicitly; otherwise the port defaults to
    /// the mode's well-known port.
    #[must_use]
    pub fn build(self) -> Config {
        let tls = match (self.tls, self.port) {
            (Some(tls), _) => tls,
            (None, Some(993)) => TlsMode::ImplicitImaps,
            (None, _) => TlsMode::Automatic,
        };
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| tls.default_port()),
            tls,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_port_services() {
        assert_eq!(resolve_port("imap").unwrap(), 143);
        assert_eq!(resolve_port("IMAP2").unwrap(), 143);
        assert_eq!(resolve_port("imap3").unwrap(), 220);
        assert_eq!(resolve_port("imaps").unwrap(), 993);
        assert_eq!(resolve_port("4143").unwrap(), 4143);
    }

    #[test]
    fn test_resolve_port_unknown() {
        assert!(matches!(
            resolve_port("smtp"),
            Err(Error::UnknownProtocol(_))
        ));
        assert!(matches!(resolve_port(""), Err(Error::UnknownProtocol(_))));
    }

    #[test]
    fn test_port_993_implies_implicit_tls() {
        let config = Config::builder("imap.example.com").port(993).build();
        assert_eq!(config.tls, TlsMode::ImplicitImaps);

        let config = Config::builder("imap.example.com")
            .service("imaps")
            .unwrap()
            .build();
        assert_eq!(config.tls, TlsMode::ImplicitImaps);
        assert_eq!(config.port, 993);
    }

    #[test]
    fn test_explicit_mode_wins() {
        let config = Config::builder("h").port(993).tls(TlsMode::Disabled).build();
        assert_eq!(config.tls, TlsMode::Disabled);
    }

    #[test]
    fn test_mode_chooses_default_port() {
        assert_eq!(Config::builder("h").tls(TlsMode::Required).build().port, 143);
        assert_eq!(
            Config::builder("h").tls(TlsMode::ImplicitImaps).build().port,
            993
        );
        assert_eq!(Config::new("h").port, 143);
    }
}
