//! Connection configuration types.

use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993, IMAPS). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Whether a failed STARTTLS upgrade is fatal. Ignored unless
    /// `security` is [`Security::StartTls`].
    pub tls_required: bool,
    /// Whether to attempt SASL authentication before LOGIN.
    pub use_sasl: bool,
    /// Whether to fall back to LOGIN when every SASL mechanism fails.
    pub sasl_fallback: bool,
    /// Connection (and TLS handshake) timeout.
    pub connect_timeout: Duration,
    /// Idle read/write timeout.
    pub io_timeout: Duration,
}

impl Config {
    /// Creates a configuration with the given security mode and its
    /// default port.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: security.default_port(),
            security,
            tls_required: true,
            use_sasl: true,
            sasl_fallback: true,
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
    security: Security,
    tls_required: bool,
    use_sasl: bool,
    sasl_fallback: bool,
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
            security: Security::Implicit,
            tls_required: true,
            use_sasl: true,
            sasl_fallback: true,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the port. Defaults to the security mode's standard port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Makes a failed STARTTLS upgrade fatal (or tolerated).
    #[must_use]
    pub const fn tls_required(mut self, required: bool) -> Self {
        self.tls_required = required;
        self
    }

    /// Enables or disables SASL authentication.
    #[must_use]
    pub const fn use_sasl(mut self, enabled: bool) -> Self {
        self.use_sasl = enabled;
        self
    }

    /// Enables or disables LOGIN fallback after SASL failure.
    #[must_use]
    pub const fn sasl_fallback(mut self, enabled: bool) -> Self {
        self.sasl_fallback = enabled;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the idle I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            host: self.host,
            security: self.security,
            tls_required: self.tls_required,
            use_sasl: self.use_sasl,
            sasl_fallback: self.sasl_fallback,
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
    fn default_ports() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::Implicit.default_port(), 993);
    }

    #[test]
    fn config_new_uses_mode_port() {
        let config = Config::new("imap.example.com", Security::StartTls);
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 143);
        assert!(config.use_sasl);
        assert!(config.sasl_fallback);
    }

    #[test]
    fn builder_overrides() {
        let config = Config::builder("imap.example.com")
            .security(Security::StartTls)
            .port(1143)
            .tls_required(false)
            .use_sasl(false)
            .connect_timeout(Duration::from_secs(10))
            .build();

        assert_eq!(config.port, 1143);
        assert!(!config.tls_required);
        assert!(!config.use_sasl);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_default_port_follows_security() {
        let config = Config::builder("imap.example.com")
            .security(Security::StartTls)
            .build();
        assert_eq!(config.port, 143);
    }
}
