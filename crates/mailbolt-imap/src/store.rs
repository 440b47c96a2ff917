//! The store a connection belongs to.
//!
//! A [`Store`] owns what outlives any single connection: the resolved
//! [`Config`], the TLS client configuration (certificate verification
//! policy included), and an optional socket factory. Connections hold a
//! weak back-reference and upgrade it for every configuration lookup, so
//! a dropped store never keeps a connection graph alive.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsConnector;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::connection::Connection;
use crate::transport::{self, Transport};
use crate::Result;

/// Descriptor of an established connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Whether the byte stream is TLS-encrypted.
    pub tls: bool,
}

/// Produces a transport for a host/port pair instead of a plain TCP
/// connect. Used to route connections through tunnels and to inject
/// scripted streams in tests.
pub type SocketFactory = dyn Fn(&str, u16) -> io::Result<Transport> + Send + Sync;

/// Shared per-account state consumed by connections.
pub struct Store {
    config: Config,
    tls_config: Arc<rustls::ClientConfig>,
    socket_factory: Option<Box<SocketFactory>>,
}

impl Store {
    /// Creates a store with the default TLS configuration (webpki roots,
    /// no client auth).
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            tls_config: transport::default_tls_config(),
            socket_factory: None,
        })
    }

    /// Creates a store with a custom TLS configuration, e.g. to pin a
    /// certificate verifier.
    #[must_use]
    pub fn with_tls_config(config: Config, tls_config: Arc<rustls::ClientConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            tls_config,
            socket_factory: None,
        })
    }

    /// Creates a store whose connections use `factory` instead of TCP.
    #[must_use]
    pub fn with_socket_factory(
        config: Config,
        factory: impl Fn(&str, u16) -> io::Result<Transport> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            tls_config: transport::default_tls_config(),
            socket_factory: Some(Box::new(factory)),
        })
    }

    /// The store's connection configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// A TLS connector carrying the store's certificate verification
    /// policy.
    #[must_use]
    pub fn tls_connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.tls_config))
    }

    /// Opens a transport to the given endpoint.
    pub(crate) async fn open_socket(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Transport> {
        match &self.socket_factory {
            Some(factory) => Ok(factory(host, port)?),
            None => transport::connect(host, port, timeout).await,
        }
    }

    /// Creates a new connection bound to this store.
    #[must_use]
    pub fn connection(self: &Arc<Self>, authenticator: Arc<dyn Authenticator>) -> Connection {
        Connection::new(Arc::downgrade(self), authenticator)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("socket_factory", &self.socket_factory.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Security;

    #[test]
    fn store_exposes_config() {
        let store = Store::new(Config::new("imap.example.com", Security::Implicit));
        assert_eq!(store.config().host, "imap.example.com");
        assert_eq!(store.config().port, 993);
    }

    #[tokio::test]
    async fn socket_factory_overrides_tcp() {
        let store = Store::with_socket_factory(
            Config::new("imap.example.com", Security::None),
            |_host, _port| Ok(Transport::from_stream(tokio_test::io::Builder::new().build())),
        );
        let transport = store
            .open_socket("imap.example.com", 143, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!transport.is_tls());
    }
}
