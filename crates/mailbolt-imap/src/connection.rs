//! The IMAP connection engine.
//!
//! [`Connection`] drives the full lifecycle of one IMAP4rev1 session:
//! transport bring-up (plain, implicit TLS, or STARTTLS), SASL and LOGIN
//! authentication, hierarchy-separator discovery, command tagging, and
//! response demultiplexing. Higher layers build mailbox operations on
//! the exposed [`Connection::send`]/[`Connection::read_response`] pair.
//!
//! A connection is a single-task cooperative object: all entry points
//! take `&mut self`, commands are strictly serialized, and there are no
//! internal locks. Independent connections run concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use mailbolt_sasl::{Credentials, SaslContext};

use crate::auth::Authenticator;
use crate::capability::{Capability, CapabilityCache};
use crate::config::{Config, Security};
use crate::parser::{GreetingKind, LiteralHandler, Response, ResponseCode, ResponseParser};
use crate::state::State;
use crate::store::{ConnectionInfo, Store};
use crate::tag::TagGenerator;
use crate::{Error, Result};

// Process-wide counter correlating trace output across connections.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A stateful IMAP4rev1 client connection.
pub struct Connection {
    store: Weak<Store>,
    authenticator: Arc<dyn Authenticator>,
    parser: Option<ResponseParser>,
    tag: TagGenerator,
    first_tag: bool,
    state: State,
    capabilities: CapabilityCache,
    hierarchy_separator: Option<char>,
    secured: bool,
    info: Option<ConnectionInfo>,
    no_modseq: bool,
    id: u64,
}

impl Connection {
    pub(crate) fn new(store: Weak<Store>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            store,
            authenticator,
            parser: None,
            tag: TagGenerator::default(),
            first_tag: true,
            state: State::None,
            capabilities: CapabilityCache::new(),
            hierarchy_separator: None,
            secured: false,
            info: None,
            no_modseq: false,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Drives full connection bring-up and returns once the connection
    /// reaches [`State::Authenticated`].
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] when called on a live connection.
    /// - [`Error::Greeting`] when the server greets with BYE.
    /// - [`Error::Command`] when a required STARTTLS upgrade is refused.
    /// - [`Error::Auth`] when every authentication path fails.
    /// - Transport, TLS, parse, and timeout errors are fatal and leave
    ///   the connection disconnected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        self.state = State::None;
        self.hierarchy_separator = None;

        let store = self.store()?;
        let config = store.config().clone();

        let transport = self.open_transport(&store, &config).await?;

        self.tag = TagGenerator::default();
        self.first_tag = true;
        self.parser = Some(ResponseParser::new(transport, config.io_timeout));
        self.state = State::NotAuthenticated;

        let greeting = self.parser_mut()?.read_greeting().await?;

        let need_auth = match greeting.kind {
            GreetingKind::Bye => {
                let text = greeting.text.text;
                self.internal_disconnect().await;
                return Err(Error::Greeting(text));
            }
            GreetingKind::Ok => true,
            GreetingKind::PreAuth => false,
        };

        // The greeting may carry the capability list, sparing a
        // CAPABILITY round-trip. Ingested for PREAUTH too.
        if let Some(ResponseCode::Capability(caps)) = greeting.text.code {
            self.capabilities.replace(caps);
        }

        if config.security == Security::StartTls {
            match self.start_tls(&store, &config).await {
                Ok(()) => {}
                Err(err @ Error::Command { .. }) => {
                    if config.tls_required {
                        self.internal_disconnect().await;
                        self.state = State::None;
                        return Err(err);
                    }
                    debug!(conn = self.id, "STARTTLS refused, continuing in cleartext");
                }
                Err(err) => {
                    self.state = State::None;
                    return Err(err);
                }
            }
        }

        if need_auth {
            if let Err(err) = self.authenticate(&config).await {
                self.state = State::None;
                return Err(err);
            }
        }

        self.init_hierarchy_separator().await?;

        self.state = State::Authenticated;
        debug!(conn = self.id, "connection established");
        Ok(())
    }

    /// Opens the transport, wrapping it in TLS immediately for IMAPS.
    async fn open_transport(
        &mut self,
        store: &Store,
        config: &Config,
    ) -> Result<crate::transport::Transport> {
        let transport = store
            .open_socket(&config.host, config.port, config.connect_timeout)
            .await?;

        if config.security == Security::Implicit {
            debug!(
                conn = self.id,
                host = %config.host,
                port = config.port,
                "connecting with implicit TLS"
            );
            let connector = store.tls_connector();
            let transport = transport
                .upgrade_to_tls(&config.host, &connector, config.connect_timeout)
                .await?;
            self.secured = true;
            self.info = Some(ConnectionInfo {
                host: config.host.clone(),
                port: config.port,
                tls: true,
            });
            Ok(transport)
        } else {
            debug!(
                conn = self.id,
                host = %config.host,
                port = config.port,
                "connecting without encryption"
            );
            self.info = Some(ConnectionInfo {
                host: config.host.clone(),
                port: config.port,
                tls: false,
            });
            Ok(transport)
        }
    }

    /// Runs the STARTTLS upgrade.
    ///
    /// A server refusal surfaces as [`Error::Command`] with the
    /// connection still usable in cleartext; the caller decides whether
    /// that is fatal. Every other failure disconnects.
    async fn start_tls(&mut self, store: &Store, config: &Config) -> Result<()> {
        match self.try_start_tls(store, config).await {
            Ok(()) => Ok(()),
            Err(err @ Error::Command { .. }) => Err(err),
            Err(err) => {
                self.internal_disconnect().await;
                Err(err)
            }
        }
    }

    async fn try_start_tls(&mut self, store: &Store, config: &Config) -> Result<()> {
        self.send(true, "STARTTLS", true, None).await?;
        let response = self.read_response(None).await?;

        if !response.is_ok() {
            return Err(Error::Command {
                command: "STARTTLS".to_string(),
                text: response.done_text().to_string(),
                log: self.error_log(),
            });
        }

        // The STARTTLS OK is the last cleartext byte the server sends,
        // so the parser's buffer is empty and the swap is clean.
        let plain = self.parser_mut()?.take_transport()?;
        let connector = store.tls_connector();
        let tls = plain
            .upgrade_to_tls(&config.host, &connector, config.connect_timeout)
            .await?;
        self.parser_mut()?.set_transport(tls)?;

        self.secured = true;
        self.info = Some(ConnectionInfo {
            host: config.host.clone(),
            port: config.port,
            tls: true,
        });
        debug!(conn = self.id, "TLS session established");

        // RFC 2595: the pre-TLS capability list must be discarded to
        // defeat man-in-the-middle tampering.
        self.capabilities.invalidate();
        Ok(())
    }

    /// Authenticates the session: SASL first when enabled, then LOGIN.
    ///
    /// SASL diagnostics accumulate across the fallback so a final
    /// failure reports every server response that led to it.
    async fn authenticate(&mut self, config: &Config) -> Result<()> {
        let mut sasl_errors = String::new();

        if config.use_sasl {
            match self.authenticate_sasl().await {
                Ok(()) => return Ok(()),
                Err(Error::Auth(text)) if config.sasl_fallback => {
                    sasl_errors = format!("{text}\n");
                    if !self.transport_open() {
                        self.internal_disconnect().await;
                        return Err(Error::Auth(format!(
                            "{sasl_errors}the server has disconnected"
                        )));
                    }
                }
                Err(err) => {
                    self.internal_disconnect().await;
                    return Err(err);
                }
            }
        }

        match self.login(&sasl_errors).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.internal_disconnect().await;
                Err(err)
            }
        }
    }

    /// The LOGIN phase. Does not disconnect on failure; the caller does.
    async fn login(&mut self, sasl_errors: &str) -> Result<()> {
        let username = self.authenticator.username();
        let password = self.authenticator.password();
        let command = format!("LOGIN {} {}", quote(&username), quote(&password));

        self.send(true, &command, true, Some("LOGIN {user} {password}"))
            .await?;
        let response = self.read_response(None).await?;

        if response.is_bad() {
            return Err(Error::Command {
                command: "LOGIN".to_string(),
                text: response.done_text().to_string(),
                log: self.error_log(),
            });
        }
        if !response.is_ok() {
            return Err(Error::Auth(format!(
                "{sasl_errors}LOGIN: {}",
                response.done_text()
            )));
        }

        // The capability list usually changes once logged in. Take the
        // fresh one if the response carried it, refetch lazily otherwise.
        if !self.capabilities.ingest(&response) {
            self.capabilities.invalidate();
        }
        Ok(())
    }

    /// SASL negotiation over the advertised `AUTH=` mechanisms.
    ///
    /// Tries each acceptable mechanism in suggested order; a mechanism
    /// failure is recorded and the next one tried. Exhaustion surfaces
    /// as [`Error::Auth`] carrying the accumulated diagnostics.
    async fn authenticate_sasl(&mut self) -> Result<()> {
        self.ensure_capabilities().await?;
        let server_mechs = self.capabilities.auth_mechanisms();

        if server_mechs.is_empty() {
            return Err(Error::Auth(
                "the server does not advertise any SASL mechanism".to_string(),
            ));
        }

        let context = SaslContext::new();
        let mut offered = Vec::new();
        for name in &server_mechs {
            if let Ok(mech) = context.create_mechanism(name) {
                offered.push(mech);
            } else {
                debug!(conn = self.id, mechanism = %name, "skipping unimplemented SASL mechanism");
            }
        }

        if offered.is_empty() {
            return Err(Error::Auth(
                "the server does not support any of the implemented SASL mechanisms".to_string(),
            ));
        }

        let Some(suggested) = context.suggest_mechanism(&offered) else {
            return Err(Error::Auth("unable to suggest a SASL mechanism".to_string()));
        };

        // Suggested mechanism first, the rest in advertised order; the
        // authenticator gets the final say.
        let mut ordered = vec![suggested];
        ordered.extend(offered.iter().copied().filter(|&m| m != suggested));
        let candidates = self.authenticator.acceptable_mechanisms(ordered, suggested);

        if candidates.is_empty() {
            return Err(Error::Auth("no acceptable SASL mechanism".to_string()));
        }

        let credentials = Credentials::new(
            self.authenticator.username(),
            self.authenticator.password(),
        );
        let mut errors = String::new();

        'mechanisms: for mechanism in candidates {
            let mut session = context.create_session("imap", &credentials, mechanism);
            session.init();

            debug!(conn = self.id, mechanism = %mechanism, "attempting SASL authentication");
            self.send(true, &format!("AUTHENTICATE {mechanism}"), true, None)
                .await?;

            loop {
                let response = self.read_response(None).await?;

                if response.is_ok() {
                    if session.has_security_layer() {
                        return Err(Error::Protocol(
                            "SASL security layers are not supported".to_string(),
                        ));
                    }
                    self.capabilities.invalidate();
                    return Ok(());
                }

                let Some(challenge) = response.continuation().map(|t| t.text.clone()) else {
                    errors.push_str(&format!(
                        "\nSASL {mechanism}: {}",
                        response.done_text()
                    ));
                    continue 'mechanisms;
                };

                let reply = context
                    .decode_b64(&challenge)
                    .and_then(|decoded| session.evaluate_challenge(&decoded));

                match reply {
                    Ok(data) => {
                        self.send(
                            false,
                            &context.encode_b64(&data),
                            true,
                            Some("{authentication data}"),
                        )
                        .await?;
                        // The advertised list may change as we log in.
                        self.capabilities.invalidate();
                    }
                    Err(err) => {
                        errors.push_str(&format!("\nSASL {mechanism}: {err}"));
                        // Cancel the exchange; the server answers with a
                        // tagged NO consumed on the next loop turn.
                        self.send(false, "*", true, None).await?;
                    }
                }
            }
        }

        Err(Error::Auth(errors.trim_start().to_string()))
    }

    /// Discovers the mailbox hierarchy separator via `LIST "" ""`.
    async fn init_hierarchy_separator(&mut self) -> Result<()> {
        if let Err(err) = self.send(true, "LIST \"\" \"\"", true, None).await {
            self.internal_disconnect().await;
            return Err(err);
        }
        let response = match self.read_response(None).await {
            Ok(response) => response,
            Err(err) => {
                self.internal_disconnect().await;
                return Err(err);
            }
        };

        if !response.is_ok() {
            let err = Error::Command {
                command: "LIST".to_string(),
                text: response.done_text().to_string(),
                log: self.error_log(),
            };
            self.internal_disconnect().await;
            return Err(err);
        }

        self.hierarchy_separator =
            Some(response.lists().find_map(|list| list.delimiter).unwrap_or('/'));
        Ok(())
    }

    /// Serializes a command to the transport.
    ///
    /// A tagged send prefixes the current tag, advancing it first unless
    /// this is the connection's first tagged command. `trace` replaces
    /// the logged line when the command carries secrets.
    pub async fn send(
        &mut self,
        tagged: bool,
        command: &str,
        end_with_crlf: bool,
        trace: Option<&str>,
    ) -> Result<()> {
        if tagged && !self.first_tag {
            self.tag.advance();
        }

        let mut line = String::with_capacity(command.len() + 8);
        if tagged {
            line.push_str(&self.tag.current());
            line.push(' ');
        }
        line.push_str(command);

        debug!(conn = self.id, "send > {}", trace.unwrap_or(&line));

        if end_with_crlf {
            line.push_str("\r\n");
        }
        self.parser_mut()?.send_bytes(line.as_bytes()).await?;

        if tagged {
            self.first_tag = false;
        }
        Ok(())
    }

    /// Writes raw bytes to the transport (literal payloads).
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.parser_mut()?.send_bytes(bytes).await
    }

    /// Reads the response for the most recently sent tagged command.
    ///
    /// # Errors
    ///
    /// Parse, timeout, and transport errors; also [`Error::Protocol`]
    /// when the tagged completion carries an unexpected tag.
    pub async fn read_response(
        &mut self,
        literal_handler: Option<&mut dyn LiteralHandler>,
    ) -> Result<Response> {
        let tag = self.tag.current();
        let parser = self
            .parser
            .as_mut()
            .ok_or_else(|| Error::InvalidState("not connected".to_string()))?;
        parser.read_response(Some(&tag), literal_handler).await
    }

    /// The current capability list, fetching it first if necessary.
    pub async fn capabilities(&mut self) -> Result<Vec<Capability>> {
        self.ensure_capabilities().await?;
        Ok(self.capabilities.list().to_vec())
    }

    /// Case-insensitive capability test, fetching first if necessary.
    pub async fn has_capability(&mut self, name: &str) -> Result<bool> {
        self.ensure_capabilities().await?;
        Ok(self.capabilities.has(name))
    }

    /// The cached capability list, `None` when not fetched.
    #[must_use]
    pub fn cached_capabilities(&self) -> Option<&[Capability]> {
        self.capabilities
            .is_fetched()
            .then(|| self.capabilities.list())
    }

    /// Clears the capability cache; the next lookup refetches.
    pub fn invalidate_capabilities(&mut self) {
        self.capabilities.invalidate();
    }

    async fn ensure_capabilities(&mut self) -> Result<()> {
        if self.capabilities.is_fetched() {
            return Ok(());
        }

        self.send(true, "CAPABILITY", true, None).await?;
        let response = self.read_response(None).await?;

        if response.is_ok() && !self.capabilities.ingest(&response) {
            // OK without capability-data: empty but fetched.
            self.capabilities.mark_fetched();
        }
        Ok(())
    }

    /// Sends LOGOUT and closes the transport. Idempotent; never fails.
    pub async fn disconnect(&mut self) {
        if self.is_connected() {
            self.internal_disconnect().await;
        }
    }

    /// Tears the connection down: best-effort LOGOUT when connected,
    /// transport closed, state moves to [`State::Logout`].
    async fn internal_disconnect(&mut self) {
        if self.is_connected() {
            let _ = self.send(true, "LOGOUT", true, None).await;
        }

        if let Some(parser) = self.parser.take()
            && let Some(mut transport) = parser.into_transport()
        {
            let _ = transport.shutdown().await;
        }

        self.state = State::Logout;
        self.secured = false;
        self.info = None;
        debug!(conn = self.id, "disconnected");
    }

    /// The current protocol state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Sets the protocol state. Higher layers drive the
    /// `Authenticated` ↔ `Selected` transitions through this.
    pub const fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// True while the transport is open and the session is authenticated
    /// (or has a mailbox selected).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport_open() && self.state.is_authenticated()
    }

    /// True once the byte stream is TLS-protected.
    #[must_use]
    pub const fn is_secured(&self) -> bool {
        self.secured
    }

    /// Endpoint and encryption details, `None` when disconnected.
    #[must_use]
    pub const fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    /// The mailbox hierarchy separator discovered at connect time.
    #[must_use]
    pub const fn hierarchy_separator(&self) -> Option<char> {
        self.hierarchy_separator
    }

    /// Opts this session out of MODSEQ updates (RFC 7162).
    pub const fn disable_modseq(&mut self) {
        self.no_modseq = true;
    }

    /// Whether MODSEQ updates are disabled.
    #[must_use]
    pub const fn is_modseq_disabled(&self) -> bool {
        self.no_modseq
    }

    /// Process-unique connection id, for trace correlation.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    fn transport_open(&self) -> bool {
        self.parser.as_ref().is_some_and(ResponseParser::has_transport)
    }

    fn store(&self) -> Result<Arc<Store>> {
        self.store
            .upgrade()
            .ok_or_else(|| Error::InvalidState("store has been dropped".to_string()))
    }

    fn parser_mut(&mut self) -> Result<&mut ResponseParser> {
        self.parser
            .as_mut()
            .ok_or_else(|| Error::InvalidState("not connected".to_string()))
    }

    fn error_log(&self) -> String {
        self.parser
            .as_ref()
            .map(ResponseParser::error_log)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("secured", &self.secured)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Quotes a string per the IMAP `quoted` grammar. LOGIN arguments are
/// always sent quoted.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
