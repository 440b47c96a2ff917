//! # mailbolt-sasl
//!
//! SASL client mechanisms (RFC 4422) for the mailbolt mail library.
//!
//! Implements:
//! - PLAIN (RFC 4616) - username/password in a single response
//! - LOGIN - legacy Username:/Password: prompt exchange
//! - CRAM-MD5 (RFC 2195) - HMAC-MD5 challenge/response
//! - XOAUTH2 (Google/Microsoft proprietary) - `OAuth2` bearer token
//!
//! The protocol engines drive authentication through [`SaslContext`] and
//! [`Session`]: the context instantiates mechanisms by their advertised
//! names and suggests which to try first, a session turns server
//! challenges into client responses.
//!
//! ```
//! use mailbolt_sasl::{Credentials, Mechanism, SaslContext};
//!
//! let ctx = SaslContext::new();
//! let mech = ctx.create_mechanism("CRAM-MD5").unwrap();
//! assert_eq!(mech, Mechanism::CramMd5);
//!
//! let creds = Credentials::new("alice", "s3cret");
//! let mut session = ctx.create_session("imap", &creds, mech);
//! session.init();
//! let reply = session.evaluate_challenge(b"<123@host>").unwrap();
//! assert!(reply.starts_with(b"alice "));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cram_md5;
mod login;
mod plain;
mod xoauth2;

pub use cram_md5::cram_md5_response;
pub use plain::plain_response;
pub use xoauth2::xoauth2_response;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use thiserror::Error;

/// Errors raised during SASL negotiation.
#[derive(Debug, Error)]
pub enum SaslError {
    /// The requested mechanism name is not implemented.
    #[error("no such SASL mechanism: {0}")]
    NoSuchMechanism(String),

    /// The mechanism rejected a server challenge.
    #[error("SASL exchange failed: {0}")]
    Exchange(String),

    /// The server challenge was not valid base64.
    #[error("invalid base64 in SASL challenge: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Result type alias using [`SaslError`].
pub type Result<T> = std::result::Result<T, SaslError>;

/// A SASL mechanism implemented by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// LOGIN (legacy prompt exchange).
    Login,
    /// CRAM-MD5 (RFC 2195).
    CramMd5,
    /// XOAUTH2 (`OAuth2` bearer token).
    XOAuth2,
}

impl Mechanism {
    /// Parses an advertised mechanism name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::NoSuchMechanism`] for names this crate does
    /// not implement.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "LOGIN" => Ok(Self::Login),
            "CRAM-MD5" => Ok(Self::CramMd5),
            "XOAUTH2" => Ok(Self::XOAuth2),
            _ => Err(SaslError::NoSuchMechanism(name.to_string())),
        }
    }

    /// The canonical mechanism name as sent on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
        }
    }

    /// Relative preference when suggesting a mechanism. Shared-secret
    /// digests rank above mechanisms that transmit the secret itself.
    const fn rank(self) -> u8 {
        match self {
            Self::CramMd5 => 3,
            Self::Plain => 2,
            Self::Login => 1,
            Self::XOAuth2 => 0,
        }
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Credentials handed to a SASL session.
///
/// For XOAUTH2 the `secret` is the `OAuth2` access token and `authcid`
/// the account e-mail address.
#[derive(Clone)]
pub struct Credentials {
    /// Authorization identity; empty means "same as authentication identity".
    pub authzid: String,
    /// Authentication identity (username).
    pub authcid: String,
    /// Password or bearer token.
    pub secret: String,
}

impl Credentials {
    /// Creates credentials with an empty authorization identity.
    #[must_use]
    pub fn new(authcid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            authzid: String::new(),
            authcid: authcid.into(),
            secret: secret.into(),
        }
    }
}

// Keep secrets out of Debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("authzid", &self.authzid)
            .field("authcid", &self.authcid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Factory for mechanisms and sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaslContext;

impl SaslContext {
    /// Creates a new context.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Instantiates a mechanism by its advertised name.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::NoSuchMechanism`] for unimplemented names.
    pub fn create_mechanism(&self, name: &str) -> Result<Mechanism> {
        Mechanism::from_name(name)
    }

    /// Suggests the preferred mechanism among those offered.
    #[must_use]
    pub fn suggest_mechanism(&self, offered: &[Mechanism]) -> Option<Mechanism> {
        offered.iter().copied().max_by_key(|m| m.rank())
    }

    /// Creates an authentication session for the given service.
    #[must_use]
    pub fn create_session(
        &self,
        service: &str,
        credentials: &Credentials,
        mechanism: Mechanism,
    ) -> Session {
        Session {
            service: service.to_string(),
            mechanism,
            credentials: credentials.clone(),
            step: 0,
        }
    }

    /// Base64-encodes bytes for the wire.
    #[must_use]
    pub fn encode_b64(&self, data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    /// Base64-decodes a server challenge.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::Base64`] on malformed input.
    pub fn decode_b64(&self, data: &str) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(data.trim())?)
    }
}

/// One authentication exchange for a single mechanism.
///
/// Challenges arrive decoded (raw octets); responses are returned as raw
/// octets for the caller to base64-encode.
#[derive(Debug)]
pub struct Session {
    service: String,
    mechanism: Mechanism,
    credentials: Credentials,
    step: u32,
}

impl Session {
    /// Resets the exchange. Must be called before the first challenge.
    pub fn init(&mut self) {
        self.step = 0;
    }

    /// The mechanism this session negotiates.
    #[must_use]
    pub const fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// The service name the session was created for (e.g. `"imap"`).
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Computes the client response to a decoded server challenge.
    ///
    /// # Errors
    ///
    /// Returns [`SaslError::Exchange`] when the challenge is not valid
    /// for the mechanism or arrives out of order.
    pub fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let step = self.step;
        self.step += 1;

        match self.mechanism {
            Mechanism::Plain => match step {
                0 => Ok(plain::plain_response(
                    &self.credentials.authzid,
                    &self.credentials.authcid,
                    &self.credentials.secret,
                )),
                _ => Err(SaslError::Exchange(
                    "PLAIN expects a single empty challenge".to_string(),
                )),
            },
            Mechanism::Login => login::login_response(
                challenge,
                &self.credentials.authcid,
                &self.credentials.secret,
            ),
            Mechanism::CramMd5 => match step {
                0 => Ok(cram_md5::cram_md5_response(
                    &self.credentials.authcid,
                    &self.credentials.secret,
                    challenge,
                )),
                _ => Err(SaslError::Exchange(
                    "CRAM-MD5 expects a single challenge".to_string(),
                )),
            },
            Mechanism::XOAuth2 => match step {
                0 => Ok(xoauth2::xoauth2_response(
                    &self.credentials.authcid,
                    &self.credentials.secret,
                )),
                // A second challenge is the server's JSON error blob; an
                // empty response asks for the final tagged NO.
                _ => Ok(Vec::new()),
            },
        }
    }

    /// Whether the mechanism negotiated a post-authentication security
    /// layer over the transport. None of the built-in mechanisms do.
    #[must_use]
    pub const fn has_security_layer(&self) -> bool {
        false
    }
}
