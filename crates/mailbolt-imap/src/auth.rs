//! Credential suppliers.

use mailbolt_sasl::Mechanism;

/// Supplies credentials to the connection and may veto or reorder the
/// SASL mechanisms the negotiation will try.
pub trait Authenticator: Send + Sync {
    /// The authentication username.
    fn username(&self) -> String;

    /// The authentication password (or bearer token for XOAUTH2).
    fn password(&self) -> String;

    /// Filters or reorders the candidate mechanisms. `ordered` already
    /// has the suggested mechanism first; the default accepts it as-is.
    fn acceptable_mechanisms(
        &self,
        ordered: Vec<Mechanism>,
        suggested: Mechanism,
    ) -> Vec<Mechanism> {
        let _ = suggested;
        ordered
    }
}

/// Plain username/password authenticator.
pub struct PasswordAuthenticator {
    username: String,
    password: String,
}

impl PasswordAuthenticator {
    /// Creates an authenticator for the given credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for PasswordAuthenticator {
    fn username(&self) -> String {
        self.username.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }
}

impl std::fmt::Debug for PasswordAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAuthenticator")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mechanism_filter_is_passthrough() {
        let auth = PasswordAuthenticator::new("user", "pass");
        let ordered = vec![Mechanism::CramMd5, Mechanism::Plain];
        let result = auth.acceptable_mechanisms(ordered.clone(), Mechanism::CramMd5);
        assert_eq!(result, ordered);
    }

    #[test]
    fn debug_hides_password() {
        let auth = PasswordAuthenticator::new("user", "hunter2");
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
