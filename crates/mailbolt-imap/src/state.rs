//! Protocol state for an IMAP connection.
//!
//! RFC 3501 section 3 defines the protocol states; `None` is the local
//! pre-connection state before the transport exists.

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No transport yet; only `connect()` is valid.
    #[default]
    None,
    /// Transport open, greeting consumed, waiting for credentials.
    NotAuthenticated,
    /// Authentication succeeded; mailbox commands are available.
    Authenticated,
    /// A mailbox is selected. Entered by higher layers via `set_state`.
    Selected,
    /// Terminal state after LOGOUT or a fatal error.
    Logout,
}

impl State {
    /// True once authentication has succeeded (authenticated or selected).
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected)
    }

    /// True in the terminal state.
    #[must_use]
    pub const fn is_logout(self) -> bool {
        matches!(self, Self::Logout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_none() {
        assert_eq!(State::default(), State::None);
    }

    #[test]
    fn authenticated_predicate() {
        assert!(!State::None.is_authenticated());
        assert!(!State::NotAuthenticated.is_authenticated());
        assert!(State::Authenticated.is_authenticated());
        assert!(State::Selected.is_authenticated());
        assert!(!State::Logout.is_authenticated());
    }

    #[test]
    fn logout_is_terminal() {
        assert!(State::Logout.is_logout());
        assert!(!State::Authenticated.is_logout());
    }
}
