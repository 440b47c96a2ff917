//! LOGIN mechanism (legacy prompt exchange).
//!
//! The server sends two challenges in turn, `Username:` and `Password:`;
//! the client answers each with the corresponding credential. Prompt text
//! varies between servers, so matching is case-insensitive and substring
//! based.

use crate::{Result, SaslError};

/// Answers a LOGIN prompt with the matching credential.
///
/// # Errors
///
/// Returns [`SaslError::Exchange`] when the prompt is neither a username
/// nor a password request.
pub fn login_response(challenge: &[u8], authcid: &str, secret: &str) -> Result<Vec<u8>> {
    let prompt = String::from_utf8_lossy(challenge).to_ascii_lowercase();

    if prompt.contains("username") || prompt.trim() == "user name" {
        Ok(authcid.as_bytes().to_vec())
    } else if prompt.contains("password") {
        Ok(secret.as_bytes().to_vec())
    } else {
        Err(SaslError::Exchange(format!(
            "unexpected LOGIN prompt: {}",
            prompt.trim()
        )))
    }
}
