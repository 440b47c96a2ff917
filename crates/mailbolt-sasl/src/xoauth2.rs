//! XOAUTH2 mechanism (Google/Microsoft proprietary).

/// Builds the XOAUTH2 response: `user=<user>\x01auth=Bearer <token>\x01\x01`.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> Vec<u8> {
    format!("user={user}\x01auth=Bearer {token}\x01\x01").into_bytes()
}
