//! PLAIN mechanism (RFC 4616).

/// Builds the PLAIN response: `authzid \0 authcid \0 secret`.
///
/// The first field is the authorization identity; empty means "derive it
/// from the authentication identity".
#[must_use]
pub fn plain_response(authzid: &str, authcid: &str, secret: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(authzid.len() + authcid.len() + secret.len() + 2);
    out.extend_from_slice(authzid.as_bytes());
    out.push(0);
    out.extend_from_slice(authcid.as_bytes());
    out.push(0);
    out.extend_from_slice(secret.as_bytes());
    out
}
