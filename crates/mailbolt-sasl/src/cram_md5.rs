//! CRAM-MD5 mechanism (RFC 2195).

use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// Computes the CRAM-MD5 response: `authcid SP hex(hmac-md5(secret, challenge))`.
///
/// The challenge arrives already base64-decoded; per RFC 2195 it is a
/// message-id style string such as `<1896.697170952@postoffice.example>`.
#[must_use]
pub fn cram_md5_response(authcid: &str, secret: &str, challenge: &[u8]) -> Vec<u8> {
    let mut mac = HmacMd5::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(authcid.len() + 1 + digest.len() * 2);
    out.extend_from_slice(authcid.as_bytes());
    out.push(b' ');
    out.extend_from_slice(hex(&digest).as_bytes());
    out
}

fn hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(DIGITS[usize::from(b >> 4)] as char);
        s.push(DIGITS[usize::from(b & 0x0f)] as char);
    }
    s
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rfc2195_example() {
        // The worked example from RFC 2195 section 2.
        let response = cram_md5_response(
            "tim",
            "tanstaaftanstaaf",
            b"<1896.697170952@postoffice.reston.mci.net>",
        );
        assert_eq!(
            response,
            b"tim b913a602c7eda7a495b4e6e7334d3890".as_slice()
        );
    }

    #[test]
    fn response_shape() {
        let response = cram_md5_response("alice", "pw", b"<1@h>");
        let text = String::from_utf8(response).unwrap();
        let (user, digest) = text.split_once(' ').unwrap();
        assert_eq!(user, "alice");
        assert_eq!(digest.len(), 32);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_depends_on_challenge() {
        let a = cram_md5_response("alice", "pw", b"<1@h>");
        let b = cram_md5_response("alice", "pw", b"<2@h>");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(hex(&[0x00, 0xff, 0x1a]), "00ff1a");
    }
}
