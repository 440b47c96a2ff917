//! Integration tests for the connection engine.
//!
//! Each test scripts an exact server-side byte exchange with
//! `tokio_test::io::Builder` and injects it through the store's socket
//! factory, so every command the engine sends is asserted byte-for-byte.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

use mailbolt_imap::{
    Config, Connection, Error, PasswordAuthenticator, ResponseParser, Security, State, Store,
    Transport,
};
use mailbolt_sasl::SaslContext;

fn connection_for(mock: Mock, config: Config) -> Connection {
    let slot = Mutex::new(Some(Transport::from_stream(mock)));
    let store = Store::with_socket_factory(config, move |_host, _port| {
        slot.lock()
            .unwrap()
            .take()
            .ok_or_else(|| io::Error::other("socket factory exhausted"))
    });
    let connection = store.connection(Arc::new(PasswordAuthenticator::new("alice", "s3cret")));
    // `Connection` only keeps a `Weak<Store>` back-reference; the store
    // must outlive the connection for the socket factory to stay usable.
    Box::leak(Box::new(store));
    connection
}

fn plaintext_login_config() -> Config {
    Config::builder("imap.example.com")
        .security(Security::None)
        .use_sasl(false)
        .build()
}

// Scenario: plaintext LOGIN success.
#[tokio::test]
async fn plaintext_login_success() {
    let mock = Builder::new()
        .read(b"* OK IMAP4rev1 ready\r\n")
        .write(b"a001 LOGIN \"alice\" \"s3cret\"\r\n")
        .read(b"a001 OK LOGIN completed\r\n")
        .write(b"a002 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a002 OK LIST done\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();

    assert_eq!(conn.state(), State::Authenticated);
    assert!(conn.is_connected());
    assert!(!conn.is_secured());
    assert_eq!(conn.hierarchy_separator(), Some('/'));
    // LOGIN OK without capability-data invalidates the cache.
    assert!(conn.cached_capabilities().is_none());

    let info = conn.connection_info().unwrap();
    assert_eq!(info.host, "imap.example.com");
    assert_eq!(info.port, 143);
    assert!(!info.tls);
}

// Scenario: STARTTLS required, the server refuses the upgrade.
#[tokio::test]
async fn starttls_required_upgrade_refused() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"a001 STARTTLS\r\n")
        .read(b"a001 BAD not supported\r\n")
        .build();

    let config = Config::builder("imap.example.com")
        .security(Security::StartTls)
        .tls_required(true)
        .use_sasl(false)
        .build();
    let mut conn = connection_for(mock, config);

    match conn.connect().await {
        Err(Error::Command { command, .. }) => assert_eq!(command, "STARTTLS"),
        other => panic!("expected STARTTLS command error, got {other:?}"),
    }
    assert_eq!(conn.state(), State::None);
    assert!(!conn.is_connected());
    assert!(!conn.is_secured());
}

// Scenario: STARTTLS optional, the connection falls back to cleartext.
#[tokio::test]
async fn starttls_optional_falls_back_to_cleartext() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"a001 STARTTLS\r\n")
        .read(b"a001 BAD not supported\r\n")
        .write(b"a002 LOGIN \"alice\" \"s3cret\"\r\n")
        .read(b"a002 OK welcome\r\n")
        .write(b"a003 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a003 OK done\r\n")
        .build();

    let config = Config::builder("imap.example.com")
        .security(Security::StartTls)
        .tls_required(false)
        .use_sasl(false)
        .build();
    let mut conn = connection_for(mock, config);

    conn.connect().await.unwrap();
    assert_eq!(conn.state(), State::Authenticated);
    assert!(!conn.is_secured());
}

// Scenario: SASL CRAM-MD5 challenge/response success.
#[tokio::test]
async fn sasl_cram_md5_success() {
    let context = SaslContext::new();
    let digest = mailbolt_sasl::cram_md5_response("alice", "s3cret", b"<123456789@host>");
    let reply = format!("{}\r\n", context.encode_b64(&digest));

    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN AUTH=CRAM-MD5] ready\r\n")
        .write(b"a001 AUTHENTICATE CRAM-MD5\r\n")
        .read(b"+ PDEyMzQ1Njc4OUBob3N0Pg==\r\n")
        .write(reply.as_bytes())
        .read(b"a001 OK welcome\r\n")
        .write(b"a002 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a002 OK done\r\n")
        .build();

    let config = Config::builder("imap.example.com")
        .security(Security::None)
        .use_sasl(true)
        .build();
    let mut conn = connection_for(mock, config);

    conn.connect().await.unwrap();
    assert_eq!(conn.state(), State::Authenticated);
    assert!(!conn.is_secured());
    // Successful authentication discards the advertised list.
    assert!(conn.cached_capabilities().is_none());
}

// Scenario: every SASL mechanism fails, the LOGIN fallback succeeds.
#[tokio::test]
async fn sasl_exhausted_login_fallback_succeeds() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN AUTH=CRAM-MD5] ready\r\n")
        .write(b"a001 AUTHENTICATE CRAM-MD5\r\n")
        .read(b"a001 NO CRAM-MD5 rejected\r\n")
        .write(b"a002 AUTHENTICATE PLAIN\r\n")
        .read(b"a002 NO PLAIN rejected\r\n")
        .write(b"a003 LOGIN \"alice\" \"s3cret\"\r\n")
        .read(b"a003 OK welcome\r\n")
        .write(b"a004 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a004 OK done\r\n")
        .build();

    let config = Config::builder("imap.example.com")
        .security(Security::None)
        .use_sasl(true)
        .sasl_fallback(true)
        .build();
    let mut conn = connection_for(mock, config);

    conn.connect().await.unwrap();
    assert_eq!(conn.state(), State::Authenticated);
}

// SASL failure without fallback is fatal and carries the server text.
#[tokio::test]
async fn sasl_exhausted_without_fallback_is_fatal() {
    let context = SaslContext::new();
    let plain = mailbolt_sasl::plain_response("", "alice", "s3cret");
    let reply = format!("{}\r\n", context.encode_b64(&plain));

    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
        .write(b"a001 AUTHENTICATE PLAIN\r\n")
        .read(b"+ \r\n")
        .write(reply.as_bytes())
        .read(b"a001 NO authentication failed\r\n")
        .build();

    let config = Config::builder("imap.example.com")
        .security(Security::None)
        .use_sasl(true)
        .sasl_fallback(false)
        .build();
    let mut conn = connection_for(mock, config);

    match conn.connect().await {
        Err(Error::Auth(text)) => {
            assert!(text.contains("PLAIN"));
            assert!(text.contains("authentication failed"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
    assert_eq!(conn.state(), State::None);
    assert!(!conn.is_connected());
}

// Scenario: a literal body is delivered byte-exact.
#[tokio::test]
async fn literal_payload_is_byte_exact() {
    let mock = Builder::new()
        .read(b"* 1 FETCH (BODY[] {7}\r\nHello!\n)\r\n")
        .read(b"a001 OK done\r\n")
        .build();

    let mut parser = ResponseParser::new(Transport::from_stream(mock), Duration::from_secs(5));
    let response = parser.read_response(Some("a001"), None).await.unwrap();

    match &response.items[0] {
        mailbolt_imap::ResponseItem::Data(mailbolt_imap::ResponseData::Fetch { seq, items }) => {
            assert_eq!(*seq, 1);
            match &items[0] {
                mailbolt_imap::parser::FetchItem::Body { data, .. } => {
                    assert_eq!(data.as_deref(), Some(b"Hello!\n".as_slice()));
                }
                other => panic!("expected body item, got {other:?}"),
            }
        }
        other => panic!("expected fetch data, got {other:?}"),
    }
}

// A PREAUTH greeting skips authentication; its capability code is kept.
#[tokio::test]
async fn preauth_greeting_skips_authentication() {
    let mock = Builder::new()
        .read(b"* PREAUTH [CAPABILITY IMAP4rev1] welcome back\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();

    assert_eq!(conn.state(), State::Authenticated);
    let caps = conn.cached_capabilities().unwrap();
    assert!(caps.contains(&mailbolt_imap::Capability::Imap4Rev1));
}

// A BYE greeting refuses the connection.
#[tokio::test]
async fn bye_greeting_is_fatal() {
    let mock = Builder::new().read(b"* BYE try again later\r\n").build();

    let mut conn = connection_for(mock, plaintext_login_config());
    match conn.connect().await {
        Err(Error::Greeting(text)) => assert_eq!(text, "try again later"),
        other => panic!("expected greeting error, got {other:?}"),
    }
    assert!(!conn.is_connected());
    assert_eq!(conn.state(), State::Logout);
}

// Empty LIST response defaults the hierarchy separator to '/'.
#[tokio::test]
async fn empty_list_defaults_separator() {
    let mock = Builder::new()
        .read(b"* PREAUTH welcome\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();
    assert_eq!(conn.hierarchy_separator(), Some('/'));
}

// A server using '.' as separator is honored.
#[tokio::test]
async fn dotted_separator_is_discovered() {
    let mock = Builder::new()
        .read(b"* PREAUTH welcome\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"* LIST (\\Noselect) \".\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();
    assert_eq!(conn.hierarchy_separator(), Some('.'));
}

// Capability lookups fetch lazily, then answer from the cache
// case-insensitively without further I/O.
#[tokio::test]
async fn capability_lookup_fetches_once() {
    let mock = Builder::new()
        .read(b"* PREAUTH welcome\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .write(b"a002 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 IDLE\r\n")
        .read(b"a002 OK done\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();

    assert!(conn.has_capability("IDLE").await.unwrap());
    // Served from the cache: the mock would panic on a second command.
    assert!(conn.has_capability("idle").await.unwrap());
    assert!(!conn.has_capability("MOVE").await.unwrap());
}

// connect() on a live connection is rejected.
#[tokio::test]
async fn connect_twice_is_rejected() {
    let mock = Builder::new()
        .read(b"* PREAUTH welcome\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();

    assert!(matches!(conn.connect().await, Err(Error::AlreadyConnected)));
    assert_eq!(conn.state(), State::Authenticated);
}

// disconnect() sends LOGOUT once and is idempotent afterwards.
#[tokio::test]
async fn disconnect_is_idempotent() {
    let mock = Builder::new()
        .read(b"* PREAUTH welcome\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .write(b"a002 LOGOUT\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();
    assert!(conn.is_connected());

    conn.disconnect().await;
    assert_eq!(conn.state(), State::Logout);
    assert!(!conn.is_connected());
    assert!(conn.connection_info().is_none());

    // A second disconnect must not touch the (consumed) mock.
    conn.disconnect().await;
    assert_eq!(conn.state(), State::Logout);
}

// Commands sent by higher layers keep advancing the tag sequence.
#[tokio::test]
async fn higher_layer_sends_advance_tags() {
    let mock = Builder::new()
        .read(b"* PREAUTH welcome\r\n")
        .write(b"a001 LIST \"\" \"\"\r\n")
        .read(b"* LIST () \"/\" \"\"\r\n")
        .read(b"a001 OK done\r\n")
        .write(b"a002 NOOP\r\n")
        .read(b"a002 OK nothing\r\n")
        .write(b"a003 NOOP\r\n")
        .read(b"a003 OK nothing\r\n")
        .build();

    let mut conn = connection_for(mock, plaintext_login_config());
    conn.connect().await.unwrap();

    for _ in 0..2 {
        conn.send(true, "NOOP", true, None).await.unwrap();
        let response = conn.read_response(None).await.unwrap();
        assert!(response.is_ok());
    }
}

/// A stream that never yields data, for exercising the idle timeout.
struct NeverReady;

impl AsyncRead for NeverReady {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for NeverReady {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test(start_paused = true)]
async fn idle_read_times_out() {
    let mut parser =
        ResponseParser::new(Transport::from_stream(NeverReady), Duration::from_millis(250));

    match parser.read_greeting().await {
        Err(Error::Timeout(elapsed)) => assert_eq!(elapsed, Duration::from_millis(250)),
        other => panic!("expected timeout, got {other:?}"),
    }
}
