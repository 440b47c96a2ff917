//! Structured server responses.
//!
//! The shapes follow the RFC 3501 response grammar: a connection starts
//! with a [`Greeting`]; afterwards every read yields a [`Response`] made
//! of interleaved untagged data and an optional tagged completion.

use crate::capability::Capability;

/// Kind of the server greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingKind {
    /// Authentication required.
    Ok,
    /// Connection is pre-authenticated.
    PreAuth,
    /// Server refuses the connection.
    Bye,
}

/// The server's first, unsolicited response.
#[derive(Debug, Clone, PartialEq)]
pub struct Greeting {
    /// Greeting kind.
    pub kind: GreetingKind,
    /// Greeting text, possibly carrying a `[CAPABILITY …]` code.
    pub text: ResponseText,
}

/// Human-readable response text with an optional bracketed code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseText {
    /// Optional `[…]` response code.
    pub code: Option<ResponseCode>,
    /// The free text after the code.
    pub text: String,
}

/// A bracketed response code.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseCode {
    /// ALERT: must be shown to the user.
    Alert,
    /// CAPABILITY: fresh capability list.
    Capability(Vec<Capability>),
    /// PARSE: the server failed to parse a message.
    Parse,
    /// PERMANENTFLAGS: flags that can be stored permanently.
    PermanentFlags(Vec<String>),
    /// READ-ONLY: mailbox selected read-only.
    ReadOnly,
    /// READ-WRITE: mailbox selected read-write.
    ReadWrite,
    /// TRYCREATE: target mailbox does not exist but may be created.
    TryCreate,
    /// UIDNEXT: next UID to be assigned.
    UidNext(u32),
    /// UIDVALIDITY: UID validity value.
    UidValidity(u32),
    /// UNSEEN: first unseen message number.
    Unseen(u32),
    /// HIGHESTMODSEQ: highest mod-sequence (RFC 7162).
    HighestModSeq(u64),
    /// NOMODSEQ: mailbox does not support mod-sequences.
    NoModSeq,
    /// Any other code, raw.
    Unknown(String),
}

/// Status of a tagged completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed.
    Ok,
    /// Command failed (operational).
    No,
    /// Command rejected (protocol or syntax).
    Bad,
}

impl Status {
    /// True for a successful completion.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// The tagged response-done terminating a command exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedDone {
    /// The echoed command tag.
    pub tag: String,
    /// Completion status.
    pub status: Status,
    /// Completion text.
    pub text: ResponseText,
}

/// Kind of an untagged server-status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatusKind {
    /// Informational.
    Ok,
    /// Warning.
    No,
    /// Protocol-level complaint.
    Bad,
    /// The server is closing the connection.
    Bye,
    /// Pre-authentication notice (normally only in the greeting).
    PreAuth,
}

/// One untagged `* LIST` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListData {
    /// Name attributes (`\Noselect`, …).
    pub attributes: Vec<String>,
    /// Hierarchy delimiter, `None` for a flat mailbox.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: String,
}

/// One attribute of an untagged FETCH response.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Vec<String>),
    /// Message UID.
    Uid(u32),
    /// RFC822 size in octets.
    Rfc822Size(u32),
    /// Internal date string.
    InternalDate(String),
    /// Mod-sequence (RFC 7162).
    ModSeq(u64),
    /// A body section payload. `data` is `None` for NIL, and empty when
    /// a literal handler redirected the octets.
    Body {
        /// Section specifier, e.g. `""` or `HEADER.FIELDS (DATE)`.
        section: String,
        /// Origin offset from a partial fetch.
        origin: Option<u32>,
        /// The payload.
        data: Option<Vec<u8>>,
    },
    /// An attribute this engine does not interpret (ENVELOPE,
    /// BODYSTRUCTURE, …); the value was skipped structurally.
    Unparsed(String),
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// `* CAPABILITY …`
    Capability(Vec<Capability>),
    /// `* LIST (…) "/" name`
    List(ListData),
    /// `* FLAGS (…)`
    Flags(Vec<String>),
    /// `* SEARCH n…`
    Search(Vec<u32>),
    /// `* STATUS name (…)`
    MailboxStatus {
        /// Mailbox name.
        mailbox: String,
        /// Attribute/value pairs in server order.
        items: Vec<(String, u64)>,
    },
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* n FETCH (…)`
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Parsed attributes.
        items: Vec<FetchItem>,
    },
    /// `* OK/NO/BAD/BYE …`
    ServerStatus {
        /// Status kind.
        kind: ServerStatusKind,
        /// Status text.
        text: ResponseText,
    },
    /// Unrecognized untagged data, kept raw.
    Unknown(String),
}

/// One element read while waiting for a command's completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseItem {
    /// `+ …` continuation request.
    Continuation(ResponseText),
    /// Untagged response data.
    Data(ResponseData),
}

/// A full command response: interleaved untagged items plus the tagged
/// completion. `done` is `None` exactly when the read stopped at a
/// continuation request, which the client must answer before the server
/// sends anything further.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Untagged data and continuation requests, in arrival order.
    pub items: Vec<ResponseItem>,
    /// The tagged completion, absent for a continuation.
    pub done: Option<TaggedDone>,
}

impl Response {
    /// True if the tagged completion is OK.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.done.as_ref().is_some_and(|d| d.status.is_ok())
    }

    /// True if the tagged completion is BAD.
    #[must_use]
    pub fn is_bad(&self) -> bool {
        self.done
            .as_ref()
            .is_some_and(|d| d.status == Status::Bad)
    }

    /// The continuation request that ended this read, if any.
    #[must_use]
    pub fn continuation(&self) -> Option<&ResponseText> {
        match self.items.last() {
            Some(ResponseItem::Continuation(text)) => Some(text),
            _ => None,
        }
    }

    /// The tagged completion text, empty when there is none.
    #[must_use]
    pub fn done_text(&self) -> &str {
        self.done.as_ref().map_or("", |d| d.text.text.as_str())
    }

    /// Iterates over the untagged LIST entries.
    pub fn lists(&self) -> impl Iterator<Item = &ListData> {
        self.items.iter().filter_map(|item| match item {
            ResponseItem::Data(ResponseData::List(list)) => Some(list),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(status: Status) -> TaggedDone {
        TaggedDone {
            tag: "a001".to_string(),
            status,
            text: ResponseText::default(),
        }
    }

    #[test]
    fn response_status_predicates() {
        let ok = Response {
            items: Vec::new(),
            done: Some(done(Status::Ok)),
        };
        assert!(ok.is_ok());
        assert!(!ok.is_bad());

        let bad = Response {
            items: Vec::new(),
            done: Some(done(Status::Bad)),
        };
        assert!(bad.is_bad());
        assert!(!bad.is_ok());
    }

    #[test]
    fn continuation_response_has_no_done() {
        let response = Response {
            items: vec![ResponseItem::Continuation(ResponseText {
                code: None,
                text: "send data".to_string(),
            })],
            done: None,
        };
        assert!(!response.is_ok());
        assert_eq!(response.continuation().map(|t| t.text.as_str()), Some("send data"));
    }

    #[test]
    fn lists_iterates_list_items_only() {
        let response = Response {
            items: vec![
                ResponseItem::Data(ResponseData::Exists(3)),
                ResponseItem::Data(ResponseData::List(ListData {
                    attributes: Vec::new(),
                    delimiter: Some('/'),
                    mailbox: "INBOX".to_string(),
                })),
            ],
            done: Some(done(Status::Ok)),
        };
        let lists: Vec<_> = response.lists().collect();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].delimiter, Some('/'));
    }
}
