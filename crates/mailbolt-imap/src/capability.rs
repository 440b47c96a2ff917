//! Server capabilities and the connection's capability cache.

use crate::parser::{Response, ResponseCode, ResponseData, ResponseItem};

/// A server-advertised capability atom.
///
/// Atoms are normalized to upper case on parse, so lookups are
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// STARTTLS support (RFC 2595)
    StartTls,
    /// LOGIN disabled until the connection is secured
    LoginDisabled,
    /// A SASL mechanism, name stored upper-cased (`AUTH=` stripped)
    Auth(String),
    /// LITERAL+ non-synchronizing literals (RFC 2088)
    LiteralPlus,
    /// IDLE command support (RFC 2177)
    Idle,
    /// NAMESPACE command support (RFC 2342)
    Namespace,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// MOVE extension (RFC 6851)
    Move,
    /// ID extension (RFC 2971)
    Id,
    /// ENABLE command (RFC 5161)
    Enable,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// QRESYNC (RFC 7162)
    QResync,
    /// Anything else, stored upper-cased
    Unknown(String),
}

impl Capability {
    /// Parses a capability atom, normalizing case.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "LITERAL+" => Self::LiteralPlus,
            "IDLE" => Self::Idle,
            "NAMESPACE" => Self::Namespace,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "ID" => Self::Id,
            "ENABLE" => Self::Enable,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            _ if upper.starts_with("AUTH=") => Self::Auth(upper[5..].to_string()),
            _ => Self::Unknown(upper),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4REV1"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::Idle => write!(f, "IDLE"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::Id => write!(f, "ID"),
            Self::Enable => write!(f, "ENABLE"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::QResync => write!(f, "QRESYNC"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Cache of the most recent server capability list.
///
/// A cleared cache is "not fetched": the connection reissues CAPABILITY
/// on the next lookup. STARTTLS and authentication invalidate the cache
/// because the server may advertise a different list afterwards.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    caps: Vec<Capability>,
    fetched: bool,
}

impl CapabilityCache {
    /// Creates an empty, unfetched cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            caps: Vec::new(),
            fetched: false,
        }
    }

    /// Whether the cache holds a (possibly empty) fetched list.
    #[must_use]
    pub const fn is_fetched(&self) -> bool {
        self.fetched
    }

    /// The cached list. Meaningless unless [`Self::is_fetched`].
    #[must_use]
    pub fn list(&self) -> &[Capability] {
        &self.caps
    }

    /// Case-insensitive membership test against the cached list.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let wanted = Capability::parse(name);
        self.caps.contains(&wanted)
    }

    /// Names of the advertised SASL mechanisms (`AUTH=` entries).
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.caps
            .iter()
            .filter_map(|c| match c {
                Capability::Auth(mech) => Some(mech.clone()),
                _ => None,
            })
            .collect()
    }

    /// Replaces the list and marks it fetched.
    pub fn replace(&mut self, caps: Vec<Capability>) {
        self.caps = caps;
        self.fetched = true;
    }

    /// Marks the cache fetched without contents. Used when a CAPABILITY
    /// command completes OK but carries no capability-data.
    pub fn mark_fetched(&mut self) {
        self.fetched = true;
    }

    /// Clears the list and marks it not fetched.
    pub fn invalidate(&mut self) {
        self.caps.clear();
        self.fetched = false;
    }

    /// Ingests capability-data from a response, either as an untagged
    /// `* CAPABILITY …` item or as a `[CAPABILITY …]` code on the tagged
    /// completion. Returns whether anything was ingested.
    pub fn ingest(&mut self, response: &Response) -> bool {
        for item in &response.items {
            if let ResponseItem::Data(ResponseData::Capability(caps)) = item {
                self.replace(caps.clone());
                return true;
            }
        }

        if let Some(done) = &response.done
            && let Some(ResponseCode::Capability(caps)) = &done.text.code
        {
            self.replace(caps.clone());
            return true;
        }

        false
    }
}
