//! Grammar for one response unit.
//!
//! A unit is a complete CRLF-terminated line with any announced literals
//! already inlined by the framing layer. These functions turn a unit
//! into the structured types of [`super::types`].

use crate::capability::Capability;

use super::lexer::{Lexer, Token};
use super::types::{
    FetchItem, Greeting, GreetingKind, ListData, ResponseCode, ResponseData, ResponseText,
    ServerStatusKind, Status, TaggedDone,
};
use crate::Result;

/// One parsed response unit.
#[derive(Debug)]
pub(crate) enum Parsed {
    /// `+ …`
    Continuation(ResponseText),
    /// `* …`
    Data(ResponseData),
    /// `<tag> OK/NO/BAD …`
    Done(TaggedDone),
}

/// Parses the connection greeting.
pub(crate) fn parse_greeting(unit: &[u8]) -> Result<Greeting> {
    let mut lex = Lexer::new(unit);

    match lex.next_token()? {
        Token::Asterisk => {}
        token => return Err(lex.error(&format!("expected untagged greeting, got {token:?}"))),
    }
    lex.expect_space()?;

    let kind = match lex.next_token()? {
        Token::Atom(s) => match s.to_ascii_uppercase().as_str() {
            "OK" => GreetingKind::Ok,
            "PREAUTH" => GreetingKind::PreAuth,
            "BYE" => GreetingKind::Bye,
            other => return Err(lex.error(&format!("unexpected greeting condition {other}"))),
        },
        token => return Err(lex.error(&format!("expected greeting condition, got {token:?}"))),
    };

    let text = parse_status_text(&mut lex)?;
    Ok(Greeting { kind, text })
}

/// Parses one unit into a continuation, untagged data, or tagged done.
pub(crate) fn parse_unit(unit: &[u8]) -> Result<Parsed> {
    let mut lex = Lexer::new(unit);

    match lex.next_token()? {
        Token::Asterisk => {
            lex.expect_space()?;
            Ok(Parsed::Data(parse_untagged(&mut lex, unit)?))
        }
        Token::Plus => {
            let text = match lex.next_token()? {
                Token::Space => parse_resp_text(&mut lex)?,
                Token::Crlf | Token::Eof => ResponseText::default(),
                token => return Err(lex.error(&format!("malformed continuation: {token:?}"))),
            };
            Ok(Parsed::Continuation(text))
        }
        Token::Atom(tag) => {
            lex.expect_space()?;
            let status = match lex.next_token()? {
                Token::Atom(s) => match s.to_ascii_uppercase().as_str() {
                    "OK" => Status::Ok,
                    "NO" => Status::No,
                    "BAD" => Status::Bad,
                    other => {
                        return Err(lex.error(&format!("unexpected tagged condition {other}")));
                    }
                },
                token => return Err(lex.error(&format!("expected condition, got {token:?}"))),
            };
            let text = parse_status_text(&mut lex)?;
            Ok(Parsed::Done(TaggedDone {
                tag: tag.to_string(),
                status,
                text,
            }))
        }
        token => Err(lex.error(&format!("expected a response, got {token:?}"))),
    }
}

/// Response text after an OK/NO/BAD/BYE condition; the text itself may be
/// absent.
fn parse_status_text(lex: &mut Lexer<'_>) -> Result<ResponseText> {
    match lex.peek() {
        Some(b' ') => {
            lex.expect_space()?;
            parse_resp_text(lex)
        }
        _ => {
            let _ = lex.rest_of_line();
            Ok(ResponseText::default())
        }
    }
}

/// `resp-text`: optional bracketed code, then free text to end of line.
fn parse_resp_text(lex: &mut Lexer<'_>) -> Result<ResponseText> {
    if lex.peek() == Some(b'[') {
        let _ = lex.next_token()?; // [
        let code = parse_resp_code(lex)?;
        if lex.peek() == Some(b' ') {
            lex.expect_space()?;
        }
        Ok(ResponseText {
            code: Some(code),
            text: lex.rest_of_line(),
        })
    } else {
        Ok(ResponseText {
            code: None,
            text: lex.rest_of_line(),
        })
    }
}

/// The code between `[` and `]`; the opening bracket is already consumed
/// and the closing bracket is consumed here.
fn parse_resp_code(lex: &mut Lexer<'_>) -> Result<ResponseCode> {
    let atom = match lex.next_token()? {
        Token::Atom(s) => s.to_ascii_uppercase(),
        token => return Err(lex.error(&format!("expected response code, got {token:?}"))),
    };

    // CAPABILITY consumes its own closing bracket.
    if atom == "CAPABILITY" {
        let mut caps = Vec::new();
        loop {
            match lex.next_token()? {
                Token::Space => {}
                Token::Atom(s) => caps.push(Capability::parse(s)),
                Token::RBracket => break,
                token => {
                    return Err(lex.error(&format!("malformed capability code: {token:?}")));
                }
            }
        }
        return Ok(ResponseCode::Capability(caps));
    }

    let code = match atom.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "UIDNEXT" => {
            lex.expect_space()?;
            ResponseCode::UidNext(read_u32(lex)?)
        }
        "UIDVALIDITY" => {
            lex.expect_space()?;
            ResponseCode::UidValidity(read_u32(lex)?)
        }
        "UNSEEN" => {
            lex.expect_space()?;
            ResponseCode::Unseen(read_u32(lex)?)
        }
        "HIGHESTMODSEQ" => {
            lex.expect_space()?;
            ResponseCode::HighestModSeq(lex.read_number()?)
        }
        "PERMANENTFLAGS" => {
            lex.expect_space()?;
            ResponseCode::PermanentFlags(parse_paren_atoms(lex)?)
        }
        _ => {
            let rest = lex.take_until(b']');
            ResponseCode::Unknown(format!("{atom}{rest}"))
        }
    };

    match lex.next_token()? {
        Token::RBracket => Ok(code),
        token => Err(lex.error(&format!("expected ] after response code, got {token:?}"))),
    }
}

/// Untagged data after `* `.
fn parse_untagged(lex: &mut Lexer<'_>, unit: &[u8]) -> Result<ResponseData> {
    match lex.next_token()? {
        Token::Number(n) => {
            let n = to_u32(lex, n)?;
            lex.expect_space()?;
            match lex.next_token()? {
                Token::Atom(s) => match s.to_ascii_uppercase().as_str() {
                    "EXISTS" => {
                        let _ = lex.rest_of_line();
                        Ok(ResponseData::Exists(n))
                    }
                    "RECENT" => {
                        let _ = lex.rest_of_line();
                        Ok(ResponseData::Recent(n))
                    }
                    "EXPUNGE" => {
                        let _ = lex.rest_of_line();
                        Ok(ResponseData::Expunge(n))
                    }
                    "FETCH" => {
                        lex.expect_space()?;
                        let items = parse_fetch_items(lex)?;
                        let _ = lex.rest_of_line();
                        Ok(ResponseData::Fetch { seq: n, items })
                    }
                    _ => Ok(unknown(unit)),
                },
                token => Err(lex.error(&format!("expected message data, got {token:?}"))),
            }
        }
        Token::Atom(s) => match s.to_ascii_uppercase().as_str() {
            "OK" => server_status(lex, ServerStatusKind::Ok),
            "NO" => server_status(lex, ServerStatusKind::No),
            "BAD" => server_status(lex, ServerStatusKind::Bad),
            "BYE" => server_status(lex, ServerStatusKind::Bye),
            "PREAUTH" => server_status(lex, ServerStatusKind::PreAuth),
            "CAPABILITY" => {
                let mut caps = Vec::new();
                loop {
                    match lex.next_token()? {
                        Token::Space => {}
                        Token::Atom(a) => caps.push(Capability::parse(a)),
                        Token::Crlf | Token::Eof => break,
                        token => {
                            return Err(
                                lex.error(&format!("malformed capability data: {token:?}"))
                            );
                        }
                    }
                }
                Ok(ResponseData::Capability(caps))
            }
            "LIST" | "LSUB" => parse_list(lex),
            "FLAGS" => {
                lex.expect_space()?;
                let flags = parse_paren_atoms(lex)?;
                let _ = lex.rest_of_line();
                Ok(ResponseData::Flags(flags))
            }
            "SEARCH" => {
                let mut hits = Vec::new();
                loop {
                    match lex.next_token()? {
                        Token::Space => {}
                        Token::Number(n) => hits.push(to_u32(lex, n)?),
                        Token::Crlf | Token::Eof => break,
                        token => {
                            return Err(lex.error(&format!("malformed search data: {token:?}")));
                        }
                    }
                }
                Ok(ResponseData::Search(hits))
            }
            "STATUS" => parse_mailbox_status(lex),
            _ => Ok(unknown(unit)),
        },
        token => Err(lex.error(&format!("expected response data, got {token:?}"))),
    }
}

fn server_status(lex: &mut Lexer<'_>, kind: ServerStatusKind) -> Result<ResponseData> {
    let text = parse_status_text(lex)?;
    Ok(ResponseData::ServerStatus { kind, text })
}

fn unknown(unit: &[u8]) -> ResponseData {
    ResponseData::Unknown(String::from_utf8_lossy(unit).trim_end().to_string())
}

/// `LIST (attrs) delimiter mailbox`.
fn parse_list(lex: &mut Lexer<'_>) -> Result<ResponseData> {
    lex.expect_space()?;
    let attributes = parse_paren_atoms(lex)?;
    lex.expect_space()?;

    let delimiter = match lex.next_token()? {
        Token::QuotedString(s) => s.chars().next().filter(|&c| c != '\0'),
        Token::Nil => None,
        token => return Err(lex.error(&format!("expected list delimiter, got {token:?}"))),
    };

    lex.expect_space()?;
    let mailbox = lex.read_astring()?;
    let _ = lex.rest_of_line();

    Ok(ResponseData::List(ListData {
        attributes,
        delimiter,
        mailbox,
    }))
}

/// `STATUS mailbox (ATTR n …)`.
fn parse_mailbox_status(lex: &mut Lexer<'_>) -> Result<ResponseData> {
    lex.expect_space()?;
    let mailbox = lex.read_astring()?;
    lex.expect_space()?;

    match lex.next_token()? {
        Token::LParen => {}
        token => return Err(lex.error(&format!("expected status list, got {token:?}"))),
    }

    let mut items = Vec::new();
    loop {
        match lex.next_token()? {
            Token::Space => {}
            Token::RParen => break,
            Token::Atom(name) => {
                let name = name.to_ascii_uppercase();
                lex.expect_space()?;
                let value = lex.read_number()?;
                items.push((name, value));
            }
            token => return Err(lex.error(&format!("malformed status item: {token:?}"))),
        }
    }
    let _ = lex.rest_of_line();

    Ok(ResponseData::MailboxStatus { mailbox, items })
}

/// FETCH attribute list; the opening parenthesis is still in the input.
fn parse_fetch_items(lex: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    match lex.next_token()? {
        Token::LParen => {}
        token => return Err(lex.error(&format!("expected fetch list, got {token:?}"))),
    }

    let mut items = Vec::new();
    loop {
        match lex.next_token()? {
            Token::Space => {}
            Token::RParen => break,
            Token::Atom(name) => {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    "FLAGS" => {
                        lex.expect_space()?;
                        items.push(FetchItem::Flags(parse_paren_atoms(lex)?));
                    }
                    "UID" => {
                        lex.expect_space()?;
                        items.push(FetchItem::Uid(read_u32(lex)?));
                    }
                    "RFC822.SIZE" => {
                        lex.expect_space()?;
                        items.push(FetchItem::Rfc822Size(read_u32(lex)?));
                    }
                    "INTERNALDATE" => {
                        lex.expect_space()?;
                        match lex.next_token()? {
                            Token::QuotedString(date) => items.push(FetchItem::InternalDate(date)),
                            token => {
                                return Err(
                                    lex.error(&format!("expected internal date, got {token:?}"))
                                );
                            }
                        }
                    }
                    "MODSEQ" => {
                        lex.expect_space()?;
                        match lex.next_token()? {
                            Token::LParen => {}
                            token => {
                                return Err(lex.error(&format!("expected (, got {token:?}")));
                            }
                        }
                        let value = lex.read_number()?;
                        match lex.next_token()? {
                            Token::RParen => {}
                            token => {
                                return Err(lex.error(&format!("expected ), got {token:?}")));
                            }
                        }
                        items.push(FetchItem::ModSeq(value));
                    }
                    "BODY" if lex.peek() == Some(b'[') => {
                        items.push(parse_body_section(lex)?);
                    }
                    _ => {
                        items.push(skip_fetch_value(lex, upper)?);
                    }
                }
            }
            token => return Err(lex.error(&format!("malformed fetch item: {token:?}"))),
        }
    }

    Ok(items)
}

/// `BODY[section]<origin> payload`.
fn parse_body_section(lex: &mut Lexer<'_>) -> Result<FetchItem> {
    let _ = lex.next_token()?; // [
    let section = lex.take_until(b']');
    match lex.next_token()? {
        Token::RBracket => {}
        token => return Err(lex.error(&format!("expected ] after section, got {token:?}"))),
    }

    let origin = if lex.peek() == Some(b'<') {
        match lex.next_token()? {
            Token::Atom(s) => s.trim_matches(['<', '>']).parse().ok(),
            token => return Err(lex.error(&format!("malformed origin, got {token:?}"))),
        }
    } else {
        None
    };

    lex.expect_space()?;
    let data = match lex.next_token()? {
        Token::Literal(bytes) => Some(bytes),
        Token::QuotedString(s) => Some(s.into_bytes()),
        Token::Nil => None,
        token => return Err(lex.error(&format!("expected body payload, got {token:?}"))),
    };

    Ok(FetchItem::Body {
        section,
        origin,
        data,
    })
}

/// Skips a fetch value this engine does not interpret (ENVELOPE,
/// BODYSTRUCTURE, extension data) without losing framing.
fn skip_fetch_value(lex: &mut Lexer<'_>, name: String) -> Result<FetchItem> {
    if lex.peek() == Some(b' ') {
        lex.expect_space()?;
        match lex.next_token()? {
            Token::LParen => skip_balanced(lex)?,
            Token::Literal(_)
            | Token::QuotedString(_)
            | Token::Number(_)
            | Token::Atom(_)
            | Token::Nil => {}
            token => return Err(lex.error(&format!("malformed fetch value: {token:?}"))),
        }
    }
    Ok(FetchItem::Unparsed(name))
}

/// Consumes tokens until the parenthesis opened before the call closes.
fn skip_balanced(lex: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 1usize;
    loop {
        match lex.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Token::Crlf | Token::Eof => {
                return Err(lex.error("unbalanced parentheses"));
            }
            _ => {}
        }
    }
}

/// A parenthesized list of atoms (flags, name attributes).
fn parse_paren_atoms(lex: &mut Lexer<'_>) -> Result<Vec<String>> {
    match lex.next_token()? {
        Token::LParen => {}
        token => return Err(lex.error(&format!("expected list, got {token:?}"))),
    }

    let mut atoms = Vec::new();
    loop {
        match lex.next_token()? {
            Token::Space => {}
            Token::Atom(s) => atoms.push(s.to_string()),
            Token::RParen => return Ok(atoms),
            token => return Err(lex.error(&format!("malformed atom list: {token:?}"))),
        }
    }
}

fn read_u32(lex: &mut Lexer<'_>) -> Result<u32> {
    let n = lex.read_number()?;
    to_u32(lex, n)
}

fn to_u32(lex: &Lexer<'_>, n: u64) -> Result<u32> {
    u32::try_from(n).map_err(|_| lex.error("number exceeds 32 bits"))
}
