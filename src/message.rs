//! A structured email message: an ordered list of header fields and a body.
//!
//! The message carries its own envelope information in its headers. When it is sent
//! without an explicit sender or recipients, they are taken from those headers:
//!
//! * sender: `Sender`, or `From` when there is no `Sender` header
//! * recipients: every address of `To`, `Cc` and `Bcc`, in that order
//!
//! A message carrying a single `Resent-Date` header is a resent message, and the
//! `Resent-Sender`, `Resent-From`, `Resent-To`, `Resent-Cc` and `Resent-Bcc` headers
//! are used instead. `Bcc` and `Resent-Bcc` are never transmitted.

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_till1},
    character::complete::{anychar, char, multispace1},
    combinator::{all_consuming, map},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::error::Error;

/// Structured email message
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Message {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Message {
    /// Creates an empty message
    pub fn new() -> Message {
        Message::default()
    }

    /// Appends a header field
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Message {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body
    pub fn body<B: Into<Vec<u8>>>(mut self, body: B) -> Message {
        self.body = body.into();
        self
    }

    /// Parses a message in internet message format.
    ///
    /// The header block ends at the first empty line; folded header lines are unfolded.
    pub fn parse(raw: &[u8]) -> Result<Message, Error> {
        let (head, body) = split_head(raw);
        let head =
            std::str::from_utf8(head).map_err(|_| Error::MalformedMessage("header is not UTF-8"))?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                match headers.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => return Err(Error::MalformedMessage("continuation line without a header")),
                }
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) if !name.is_empty() && !name.contains(' ') => {
                    headers.push((name.to_string(), value.trim().to_string()));
                }
                _ => return Err(Error::MalformedMessage("header line without a name")),
            }
        }

        Ok(Message {
            headers,
            body: body.to_vec(),
        })
    }

    /// First value of the named header, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value of the named header, ignoring case, in message order
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let name = name.to_string();
        self.headers
            .iter()
            .filter(move |(header, _)| header.eq_ignore_ascii_case(&name))
            .map(|(_, value)| value.as_str())
    }

    /// Removes every occurrence of the named header
    pub fn remove(&mut self, name: &str) {
        self.headers
            .retain(|(header, _)| !header.eq_ignore_ascii_case(name));
    }

    /// Header fields in message order
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The message body
    pub fn get_body(&self) -> &[u8] {
        &self.body
    }

    /// Sender and recipients declared by the headers
    pub fn envelope_addresses(&self) -> Result<(Option<String>, Vec<String>), Error> {
        let prefix = match self.get_all("Resent-Date").count() {
            0 => "",
            1 => "Resent-",
            _ => {
                return Err(Error::MalformedMessage(
                    "more than one 'Resent-' header block",
                ))
            }
        };
        let header = |name: &str| format!("{}{}", prefix, name);

        let sender = match self
            .get(&header("Sender"))
            .or_else(|| self.get(&header("From")))
        {
            Some(value) => parse_address_list(value)?.into_iter().next(),
            None => None,
        };

        let mut recipients = Vec::new();
        for name in &["To", "Cc", "Bcc"] {
            for value in self.get_all(&header(name)) {
                recipients.extend(parse_address_list(value)?);
            }
        }

        Ok((sender, recipients))
    }

    /// Serializes the message for transmission, without `Bcc` or `Resent-Bcc` headers
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.body.len() + 64 * self.headers.len() + 2);
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("Bcc") || name.eq_ignore_ascii_case("Resent-Bcc") {
                continue;
            }
            bytes.extend_from_slice(name.as_bytes());
            bytes.extend_from_slice(b": ");
            bytes.extend_from_slice(value.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Splits a raw message at the first empty line
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    if raw.starts_with(b"\r\n") {
        return (&[], &raw[2..]);
    }
    if raw.starts_with(b"\n") {
        return (&[], &raw[1..]);
    }
    for idx in 0..raw.len() {
        if raw[idx..].starts_with(b"\r\n\r\n") {
            return (&raw[..idx], &raw[idx + 4..]);
        }
        if raw[idx..].starts_with(b"\n\n") {
            return (&raw[..idx], &raw[idx + 2..]);
        }
    }
    (raw, &[])
}

enum Token<'a> {
    Text(&'a str),
    Angle(&'a str),
    Skip,
}

/// A quoted string, with backslash escapes
fn quoted(i: &str) -> IResult<&str, Token> {
    map(
        delimited(
            char('"'),
            many0(alt((
                map(preceded(char('\\'), anychar), |_| ()),
                map(take_till1(|c| c == '"' || c == '\\'), |_| ()),
            ))),
            char('"'),
        ),
        |_| Token::Skip,
    )(i)
}

/// A comment, which may contain nested comments
fn comment(i: &str) -> IResult<&str, Token> {
    map(
        delimited(
            char('('),
            many0(alt((
                map(preceded(char('\\'), anychar), |_| ()),
                map(comment, |_| ()),
                map(take_till1(|c| matches!(c, '(' | ')' | '\\')), |_| ()),
            ))),
            char(')'),
        ),
        |_| Token::Skip,
    )(i)
}

fn angle_addr(i: &str) -> IResult<&str, Token> {
    map(
        delimited(char('<'), take_till(|c| c == '>'), char('>')),
        Token::Angle,
    )(i)
}

fn text(i: &str) -> IResult<&str, Token> {
    map(
        take_till1(|c| matches!(c, ',' | '<' | '"' | '(' | ':' | ';')),
        Token::Text,
    )(i)
}

/// Folding white space and comments
fn cfws(i: &str) -> IResult<&str, ()> {
    map(many0(alt((comment, map(multispace1, |_| Token::Skip)))), |_| ())(i)
}

/// One mailbox: the angle address if there is one, the bare text otherwise
fn mailbox(i: &str) -> IResult<&str, Option<String>> {
    map(many0(alt((quoted, comment, angle_addr, text))), |tokens| {
        let mut bare = String::new();
        for token in tokens {
            match token {
                Token::Angle(address) => return Some(address.trim().to_string()),
                Token::Text(text) => bare.push_str(text),
                Token::Skip => (),
            }
        }
        let bare = bare.trim();
        if bare.is_empty() {
            None
        } else {
            Some(bare.to_string())
        }
    })(i)
}

/// A named group of mailboxes, `name: a@example.com, b@example.com;`
fn group(i: &str) -> IResult<&str, Vec<String>> {
    map(
        tuple((
            many0(alt((quoted, comment, text))),
            char(':'),
            separated_list0(char(','), mailbox),
            terminated(char(';'), cfws),
        )),
        |(_, _, members, _)| members.into_iter().flatten().collect(),
    )(i)
}

fn address(i: &str) -> IResult<&str, Vec<String>> {
    alt((group, map(mailbox, |mailbox| mailbox.into_iter().collect())))(i)
}

/// Extracts the addresses of an address list header value.
///
/// Groups contribute their members. A value that does not parse as a whole, such as one
/// with an unterminated quoted string, is an error.
pub fn parse_address_list(value: &str) -> Result<Vec<String>, Error> {
    match all_consuming(separated_list0(char(','), address))(value) {
        Ok((_, addresses)) => Ok(addresses.into_iter().flatten().collect()),
        Err(_) => Err(Error::MalformedMessage("malformed address list")),
    }
}
