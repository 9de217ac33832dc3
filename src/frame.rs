//! The STOMP 1.2 wire frame: a strict parser, a builder, and the closed
//! enumerations (`Command`, `HeaderName`, `ParseError`) they share.
//!
//! A [`Frame`] owns its backing bytes and stores header/body locations as
//! byte ranges into that buffer rather than borrowed slices, so accessors
//! can hand back views without copying, without unsafe code, and without
//! risking a dangling reference.

use std::fmt;
use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use custom_debug_derive::CustomDebug;

/// One of the sixteen STOMP 1.2 commands, plus the `Invalid` sentinel used
/// for frames that never got far enough in parsing to have a real command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Abort,
    Ack,
    Begin,
    Commit,
    Connect,
    Connected,
    Disconnect,
    Error,
    Invalid,
    Message,
    Nack,
    Receipt,
    Send,
    Stomp,
    Subscribe,
    Unsubscribe,
}

impl Command {
    /// The canonical upper-case wire token for this command.
    pub fn as_wire_token(self) -> &'static str {
        match self {
            Command::Abort => "ABORT",
            Command::Ack => "ACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Disconnect => "DISCONNECT",
            Command::Error => "ERROR",
            Command::Invalid => "INVALID_COMMAND",
            Command::Message => "MESSAGE",
            Command::Nack => "NACK",
            Command::Receipt => "RECEIPT",
            Command::Send => "SEND",
            Command::Stomp => "STOMP",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
        }
    }

    fn from_wire_token(token: &[u8]) -> Option<Command> {
        Some(match token {
            b"ABORT" => Command::Abort,
            b"ACK" => Command::Ack,
            b"BEGIN" => Command::Begin,
            b"COMMIT" => Command::Commit,
            b"CONNECT" => Command::Connect,
            b"CONNECTED" => Command::Connected,
            b"DISCONNECT" => Command::Disconnect,
            b"ERROR" => Command::Error,
            b"MESSAGE" => Command::Message,
            b"NACK" => Command::Nack,
            b"RECEIPT" => Command::Receipt,
            b"SEND" => Command::Send,
            b"STOMP" => Command::Stomp,
            b"SUBSCRIBE" => Command::Subscribe,
            b"UNSUBSCRIBE" => Command::Unsubscribe,
            _ => return None,
        })
    }

    fn required_headers(self) -> &'static [HeaderName] {
        use HeaderName::*;
        match self {
            Command::Connect | Command::Stomp => &[AcceptVersion, Host],
            Command::Connected => &[Version],
            Command::Send => &[Destination],
            Command::Subscribe => &[Destination, Id],
            Command::Unsubscribe | Command::Ack | Command::Nack => &[Id],
            Command::Begin | Command::Commit | Command::Abort => &[Transaction],
            Command::Message => &[Destination, MessageId, Subscription],
            Command::Receipt => &[ReceiptId],
            Command::Disconnect | Command::Error | Command::Invalid => &[],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_token())
    }
}

/// One of the twenty recognized STOMP 1.2 header names, plus the `Invalid`
/// sentinel (never produced by the parser — an unrecognized header token
/// fails parsing outright rather than mapping to this variant).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeaderName {
    AcceptVersion,
    Ack,
    ContentLength,
    ContentType,
    Destination,
    HeartBeat,
    Host,
    Id,
    Invalid,
    Login,
    Message,
    MessageId,
    Passcode,
    Receipt,
    ReceiptId,
    Session,
    Server,
    Subscription,
    Transaction,
    Version,
}

impl HeaderName {
    /// The canonical lower-case kebab-case wire token for this header.
    pub fn as_wire_token(self) -> &'static str {
        match self {
            HeaderName::AcceptVersion => "accept-version",
            HeaderName::Ack => "ack",
            HeaderName::ContentLength => "content-length",
            HeaderName::ContentType => "content-type",
            HeaderName::Destination => "destination",
            HeaderName::HeartBeat => "heart-beat",
            HeaderName::Host => "host",
            HeaderName::Id => "id",
            HeaderName::Invalid => "invalid-header",
            HeaderName::Login => "login",
            HeaderName::Message => "message",
            HeaderName::MessageId => "message-id",
            HeaderName::Passcode => "passcode",
            HeaderName::Receipt => "receipt",
            HeaderName::ReceiptId => "receipt-id",
            HeaderName::Session => "session",
            HeaderName::Server => "server",
            HeaderName::Subscription => "subscription",
            HeaderName::Transaction => "transaction",
            HeaderName::Version => "version",
        }
    }

    fn from_wire_token(token: &[u8]) -> Option<HeaderName> {
        Some(match token {
            b"accept-version" => HeaderName::AcceptVersion,
            b"ack" => HeaderName::Ack,
            b"content-length" => HeaderName::ContentLength,
            b"content-type" => HeaderName::ContentType,
            b"destination" => HeaderName::Destination,
            b"heart-beat" => HeaderName::HeartBeat,
            b"host" => HeaderName::Host,
            b"id" => HeaderName::Id,
            b"login" => HeaderName::Login,
            b"message" => HeaderName::Message,
            b"message-id" => HeaderName::MessageId,
            b"passcode" => HeaderName::Passcode,
            b"receipt" => HeaderName::Receipt,
            b"receipt-id" => HeaderName::ReceiptId,
            b"session" => HeaderName::Session,
            b"server" => HeaderName::Server,
            b"subscription" => HeaderName::Subscription,
            b"transaction" => HeaderName::Transaction,
            b"version" => HeaderName::Version,
            _ => return None,
        })
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_token())
    }
}

/// Parse-status tag attached to every [`Frame`]. `Ok` is the only value for
/// which the other accessors are contractually meaningful.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseError {
    Ok,
    NoData,
    MissingCommand,
    NoNewlineCharacters,
    InvalidCommand,
    NoHeaderName,
    InvalidHeader,
    NoHeaderValue,
    EmptyHeaderValue,
    MissingLastHeaderNewline,
    MissingBodyNewline,
    MissingClosingNullCharacter,
    JunkAfterBody,
    ContentLengthsDontMatch,
    InvalidHeaderValue,
    MissingRequiredHeader,
    UndefinedError,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
struct HeaderEntry {
    name: HeaderName,
    value: Range<usize>,
}

fn find_byte(buffer: &[u8], from: usize, needle: u8) -> Option<usize> {
    buffer[from..].iter().position(|&b| b == needle).map(|p| p + from)
}

fn pretty_bytes(b: &Bytes, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", String::from_utf8_lossy(b))
}

/// An immutable, already-parsed STOMP frame.
///
/// Construction always succeeds and always produces a `Frame`; failures are
/// reported through [`Frame::parse_status`], never through a `Result`. Only
/// when `parse_status() == ParseError::Ok` are `command`, `headers`, and
/// `body` meaningful.
#[derive(CustomDebug, Clone)]
pub struct Frame {
    #[debug(with = "pretty_bytes")]
    buffer: Bytes,
    command: Command,
    headers: Vec<HeaderEntry>,
    body: Range<usize>,
    parse_status: ParseError,
}

impl Frame {
    /// Parse `buffer` as a STOMP frame. Never panics and never fails loudly:
    /// every input produces a `Frame`, and the caller inspects
    /// [`Frame::parse_status`] before trusting anything else.
    pub fn parse(buffer: impl Into<Bytes>) -> Frame {
        let buffer = buffer.into();
        let (command, headers, body, status) = parse_structure(&buffer);
        let status = if status == ParseError::Ok {
            validate(command, &headers, &buffer, &body)
        } else {
            status
        };
        Frame {
            buffer,
            command,
            headers,
            body,
            parse_status: status,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn parse_status(&self) -> ParseError {
        self.parse_status
    }

    pub fn has_header(&self, name: HeaderName) -> bool {
        self.headers.iter().any(|h| h.name == name)
    }

    /// The value for `name`, or an empty slice if the header is absent.
    /// Never fails.
    pub fn header_value(&self, name: HeaderName) -> &[u8] {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| &self.buffer[h.value.clone()])
            .unwrap_or(&[])
    }

    /// All headers in first-occurrence, insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (HeaderName, &[u8])> {
        self.headers
            .iter()
            .map(move |h| (h.name, &self.buffer[h.value.clone()]))
    }

    pub fn body(&self) -> &[u8] {
        &self.buffer[self.body.clone()]
    }

    /// Re-serializes this frame to wire bytes via [`FrameBuilder`], byte-exact
    /// even when headers or the body carry non-UTF8 bytes. Only meaningful
    /// when `parse_status() == ParseError::Ok`.
    pub fn to_bytes(&self) -> Bytes {
        let mut builder = FrameBuilder::new(self.command);
        for (name, value) in self.headers() {
            builder = builder.header(name, value);
        }
        builder.body(self.body().to_vec()).build()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        if self.parse_status != other.parse_status {
            return false;
        }
        if self.parse_status != ParseError::Ok {
            return true;
        }
        if self.command != other.command || self.body() != other.body() {
            return false;
        }
        let mut ours: Vec<_> = self.headers().collect();
        let mut theirs: Vec<_> = other.headers().collect();
        ours.sort_by_key(|(name, _)| format!("{name}"));
        theirs.sort_by_key(|(name, _)| format!("{name}"));
        ours == theirs
    }
}

/// Human-readable only: non-UTF8 header values and bodies are shown lossily.
/// Use [`Frame::to_bytes`] for a byte-exact wire re-serialization.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.command)?;
        for (name, value) in self.headers() {
            writeln!(f, "{name}:{}", String::from_utf8_lossy(value))?;
        }
        write!(f, "\n{}\0", String::from_utf8_lossy(self.body()))
    }
}

fn parse_structure(buffer: &[u8]) -> (Command, Vec<HeaderEntry>, Range<usize>, ParseError) {
    let fail = |e| (Command::Invalid, Vec::new(), 0..0, e);

    if buffer.is_empty() {
        return fail(ParseError::NoData);
    }
    if buffer[0] == b'\n' {
        return fail(ParseError::MissingCommand);
    }
    if *buffer.last().expect("checked non-empty above") != b'\0' {
        return fail(ParseError::MissingClosingNullCharacter);
    }
    let command_end = match find_byte(buffer, 0, b'\n') {
        Some(p) => p,
        None => return fail(ParseError::NoNewlineCharacters),
    };
    if !buffer.windows(2).any(|w| w == [b'\n', b'\n']) {
        return fail(ParseError::MissingBodyNewline);
    }

    let command = match Command::from_wire_token(&buffer[..command_end]) {
        Some(c) => c,
        None => return fail(ParseError::InvalidCommand),
    };

    let (headers, cursor) = match parse_headers(buffer, command_end + 1) {
        Ok(v) => v,
        Err(e) => return fail(e),
    };

    if buffer[cursor] != b'\n' {
        return fail(ParseError::MissingBodyNewline);
    }
    let cursor = cursor + 1;

    if cursor >= buffer.len() {
        return fail(ParseError::MissingClosingNullCharacter);
    }
    let null_pos = match find_byte(buffer, cursor, b'\0') {
        Some(p) => p,
        None => return fail(ParseError::MissingClosingNullCharacter),
    };

    let has_content_length = headers.iter().any(|h| h.name == HeaderName::ContentLength);
    let body = if has_content_length {
        cursor..(buffer.len() - 1)
    } else {
        if null_pos + 1 != buffer.len() {
            return fail(ParseError::JunkAfterBody);
        }
        cursor..null_pos
    };

    (command, headers, body, ParseError::Ok)
}

/// Parses the header block starting at `cursor` (the first byte after the
/// command's trailing `\n`). Returns the parsed headers and the cursor
/// position of the blank-line `\n` that terminates the header block — the
/// caller still has to consume that newline itself.
fn parse_headers(
    buffer: &[u8],
    mut cursor: usize,
) -> Result<(Vec<HeaderEntry>, usize), ParseError> {
    let mut headers = Vec::new();

    loop {
        if cursor >= buffer.len() {
            return Err(ParseError::MissingBodyNewline);
        }
        match buffer[cursor] {
            b'\n' => break,
            b':' => return Err(ParseError::NoHeaderName),
            b'\0' => return Err(ParseError::MissingBodyNewline),
            _ => {}
        }

        let colon_pos = match find_byte(buffer, cursor, b':') {
            Some(p) => p,
            None => return Err(ParseError::NoHeaderValue),
        };
        let newline_pos = match find_byte(buffer, cursor, b'\n') {
            Some(p) => p,
            None => return Err(ParseError::MissingLastHeaderNewline),
        };
        if newline_pos < colon_pos {
            return Err(ParseError::NoHeaderValue);
        }
        if buffer[colon_pos + 1] == buffer[newline_pos] {
            return Err(ParseError::EmptyHeaderValue);
        }

        let name = match HeaderName::from_wire_token(&buffer[cursor..colon_pos]) {
            Some(n) => n,
            None => return Err(ParseError::InvalidHeader),
        };
        let value = (colon_pos + 1)..newline_pos;
        if !headers.iter().any(|h: &HeaderEntry| h.name == name) {
            headers.push(HeaderEntry { name, value });
        }

        cursor = newline_pos + 1;
    }

    Ok((headers, cursor))
}

fn validate(
    command: Command,
    headers: &[HeaderEntry],
    buffer: &[u8],
    body: &Range<usize>,
) -> ParseError {
    if let Some(h) = headers.iter().find(|h| h.name == HeaderName::ContentLength) {
        let text = match std::str::from_utf8(&buffer[h.value.clone()]) {
            Ok(s) => s,
            Err(_) => return ParseError::InvalidHeaderValue,
        };
        let declared: usize = match text.parse() {
            Ok(v) => v,
            Err(_) => return ParseError::InvalidHeaderValue,
        };
        if declared != body.len() {
            return ParseError::ContentLengthsDontMatch;
        }
    }

    for required in command.required_headers() {
        if !headers.iter().any(|h| h.name == *required) {
            return ParseError::MissingRequiredHeader;
        }
    }

    ParseError::Ok
}

/// Builds wire bytes for a STOMP frame. Output built with a command's
/// required headers present re-parses to `ParseError::Ok` with an identical
/// command, header map, and body.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    command: Command,
    headers: Vec<(HeaderName, Vec<u8>)>,
    body: Vec<u8>,
}

impl FrameBuilder {
    pub fn new(command: Command) -> Self {
        FrameBuilder {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: impl AsRef<[u8]>) -> Self {
        self.headers.push((name, value.as_ref().to_vec()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize to wire bytes. Empty header values are emitted as the two
    /// characters `""` so the parser never sees `EmptyHeaderValue` on a
    /// frame this builder produced.
    pub fn build(self) -> Bytes {
        let estimated = self.command.as_wire_token().len()
            + self.body.len()
            + self
                .headers
                .iter()
                .map(|(name, value)| name.as_wire_token().len() + value.len() + 2)
                .sum::<usize>()
            + 8;
        let mut buf = BytesMut::with_capacity(estimated);

        buf.put_slice(self.command.as_wire_token().as_bytes());
        buf.put_u8(b'\n');
        for (name, value) in &self.headers {
            buf.put_slice(name.as_wire_token().as_bytes());
            buf.put_u8(b':');
            if value.is_empty() {
                buf.put_slice(b"\"\"");
            } else {
                buf.put_slice(value);
            }
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');
        buf.put_slice(&self.body);
        buf.put_u8(b'\0');

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_parse() {
        let frame = Frame::parse(&b"CONNECT\naccept-version:42\nhost:host.com\n\nFrame body\0"[..]);
        assert_eq!(frame.parse_status(), ParseError::Ok);
        assert_eq!(frame.command(), Command::Connect);
        assert_eq!(frame.header_value(HeaderName::AcceptVersion), b"42");
        assert_eq!(frame.header_value(HeaderName::Host), b"host.com");
        assert_eq!(frame.body(), b"Frame body");
    }

    #[test]
    fn content_length_enforced() {
        let frame = Frame::parse(
            &b"CONNECT\naccept-version:42\nhost:host.com\ncontent-length:9\n\nFrame body\0"[..],
        );
        assert_eq!(frame.parse_status(), ParseError::ContentLengthsDontMatch);
    }

    #[test]
    fn content_length_matches() {
        let frame = Frame::parse(
            &b"CONNECT\naccept-version:42\nhost:host.com\ncontent-length:10\n\nFrame body\0"[..],
        );
        assert_eq!(frame.parse_status(), ParseError::Ok);
        assert_eq!(frame.body(), b"Frame body");
    }

    #[test]
    fn content_length_permits_embedded_nul() {
        let frame = Frame::parse(&b"SEND\ndestination:/a\ncontent-length:3\n\na\0b\0"[..]);
        assert_eq!(frame.parse_status(), ParseError::Ok);
        assert_eq!(frame.body(), b"a\0b");
    }

    #[test]
    fn junk_after_body_without_content_length() {
        let frame = Frame::parse(
            &b"CONNECT\naccept-version:42\nhost:host.com\n\nFrame body\0\n\njunk\n\0"[..],
        );
        assert_eq!(frame.parse_status(), ParseError::JunkAfterBody);
    }

    #[test]
    fn first_occurrence_header_wins() {
        let frame = Frame::parse(
            &b"CONNECT\naccept-version:42\naccept-version:43\nhost:host.com\n\nFrame body\0"[..],
        );
        assert_eq!(frame.parse_status(), ParseError::Ok);
        assert_eq!(frame.header_value(HeaderName::AcceptVersion), b"42");
    }

    #[test]
    fn no_data() {
        assert_eq!(Frame::parse(&b""[..]).parse_status(), ParseError::NoData);
    }

    #[test]
    fn missing_command() {
        assert_eq!(
            Frame::parse(&b"\nfoo\0"[..]).parse_status(),
            ParseError::MissingCommand
        );
    }

    #[test]
    fn missing_closing_null_character() {
        assert_eq!(
            Frame::parse(&b"CONNECT\naccept-version:1.2\nhost:h\n\n"[..]).parse_status(),
            ParseError::MissingClosingNullCharacter
        );
    }

    #[test]
    fn no_newline_characters() {
        assert_eq!(
            Frame::parse(&b"CONNECT\0"[..]).parse_status(),
            ParseError::NoNewlineCharacters
        );
    }

    #[test]
    fn missing_body_newline() {
        assert_eq!(
            Frame::parse(&b"CONNECT\naccept-version:1.2\0"[..]).parse_status(),
            ParseError::MissingBodyNewline
        );
    }

    #[test]
    fn invalid_command() {
        assert_eq!(
            Frame::parse(&b"NOTACOMMAND\n\n\0"[..]).parse_status(),
            ParseError::InvalidCommand
        );
    }

    #[test]
    fn no_header_name() {
        assert_eq!(
            Frame::parse(&b"CONNECT\n:value\n\n\0"[..]).parse_status(),
            ParseError::NoHeaderName
        );
    }

    #[test]
    fn invalid_header() {
        assert_eq!(
            Frame::parse(&b"CONNECT\nbanana:value\n\n\0"[..]).parse_status(),
            ParseError::InvalidHeader
        );
    }

    #[test]
    fn no_header_value_missing_colon() {
        assert_eq!(
            Frame::parse(&b"CONNECT\nhost\n\n\0"[..]).parse_status(),
            ParseError::NoHeaderValue
        );
    }

    #[test]
    fn empty_header_value() {
        assert_eq!(
            Frame::parse(&b"CONNECT\nhost:\n\n\0"[..]).parse_status(),
            ParseError::EmptyHeaderValue
        );
    }

    #[test]
    fn missing_required_header() {
        assert_eq!(
            Frame::parse(&b"CONNECT\nhost:h\n\n\0"[..]).parse_status(),
            ParseError::MissingRequiredHeader
        );
    }

    #[test]
    fn invalid_header_value() {
        assert_eq!(
            Frame::parse(&b"CONNECT\naccept-version:1.2\nhost:h\ncontent-length:nope\n\n\0"[..])
                .parse_status(),
            ParseError::InvalidHeaderValue
        );
    }

    #[test]
    fn builder_round_trip_subscribe() {
        let built = FrameBuilder::new(Command::Subscribe)
            .header(HeaderName::Destination, "/q/a")
            .header(HeaderName::Id, "sub-1")
            .header(HeaderName::Ack, "auto")
            .header(HeaderName::Receipt, "sub-1")
            .build();

        let frame = Frame::parse(built);
        assert_eq!(frame.parse_status(), ParseError::Ok);
        assert_eq!(frame.command(), Command::Subscribe);
        assert_eq!(frame.header_value(HeaderName::Destination), b"/q/a");
        assert_eq!(frame.header_value(HeaderName::Id), b"sub-1");
        assert_eq!(frame.header_value(HeaderName::Ack), b"auto");
        assert_eq!(frame.header_value(HeaderName::Receipt), b"sub-1");
        assert_eq!(frame.body(), b"");
    }

    #[test]
    fn builder_empty_header_value_round_trips() {
        let built = FrameBuilder::new(Command::Connect)
            .header(HeaderName::AcceptVersion, "1.2")
            .header(HeaderName::Host, "h")
            .header(HeaderName::Login, "")
            .build();

        let frame = Frame::parse(built);
        assert_eq!(frame.parse_status(), ParseError::Ok);
        assert_eq!(frame.header_value(HeaderName::Login), b"\"\"");
    }

    #[test]
    fn to_bytes_reparses_equal() {
        let original =
            Frame::parse(&b"CONNECT\naccept-version:42\nhost:host.com\n\nFrame body\0"[..]);
        let reparsed = Frame::parse(original.to_bytes());
        assert_eq!(original, reparsed);
    }

    #[test]
    fn to_bytes_is_byte_exact_for_non_utf8_body() {
        let original = Frame::parse(&b"SEND\ndestination:/a\n\n\xff\0"[..]);
        assert_eq!(original.parse_status(), ParseError::Ok);
        let reparsed = Frame::parse(original.to_bytes());
        assert_eq!(original, reparsed);
        assert_eq!(reparsed.body(), b"\xff");
    }

    #[test]
    fn parse_terminates_on_arbitrary_bytes() {
        let inputs: &[&[u8]] = &[
            b"",
            b"\n",
            b"\0",
            b":",
            b"CONNECT",
            b"CONNECT\n\n\0\0\0garbage",
            b"\n\n\n\n\n\0",
        ];
        for input in inputs {
            let _ = Frame::parse(*input).parse_status();
        }
    }
}
