//! Decoder for field lines, shared by the header block and the chunked
//! trailer section (RFC 9110 Section 5.2, RFC 9112 Section 7.1.2).
//!
//! Values for list fields are split on commas with optional surrounding
//! whitespace; entries are either bare tokens or double-quoted strings
//! with backslash escapes. Singleton fields take the rest of the line as
//! one opaque value. Names are stored upper-cased; `Content-Length` is
//! captured as it is parsed so body dispatch does not rescan the map.

use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};

use crate::ensure;
use crate::protocol::tokens::{
    is_crlf_char, is_field_content_char, is_list_field, is_quoted_char, is_tchar, is_whitespace,
};
use crate::protocol::{Message, ParseError, Transport};

/// Which section values are committed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Header,
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    /// Start of a line: CR/LF here ends the whole block.
    LineStart,
    Name,
    /// The byte between name and value must be a colon.
    AfterName,
    /// Optional whitespace before the value.
    BeforeValue,
    /// Choose the singleton or list sub-machine. Consumes nothing.
    ValueDispatch,
    SingletonValue,
    /// Start of one list entry: quote, token, or fault.
    ListEntry,
    UnquotedValue,
    QuotedValue,
    QuotedEscape,
    /// Optional whitespace after a quoted entry.
    AfterQuoted,
    /// Expect a comma (more entries) or the line terminator.
    Comma,
    /// Optional whitespace after a comma.
    AfterComma,
    /// Line terminator after a quoted entry: CRLF or bare LF.
    LineCrlf,
    LineCrlfLf,
    /// Blank-line terminator of the block.
    EndCrlfLf,
    Done,
}

macro_rules! peek_byte {
    ($src:ident) => {{
        match $src.first() {
            Some(&b) => b,
            None => return Poll::Pending,
        }
    }};
}

pub(crate) struct FieldDecoder {
    state: FieldState,
    name: String,
    scratch: Vec<u8>,
}

impl FieldDecoder {
    pub(crate) fn new() -> Self {
        Self { state: FieldState::LineStart, name: String::new(), scratch: Vec::new() }
    }

    pub(crate) fn reset(&mut self) {
        self.state = FieldState::LineStart;
        self.name.clear();
        self.scratch.clear();
    }

    /// Advance until the blank line ends the block, input runs dry, or a
    /// fault is hit.
    pub(crate) fn advance(
        &mut self,
        src: &mut BytesMut,
        message: &mut Message,
        section: Section,
    ) -> Poll<Result<(), ParseError>> {
        loop {
            match self.state {
                FieldState::LineStart => match peek_byte!(src) {
                    b'\r' => {
                        src.advance(1);
                        self.state = FieldState::EndCrlfLf;
                    }
                    b'\n' => {
                        src.advance(1);
                        self.state = FieldState::Done;
                    }
                    _ => self.state = FieldState::Name,
                },

                FieldState::Name => {
                    loop {
                        let b = peek_byte!(src);
                        if is_tchar(b) {
                            src.advance(1);
                            self.scratch.push(b);
                        } else {
                            break;
                        }
                    }
                    if self.scratch.is_empty() {
                        return fault("Error reading field line.");
                    }
                    self.name = String::from_utf8_lossy(&self.scratch).to_ascii_uppercase();
                    self.scratch.clear();
                    self.state = FieldState::AfterName;
                }

                FieldState::AfterName => match peek_byte!(src) {
                    b':' => {
                        src.advance(1);
                        self.state = FieldState::BeforeValue;
                    }
                    _ => return fault("Illegal character between field name and colon"),
                },

                FieldState::BeforeValue => {
                    while is_whitespace(peek_byte!(src)) {
                        src.advance(1);
                    }
                    self.state = FieldState::ValueDispatch;
                }

                FieldState::ValueDispatch => {
                    self.state = if is_list_field(&self.name) {
                        FieldState::ListEntry
                    } else {
                        FieldState::SingletonValue
                    };
                }

                FieldState::SingletonValue => {
                    loop {
                        let b = peek_byte!(src);
                        if b == b'\n' {
                            break;
                        }
                        src.advance(1);
                        self.scratch.push(b);
                    }
                    // The LF stays unconsumed until the value validates,
                    // so a fault here recovers on the line boundary.
                    let value = match trim_line_value(&self.scratch) {
                        Some(value) => value,
                        None => return fault("Singleton field value is blank/empty"),
                    };
                    if !value.iter().copied().all(is_field_content_char) {
                        return fault("Illegal character in singleton field value");
                    }
                    if let Err(e) = self.commit(message, section, Bytes::copy_from_slice(value)) {
                        return Poll::Ready(Err(e));
                    }
                    src.advance(1);
                    self.end_line();
                }

                FieldState::ListEntry => {
                    let b = peek_byte!(src);
                    if b == b'"' {
                        src.advance(1);
                        self.scratch.clear();
                        self.state = FieldState::QuotedValue;
                    } else if is_tchar(b) {
                        self.state = FieldState::UnquotedValue;
                    } else {
                        return fault("Illegal character in field value");
                    }
                }

                FieldState::UnquotedValue => {
                    let ended_by_comma = loop {
                        let b = peek_byte!(src);
                        if b == b',' || b == b'\n' {
                            break b == b',';
                        }
                        src.advance(1);
                        self.scratch.push(b);
                    };
                    let value = match trim_line_value(&self.scratch) {
                        Some(value) => value,
                        None => return fault("Singleton field value is blank/empty"),
                    };
                    if !value.iter().copied().all(is_field_content_char) {
                        return fault("Illegal character in singleton field value");
                    }
                    if let Err(e) = self.commit(message, section, Bytes::copy_from_slice(value)) {
                        return Poll::Ready(Err(e));
                    }
                    src.advance(1);
                    if ended_by_comma {
                        self.scratch.clear();
                        self.state = FieldState::AfterComma;
                    } else {
                        self.end_line();
                    }
                }

                FieldState::QuotedValue => {
                    loop {
                        let b = peek_byte!(src);
                        if is_quoted_char(b) {
                            src.advance(1);
                            self.scratch.push(b);
                        } else if b == b'\\' {
                            src.advance(1);
                            self.state = FieldState::QuotedEscape;
                            break;
                        } else if b == b'"' {
                            src.advance(1);
                            let value = Bytes::copy_from_slice(&self.scratch);
                            if let Err(e) = self.commit(message, section, value) {
                                return Poll::Ready(Err(e));
                            }
                            self.scratch.clear();
                            self.state = FieldState::AfterQuoted;
                            break;
                        } else {
                            return fault("Quoted field value is malformed");
                        }
                    }
                }

                FieldState::QuotedEscape => {
                    let b = peek_byte!(src);
                    src.advance(1);
                    self.scratch.push(b);
                    self.state = FieldState::QuotedValue;
                }

                FieldState::AfterQuoted => {
                    while is_whitespace(peek_byte!(src)) {
                        src.advance(1);
                    }
                    self.state = FieldState::Comma;
                }

                FieldState::Comma => match peek_byte!(src) {
                    b',' => {
                        src.advance(1);
                        self.state = FieldState::AfterComma;
                    }
                    b if is_crlf_char(b) => self.state = FieldState::LineCrlf,
                    _ => return fault("Error reading field line."),
                },

                FieldState::AfterComma => {
                    while is_whitespace(peek_byte!(src)) {
                        src.advance(1);
                    }
                    self.state = FieldState::ListEntry;
                }

                FieldState::LineCrlf => match peek_byte!(src) {
                    b'\r' => {
                        src.advance(1);
                        self.state = FieldState::LineCrlfLf;
                    }
                    b'\n' => {
                        src.advance(1);
                        self.end_line();
                    }
                    _ => return fault("Error reading field line."),
                },

                FieldState::LineCrlfLf => match peek_byte!(src) {
                    b'\n' => {
                        src.advance(1);
                        self.end_line();
                    }
                    _ => return fault("Error reading field line."),
                },

                FieldState::EndCrlfLf => match peek_byte!(src) {
                    b'\n' => {
                        src.advance(1);
                        self.state = FieldState::Done;
                    }
                    _ => return fault("Error reading field line."),
                },

                FieldState::Done => return Poll::Ready(Ok(())),
            }
        }
    }

    fn end_line(&mut self) {
        self.name.clear();
        self.scratch.clear();
        self.state = FieldState::LineStart;
    }

    /// Store a committed value; header-section `Content-Length` is also
    /// parsed into the message's numeric length and fixes the transport.
    fn commit(
        &mut self,
        message: &mut Message,
        section: Section,
        value: Bytes,
    ) -> Result<(), ParseError> {
        match section {
            Section::Header => {
                if self.name == "CONTENT-LENGTH" {
                    // https://www.rfc-editor.org/rfc/rfc9112#name-content-length
                    let mut length: u64 = 0;
                    for &b in value.iter() {
                        ensure!(b.is_ascii_digit(), ParseError::InvalidContentLength);
                        length = length
                            .checked_mul(10)
                            .and_then(|l| l.checked_add((b - b'0') as u64))
                            .ok_or(ParseError::InvalidContentLength)?;
                    }
                    message.set_content_length(length);
                    message.set_transport(Transport::Fixed);
                }
                message.add_field_value(&self.name, value);
            }
            Section::Trailer => {
                message.add_trailer_field_value(&self.name, value);
            }
        }
        Ok(())
    }
}

fn fault(reason: &str) -> Poll<Result<(), ParseError>> {
    Poll::Ready(Err(ParseError::invalid_field_line(reason)))
}

/// Strip a trailing CR (bare-LF tolerance) and trailing whitespace from a
/// raw line value. `None` when nothing remains.
fn trim_line_value(raw: &[u8]) -> Option<&[u8]> {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    while end > 0 && is_whitespace(raw[end - 1]) {
        end -= 1;
    }
    if end == 0 {
        None
    } else {
        Some(&raw[..end])
    }
}
