//! Decoder for the request line and status line.
//!
//! A byte-driven machine: each state consumes input until it either
//! completes, runs dry (resuming on the next block), or hits a protocol
//! fault. The cursor never rewinds; token bytes are copied into a scratch
//! buffer so the finished message owns its data.

use std::task::Poll;

use bytes::{Buf, BytesMut};

use crate::protocol::tokens::{is_crlf_char, is_visible, is_whitespace};
use crate::protocol::{Kind, Message, Method, ParseError};

/// The fine-grained steps of start-line parsing. Request lines travel
/// `LeadingCrlf -> .. -> Method -> .. -> Version -> Crlf`; status lines
/// travel `LeadingCrlf -> .. -> Version -> .. -> StatusCode ->
/// ReasonPhrase -> Crlf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    /// Empty lines before the start line are ignored (RFC 9112 Section 2.2).
    LeadingCrlf,
    /// Optional whitespace before the first token.
    LeadingWs,
    Method,
    AfterMethod,
    Target,
    AfterTarget,
    Version,
    AfterVersion,
    StatusCode,
    AfterStatusCode,
    ReasonPhrase,
    /// Line terminator: CRLF, or bare LF (RFC 9112 Section 2.2).
    Crlf,
    CrlfLf,
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

/// Unwrap a token-level step, propagating "need more input" and faults.
macro_rules! try_token {
    ($e:expr) => {
        match $e {
            Ok(()) => {}
            Err(TokenBreak::Pending) => return Poll::Pending,
            Err(TokenBreak::Fault(e)) => return Poll::Ready(Err(e)),
        }
    };
}

enum TokenBreak {
    Pending,
    Fault(ParseError),
}

pub(crate) struct HeadDecoder {
    kind: Kind,
    state: HeadState,
    scratch: Vec<u8>,
    ws_seen: bool,
}

impl HeadDecoder {
    pub(crate) fn new(kind: Kind) -> Self {
        Self { kind, state: HeadState::LeadingCrlf, scratch: Vec::new(), ws_seen: false }
    }

    pub(crate) fn reset(&mut self) {
        self.state = HeadState::LeadingCrlf;
        self.scratch.clear();
        self.ws_seen = false;
    }

    fn start_line_error(&self) -> ParseError {
        ParseError::invalid_start_line(match self.kind {
            Kind::Response => "Error reading status line.",
            _ => "Error reading request line.",
        })
    }

    /// Advance until the start line is fully parsed into `message`, input
    /// runs dry, or a fault is hit.
    pub(crate) fn advance(
        &mut self,
        src: &mut BytesMut,
        message: &mut Message,
    ) -> Poll<Result<(), ParseError>> {
        loop {
            match self.state {
                HeadState::LeadingCrlf => {
                    while is_crlf_char(peek_byte!(src)) {
                        src.advance(1);
                    }
                    self.state = HeadState::LeadingWs;
                }

                HeadState::LeadingWs => {
                    while is_whitespace(peek_byte!(src)) {
                        src.advance(1);
                    }
                    self.state = match self.kind {
                        Kind::Response => HeadState::Version,
                        _ => HeadState::Method,
                    };
                }

                HeadState::Method => {
                    try_token!(self.take_visible(src));
                    match Method::from_bytes(&self.scratch) {
                        Some(method) => {
                            message.set_method(method);
                            self.enter(HeadState::AfterMethod);
                        }
                        // https://www.rfc-editor.org/rfc/rfc9110#section-9.1
                        None => return Poll::Ready(Err(ParseError::UnrecognizedMethod)),
                    }
                }

                HeadState::AfterMethod => {
                    try_token!(self.require_whitespace(src));
                    self.enter(HeadState::Target);
                }

                HeadState::Target => {
                    try_token!(self.take_visible(src));
                    let target = String::from_utf8_lossy(&self.scratch).into_owned();
                    message.set_target(target);
                    self.enter(HeadState::AfterTarget);
                }

                HeadState::AfterTarget => {
                    try_token!(self.require_whitespace(src));
                    self.enter(HeadState::Version);
                }

                HeadState::Version => {
                    try_token!(self.take_visible(src));
                    let version = String::from_utf8_lossy(&self.scratch).into_owned();
                    message.set_version(version);
                    self.enter(HeadState::AfterVersion);
                }

                HeadState::AfterVersion => match self.kind {
                    Kind::Response => {
                        try_token!(self.require_whitespace(src));
                        self.enter(HeadState::StatusCode);
                    }
                    _ => {
                        while is_whitespace(peek_byte!(src)) {
                            src.advance(1);
                        }
                        self.enter(HeadState::Crlf);
                    }
                },

                HeadState::StatusCode => {
                    // Exactly 3 ASCII digits (RFC 9112 Section 4).
                    while self.scratch.len() < 3 {
                        let b = peek_byte!(src);
                        if !b.is_ascii_digit() {
                            return Poll::Ready(Err(self.start_line_error()));
                        }
                        src.advance(1);
                        self.scratch.push(b);
                    }
                    let code = (self.scratch[0] - b'0') as u16 * 100
                        + (self.scratch[1] - b'0') as u16 * 10
                        + (self.scratch[2] - b'0') as u16;
                    message.set_status_code(code);
                    self.enter(HeadState::AfterStatusCode);
                }

                HeadState::AfterStatusCode => {
                    try_token!(self.require_whitespace(src));
                    self.enter(HeadState::ReasonPhrase);
                }

                HeadState::ReasonPhrase => {
                    // Any non-CRLF bytes; may be empty (RFC 9112 Section 4).
                    while !is_crlf_char(peek_byte!(src)) {
                        let b = src[0];
                        src.advance(1);
                        self.scratch.push(b);
                    }
                    let reason = String::from_utf8_lossy(&self.scratch).into_owned();
                    message.set_reason(reason);
                    self.enter(HeadState::Crlf);
                }

                HeadState::Crlf => match peek_byte!(src) {
                    b'\r' => {
                        src.advance(1);
                        self.state = HeadState::CrlfLf;
                    }
                    b'\n' => {
                        src.advance(1);
                        self.state = HeadState::Done;
                    }
                    _ => return Poll::Ready(Err(self.start_line_error())),
                },

                HeadState::CrlfLf => match peek_byte!(src) {
                    b'\n' => {
                        src.advance(1);
                        self.state = HeadState::Done;
                    }
                    _ => return Poll::Ready(Err(self.start_line_error())),
                },

                HeadState::Done => return Poll::Ready(Ok(())),
            }
        }
    }

    fn enter(&mut self, state: HeadState) {
        self.state = state;
        self.scratch.clear();
        self.ws_seen = false;
    }

    /// Accumulate visible bytes into the scratch buffer; stop (without
    /// consuming) at the first non-visible byte. An empty token is a
    /// start-line fault.
    fn take_visible(&mut self, src: &mut BytesMut) -> Result<(), TokenBreak> {
        loop {
            let b = match src.first() {
                Some(&b) => b,
                None => return Err(TokenBreak::Pending),
            };
            if is_visible(b) {
                src.advance(1);
                self.scratch.push(b);
            } else if self.scratch.is_empty() {
                return Err(TokenBreak::Fault(self.start_line_error()));
            } else {
                return Ok(());
            }
        }
    }

    /// Consume required whitespace: at least one SP/HTAB before the next
    /// token.
    fn require_whitespace(&mut self, src: &mut BytesMut) -> Result<(), TokenBreak> {
        loop {
            let b = match src.first() {
                Some(&b) => b,
                None => return Err(TokenBreak::Pending),
            };
            if is_whitespace(b) {
                src.advance(1);
                self.ws_seen = true;
            } else if self.ws_seen {
                return Ok(());
            } else {
                return Err(TokenBreak::Fault(self.start_line_error()));
            }
        }
    }
}
