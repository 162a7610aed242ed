//! The incremental HTTP/1.1 message decoder.
//!
//! A two-level state machine: the major state selects the active
//! sub-decoder (start line, field lines, fixed or chunked body, trailer),
//! and each sub-decoder runs its own byte-driven minor states. Input is
//! consumed from a `BytesMut` as it is parsed, so resuming across
//! arbitrarily fragmented blocks is inherent and every emitted message
//! owns its bytes.
//!
//! Protocol faults never surface as `Err`: the current message is emitted
//! with its error flag, status code, and description set, the rest of the
//! broken message is skipped (through the next blank line), and parsing
//! resumes with a fresh message so one bad exchange does not take down
//! the stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::Poll;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{
    FieldMap, Kind, Message, Parameter, Parameters, ParseError, SharedMessage,
};

use super::body::{ChunkEvent, ChunkedDecoder, FixedDecoder};
use super::field_decoder::{FieldDecoder, Section};
use super::head_decoder::HeadDecoder;

/// Major parsing phase. `NewHeader -> FieldLine -> (MessageBody |
/// ChunkedBody | finished)`; `ChunkedBody -> Trailer -> finished`; a
/// finished message resets to `NewHeader` for the next pipelined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Major {
    NewHeader,
    FieldLine,
    MessageBody,
    ChunkedBody,
    Trailer,
    /// Skipping a broken message: discard through the next blank line.
    Recover,
}

/// The body sub-decoder active during `MessageBody`/`ChunkedBody`.
enum BodyState {
    None,
    Fixed(FixedDecoder),
    Chunked(ChunkedDecoder),
}

/// What a state-machine step decided, applied after the borrow of the
/// active sub-decoder ends.
enum Step {
    NeedMore,
    Continue,
    Fault(ParseError),
    EnterFieldLine,
    DispatchBody,
    BodyComplete,
    ChunkComplete,
    Finished,
}

pub struct MessageDecoder {
    kind: Kind,
    state: Major,
    head: HeadDecoder,
    fields: FieldDecoder,
    body: BodyState,
    recover_prev_lf: bool,

    current: SharedMessage,
    register: HashMap<u64, SharedMessage>,
    next_id: u64,
    params: Arc<Parameters>,
}

impl MessageDecoder {
    /// A decoder for the given message kind: `Kind::Request` on the
    /// server side, `Kind::Response` on the client side.
    pub fn new(kind: Kind, params: Arc<Parameters>) -> Self {
        let current = SharedMessage::new(kind);
        Self {
            kind,
            state: Major::NewHeader,
            head: HeadDecoder::new(kind),
            fields: FieldDecoder::new(),
            body: BodyState::None,
            recover_prev_lf: false,
            current,
            register: HashMap::new(),
            next_id: 1,
            params,
        }
    }

    /// A decoder running on the built-in parameter defaults.
    pub fn with_defaults(kind: Kind) -> Self {
        Self::new(kind, Arc::new(Parameters::new()))
    }

    /// The id of the message currently being populated. Messages are
    /// numbered sequentially from zero in arrival order, which on a
    /// pipelined connection is also the correlation order.
    pub fn current_id(&self) -> u64 {
        self.next_id - 1
    }

    /// Associate a caller-owned message with a parser id, so the
    /// caller's object is populated in place and its ready signal fires
    /// as content arrives.
    ///
    /// If the decoder has already begun populating a message with this
    /// id, the caller's message adopts its contents; the existing ready
    /// signal is not transferred, but if it had been released the
    /// caller's signal is released immediately.
    pub fn register_message(&mut self, id: u64, message: SharedMessage) {
        message.lock().set_id(id);
        if id == self.current_id() {
            message.adopt_shared(&self.current);
            self.current = message;
        } else if let Some(existing) = self.register.insert(id, message.clone()) {
            message.adopt_shared(&existing);
        }
    }

    fn fresh_message(&mut self) -> SharedMessage {
        let id = self.next_id;
        self.next_id += 1;
        let handle = match self.register.remove(&id) {
            Some(registered) => registered,
            None => SharedMessage::new(self.kind),
        };
        handle.lock().set_id(id);
        handle
    }

    /// Emit the current message as finished and reset for the next
    /// pipelined message.
    fn finish(&mut self) -> SharedMessage {
        let next = self.fresh_message();
        let finished = std::mem::replace(&mut self.current, next);
        finished.set_ready(true);
        self.head.reset();
        self.fields.reset();
        self.body = BodyState::None;
        self.state = Major::NewHeader;
        trace!(id = finished.lock().id(), "message finished");
        finished
    }

    /// Emit the current message in its error state and switch to
    /// recovery so a subsequent well-formed message still parses.
    fn fault(&mut self, error: ParseError) -> SharedMessage {
        let next = self.fresh_message();
        let broken = std::mem::replace(&mut self.current, next);
        broken.lock().set_error(error.status(), error.to_string());
        broken.set_ready(true);
        self.head.reset();
        self.fields.reset();
        self.body = BodyState::None;
        self.state = Major::Recover;
        self.recover_prev_lf = false;
        trace!(status = error.status(), %error, "message faulted");
        broken
    }

    fn mem_limit(&self) -> u64 {
        self.params.get(Parameter::MemChunkSizeLimit)
    }

    fn advance(&mut self, src: &mut BytesMut) -> Option<SharedMessage> {
        loop {
            let step = match self.state {
                Major::NewHeader => {
                    let mut guard = self.current.lock();
                    match self.head.advance(src, &mut guard) {
                        Poll::Pending => Step::NeedMore,
                        Poll::Ready(Err(e)) => Step::Fault(e),
                        Poll::Ready(Ok(())) => Step::EnterFieldLine,
                    }
                }

                Major::FieldLine => {
                    let mut guard = self.current.lock();
                    match self.fields.advance(src, &mut guard, Section::Header) {
                        Poll::Pending => Step::NeedMore,
                        Poll::Ready(Err(e)) => Step::Fault(e),
                        Poll::Ready(Ok(())) => Step::DispatchBody,
                    }
                }

                Major::MessageBody => match &mut self.body {
                    BodyState::Fixed(decoder) => match decoder.advance(src) {
                        Poll::Pending => Step::NeedMore,
                        Poll::Ready(Err(e)) => Step::Fault(e),
                        Poll::Ready(Ok(blob)) => {
                            self.current.lock().set_body(blob);
                            Step::BodyComplete
                        }
                    },
                    _ => Step::Fault(ParseError::invalid_start_line("parser state corrupted")),
                },

                Major::ChunkedBody => match &mut self.body {
                    BodyState::Chunked(decoder) => match decoder.advance(src) {
                        Poll::Pending => Step::NeedMore,
                        Poll::Ready(Err(e)) => Step::Fault(e),
                        Poll::Ready(Ok(ChunkEvent::Chunk(blob))) => {
                            self.current.lock().add_chunk(Message::chunk(blob));
                            self.current.set_ready(false);
                            Step::Continue
                        }
                        Poll::Ready(Ok(ChunkEvent::Complete)) => Step::ChunkComplete,
                    },
                    _ => Step::Fault(ParseError::invalid_start_line("parser state corrupted")),
                },

                Major::Trailer => {
                    let mut guard = self.current.lock();
                    match self.fields.advance(src, &mut guard, Section::Trailer) {
                        Poll::Pending => Step::NeedMore,
                        Poll::Ready(Err(e)) => Step::Fault(e),
                        Poll::Ready(Ok(())) => Step::Finished,
                    }
                }

                Major::Recover => {
                    let mut recovered = false;
                    while !src.is_empty() {
                        let b = src.get_u8();
                        match b {
                            b'\n' if self.recover_prev_lf => {
                                recovered = true;
                                break;
                            }
                            b'\n' => self.recover_prev_lf = true,
                            b'\r' => {}
                            _ => self.recover_prev_lf = false,
                        }
                    }
                    if recovered {
                        self.state = Major::NewHeader;
                        Step::Continue
                    } else {
                        Step::NeedMore
                    }
                }
            };

            match step {
                Step::NeedMore => return None,
                Step::Continue => {}
                Step::Fault(error) => return Some(self.fault(error)),
                Step::EnterFieldLine => {
                    self.fields.reset();
                    self.state = Major::FieldLine;
                }
                Step::DispatchBody => {
                    let (chunked, content_length) = {
                        let guard = self.current.lock();
                        (declares_chunked(guard.fields()), guard.content_length())
                    };
                    if chunked {
                        self.body = BodyState::Chunked(ChunkedDecoder::new(self.mem_limit()));
                        self.state = Major::ChunkedBody;
                    } else if content_length > 0 {
                        self.body =
                            BodyState::Fixed(FixedDecoder::new(content_length, self.mem_limit()));
                        self.state = Major::MessageBody;
                    } else {
                        return Some(self.finish());
                    }
                }
                Step::BodyComplete | Step::Finished => return Some(self.finish()),
                Step::ChunkComplete => {
                    self.fields.reset();
                    self.state = Major::Trailer;
                }
            }
        }
    }
}

impl Decoder for MessageDecoder {
    type Item = SharedMessage;
    type Error = ParseError;

    /// Feed a block of input. Returns one message per call (finished or
    /// carrying its error state); `Ok(None)` means more input is needed.
    /// Re-decoding after appending more bytes produces the same message
    /// sequence as one concatenated feed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.advance(src))
    }
}

/// Whether the header block declared `Transfer-Encoding: chunked`
/// anywhere in its (comma-separable) value.
fn declares_chunked(fields: &FieldMap) -> bool {
    let Some(values) = fields.get("TRANSFER-ENCODING") else {
        return false;
    };
    values.iter().any(|value| {
        String::from_utf8_lossy(value)
            .split(',')
            .any(|encoding| encoding.trim().eq_ignore_ascii_case("chunked"))
    })
}
