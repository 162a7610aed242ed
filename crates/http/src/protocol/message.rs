//! The structured form of an HTTP/1.1 request, response, or chunk.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::blob::Blob;
use super::fields::FieldMap;
use super::tokens::{field_value_escape, field_value_quotes_needed, is_list_field};

/// Whether a message is a request, a response, or a chunk belonging to a
/// parent chunked-transfer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
    Chunk,
}

/// How the message body travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Not yet declared; the message is not safe to process.
    #[default]
    Undeclared,
    /// Fixed length; process only once fully received.
    Fixed,
    /// Boundary-separated parts. Reserved.
    Multipart,
    /// Chunked encoding; chunks may be processed as they arrive.
    Chunked,
    /// No declared length; bytes may be processed as they arrive. Reserved.
    Stream,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Undeclared => "UNDECLARED",
            Transport::Fixed => "FIXED",
            Transport::Multipart => "MULTIPART",
            Transport::Chunked => "CHUNKED",
            Transport::Stream => "STREAM",
        }
    }
}

/// The recognized request methods per RFC 9110 Section 9.1 plus PATCH
/// (RFC 5789).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Parse a method token. `None` for anything outside the set.
    pub fn from_bytes(token: &[u8]) -> Option<Self> {
        match token {
            b"GET" => Some(Method::Get),
            b"HEAD" => Some(Method::Head),
            b"POST" => Some(Method::Post),
            b"PUT" => Some(Method::Put),
            b"DELETE" => Some(Method::Delete),
            b"CONNECT" => Some(Method::Connect),
            b"OPTIONS" => Some(Method::Options),
            b"TRACE" => Some(Method::Trace),
            b"PATCH" => Some(Method::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

/// A single HTTP message.
///
/// Created by the caller (outbound) or by the decoder (inbound) and
/// populated over the life of a connection. Once parsing has finished the
/// header fields, transport, and (for fixed transport) the body are
/// treated as immutable.
#[derive(Debug, Default)]
pub struct Message {
    kind: KindCell,
    transport: Transport,
    id: u64,

    method: Method,
    target: String,
    domain: String,
    port: u16,

    status_code: u16,
    /// Reason phrase for responses; doubles as the error description when
    /// `error_is_set`.
    reason: String,

    version: String,
    fields: FieldMap,
    trailer_fields: FieldMap,
    body: Blob,
    content_length: u64,
    chunks: Vec<Message>,

    error_is_set: bool,
    finished: bool,

    rendered_header: Option<Bytes>,
    header_is_sent: bool,
}

/// `Kind` with a `Default` so `Message::default()` exists for scratch use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KindCell(Kind);

impl Default for KindCell {
    fn default() -> Self {
        KindCell(Kind::Request)
    }
}

impl Message {
    pub fn new(kind: Kind) -> Self {
        Self { kind: KindCell(kind), ..Self::default() }
    }

    /// A chunk message wrapping a payload blob.
    pub fn chunk(body: Blob) -> Self {
        let mut message = Self::new(Kind::Chunk);
        message.set_body(body);
        message
    }

    pub fn kind(&self) -> Kind {
        self.kind.0
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn set_transport(&mut self, transport: Transport) -> &mut Self {
        self.transport = transport;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) -> &mut Self {
        self.id = id;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        if !self.header_locked() {
            self.method = method;
        }
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_target(&mut self, target: impl Into<String>) -> &mut Self {
        if !self.header_locked() {
            self.target = target.into();
        }
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) -> &mut Self {
        self.domain = domain.into();
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status_code(&mut self, status_code: u16) -> &mut Self {
        if !self.header_locked() {
            self.status_code = status_code;
        }
        self
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) -> &mut Self {
        if !self.header_locked() {
            self.reason = reason.into();
        }
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) -> &mut Self {
        if !self.header_locked() {
            self.version = version.into();
        }
        self
    }

    /// Record a protocol or resource fault on this message. The message
    /// still surfaces to the caller so diagnostics stay observable.
    pub fn set_error(&mut self, status_code: u16, reason: impl Into<String>) -> &mut Self {
        self.status_code = status_code;
        self.reason = reason.into();
        self.error_is_set = true;
        self
    }

    pub fn has_error(&self) -> bool {
        self.error_is_set
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn add_field_value(&mut self, name: &str, value: impl Into<Bytes>) -> &mut Self {
        if !self.header_locked() {
            self.fields.append(name, value);
        }
        self
    }

    pub fn trailer_fields(&self) -> &FieldMap {
        &self.trailer_fields
    }

    pub fn add_trailer_field_value(&mut self, name: &str, value: impl Into<Bytes>) -> &mut Self {
        self.trailer_fields.append(name, value);
        self
    }

    pub fn body(&self) -> &Blob {
        &self.body
    }

    /// Set the content body. Forces `Transport::Fixed` and recomputes the
    /// content length.
    pub fn set_body(&mut self, body: Blob) -> &mut Self {
        self.content_length = body.size();
        self.body = body;
        self.transport = Transport::Fixed;
        self
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub(crate) fn set_content_length(&mut self, content_length: u64) -> &mut Self {
        self.content_length = content_length;
        self
    }

    /// Append a chunk. Forces `Transport::Chunked`.
    pub fn add_chunk(&mut self, chunk: Message) -> &mut Self {
        self.chunks.push(chunk);
        self.transport = Transport::Chunked;
        self
    }

    pub fn chunks(&self) -> &[Message] {
        &self.chunks
    }

    /// Whether no more content is expected for this message.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn set_finished(&mut self, finished: bool) -> &mut Self {
        self.finished = finished;
        self
    }

    pub(crate) fn header_is_sent(&self) -> bool {
        self.header_is_sent
    }

    pub(crate) fn set_header_sent(&mut self) -> &mut Self {
        self.header_is_sent = true;
        self
    }

    fn header_locked(&self) -> bool {
        self.rendered_header.is_some()
    }

    /// The HTTP/1.1 rendering of the start line and field lines, cached
    /// after the first call. The terminating blank line and the
    /// transport-specific framing fields (`Content-Length`,
    /// `Transfer-Encoding`) are appended by the encoder, which knows the
    /// transport it is about to use.
    pub fn render_header(&mut self) -> Bytes {
        if let Some(rendered) = &self.rendered_header {
            return rendered.clone();
        }

        let version = if self.version.is_empty() { "HTTP/1.1" } else { self.version.as_str() };
        let mut dst = BytesMut::with_capacity(256);
        match self.kind.0 {
            Kind::Request => {
                dst.put_slice(self.method.as_str().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(self.target.as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(version.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Kind::Response | Kind::Chunk => {
                dst.put_slice(version.as_bytes());
                dst.put_u8(b' ');
                let status = if self.status_code == 0 { 200 } else { self.status_code };
                dst.put_slice(status.to_string().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(self.reason.as_bytes());
                dst.put_slice(b"\r\n");
            }
        }

        render_fields(&self.fields, &mut dst);

        let rendered = dst.freeze();
        self.rendered_header = Some(rendered.clone());
        rendered
    }

    /// Move all wire-derived state from `source` into `self`. The
    /// receiver keeps its own identity (id and kind); any notification
    /// machinery attached to the receiver is untouched.
    pub fn adopt(&mut self, source: Message) {
        self.transport = source.transport;
        self.method = source.method;
        self.target = source.target;
        self.domain = source.domain;
        self.port = source.port;
        self.status_code = source.status_code;
        self.reason = source.reason;
        self.version = source.version;
        self.fields = source.fields;
        self.trailer_fields = source.trailer_fields;
        self.body = source.body;
        self.content_length = source.content_length;
        self.chunks = source.chunks;
        self.error_is_set = source.error_is_set;
        self.finished = source.finished;
        self.rendered_header = None;
    }
}

/// Render field lines. List fields are joined with `", "`, quoting any
/// entry that contains non-token bytes; other fields get one line per
/// value. The framing fields are skipped: the encoder re-emits them to
/// match the transport actually used.
fn render_fields(fields: &FieldMap, dst: &mut BytesMut) {
    for (name, values) in fields.iter() {
        if name == "CONTENT-LENGTH" || name == "TRANSFER-ENCODING" {
            continue;
        }
        if is_list_field(name) {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    dst.put_slice(b", ");
                }
                if field_value_quotes_needed(value) {
                    dst.put_u8(b'"');
                    dst.put_slice(&field_value_escape(value));
                    dst.put_u8(b'"');
                } else {
                    dst.put_slice(value);
                }
            }
            dst.put_slice(b"\r\n");
        } else {
            for value in values {
                dst.put_slice(name.as_bytes());
                dst.put_slice(b": ");
                dst.put_slice(value);
                dst.put_slice(b"\r\n");
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Message:")?;
        writeln!(f, "  Kind: {:?}", self.kind.0)?;
        writeln!(f, "  Transport: {}", self.transport.as_str())?;
        writeln!(f, "  Method: {}", self.method.as_str())?;
        writeln!(f, "  Target: {}", self.target)?;
        writeln!(f, "  Version: {}", self.version)?;
        writeln!(f, "  StatusCode: {}", self.status_code)?;
        writeln!(f, "  Reason: {}", self.reason)?;
        if !self.fields.is_empty() {
            writeln!(f, "  Fields:")?;
            write!(f, "{}", self.fields)?;
        }
        if !self.trailer_fields.is_empty() {
            writeln!(f, "  Trailer fields:")?;
            write!(f, "{}", self.trailer_fields)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        for kind in [Kind::Request, Kind::Response] {
            let message = Message::new(kind);
            assert_eq!(message.kind(), kind);
            assert_eq!(message.transport(), Transport::Undeclared);
            assert_eq!(message.method(), Method::Get);
            assert_eq!(message.target(), "");
            assert_eq!(message.domain(), "");
            assert_eq!(message.port(), 0);
            assert!(!message.has_error());
            assert_eq!(message.status_code(), 0);
            assert_eq!(message.reason(), "");
            assert_eq!(message.version(), "");
            assert_eq!(*message.body(), b""[..]);
            assert_eq!(message.fields().len(), 0);
            assert_eq!(message.content_length(), 0);
            assert_eq!(message.id(), 0);
            assert!(!message.is_finished());
        }
    }

    #[test]
    fn body_forces_fixed_transport() {
        let mut message = Message::new(Kind::Response);
        message.set_body(Blob::from_bytes(b"Hello World!"));
        assert_eq!(message.transport(), Transport::Fixed);
        assert_eq!(message.content_length(), 12);
        assert_eq!(*message.body(), b"Hello World!"[..]);
    }

    #[test]
    fn chunks_force_chunked_transport() {
        let mut message = Message::new(Kind::Request);
        assert_eq!(message.transport(), Transport::Undeclared);
        assert!(message.chunks().is_empty());

        message.add_chunk(Message::chunk(Blob::from_bytes(b"hello")));
        assert_eq!(message.transport(), Transport::Chunked);
        assert_eq!(message.chunks().len(), 1);

        message.add_chunk(Message::chunk(Blob::from_bytes(b"world!")));
        assert_eq!(message.transport(), Transport::Chunked);
        assert_eq!(message.chunks().len(), 2);
        assert_eq!(*message.chunks()[1].body(), b"world!"[..]);
    }

    #[test]
    fn header_setters_are_noops_after_render() {
        let mut message = Message::new(Kind::Request);
        message.set_target("/before").add_field_value("Host", "h");
        let first = message.render_header();

        message.set_target("/after");
        message.set_method(Method::Post);
        message.add_field_value("X-Late", "v");
        message.set_status_code(500);

        assert_eq!(message.target(), "/before");
        assert_eq!(message.method(), Method::Get);
        assert!(!message.fields().contains("X-Late"));
        assert_eq!(message.render_header(), first);
    }

    #[test]
    fn request_header_rendering() {
        let mut message = Message::new(Kind::Request);
        message.set_target("/foo").add_field_value("Host", "example");
        let header = message.render_header();
        assert_eq!(&header[..], b"GET /foo HTTP/1.1\r\nHOST: example\r\n");
    }

    #[test]
    fn list_field_rendering_quotes_when_needed() {
        let mut message = Message::new(Kind::Request);
        message
            .set_target("/")
            .add_field_value("Accept", "a")
            .add_field_value("Accept", "b,c")
            .add_field_value("Accept", "d");
        let header = message.render_header();
        assert_eq!(&header[..], b"GET / HTTP/1.1\r\nACCEPT: a, \"b,c\", d\r\n");
    }

    #[test]
    fn duplicate_singleton_fields_render_one_line_each() {
        let mut message = Message::new(Kind::Request);
        message.set_target("/").add_field_value("X-Tag", "a").add_field_value("X-Tag", "b");
        let header = message.render_header();
        assert_eq!(&header[..], b"GET / HTTP/1.1\r\nX-TAG: a\r\nX-TAG: b\r\n");
    }

    #[test]
    fn adopt_moves_wire_state_keeps_identity() {
        let mut parsed = Message::new(Kind::Response);
        parsed
            .set_status_code(200)
            .set_reason("OK")
            .set_version("HTTP/1.1")
            .add_field_value("Server", "swell");
        parsed.set_body(Blob::from_bytes(b"hi"));
        parsed.set_finished(true);

        let mut target = Message::new(Kind::Response);
        target.set_id(42);
        target.adopt(parsed);

        assert_eq!(target.id(), 42);
        assert_eq!(target.status_code(), 200);
        assert_eq!(target.reason(), "OK");
        assert_eq!(target.fields().first("server").unwrap(), "swell");
        assert_eq!(*target.body(), b"hi"[..]);
        assert_eq!(target.transport(), Transport::Fixed);
        assert!(target.is_finished());
    }
}
