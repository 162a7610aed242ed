//! Character-class predicates for the RFC 9110/9112 productions.
//!
//! All predicates are pure functions over single bytes, backed by const
//! lookup tables so that the hot parsing loops stay branch-light. The
//! tables are process-wide immutable data.

macro_rules! byte_table {
    ($($pattern:pat_param)|+) => {{
        let mut table = [false; 256];
        let mut c = 0usize;
        while c < 256 {
            table[c] = matches!(c as u8, $($pattern)|+);
            c += 1;
        }
        table
    }};
}

/// `tchar` per [RFC 9110 Section 5.6.2].
///
/// [RFC 9110 Section 5.6.2]: https://www.rfc-editor.org/rfc/rfc9110#section-5.6.2
const TCHAR: [bool; 256] = byte_table!(
    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*'
    | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
    | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z');

/// `OWS`/`RWS` constituents: space and horizontal tab only.
const WHITESPACE: [bool; 256] = byte_table!(b' ' | b'\t');

/// `VCHAR` per [RFC 5234 Appendix B.1].
///
/// [RFC 5234 Appendix B.1]: https://www.rfc-editor.org/rfc/rfc5234#appendix-B.1
const VISIBLE: [bool; 256] = byte_table!(0x21..=0x7e);

/// `qdtext` per [RFC 9110 Section 5.6.4]: HTAB, SP, and visible characters
/// except `"` and `\`, plus obs-text.
///
/// [RFC 9110 Section 5.6.4]: https://www.rfc-editor.org/rfc/rfc9110#section-5.6.4
const QDTEXT: [bool; 256] =
    byte_table!(b'\t' | b' ' | 0x21 | 0x23..=0x5b | 0x5d..=0x7e | 0x80..=0xff);

/// `field-content` constituents per [RFC 9110 Section 5.5]: HTAB, SP,
/// visible characters, and obs-text.
///
/// [RFC 9110 Section 5.5]: https://www.rfc-editor.org/rfc/rfc9110#section-5.5
const FIELD_CONTENT: [bool; 256] = byte_table!(b'\t' | b' ' | 0x21..=0x7e | 0x80..=0xff);

#[inline]
pub fn is_tchar(c: u8) -> bool {
    TCHAR[c as usize]
}

#[inline]
pub fn is_whitespace(c: u8) -> bool {
    WHITESPACE[c as usize]
}

#[inline]
pub fn is_visible(c: u8) -> bool {
    VISIBLE[c as usize]
}

/// `obs-text` per RFC 9110 Section 5.5: any byte with the high bit set.
#[inline]
pub fn is_obs_text(c: u8) -> bool {
    c >= 0x80
}

/// `field-name = token`, so this is the token class.
#[inline]
pub fn is_field_name_char(c: u8) -> bool {
    TCHAR[c as usize]
}

#[inline]
pub fn is_quoted_char(c: u8) -> bool {
    QDTEXT[c as usize]
}

#[inline]
pub fn is_field_content_char(c: u8) -> bool {
    FIELD_CONTENT[c as usize]
}

#[inline]
pub fn is_crlf_char(c: u8) -> bool {
    c == b'\r' || c == b'\n'
}

/// Field names whose value may legally be a comma-separated list per
/// RFC 9110 Section 5.5, and may therefore carry quoted entries.
///
/// Sorted, so membership is a binary search. Names are compared in their
/// stored (upper-cased) form.
pub const LIST_FIELDS: &[&str] = &[
    "ACCEPT",
    "ACCEPT-CHARSET",
    "ACCEPT-ENCODING",
    "ACCEPT-LANGUAGE",
    "ACCEPT-RANGES",
    "ALLOW",
    "AUTHENTICATION-INFO",
    "CONNECTION",
    "CONTENT-ENCODING",
    "CONTENT-LANGUAGE",
    "EXPECT",
    "IF-MATCH",
    "IF-NONE-MATCH",
    "PROXY-AUTHENTICATE",
    "PROXY-AUTHENTICATION-INFO",
    "TE",
    "TRAILER",
    "UPGRADE",
    "VARY",
    "VIA",
    "WWW-AUTHENTICATE",
];

/// Whether a field name (upper-cased) takes comma-separated list values.
pub fn is_list_field(name: &str) -> bool {
    LIST_FIELDS.binary_search(&name).is_ok()
}

/// Whether a value must be wrapped in double quotes when rendered as a
/// list entry: true iff any byte falls outside the token class.
pub fn field_value_quotes_needed(value: &[u8]) -> bool {
    !value.iter().copied().all(is_tchar)
}

/// Escape a field value for rendering inside a quoted string: any byte
/// outside the `qdtext` class is prefixed with a backslash.
pub fn field_value_escape(value: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(value.len());
    for &c in value {
        if !is_quoted_char(c) {
            escaped.push(b'\\');
        }
        escaped.push(c);
    }
    escaped
}
