//! Schema-driven JSON wire codec.
//!
//! A [`Schema`] describes records (with single inheritance and enumerated
//! subtypes) and tagged unions. Values of those types are encoded to a
//! tagged JSON-shaped [`WireValue`] and decoded back, with constraint
//! validation and forward-compatible tag dispatch:
//!
//! - subtypes of a record are discriminated by a `.tag` path such as `"file.photo"`;
//!   a reader that only knows part of the path decodes the closest type it knows
//! - union variants are discriminated by `.tag`; a variant whose payload is a plain
//!   record has that record's fields inlined next to the tag
//! - an unknown union tag decodes to the union's catch-all variant, if it has one
//!
//! ```
//! use stone_json::{
//!     Field, RecordType, RecordValue, SchemaBuilder, TypeRef, UnionType, UnionValue, Value,
//! };
//!
//! let mut b = SchemaBuilder::new();
//! let point = b.record(
//!     "geo",
//!     "Point",
//!     RecordType::new()
//!         .field(Field::new("x", TypeRef::int32()))
//!         .field(Field::new("y", TypeRef::int32())),
//! );
//! let shape = b.union(
//!     "geo",
//!     "Shape",
//!     UnionType::new()
//!         .variant(Field::void("empty"))
//!         .variant(Field::new("point", TypeRef::reference(point))),
//! );
//! let schema = b.build().unwrap();
//!
//! let value = UnionValue::with_payload(
//!     &schema,
//!     shape,
//!     "point",
//!     RecordValue::new(point).with("x", 1).with("y", 2),
//! )
//! .unwrap();
//! let json = stone_json::to_string(&schema, shape, &value.clone().into()).unwrap();
//! assert_eq!(json, r#"{".tag":"point","x":1,"y":2}"#);
//!
//! let back = stone_json::from_str(&schema, shape, &json).unwrap();
//! assert_eq!(back, Value::Union(value));
//! ```
#![warn(missing_docs)]

extern crate alloc;

mod deserialize;
mod error;
mod plan;
mod resolve;
mod schema;
mod serialize;
mod span;
mod tokenizer;
mod validate;
mod value;
mod wire;

pub use deserialize::{DecodeOptions, Decoder, MAX_DEPTH, decode, from_slice, from_str};
pub use error::{CodecError, ErrorKind, Result, SchemaError, SchemaErrorKind, Violation};
pub use plan::{SlotId, VariantPlan};
pub use resolve::{ChainLink, Schema};
pub use schema::{
    Field, FloatConstraints, FloatKind, IntegerConstraints, IntegerKind, ListConstraints,
    RecordType, SchemaBuilder, StringConstraints, TypeDef, TypeId, TypeName, TypeRef, UnionType,
};
pub use serialize::{
    EncodeOptions, Encoder, encode, to_string, to_string_pretty, to_writer, to_writer_pretty,
};
pub use span::{Span, Spanned};
pub use tokenizer::{Token, TokenError, TokenErrorKind, Tokenizer};
pub use validate::validate;
pub use value::{RecordValue, UnionValue, Value};
pub use wire::{Path, PathSegment, TAG_KEY, TAG_PATH_SEPARATOR, WireObject, WireValue};

/// A sink for JSON output.
pub trait JsonWrite {
    /// Appends bytes.
    fn write(&mut self, buf: &[u8]);

    /// Hints that `additional` more bytes are coming.
    fn reserve(&mut self, additional: usize);
}

impl JsonWrite for Vec<u8> {
    fn write(&mut self, buf: &[u8]) {
        self.extend_from_slice(buf);
    }

    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }
}

impl JsonWrite for &mut Vec<u8> {
    fn write(&mut self, buf: &[u8]) {
        self.extend_from_slice(buf);
    }

    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }
}

/// Writes `s` as a quoted JSON string.
fn write_json_string<W: JsonWrite>(writer: &mut W, s: &str) {
    writer.reserve(s.len() + 2);
    writer.write(b"\"");

    // copy runs of characters that need no escaping in one go
    let bytes = s.as_bytes();
    let mut run_start = 0;
    for (i, c) in s.char_indices() {
        if needs_escape(c) {
            writer.write(&bytes[run_start..i]);
            write_json_escaped_char(writer, c);
            run_start = i + c.len_utf8();
        }
    }
    writer.write(&bytes[run_start..]);
    writer.write(b"\"");
}

fn needs_escape(c: char) -> bool {
    matches!(c, '"' | '\\') || (c as u32) < 0x20
}

/// Writes one character of a JSON string body, escaped if needed.
fn write_json_escaped_char<W: JsonWrite>(writer: &mut W, c: char) {
    match c {
        '"' => writer.write(b"\\\""),
        '\\' => writer.write(b"\\\\"),
        '\n' => writer.write(b"\\n"),
        '\r' => writer.write(b"\\r"),
        '\t' => writer.write(b"\\t"),
        '\u{08}' => writer.write(b"\\b"),
        '\u{0C}' => writer.write(b"\\f"),
        c if (c as u32) < 0x20 => {
            const HEX: &[u8; 16] = b"0123456789abcdef";
            let n = c as usize;
            writer.write(&[b'\\', b'u', b'0', b'0', HEX[n >> 4], HEX[n & 0xf]]);
        }
        c => {
            let mut buf = [0u8; 4];
            writer.write(c.encode_utf8(&mut buf).as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quoted(s: &str) -> String {
        let mut out = Vec::new();
        write_json_string(&mut out, s);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn string_escapes() {
        assert_eq!(quoted("plain"), r#""plain""#);
        assert_eq!(quoted("a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(quoted("line\nbreak\u{1}"), r#""line\nbreak\u0001""#);
        assert_eq!(quoted("héllo ☃"), "\"héllo ☃\"");
    }
}
