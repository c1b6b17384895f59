//! Decoding: JSON text to the wire representation (recursive descent over the
//! tokenizer), and wire values to typed values.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::collections::{HashMap, HashSet};

use base64::Engine as _;
use log::trace;

use crate::error::{CodecError, ErrorKind, Result, Violation, find_similar};
use crate::resolve::Schema;
use crate::schema::{IntegerKind, TypeDef, TypeId, TypeRef};
use crate::span::{Span, Spanned};
use crate::tokenizer::{Token, Tokenizer};
use crate::validate::{self, check_float, check_integer, check_list_len, check_string};
use crate::value::{RecordValue, UnionValue, Value};
use crate::wire::{Path, TAG_KEY, TAG_PATH_SEPARATOR, WireObject, WireValue};

/// Source spans of every value in a parsed document, keyed by path.
pub(crate) type SpanIndex = HashMap<Path, Span>;

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// Deepest nesting of arrays and objects accepted on input.
pub const MAX_DEPTH: usize = 128;

fn too_deep(path: &Path) -> CodecError {
    CodecError::malformed(
        path,
        alloc::format!("at most {MAX_DEPTH} levels of nesting"),
        "deeper nesting",
    )
}

// ============================================================================
// Text to wire
// ============================================================================

struct Parser<'input> {
    tokenizer: Tokenizer<'input>,
    /// Peeked token (for lookahead)
    peeked: Option<Spanned<Token<'input>>>,
    spans: SpanIndex,
}

impl<'input> Parser<'input> {
    fn new(input: &'input [u8]) -> Self {
        Parser {
            tokenizer: Tokenizer::new(input),
            peeked: None,
            spans: SpanIndex::new(),
        }
    }

    /// Peek at the next token without consuming it.
    fn peek(&mut self) -> Result<&Spanned<Token<'input>>> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.tokenizer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    /// Consume and return the next token.
    fn next(&mut self) -> Result<Spanned<Token<'input>>> {
        if let Some(token) = self.peeked.take() {
            Ok(token)
        } else {
            Ok(self.tokenizer.next_token()?)
        }
    }

    fn unexpected(token: &Spanned<Token<'_>>, path: &Path, expected: &str) -> CodecError {
        CodecError::malformed(path, expected, token.node.to_string()).with_span(token.span)
    }

    fn parse_value(&mut self, path: &Path) -> Result<WireValue> {
        let token = self.next()?;
        if matches!(token.node, Token::LBrace | Token::LBracket) && path.depth() >= MAX_DEPTH {
            return Err(too_deep(path).with_span(token.span));
        }
        let (value, span) = match token.node {
            Token::LBrace => self.parse_object(token.span, path)?,
            Token::LBracket => self.parse_array(token.span, path)?,
            Token::String(s) => (WireValue::String(s.into_owned()), token.span),
            Token::I64(n) => (WireValue::I64(n), token.span),
            Token::U64(n) => (WireValue::U64(n), token.span),
            Token::F64(n) => (WireValue::F64(n), token.span),
            Token::True => (WireValue::Bool(true), token.span),
            Token::False => (WireValue::Bool(false), token.span),
            Token::Null => (WireValue::Null, token.span),
            _ => return Err(Self::unexpected(&token, path, "value")),
        };
        self.spans.insert(path.clone(), span);
        Ok(value)
    }

    fn parse_object(&mut self, start: Span, path: &Path) -> Result<(WireValue, Span)> {
        let mut obj = WireObject::new();
        let mut seen = HashSet::new();
        if matches!(self.peek()?.node, Token::RBrace) {
            let end = self.next()?;
            return Ok((WireValue::Object(obj), start.cover(end.span)));
        }
        loop {
            let key_token = self.next()?;
            let Token::String(key) = key_token.node else {
                return Err(Self::unexpected(&key_token, path, "object key"));
            };
            let key = key.into_owned();
            let field_path = path.key(&key);
            if !seen.insert(key.clone()) {
                return Err(CodecError::malformed(
                    &field_path,
                    "unique object keys",
                    alloc::format!("duplicate key `{key}`"),
                )
                .with_span(key_token.span));
            }

            let colon = self.next()?;
            if !matches!(colon.node, Token::Colon) {
                return Err(Self::unexpected(&colon, &field_path, "':'"));
            }
            let value = self.parse_value(&field_path)?;
            obj.push_unchecked(key, value);

            let sep = self.next()?;
            match sep.node {
                Token::Comma => continue,
                Token::RBrace => return Ok((WireValue::Object(obj), start.cover(sep.span))),
                _ => return Err(Self::unexpected(&sep, path, "',' or '}'")),
            }
        }
    }

    fn parse_array(&mut self, start: Span, path: &Path) -> Result<(WireValue, Span)> {
        let mut items = Vec::new();
        if matches!(self.peek()?.node, Token::RBracket) {
            let end = self.next()?;
            return Ok((WireValue::Array(items), start.cover(end.span)));
        }
        loop {
            items.push(self.parse_value(&path.index(items.len()))?);
            let sep = self.next()?;
            match sep.node {
                Token::Comma => continue,
                Token::RBracket => return Ok((WireValue::Array(items), start.cover(sep.span))),
                _ => return Err(Self::unexpected(&sep, path, "',' or ']'")),
            }
        }
    }
}

/// Parses one JSON document, skipping a leading BOM and rejecting trailing data.
pub(crate) fn parse_wire_slice(input: &[u8]) -> Result<(WireValue, SpanIndex)> {
    let offset = if input.starts_with(UTF8_BOM) { UTF8_BOM.len() } else { 0 };
    let shift = |mut e: CodecError| {
        e.span = e.span.map(|s| s.shifted(offset));
        e
    };

    let mut parser = Parser::new(&input[offset..]);
    let wire = parser.parse_value(&Path::root()).map_err(shift)?;

    // Check that we've consumed all input (no trailing data after the root value)
    let trailing = parser.peek().map_err(shift)?;
    if !matches!(trailing.node, Token::Eof) {
        return Err(shift(Parser::unexpected(trailing, &Path::root(), "end of input")));
    }

    let mut spans = parser.spans;
    if offset > 0 {
        for span in spans.values_mut() {
            *span = span.shifted(offset);
        }
    }
    Ok((wire, spans))
}

pub(crate) fn parse_wire_str(input: &str) -> Result<(WireValue, SpanIndex)> {
    parse_wire_slice(input.as_bytes()).map_err(|e| e.with_source(input))
}

/// Points `err` at the closest enclosing value that has a source span.
fn locate(mut err: CodecError, spans: &SpanIndex, source: Option<&str>) -> CodecError {
    if err.span.is_none() {
        let mut cursor = Some(err.path.clone());
        while let Some(path) = cursor {
            if let Some(span) = spans.get(&path) {
                err.span = Some(*span);
                break;
            }
            cursor = path.parent();
        }
    }
    if let Some(src) = source {
        err = err.with_source(src);
    }
    err
}

// ============================================================================
// Wire to value
// ============================================================================

/// Decodes `wire` as type `type_id` with default options.
pub fn decode(schema: &Schema, type_id: TypeId, wire: &WireValue) -> Result<Value> {
    Decoder::new(schema).decode(type_id, wire)
}

/// Decodes JSON text as type `type_id`.
///
/// Errors carry the source text and the span of the offending value, so they
/// render with context through [`miette`].
pub fn from_str(schema: &Schema, type_id: TypeId, input: &str) -> Result<Value> {
    Decoder::new(schema).decode_str(type_id, input)
}

/// Decodes JSON bytes as type `type_id`.
pub fn from_slice(schema: &Schema, type_id: TypeId, input: &[u8]) -> Result<Value> {
    Decoder::new(schema).decode_slice(type_id, input)
}

/// Options for [`Decoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject object keys that match no field (default `false`: ignore them).
    pub deny_unknown_fields: bool,
}

impl DecodeOptions {
    /// Sets [`DecodeOptions::deny_unknown_fields`].
    pub fn deny_unknown_fields(mut self, deny: bool) -> Self {
        self.deny_unknown_fields = deny;
        self
    }
}

/// Turns [`WireValue`]s (or JSON text) into typed values.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'s> {
    schema: &'s Schema,
    options: DecodeOptions,
}

impl<'s> Decoder<'s> {
    /// A decoder with default options.
    pub fn new(schema: &'s Schema) -> Self {
        Decoder {
            schema,
            options: DecodeOptions::default(),
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Decodes `wire` as the record or union `type_id`.
    pub fn decode(&self, type_id: TypeId, wire: &WireValue) -> Result<Value> {
        self.decode_as(&TypeRef::Ref(type_id), wire)
    }

    /// Decodes `wire` as an arbitrary type reference.
    pub fn decode_as(&self, ty: &TypeRef, wire: &WireValue) -> Result<Value> {
        self.decode_value(ty, wire, &Path::root())
    }

    /// Decodes JSON text as type `type_id`.
    pub fn decode_str(&self, type_id: TypeId, input: &str) -> Result<Value> {
        let (wire, spans) = parse_wire_str(input)?;
        self.decode(type_id, &wire)
            .map_err(|e| locate(e, &spans, Some(input)))
    }

    /// Decodes JSON bytes as type `type_id`.
    pub fn decode_slice(&self, type_id: TypeId, input: &[u8]) -> Result<Value> {
        let source = core::str::from_utf8(input).ok();
        let (wire, spans) = parse_wire_slice(input).map_err(|e| match source {
            Some(src) => e.with_source(src),
            None => e,
        })?;
        self.decode(type_id, &wire)
            .map_err(|e| locate(e, &spans, source))
    }

    fn decode_value(&self, ty: &TypeRef, wire: &WireValue, path: &Path) -> Result<Value> {
        if path.depth() > MAX_DEPTH {
            return Err(too_deep(path));
        }
        let value = match (ty, wire) {
            (TypeRef::Nullable(_), WireValue::Null) => Value::Null,
            (TypeRef::Nullable(inner), _) => return self.decode_value(inner, wire, path),
            (TypeRef::Boolean, WireValue::Bool(b)) => Value::Bool(*b),
            (TypeRef::String(c), WireValue::String(s)) => {
                check_string(self.schema, c, s, path)?;
                Value::String(s.clone())
            }
            (TypeRef::Integer(kind, c), WireValue::I64(n)) => {
                integer(*kind, c, (*n).into(), path)?
            }
            (TypeRef::Integer(kind, c), WireValue::U64(n)) => {
                integer(*kind, c, (*n).into(), path)?
            }
            (TypeRef::Float(kind, c), WireValue::F64(_) | WireValue::I64(_) | WireValue::U64(_)) => {
                let n = match wire {
                    WireValue::I64(n) => *n as f64,
                    WireValue::U64(n) => *n as f64,
                    WireValue::F64(n) => *n,
                    _ => f64::NAN,
                };
                check_float(*kind, c, n, path)?;
                Value::Float(n)
            }
            (TypeRef::Binary, WireValue::String(s)) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|e| CodecError::malformed(path, "base64 string", e.to_string()))?;
                Value::Binary(bytes)
            }
            (TypeRef::Timestamp(format), WireValue::String(s)) => {
                let t = validate::parse_timestamp(s, format).map_err(|e| {
                    CodecError::malformed(
                        path,
                        alloc::format!("timestamp in format {format:?}"),
                        alloc::format!("{s:?} ({e})"),
                    )
                })?;
                Value::Timestamp(t)
            }
            (TypeRef::List(item_ty, c), WireValue::Array(items)) => {
                check_list_len(c, items.len(), path)?;
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if item.is_null() {
                        return Err(CodecError::violation(path, Violation::NullItem { index }));
                    }
                    out.push(self.decode_value(item_ty, item, &path.index(index))?);
                }
                Value::List(out)
            }
            (TypeRef::Ref(id), _) => {
                validate::check_type_id(self.schema, *id, path)?;
                match self.schema.type_def(*id) {
                    TypeDef::Record(_) => match wire {
                        WireValue::Object(obj) => Value::Record(self.decode_record(*id, obj, path)?),
                        other => return Err(self.malformed(ty, other, path)),
                    },
                    TypeDef::Union(_) => Value::Union(self.decode_union(*id, wire, path)?),
                }
            }
            (ty, other) => return Err(self.malformed(ty, other, path)),
        };
        Ok(value)
    }

    fn malformed(&self, ty: &TypeRef, wire: &WireValue, path: &Path) -> CodecError {
        let expected = match ty {
            TypeRef::Integer(kind, _) => alloc::format!("{} integer", kind.name()),
            TypeRef::Binary => "base64 string".into(),
            TypeRef::Timestamp(_) => "timestamp string".into(),
            TypeRef::Ref(id) => alloc::format!("{} object", self.schema.type_name(*id)),
            other => validate::describe(self.schema, other),
        };
        let got = match wire {
            WireValue::F64(n) => alloc::format!("number {n}"),
            other => other.kind_name().into(),
        };
        CodecError::malformed(path, expected, got)
    }

    /// Follows the wire tag path down from `expected`, as far as this schema knows it.
    fn resolve_subtype(&self, expected: TypeId, obj: &WireObject, path: &Path) -> Result<TypeId> {
        let schema = self.schema;
        if !schema.is_subtype_tree_member(expected) {
            return Ok(expected);
        }
        let Some(tag_value) = obj.get(TAG_KEY) else {
            return Ok(expected);
        };
        let tag_path = path.key(TAG_KEY);
        let Some(tag) = tag_value.as_str() else {
            return Err(CodecError::malformed(&tag_path, "tag string", tag_value.kind_name()));
        };

        let mut segments = tag.split(TAG_PATH_SEPARATOR);
        for own in schema.tag_path(expected) {
            if segments.next() != Some(own.as_str()) {
                return Err(CodecError::new(
                    ErrorKind::UnrecognizedTag {
                        tag: tag.into(),
                        type_name: schema.type_name(expected).to_string(),
                        suggestion: None,
                    },
                    tag_path,
                ));
            }
        }

        let mut resolved = expected;
        for segment in segments {
            match schema.subtype_for_tag(resolved, segment) {
                Some(child) => resolved = child,
                None => {
                    trace!(
                        "tag path `{tag}` truncated to {} at unknown segment `{segment}`",
                        schema.type_name(resolved)
                    );
                    break;
                }
            }
        }
        trace!("`{tag}` resolved to {}", schema.type_name(resolved));
        Ok(resolved)
    }

    fn unknown_field(&self, key: &str, candidates: Vec<String>, path: &Path) -> CodecError {
        let suggestion = find_similar(key, candidates.iter().map(String::as_str)).map(String::from);
        CodecError::new(
            ErrorKind::UnknownField {
                field: key.into(),
                expected: candidates,
                suggestion,
            },
            path.key(key),
        )
    }

    fn decode_record(&self, expected: TypeId, obj: &WireObject, path: &Path) -> Result<RecordValue> {
        let schema = self.schema;
        let target = self.resolve_subtype(expected, obj, path)?;
        trace!("decoding record {} at {path}", schema.type_name(target));

        let mut record = RecordValue::new(target);
        for (key, wire) in obj.iter() {
            if key == TAG_KEY {
                continue;
            }
            let Some(field) = schema.field(target, key) else {
                if self.options.deny_unknown_fields {
                    let names = schema.linearized_fields(target).map(|f| f.name.clone()).collect();
                    return Err(self.unknown_field(key, names, path));
                }
                trace!("ignoring unknown field `{key}` at {path}");
                continue;
            };
            // null reads as absent; the presence pass below reports or fills it
            if wire.is_null() {
                continue;
            }
            let value = self.decode_value(&field.ty, wire, &path.key(key))?;
            record.set(key, value);
        }

        for field in schema.linearized_fields(target) {
            if record.is_set(&field.name) {
                continue;
            }
            if let Some(default) = &field.default {
                record.set(&field.name, default.clone());
            } else if !field.ty.is_nullable() {
                return Err(CodecError::missing(path, &field.name));
            }
        }
        Ok(record)
    }

    fn decode_union(&self, expected: TypeId, wire: &WireValue, path: &Path) -> Result<UnionValue> {
        let schema = self.schema;
        let (tag, obj, tag_path) = match wire {
            WireValue::String(tag) => (tag.as_str(), None, path.clone()),
            WireValue::Object(obj) => match obj.get(TAG_KEY) {
                Some(WireValue::String(tag)) => (tag.as_str(), Some(obj), path.key(TAG_KEY)),
                Some(other) => {
                    return Err(CodecError::malformed(
                        &path.key(TAG_KEY),
                        "tag string",
                        other.kind_name(),
                    ));
                }
                None => {
                    return Err(CodecError::malformed(
                        path,
                        alloc::format!("object with a `{TAG_KEY}` key"),
                        "object without one",
                    ));
                }
            },
            other => {
                return Err(CodecError::malformed(
                    path,
                    alloc::format!("{} object or tag string", schema.type_name(expected)),
                    other.kind_name(),
                ));
            }
        };

        let Some(variant) = schema.field(expected, tag) else {
            if let Some(catch_all) = schema.catch_all(expected) {
                trace!("unknown tag `{tag}` falls back to `{}`", catch_all.name);
                return Ok(UnionValue::from_parts(expected, catch_all.name.clone(), None, None));
            }
            let suggestion = find_similar(tag, schema.linearized_fields(expected).map(|f| f.name.as_str()))
                .map(String::from);
            return Err(CodecError::new(
                ErrorKind::UnrecognizedTag {
                    tag: tag.into(),
                    type_name: schema.type_name(expected).to_string(),
                    suggestion,
                },
                tag_path,
            ));
        };
        trace!("decoding variant {}.{tag} at {path}", schema.type_name(expected));

        if variant.ty.is_void() {
            if let Some(obj) = obj {
                self.check_union_keys(obj, &[], path)?;
            }
            return Ok(UnionValue::from_parts(expected, tag.into(), None, None));
        }

        let slot = schema.variant_plan(expected).and_then(|plan| plan.slot_of(tag));
        let Some(obj) = obj else {
            // bare tag string: only a nullable payload may be left out
            if variant.ty.is_nullable() {
                return Ok(UnionValue::from_parts(expected, tag.into(), slot, None));
            }
            return Err(CodecError::missing(path, tag));
        };

        let payload = if let Some(record_id) = schema.collapsible_record(&variant.ty) {
            Some(Value::Record(self.decode_record(record_id, obj, path)?))
        } else {
            self.check_union_keys(obj, &[tag], path)?;
            match obj.get(tag) {
                Some(wire) if !wire.is_null() => {
                    Some(self.decode_value(&variant.ty, wire, &path.key(tag))?)
                }
                _ if variant.ty.is_nullable() => None,
                _ => return Err(CodecError::missing(path, tag)),
            }
        };
        Ok(UnionValue::from_parts(expected, tag.into(), slot, payload))
    }

    fn check_union_keys(&self, obj: &WireObject, allowed: &[&str], path: &Path) -> Result<()> {
        if !self.options.deny_unknown_fields {
            return Ok(());
        }
        for (key, _) in obj.iter() {
            if key != TAG_KEY && !allowed.contains(&key) {
                let names = allowed.iter().map(|s| s.to_string()).collect();
                return Err(self.unknown_field(key, names, path));
            }
        }
        Ok(())
    }
}

fn integer(kind: IntegerKind, c: &crate::schema::IntegerConstraints, n: i128, path: &Path) -> Result<Value> {
    check_integer(kind, c, n, path)?;
    let value = if kind.is_unsigned() {
        u64::try_from(n).ok().map(Value::UInt)
    } else {
        i64::try_from(n).ok().map(Value::Int)
    };
    value.ok_or_else(|| CodecError::invalid(path, alloc::format!("{n} does not fit {}", kind.name())))
}
