//! Encoding: typed values to the tagged wire representation, and wire values
//! to JSON text.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use base64::Engine as _;
use log::trace;

use crate::error::{CodecError, ErrorKind, Result, Violation};
use crate::resolve::Schema;
use crate::schema::{TypeDef, TypeId, TypeRef};
use crate::validate;
use crate::value::{RecordValue, UnionValue, Value};
use crate::wire::{Path, TAG_KEY, TAG_PATH_SEPARATOR, WireObject, WireValue};

/// Encodes `value` as type `type_id` with default options.
pub fn encode(schema: &Schema, type_id: TypeId, value: &Value) -> Result<WireValue> {
    Encoder::new(schema).encode(type_id, value)
}

/// Encodes `value` as type `type_id` to a compact JSON string.
pub fn to_string(schema: &Schema, type_id: TypeId, value: &Value) -> Result<String> {
    let mut out = Vec::new();
    to_writer(schema, type_id, value, &mut out)?;
    Ok(into_string(out))
}

/// Encodes `value` as type `type_id` to a pretty-printed JSON string.
pub fn to_string_pretty(schema: &Schema, type_id: TypeId, value: &Value) -> Result<String> {
    let mut out = Vec::new();
    to_writer_pretty(schema, type_id, value, &mut out)?;
    Ok(into_string(out))
}

/// Encodes `value` as type `type_id` and writes compact JSON to `writer`.
pub fn to_writer<W: crate::JsonWrite>(
    schema: &Schema,
    type_id: TypeId,
    value: &Value,
    mut writer: W,
) -> Result<()> {
    let wire = encode(schema, type_id, value)?;
    write_wire(&wire, &mut writer, None, 0);
    Ok(())
}

/// Encodes `value` as type `type_id` and writes pretty-printed JSON to `writer`.
pub fn to_writer_pretty<W: crate::JsonWrite>(
    schema: &Schema,
    type_id: TypeId,
    value: &Value,
    mut writer: W,
) -> Result<()> {
    let wire = encode(schema, type_id, value)?;
    write_wire(&wire, &mut writer, Some("  "), 0);
    Ok(())
}

fn into_string(out: Vec<u8>) -> String {
    // the writer only emits UTF-8
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Options for [`Encoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Run the constraint validator before encoding (default `true`).
    ///
    /// When off, only the checks encoding cannot do without still run:
    /// required fields must be present and values must have their declared shape.
    pub validate: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions { validate: true }
    }
}

impl EncodeOptions {
    /// Sets [`EncodeOptions::validate`].
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

/// Turns typed values into [`WireValue`]s.
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'s> {
    schema: &'s Schema,
    options: EncodeOptions,
}

impl<'s> Encoder<'s> {
    /// An encoder with default options.
    pub fn new(schema: &'s Schema) -> Self {
        Encoder {
            schema,
            options: EncodeOptions::default(),
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Encodes `value` as the record or union `type_id`.
    pub fn encode(&self, type_id: TypeId, value: &Value) -> Result<WireValue> {
        self.encode_as(&TypeRef::Ref(type_id), value)
    }

    /// Encodes `value` as an arbitrary type reference.
    pub fn encode_as(&self, ty: &TypeRef, value: &Value) -> Result<WireValue> {
        if self.options.validate {
            validate::check_value(self.schema, ty, value)?;
        }
        self.encode_value(ty, value, &Path::root())
    }

    fn encode_value(&self, ty: &TypeRef, value: &Value, path: &Path) -> Result<WireValue> {
        let wire = match (ty, value) {
            (TypeRef::Nullable(_), Value::Null) => WireValue::Null,
            (TypeRef::Nullable(inner), present) => return self.encode_value(inner, present, path),
            (TypeRef::Boolean, Value::Bool(b)) => WireValue::Bool(*b),
            (TypeRef::String(_), Value::String(s)) => WireValue::String(s.clone()),
            (TypeRef::Integer(..), Value::Int(n)) => match u64::try_from(*n) {
                Ok(n) => WireValue::U64(n),
                Err(_) => WireValue::I64(*n),
            },
            (TypeRef::Integer(..), Value::UInt(n)) => WireValue::U64(*n),
            (TypeRef::Float(..), Value::Float(n)) => {
                let n = *n;
                if !n.is_finite() {
                    return Err(CodecError::violation(path, Violation::NotFinite));
                }
                WireValue::F64(n)
            }
            (TypeRef::Binary, Value::Binary(bytes)) => {
                WireValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            (TypeRef::Timestamp(format), Value::Timestamp(t)) => {
                let s = validate::format_timestamp(t, format).ok_or_else(|| {
                    CodecError::invalid(path, alloc::format!("cannot format timestamp with {format:?}"))
                })?;
                WireValue::String(s)
            }
            (TypeRef::List(item_ty, _), Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if item.is_null() {
                        trace!("skipping null item {index} at {path}");
                        continue;
                    }
                    out.push(self.encode_value(item_ty, item, &path.index(index))?);
                }
                WireValue::Array(out)
            }
            (TypeRef::Ref(id), Value::Record(record)) => {
                WireValue::Object(self.encode_record(*id, record, path)?)
            }
            (TypeRef::Ref(id), Value::Union(union)) => {
                WireValue::Object(self.encode_union(*id, union, path)?)
            }
            (ty, other) => {
                return Err(CodecError::invalid(
                    path,
                    alloc::format!(
                        "expected {}, got {}",
                        validate::describe(self.schema, ty),
                        other.kind_name()
                    ),
                ));
            }
        };
        Ok(wire)
    }

    fn encode_record(&self, expected: TypeId, record: &RecordValue, path: &Path) -> Result<WireObject> {
        let schema = self.schema;
        let runtime = record.type_id();
        validate::check_type_id(schema, expected, path)?;
        validate::check_type_id(schema, runtime, path)?;
        if !matches!(schema.type_def(expected), TypeDef::Record(_)) || !schema.is_a(runtime, expected) {
            return Err(CodecError::invalid(
                path,
                alloc::format!(
                    "a {} is not a {}",
                    schema.type_name(runtime),
                    schema.type_name(expected)
                ),
            ));
        }

        // only subtype trees are polymorphic on the wire
        let encode_as = if schema.is_subtype_tree_member(expected) {
            runtime
        } else {
            expected
        };
        trace!("encoding record {} at {path}", schema.type_name(encode_as));

        let mut obj = WireObject::new();
        let tag_path = schema.tag_path(encode_as);
        if !tag_path.is_empty() {
            let mut joined = String::new();
            for (i, tag) in tag_path.iter().enumerate() {
                if i > 0 {
                    joined.push(TAG_PATH_SEPARATOR);
                }
                joined.push_str(tag);
            }
            obj.push_unchecked(TAG_KEY.to_string(), WireValue::String(joined));
        }

        for field in schema.linearized_fields(encode_as) {
            let field_path = path.key(&field.name);
            let value = match (record.get(&field.name), &field.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default,
                (None, None) if field.ty.is_nullable() => continue,
                (None, None) => return Err(CodecError::missing(path, &field.name)),
            };
            let wire = self.encode_value(&field.ty, value, &field_path)?;
            if !wire.is_null() {
                obj.push_unchecked(field.name.clone(), wire);
            }
        }
        Ok(obj)
    }

    fn encode_union(&self, expected: TypeId, union: &UnionValue, path: &Path) -> Result<WireObject> {
        let schema = self.schema;
        let runtime = union.type_id();
        validate::check_type_id(schema, expected, path)?;
        validate::check_type_id(schema, runtime, path)?;
        if !matches!(schema.type_def(expected), TypeDef::Union(_)) || !schema.is_a(expected, runtime) {
            return Err(CodecError::invalid(
                path,
                alloc::format!(
                    "a {} is not a {}",
                    schema.type_name(runtime),
                    schema.type_name(expected)
                ),
            ));
        }
        let tag = union.tag();
        let Some(variant) = schema.field(runtime, tag) else {
            return Err(CodecError::new(
                ErrorKind::UnrecognizedTag {
                    tag: tag.into(),
                    type_name: schema.type_name(runtime).to_string(),
                    suggestion: None,
                },
                path.clone(),
            ));
        };
        trace!("encoding variant {}.{tag} at {path}", schema.type_name(runtime));

        let mut obj = WireObject::new();
        obj.push_unchecked(TAG_KEY.to_string(), WireValue::String(tag.into()));

        let payload = match (union.payload(), &variant.ty) {
            (None, ty) if ty.is_void() || ty.is_nullable() => return Ok(obj),
            (Some(_), ty) if ty.is_void() => {
                return Err(CodecError::invalid(
                    path,
                    alloc::format!("variant `{tag}` carries no payload"),
                ));
            }
            (None, _) => return Err(CodecError::missing(path, tag)),
            (Some(payload), _) => payload,
        };

        match (schema.collapsible_record(&variant.ty), payload) {
            (Some(record_id), Value::Record(record)) => {
                trace!("collapsing {} into {tag}", schema.type_name(record_id));
                let inner = self.encode_record(record_id, record, path)?;
                for (key, value) in inner.iter() {
                    obj.push_unchecked(key.to_string(), value.clone());
                }
            }
            _ => {
                let wire = self.encode_value(&variant.ty, payload, &path.key(tag))?;
                if !wire.is_null() {
                    obj.push_unchecked(tag.to_string(), wire);
                }
            }
        }
        Ok(obj)
    }
}

// ============================================================================
// JSON text
// ============================================================================

/// Write indentation for pretty printing
fn write_indent<W: crate::JsonWrite>(writer: &mut W, indent: Option<&str>, depth: usize) {
    if let Some(indent_str) = indent {
        for _ in 0..depth {
            writer.write(indent_str.as_bytes());
        }
    }
}

/// Write a newline for pretty printing
fn write_newline<W: crate::JsonWrite>(writer: &mut W, indent: Option<&str>) {
    if indent.is_some() {
        writer.write(b"\n");
    }
}

/// Write a space after colon for pretty printing
fn write_colon<W: crate::JsonWrite>(writer: &mut W, indent: Option<&str>) {
    if indent.is_some() {
        writer.write(b": ");
    } else {
        writer.write(b":");
    }
}

/// Writes `wire` as JSON text. Non-finite floats are written as `null`.
pub(crate) fn write_wire<W: crate::JsonWrite>(
    wire: &WireValue,
    writer: &mut W,
    indent: Option<&str>,
    depth: usize,
) {
    match wire {
        WireValue::Null => writer.write(b"null"),
        WireValue::Bool(b) => writer.write(if *b { b"true" } else { b"false" }),
        WireValue::I64(n) => writer.write(itoa::Buffer::new().format(*n).as_bytes()),
        WireValue::U64(n) => writer.write(itoa::Buffer::new().format(*n).as_bytes()),
        WireValue::F64(n) if n.is_finite() => {
            writer.write(ryu::Buffer::new().format_finite(*n).as_bytes())
        }
        WireValue::F64(_) => writer.write(b"null"),
        WireValue::String(s) => crate::write_json_string(writer, s),
        WireValue::Array(items) => {
            writer.write(b"[");
            let mut first = true;
            for item in items {
                if !first {
                    writer.write(b",");
                }
                first = false;
                write_newline(writer, indent);
                write_indent(writer, indent, depth + 1);
                write_wire(item, writer, indent, depth + 1);
            }
            if !first {
                write_newline(writer, indent);
                write_indent(writer, indent, depth);
            }
            writer.write(b"]");
        }
        WireValue::Object(obj) => {
            writer.write(b"{");
            let mut first = true;
            for (key, value) in obj.iter() {
                if !first {
                    writer.write(b",");
                }
                first = false;
                write_newline(writer, indent);
                write_indent(writer, indent, depth + 1);
                crate::write_json_string(writer, key);
                write_colon(writer, indent);
                write_wire(value, writer, indent, depth + 1);
            }
            if !first {
                write_newline(writer, indent);
                write_indent(writer, indent, depth);
            }
            writer.write(b"}");
        }
    }
}
