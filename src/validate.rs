//! Constraint validation of in-memory values.
//!
//! Records are validated ancestor by ancestor, root first, each ancestor
//! checking only its own declared fields. An absent field with a default is
//! filled in with that default, which is trusted and not re-checked (defaults
//! are checked once when the schema is built). That fill is the only way
//! validation changes a value.

use alloc::string::{String, ToString};
use core::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime, ParseError};

use crate::error::{CodecError, ErrorKind, Result, Violation};
use crate::resolve::Schema;
use crate::schema::{
    FloatConstraints, FloatKind, IntegerConstraints, IntegerKind, ListConstraints,
    StringConstraints, TypeDef, TypeId, TypeRef,
};
use crate::value::{RecordValue, UnionValue, Value};
use crate::wire::Path;

/// Validates `value` against `ty`, filling in absent defaulted fields.
pub fn validate(schema: &Schema, ty: &TypeRef, value: &mut Value) -> Result<()> {
    validate_at(schema, ty, value, &Path::root())
}

/// Checks `value` against `ty` without modifying it.
pub(crate) fn check_value(schema: &Schema, ty: &TypeRef, value: &Value) -> Result<()> {
    let mut scratch = value.clone();
    validate_at(schema, ty, &mut scratch, &Path::root())
}

pub(crate) fn validate_at(schema: &Schema, ty: &TypeRef, value: &mut Value, path: &Path) -> Result<()> {
    match (ty, value) {
        (TypeRef::Nullable(_), Value::Null) => Ok(()),
        (TypeRef::Nullable(inner), present) => validate_at(schema, inner, present, path),
        (TypeRef::Void, Value::Null) => Ok(()),
        (TypeRef::Boolean, Value::Bool(_)) => Ok(()),
        (TypeRef::Binary, Value::Binary(_)) => Ok(()),
        (TypeRef::Timestamp(_), Value::Timestamp(_)) => Ok(()),
        (TypeRef::String(c), Value::String(s)) => check_string(schema, c, s, path),
        (TypeRef::Integer(kind, c), Value::Int(n)) => check_integer(*kind, c, (*n).into(), path),
        (TypeRef::Integer(kind, c), Value::UInt(n)) => check_integer(*kind, c, (*n).into(), path),
        (TypeRef::Float(kind, c), Value::Float(n)) => check_float(*kind, c, *n, path),
        (TypeRef::List(item_ty, c), Value::List(items)) => {
            check_list_len(c, items.len(), path)?;
            for (index, item) in items.iter_mut().enumerate() {
                if item.is_null() {
                    return Err(CodecError::violation(path, Violation::NullItem { index }));
                }
                validate_at(schema, item_ty, item, &path.index(index))?;
            }
            Ok(())
        }
        (TypeRef::Ref(id), Value::Record(record)) => validate_record(schema, *id, record, path),
        (TypeRef::Ref(id), Value::Union(union)) => validate_union(schema, *id, union, path),
        (ty, other) => Err(mismatch(schema, ty, other, path)),
    }
}

/// Rejects type ids handed out by some other schema's builder.
pub(crate) fn check_type_id(schema: &Schema, id: TypeId, path: &Path) -> Result<()> {
    if schema.contains(id) {
        Ok(())
    } else {
        Err(CodecError::invalid(
            path,
            alloc::format!("type id {} does not belong to this schema", id.index()),
        ))
    }
}

fn mismatch(schema: &Schema, ty: &TypeRef, value: &Value, path: &Path) -> CodecError {
    CodecError::invalid(
        path,
        alloc::format!("expected {}, got {}", describe(schema, ty), value.kind_name()),
    )
}

/// Like [`TypeRef::describe`], with referenced types named.
pub(crate) fn describe(schema: &Schema, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Ref(id) => schema.type_name(*id).to_string(),
        TypeRef::Nullable(inner) => alloc::format!("nullable {}", describe(schema, inner)),
        TypeRef::List(item, _) => alloc::format!("list of {}", describe(schema, item)),
        other => other.describe(),
    }
}

fn validate_record(schema: &Schema, expected: TypeId, record: &mut RecordValue, path: &Path) -> Result<()> {
    let runtime = record.type_id();
    check_type_id(schema, expected, path)?;
    check_type_id(schema, runtime, path)?;
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
    log::trace!("validating {} at {path}", schema.type_name(runtime));

    for link in schema.ancestor_chain(runtime) {
        for field in schema.type_def(link.type_id).own_fields() {
            let field_path = path.key(&field.name);
            match record.get_mut(&field.name) {
                Some(present) => validate_at(schema, &field.ty, present, &field_path)?,
                None => {
                    if let Some(default) = &field.default {
                        record.set(&field.name, default.clone());
                    } else if !field.ty.is_nullable() {
                        return Err(CodecError::missing(path, &field.name));
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_union(schema: &Schema, expected: TypeId, union: &mut UnionValue, path: &Path) -> Result<()> {
    let runtime = union.type_id();
    check_type_id(schema, expected, path)?;
    check_type_id(schema, runtime, path)?;
    // a parent union's variants are a subset of each child's
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
    let tag = union.tag().to_string();
    let Some(variant) = schema.field(runtime, &tag) else {
        return Err(CodecError::new(
            ErrorKind::UnrecognizedTag {
                tag,
                type_name: schema.type_name(runtime).to_string(),
                suggestion: None,
            },
            path.clone(),
        ));
    };
    log::trace!("validating {}.{tag} at {path}", schema.type_name(runtime));

    let payload_path = path.key(&tag);
    match union.payload_mut() {
        Some(_) if variant.ty.is_void() => Err(CodecError::invalid(
            path,
            alloc::format!("variant `{tag}` carries no payload"),
        )),
        Some(payload) => validate_at(schema, &variant.ty, payload, &payload_path),
        None if variant.ty.is_void() || variant.ty.is_nullable() => Ok(()),
        None => Err(CodecError::missing(path, &tag)),
    }
}

// ============================================================================
// Scalar checks, shared with the decoder
// ============================================================================

pub(crate) fn check_string(schema: &Schema, c: &StringConstraints, s: &str, path: &Path) -> Result<()> {
    if c.min_length.is_some() || c.max_length.is_some() {
        let length = s.chars().count();
        if let Some(min_length) = c.min_length {
            if (length as u64) < min_length {
                return Err(CodecError::violation(path, Violation::TooShort { min_length, length }));
            }
        }
        if let Some(max_length) = c.max_length {
            if (length as u64) > max_length {
                return Err(CodecError::violation(path, Violation::TooLong { max_length, length }));
            }
        }
    }
    if let Some(pattern) = &c.pattern {
        let Some(re) = schema.pattern(pattern) else {
            return Err(CodecError::invalid(
                path,
                alloc::format!("pattern `{pattern}` is not part of this schema"),
            ));
        };
        if !re.is_match(s) {
            return Err(CodecError::violation(
                path,
                Violation::PatternMismatch {
                    pattern: pattern.clone(),
                },
            ));
        }
    }
    Ok(())
}

pub(crate) fn check_integer(kind: IntegerKind, c: &IntegerConstraints, n: i128, path: &Path) -> Result<()> {
    let (lo, hi) = kind.range();
    let min = c.min_value.map_or(lo, |m| m.max(lo));
    let max = c.max_value.map_or(hi, |m| m.min(hi));
    if n < min {
        return Err(CodecError::violation(
            path,
            Violation::BelowMinimum {
                min: min.to_string(),
                actual: n.to_string(),
            },
        ));
    }
    if n > max {
        return Err(CodecError::violation(
            path,
            Violation::AboveMaximum {
                max: max.to_string(),
                actual: n.to_string(),
            },
        ));
    }
    Ok(())
}

pub(crate) fn check_float(kind: FloatKind, c: &FloatConstraints, n: f64, path: &Path) -> Result<()> {
    if !n.is_finite() {
        return Err(CodecError::violation(path, Violation::NotFinite));
    }
    let limit = match kind {
        FloatKind::Float32 => f64::from(f32::MAX),
        FloatKind::Float64 => f64::MAX,
    };
    let min = c.min_value.map_or(-limit, |m| m.max(-limit));
    let max = c.max_value.map_or(limit, |m| m.min(limit));
    if n < min {
        return Err(CodecError::violation(
            path,
            Violation::BelowMinimum {
                min: min.to_string(),
                actual: n.to_string(),
            },
        ));
    }
    if n > max {
        return Err(CodecError::violation(
            path,
            Violation::AboveMaximum {
                max: max.to_string(),
                actual: n.to_string(),
            },
        ));
    }
    Ok(())
}

pub(crate) fn check_list_len(c: &ListConstraints, count: usize, path: &Path) -> Result<()> {
    if let Some(min_items) = c.min_items {
        if (count as u64) < min_items {
            return Err(CodecError::violation(path, Violation::TooFewItems { min_items, count }));
        }
    }
    if let Some(max_items) = c.max_items {
        if (count as u64) > max_items {
            return Err(CodecError::violation(path, Violation::TooManyItems { max_items, count }));
        }
    }
    Ok(())
}

// ============================================================================
// Timestamps
// ============================================================================

/// Renders `t` with `format`, or `None` when the format needs data a naive
/// timestamp does not have (an offset or a zone name).
pub(crate) fn format_timestamp(t: &NaiveDateTime, format: &str) -> Option<String> {
    let mut s = String::new();
    write!(s, "{}", t.format(format)).ok()?;
    Some(s)
}

/// Parses `s` with `format`. A format without a time of day reads as midnight.
pub(crate) fn parse_timestamp(s: &str, format: &str) -> core::result::Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(s, format).or_else(|e| {
        NaiveDate::parse_from_str(s, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, RecordType, SchemaBuilder, UnionType};

    fn limits_schema() -> (Schema, TypeId) {
        let mut b = SchemaBuilder::new();
        let id = b.record(
            "test",
            "Limits",
            RecordType::new()
                .field(Field::new(
                    "code",
                    TypeRef::string_with(StringConstraints::default().max_length(5)),
                ))
                .field(Field::new(
                    "tags",
                    TypeRef::list_with(TypeRef::string(), ListConstraints::default().min_items(1)),
                ))
                .field(Field::new("retries", TypeRef::uint32()).default_value(3u32))
                .field(Field::new("note", TypeRef::string().nullable())),
        );
        (b.build().unwrap(), id)
    }

    fn limits(id: TypeId, code: &str) -> Value {
        RecordValue::new(id)
            .with("code", code)
            .with("tags", vec!["a"])
            .into()
    }

    #[test]
    fn max_length_boundary() {
        let (schema, id) = limits_schema();
        let ty = TypeRef::Ref(id);

        let mut ok = limits(id, "abcde");
        validate(&schema, &ty, &mut ok).unwrap();

        let mut too_long = limits(id, "abcdef");
        let err = validate(&schema, &ty, &mut too_long).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::ConstraintViolation {
                violation: Violation::TooLong {
                    max_length: 5,
                    length: 6
                }
            }
        );
        assert_eq!(err.path.to_string(), "$.code");
    }

    #[test]
    fn length_counts_characters() {
        let (schema, id) = limits_schema();
        let mut v = limits(id, "héllo");
        validate(&schema, &TypeRef::Ref(id), &mut v).unwrap();
    }

    #[test]
    fn empty_list_below_min_items() {
        let (schema, id) = limits_schema();
        let mut v: Value = RecordValue::new(id)
            .with("code", "x")
            .with("tags", Vec::<String>::new())
            .into();
        let err = validate(&schema, &TypeRef::Ref(id), &mut v).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::ConstraintViolation {
                violation: Violation::TooFewItems { min_items: 1, count: 0 }
            }
        ));
    }

    #[test]
    fn null_list_item_is_rejected() {
        let (schema, id) = limits_schema();
        let mut v: Value = RecordValue::new(id)
            .with("code", "x")
            .with("tags", Value::List(vec![Value::from("a"), Value::Null]))
            .into();
        let err = validate(&schema, &TypeRef::Ref(id), &mut v).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::ConstraintViolation {
                violation: Violation::NullItem { index: 1 }
            }
        ));
    }

    #[test]
    fn absent_default_is_filled() {
        let (schema, id) = limits_schema();
        let mut v = limits(id, "x");
        validate(&schema, &TypeRef::Ref(id), &mut v).unwrap();
        let record = v.as_record().unwrap();
        assert_eq!(record.get("retries"), Some(&Value::UInt(3)));
        assert!(!record.is_set("note"));
    }

    #[test]
    fn missing_required_is_reported_before_type_checks() {
        let (schema, id) = limits_schema();
        let mut v: Value = RecordValue::new(id).with("tags", 7).into();
        let err = validate(&schema, &TypeRef::Ref(id), &mut v).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::RequiredValueMissing {
                field: "code".into()
            }
        );
    }

    #[test]
    fn null_counts_as_absent() {
        let (schema, id) = limits_schema();
        let mut v: Value = RecordValue::new(id)
            .with("code", Value::Null)
            .with("tags", vec!["a"])
            .into();
        let err = validate(&schema, &TypeRef::Ref(id), &mut v).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RequiredValueMissing { .. }));
    }

    #[test]
    fn integer_kind_range_applies_without_bounds() {
        let path = Path::root();
        let c = IntegerConstraints::default();
        check_integer(IntegerKind::Int32, &c, i32::MAX.into(), &path).unwrap();
        let err = check_integer(IntegerKind::Int32, &c, i128::from(i32::MAX) + 1, &path).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::ConstraintViolation {
                violation: Violation::AboveMaximum { .. }
            }
        ));
        assert!(check_integer(IntegerKind::UInt64, &c, -1, &path).is_err());
    }

    #[test]
    fn declared_bounds_are_inclusive() {
        let path = Path::root();
        let c = IntegerConstraints::default().min_value(1).max_value(10);
        check_integer(IntegerKind::Int64, &c, 1, &path).unwrap();
        check_integer(IntegerKind::Int64, &c, 10, &path).unwrap();
        assert!(check_integer(IntegerKind::Int64, &c, 0, &path).is_err());
        assert!(check_integer(IntegerKind::Int64, &c, 11, &path).is_err());
    }

    #[test]
    fn floats_must_be_finite() {
        let path = Path::root();
        let c = FloatConstraints::default();
        let err = check_float(FloatKind::Float64, &c, f64::NAN, &path).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::ConstraintViolation {
                violation: Violation::NotFinite
            }
        );
        assert!(check_float(FloatKind::Float32, &c, 1e39, &path).is_err());
        check_float(FloatKind::Float64, &c, 1e39, &path).unwrap();
    }

    #[test]
    fn pattern_must_match_whole_string() {
        let mut b = SchemaBuilder::new();
        let id = b.record(
            "test",
            "Account",
            RecordType::new().field(Field::new(
                "id",
                TypeRef::string_with(StringConstraints::default().pattern("dbid:[0-9]+")),
            )),
        );
        let schema = b.build().unwrap();
        let ty = TypeRef::Ref(id);

        let mut ok: Value = RecordValue::new(id).with("id", "dbid:42").into();
        validate(&schema, &ty, &mut ok).unwrap();

        let mut partial: Value = RecordValue::new(id).with("id", "xdbid:42x").into();
        let err = validate(&schema, &ty, &mut partial).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::ConstraintViolation {
                violation: Violation::PatternMismatch { .. }
            }
        ));
    }

    #[test]
    fn ancestor_fields_are_checked_for_subtype_values() {
        let mut b = SchemaBuilder::new();
        let base = b.declare_record("test", "Base");
        let leaf = b.declare_record("test", "Leaf");
        b.define_record(
            base,
            RecordType::new()
                .field(Field::new("name", TypeRef::string_with(StringConstraints::default().max_length(3))))
                .subtypes([("leaf", leaf)]),
        );
        b.define_record(
            leaf,
            RecordType::new()
                .extends(base)
                .field(Field::new("size", TypeRef::uint64())),
        );
        let schema = b.build().unwrap();

        let mut v: Value = RecordValue::new(leaf)
            .with("name", "toolong")
            .with("size", 1u64)
            .into();
        let err = validate(&schema, &TypeRef::Ref(base), &mut v).unwrap_err();
        assert_eq!(err.path.to_string(), "$.name");

        let mut wrong: Value = RecordValue::new(base).with("name", "ok").into();
        assert!(validate(&schema, &TypeRef::Ref(leaf), &mut wrong).is_err());
    }

    #[test]
    fn union_payload_is_validated() {
        let mut b = SchemaBuilder::new();
        let u = b.union(
            "test",
            "Result",
            UnionType::new()
                .variant(Field::void("ok"))
                .variant(Field::new(
                    "error",
                    TypeRef::string_with(StringConstraints::default().min_length(1)),
                )),
        );
        let schema = b.build().unwrap();
        let ty = TypeRef::Ref(u);

        let mut ok: Value = UnionValue::new(&schema, u, "ok").unwrap().into();
        validate(&schema, &ty, &mut ok).unwrap();

        let mut empty: Value = UnionValue::with_payload(&schema, u, "error", "").unwrap().into();
        let err = validate(&schema, &ty, &mut empty).unwrap_err();
        assert_eq!(err.path.to_string(), "$.error");
    }
}
