//! Typed in-memory values.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use chrono::NaiveDateTime;

use crate::error::{CodecError, ErrorKind, Result};
use crate::plan::SlotId;
use crate::resolve::Schema;
use crate::schema::TypeId;
use crate::wire::Path;

/// A value of some schema type.
///
/// Integers compare by numeric value, so `Int(5) == UInt(5)`.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Float
    Float(f64),
    /// String
    String(String),
    /// Bytes
    Binary(Vec<u8>),
    /// Date and time without zone
    Timestamp(NaiveDateTime),
    /// List
    List(Vec<Value>),
    /// Record instance, tagged with its most specific type
    Record(RecordValue),
    /// Union instance
    Union(UnionValue),
}

impl Value {
    /// Short name of the value's shape, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Union(_) => "union",
        }
    }

    /// `true` for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer value widened to `i128`.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(n) => Some((*n).into()),
            Value::UInt(n) => Some((*n).into()),
            _ => None,
        }
    }

    /// The value as a float; integers convert.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the string if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the elements if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the record if this is one.
    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the union if this is one.
    pub fn as_union(&self) -> Option<&UnionValue> {
        match self {
            Value::Union(u) => Some(u),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(_) | Value::UInt(_), Value::Int(_) | Value::UInt(_)) => {
                self.as_i128() == other.as_i128()
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Union(a), Value::Union(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Timestamp(t)
    }
}

impl From<RecordValue> for Value {
    fn from(r: RecordValue) -> Self {
        Value::Record(r)
    }
}

impl From<UnionValue> for Value {
    fn from(u: UnionValue) -> Self {
        Value::Union(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// A record instance.
///
/// `type_id` is the most specific runtime type. Null fields are not stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    type_id: TypeId,
    fields: BTreeMap<String, Value>,
}

impl RecordValue {
    /// An instance of `type_id` with no fields set.
    pub fn new(type_id: TypeId) -> Self {
        RecordValue {
            type_id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style [`RecordValue::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field. Setting [`Value::Null`] clears it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        match value.into() {
            Value::Null => {
                self.fields.remove(name);
            }
            value => {
                self.fields.insert(name.into(), value);
            }
        }
    }

    /// The field's value, or `None` when absent or null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// `true` when the field holds a non-null value
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The most specific runtime type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// All set fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }
}

/// A union instance: the selected variant and, for variants that carry one,
/// the payload stored in that variant's slot.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionValue {
    type_id: TypeId,
    tag: String,
    slot: Option<SlotId>,
    payload: Option<Box<Value>>,
}

impl UnionValue {
    /// Selects the variant `tag` of `union`, without a payload.
    ///
    /// Fails when `tag` is not a variant, or when the variant requires a payload.
    pub fn new(schema: &Schema, union: TypeId, tag: &str) -> Result<Self> {
        UnionValue::build(schema, union, tag, None)
    }

    /// Selects the variant `tag` of `union` with `payload`.
    ///
    /// [`Value::Null`] is accepted for variants with a nullable payload.
    pub fn with_payload(
        schema: &Schema,
        union: TypeId,
        tag: &str,
        payload: impl Into<Value>,
    ) -> Result<Self> {
        let payload = payload.into();
        let payload = (!payload.is_null()).then_some(payload);
        UnionValue::build(schema, union, tag, payload)
    }

    fn build(schema: &Schema, union: TypeId, tag: &str, payload: Option<Value>) -> Result<Self> {
        crate::validate::check_type_id(schema, union, &Path::root())?;
        if schema.type_def(union).as_union().is_none() {
            return Err(CodecError::invalid(
                &Path::root(),
                alloc::format!("{} is not a union", schema.type_name(union)),
            ));
        }
        let Some(variant) = schema.field(union, tag) else {
            return Err(CodecError::new(
                ErrorKind::UnrecognizedTag {
                    tag: tag.into(),
                    type_name: schema.type_name(union).to_string(),
                    suggestion: None,
                },
                Path::root(),
            ));
        };
        match (&payload, &variant.ty) {
            (Some(_), ty) if ty.is_void() => {
                return Err(CodecError::invalid(
                    &Path::root(),
                    alloc::format!("variant `{tag}` carries no payload"),
                ));
            }
            (None, ty) if !ty.is_void() && !ty.is_nullable() => {
                return Err(CodecError::missing(&Path::root(), tag));
            }
            _ => {}
        }
        let slot = schema.variant_plan(union).and_then(|plan| plan.slot_of(tag));
        Ok(UnionValue::from_parts(union, tag.into(), slot, payload))
    }

    pub(crate) fn from_parts(
        type_id: TypeId,
        tag: String,
        slot: Option<SlotId>,
        payload: Option<Value>,
    ) -> Self {
        UnionValue {
            type_id,
            tag,
            slot,
            payload: payload.map(Box::new),
        }
    }

    /// The union type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The selected variant's tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The storage slot of the selected variant; `None` for payload-free variants.
    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    /// The payload, if the variant has one and it is present.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_deref()
    }

    /// The payload if it lives in `slot`.
    ///
    /// Variants with structurally identical payload types share a slot, so
    /// one accessor serves all of them.
    pub fn payload_in(&self, slot: SlotId) -> Option<&Value> {
        if self.slot == Some(slot) {
            self.payload()
        } else {
            None
        }
    }

    pub(crate) fn payload_mut(&mut self) -> Option<&mut Value> {
        self.payload.as_deref_mut()
    }
}
