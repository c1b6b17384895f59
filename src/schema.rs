//! The schema model: record and union types held in an arena, fields, type
//! references and their constraints.
//!
//! Types are first *declared* (which hands out a stable [`TypeId`]) and then
//! *defined*, so a type can refer to itself or to types defined after it:
//!
//! ```
//! use stone_json::{Field, RecordType, SchemaBuilder, TypeRef};
//!
//! let mut b = SchemaBuilder::new();
//! let node = b.declare_record("tree", "Node");
//! b.define_record(
//!     node,
//!     RecordType::new()
//!         .field(Field::new("label", TypeRef::string()))
//!         .field(Field::new("children", TypeRef::list(TypeRef::reference(node)))),
//! );
//! let schema = b.build().unwrap();
//! assert_eq!(schema.linearized_fields(node).count(), 2);
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::SchemaError;
use crate::resolve::Schema;
use crate::value::Value;

/// Index of a type in the schema arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

impl TypeId {
    /// Position of the type in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Namespace-qualified type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Namespace the type lives in
    pub namespace: String,
    /// Unqualified name
    pub name: String,
}

impl TypeName {
    /// Creates a qualified name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// A named type: a record or a tagged union.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    /// Product type with optional single inheritance
    Record(RecordType),
    /// Tagged union
    Union(UnionType),
}

impl TypeDef {
    /// The qualified name.
    pub fn name(&self) -> &TypeName {
        match self {
            TypeDef::Record(r) => &r.name,
            TypeDef::Union(u) => &u.name,
        }
    }

    /// Fields (records) or variants (unions) declared by this type itself.
    pub fn own_fields(&self) -> &[Field] {
        match self {
            TypeDef::Record(r) => &r.fields,
            TypeDef::Union(u) => &u.variants,
        }
    }

    /// The declared parent, if any.
    pub fn parent(&self) -> Option<TypeId> {
        match self {
            TypeDef::Record(r) => r.parent,
            TypeDef::Union(u) => u.parent,
        }
    }

    /// Documentation string
    pub fn doc(&self) -> &str {
        match self {
            TypeDef::Record(r) => &r.doc,
            TypeDef::Union(u) => &u.doc,
        }
    }

    /// `"record"` or `"union"`
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDef::Record(_) => "record",
            TypeDef::Union(_) => "union",
        }
    }

    /// Returns the record definition if this is one.
    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            TypeDef::Record(r) => Some(r),
            TypeDef::Union(_) => None,
        }
    }

    /// Returns the union definition if this is one.
    pub fn as_union(&self) -> Option<&UnionType> {
        match self {
            TypeDef::Union(u) => Some(u),
            TypeDef::Record(_) => None,
        }
    }
}

/// A record type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordType {
    /// Qualified name, filled in from the declaration
    pub name: TypeName,
    /// Documentation string
    pub doc: String,
    /// Single-inheritance parent
    pub parent: Option<TypeId>,
    /// Locally declared fields, in declaration order
    pub fields: Vec<Field>,
    /// `Some` when this record has enumerated subtypes: `(tag, child)` pairs in order
    pub subtypes: Option<Vec<(String, TypeId)>>,
}

impl Default for TypeName {
    fn default() -> Self {
        TypeName::new("", "")
    }
}

impl RecordType {
    /// An empty record definition.
    pub fn new() -> Self {
        RecordType::default()
    }

    /// Sets the parent type.
    pub fn extends(mut self, parent: TypeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Appends a field.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the enumerated subtypes, in dispatch order.
    pub fn subtypes<S: Into<String>>(mut self, subtypes: impl IntoIterator<Item = (S, TypeId)>) -> Self {
        self.subtypes = Some(
            subtypes
                .into_iter()
                .map(|(tag, id)| (tag.into(), id))
                .collect(),
        );
        self
    }

    /// Sets the documentation string.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// `true` if this record declares enumerated subtypes
    pub fn has_enumerated_subtypes(&self) -> bool {
        self.subtypes.is_some()
    }
}

/// A tagged union type. Each variant is a [`Field`] whose type is the payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnionType {
    /// Qualified name, filled in from the declaration
    pub name: TypeName,
    /// Documentation string
    pub doc: String,
    /// Union whose variants this union extends
    pub parent: Option<TypeId>,
    /// Locally declared variants
    pub variants: Vec<Field>,
}

impl UnionType {
    /// An empty union definition.
    pub fn new() -> Self {
        UnionType::default()
    }

    /// Inherits all variants of `parent`.
    pub fn extends(mut self, parent: TypeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Appends a variant.
    pub fn variant(mut self, variant: Field) -> Self {
        self.variants.push(variant);
        self
    }

    /// Sets the documentation string.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }
}

/// A record field or union variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Wire key (records) or tag (unions)
    pub name: String,
    /// Declared type; [`TypeRef::Void`] for payload-free variants
    pub ty: TypeRef,
    /// Value used when the field is absent
    pub default: Option<Value>,
    /// Documentation string
    pub doc: String,
    /// Marks the union variant returned for unrecognized tags
    pub is_catch_all: bool,
}

impl Field {
    /// A field of type `ty`.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Field {
            name: name.into(),
            ty,
            default: None,
            doc: String::new(),
            is_catch_all: false,
        }
    }

    /// A payload-free union variant.
    pub fn void(name: impl Into<String>) -> Self {
        Field::new(name, TypeRef::Void)
    }

    /// The payload-free catch-all variant of a union.
    pub fn catch_all(name: impl Into<String>) -> Self {
        Field {
            is_catch_all: true,
            ..Field::void(name)
        }
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the documentation string.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Absent values are acceptable: the type is nullable or a default exists.
    pub fn is_optional(&self) -> bool {
        self.ty.is_nullable() || self.default.is_some()
    }

    /// `true` for payload-free variants
    pub fn is_void(&self) -> bool {
        self.ty.is_void()
    }
}

/// Fixed-width integer kinds and their inherent ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerKind {
    /// -2^31 ..= 2^31-1
    Int32,
    /// 0 ..= 2^32-1
    UInt32,
    /// -2^63 ..= 2^63-1
    Int64,
    /// 0 ..= 2^64-1
    UInt64,
}

impl IntegerKind {
    /// The inherent inclusive range.
    pub fn range(self) -> (i128, i128) {
        match self {
            IntegerKind::Int32 => (i32::MIN.into(), i32::MAX.into()),
            IntegerKind::UInt32 => (0, u32::MAX.into()),
            IntegerKind::Int64 => (i64::MIN.into(), i64::MAX.into()),
            IntegerKind::UInt64 => (0, u64::MAX.into()),
        }
    }

    /// `true` for the unsigned kinds
    pub fn is_unsigned(self) -> bool {
        matches!(self, IntegerKind::UInt32 | IntegerKind::UInt64)
    }

    /// Schema-language name of the kind
    pub fn name(self) -> &'static str {
        match self {
            IntegerKind::Int32 => "Int32",
            IntegerKind::UInt32 => "UInt32",
            IntegerKind::Int64 => "Int64",
            IntegerKind::UInt64 => "UInt64",
        }
    }
}

/// Floating point kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    /// Single precision; values must fit an `f32`
    Float32,
    /// Double precision
    Float64,
}

/// Bounds on integer values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegerConstraints {
    /// Inclusive lower bound
    pub min_value: Option<i128>,
    /// Inclusive upper bound
    pub max_value: Option<i128>,
}

impl IntegerConstraints {
    /// Sets the lower bound.
    pub fn min_value(mut self, min: i128) -> Self {
        self.min_value = Some(min);
        self
    }

    /// Sets the upper bound.
    pub fn max_value(mut self, max: i128) -> Self {
        self.max_value = Some(max);
        self
    }
}

/// Bounds on float values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FloatConstraints {
    /// Inclusive lower bound
    pub min_value: Option<f64>,
    /// Inclusive upper bound
    pub max_value: Option<f64>,
}

impl FloatConstraints {
    /// Sets the lower bound.
    pub fn min_value(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    /// Sets the upper bound.
    pub fn max_value(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }
}

/// Bounds on strings. Lengths count Unicode scalar values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringConstraints {
    /// Minimum length
    pub min_length: Option<u64>,
    /// Maximum length
    pub max_length: Option<u64>,
    /// Regular expression the whole string must match
    pub pattern: Option<String>,
}

impl StringConstraints {
    /// Sets the minimum length.
    pub fn min_length(mut self, min: u64) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Sets the maximum length.
    pub fn max_length(mut self, max: u64) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the pattern.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// Bounds on list sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListConstraints {
    /// Minimum element count
    pub min_items: Option<u64>,
    /// Maximum element count
    pub max_items: Option<u64>,
}

impl ListConstraints {
    /// Sets the minimum element count.
    pub fn min_items(mut self, min: u64) -> Self {
        self.min_items = Some(min);
        self
    }

    /// Sets the maximum element count.
    pub fn max_items(mut self, max: u64) -> Self {
        self.max_items = Some(max);
        self
    }
}

/// A reference to a type, with its constraints.
///
/// Equality is structural: two `TypeRef`s are equal when they describe the
/// same type with the same constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// No payload (union variants only)
    Void,
    /// `true` / `false`
    Boolean,
    /// Unicode string
    String(StringConstraints),
    /// Fixed-width integer
    Integer(IntegerKind, IntegerConstraints),
    /// Floating point number
    Float(FloatKind, FloatConstraints),
    /// Bytes, base64 on the wire
    Binary,
    /// Date and time, rendered with the given strftime-style format
    Timestamp(String),
    /// Homogeneous list
    List(Box<TypeRef>, ListConstraints),
    /// A record or union in the schema
    Ref(TypeId),
    /// `null` (absent) is allowed in addition to the inner type
    Nullable(Box<TypeRef>),
}

impl TypeRef {
    /// Unconstrained string
    pub fn string() -> Self {
        TypeRef::String(StringConstraints::default())
    }

    /// Constrained string
    pub fn string_with(constraints: StringConstraints) -> Self {
        TypeRef::String(constraints)
    }

    /// Boolean
    pub fn boolean() -> Self {
        TypeRef::Boolean
    }

    /// Int32 with no bounds beyond its range
    pub fn int32() -> Self {
        TypeRef::Integer(IntegerKind::Int32, IntegerConstraints::default())
    }

    /// UInt32 with no bounds beyond its range
    pub fn uint32() -> Self {
        TypeRef::Integer(IntegerKind::UInt32, IntegerConstraints::default())
    }

    /// Int64 with no bounds beyond its range
    pub fn int64() -> Self {
        TypeRef::Integer(IntegerKind::Int64, IntegerConstraints::default())
    }

    /// UInt64 with no bounds beyond its range
    pub fn uint64() -> Self {
        TypeRef::Integer(IntegerKind::UInt64, IntegerConstraints::default())
    }

    /// Integer with explicit bounds
    pub fn integer_with(kind: IntegerKind, constraints: IntegerConstraints) -> Self {
        TypeRef::Integer(kind, constraints)
    }

    /// Float32
    pub fn float32() -> Self {
        TypeRef::Float(FloatKind::Float32, FloatConstraints::default())
    }

    /// Float64
    pub fn float64() -> Self {
        TypeRef::Float(FloatKind::Float64, FloatConstraints::default())
    }

    /// Float with explicit bounds
    pub fn float_with(kind: FloatKind, constraints: FloatConstraints) -> Self {
        TypeRef::Float(kind, constraints)
    }

    /// Binary blob
    pub fn binary() -> Self {
        TypeRef::Binary
    }

    /// Timestamp using `format` on the wire
    pub fn timestamp(format: impl Into<String>) -> Self {
        TypeRef::Timestamp(format.into())
    }

    /// Unbounded list of `item`
    pub fn list(item: TypeRef) -> Self {
        TypeRef::List(Box::new(item), ListConstraints::default())
    }

    /// Bounded list of `item`
    pub fn list_with(item: TypeRef, constraints: ListConstraints) -> Self {
        TypeRef::List(Box::new(item), constraints)
    }

    /// Reference to a record or union
    pub fn reference(id: TypeId) -> Self {
        TypeRef::Ref(id)
    }

    /// Wraps `self` as nullable. Already-nullable types are returned unchanged.
    pub fn nullable(self) -> Self {
        match self {
            TypeRef::Nullable(_) => self,
            other => TypeRef::Nullable(Box::new(other)),
        }
    }

    /// Strips one `Nullable` layer, reporting whether there was one.
    pub fn unwrap_nullable(&self) -> (&TypeRef, bool) {
        match self {
            TypeRef::Nullable(inner) => (inner, true),
            other => (other, false),
        }
    }

    /// `true` for `Nullable(_)`
    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeRef::Nullable(_))
    }

    /// `true` for `Void`
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// Calls `f` on every type id referenced from this type.
    pub(crate) fn for_each_ref(&self, f: &mut impl FnMut(TypeId)) {
        match self {
            TypeRef::Ref(id) => f(*id),
            TypeRef::List(item, _) | TypeRef::Nullable(item) => item.for_each_ref(f),
            _ => {}
        }
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            TypeRef::Void => "void".into(),
            TypeRef::Boolean => "boolean".into(),
            TypeRef::String(_) => "string".into(),
            TypeRef::Integer(kind, _) => kind.name().into(),
            TypeRef::Float(FloatKind::Float32, _) => "Float32".into(),
            TypeRef::Float(FloatKind::Float64, _) => "Float64".into(),
            TypeRef::Binary => "binary".into(),
            TypeRef::Timestamp(fmt) => alloc::format!("timestamp ({fmt})"),
            TypeRef::List(item, _) => alloc::format!("list of {}", item.describe()),
            TypeRef::Ref(id) => alloc::format!("type #{}", id.0),
            TypeRef::Nullable(inner) => alloc::format!("nullable {}", inner.describe()),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Record,
    Union,
}

impl DeclKind {
    fn name(self) -> &'static str {
        match self {
            DeclKind::Record => "record",
            DeclKind::Union => "union",
        }
    }
}

#[derive(Debug)]
pub(crate) enum Slot {
    Declared(TypeName, DeclKind),
    Defined(TypeDef),
}

/// Collects type declarations and definitions, then resolves them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    pub(crate) slots: Vec<Slot>,
    pub(crate) errors: Vec<SchemaError>,
}

impl SchemaBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        SchemaBuilder::default()
    }

    fn declare(&mut self, namespace: &str, name: &str, kind: DeclKind) -> TypeId {
        let id = TypeId(self.slots.len());
        self.slots
            .push(Slot::Declared(TypeName::new(namespace, name), kind));
        id
    }

    /// Reserves an id for a record defined later with [`SchemaBuilder::define_record`].
    pub fn declare_record(&mut self, namespace: &str, name: &str) -> TypeId {
        self.declare(namespace, name, DeclKind::Record)
    }

    /// Reserves an id for a union defined later with [`SchemaBuilder::define_union`].
    pub fn declare_union(&mut self, namespace: &str, name: &str) -> TypeId {
        self.declare(namespace, name, DeclKind::Union)
    }

    fn take_declaration(&mut self, id: TypeId, kind: DeclKind) -> Option<TypeName> {
        use crate::error::SchemaErrorKind;

        let Some(slot) = self.slots.get(id.0) else {
            self.errors.push(SchemaError::new(SchemaErrorKind::DanglingReference {
                from: "<builder>".into(),
                id: id.0,
            }));
            return None;
        };
        match slot {
            Slot::Declared(name, declared) if *declared == kind => Some(name.clone()),
            Slot::Declared(name, _) => {
                self.errors.push(SchemaError::new(SchemaErrorKind::KindMismatch {
                    name: name.to_string(),
                    expected: kind.name(),
                }));
                None
            }
            Slot::Defined(def) => {
                self.errors
                    .push(SchemaError::new(SchemaErrorKind::AlreadyDefined {
                        name: def.name().to_string(),
                    }));
                None
            }
        }
    }

    /// Supplies the definition of a declared record.
    pub fn define_record(&mut self, id: TypeId, mut record: RecordType) -> &mut Self {
        if let Some(name) = self.take_declaration(id, DeclKind::Record) {
            record.name = name;
            self.slots[id.0] = Slot::Defined(TypeDef::Record(record));
        }
        self
    }

    /// Supplies the definition of a declared union.
    pub fn define_union(&mut self, id: TypeId, mut union: UnionType) -> &mut Self {
        if let Some(name) = self.take_declaration(id, DeclKind::Union) {
            union.name = name;
            self.slots[id.0] = Slot::Defined(TypeDef::Union(union));
        }
        self
    }

    /// Declares and defines a record in one step.
    pub fn record(&mut self, namespace: &str, name: &str, record: RecordType) -> TypeId {
        let id = self.declare_record(namespace, name);
        self.define_record(id, record);
        id
    }

    /// Declares and defines a union in one step.
    pub fn union(&mut self, namespace: &str, name: &str, union: UnionType) -> TypeId {
        let id = self.declare_union(namespace, name);
        self.define_union(id, union);
        id
    }

    /// Resolves every declared type. Fails on the first inconsistency found.
    pub fn build(self) -> Result<Schema, SchemaError> {
        crate::resolve::resolve(self)
    }
}
