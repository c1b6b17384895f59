//! Error taxonomy for schema construction, validation, encoding and decoding.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display};

use crate::span::Span;
use crate::tokenizer::{TokenError, TokenErrorKind};
use crate::wire::Path;

// ============================================================================
// Codec errors
// ============================================================================

/// Error returned by validation, encoding and decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecError {
    /// The specific kind of error
    pub kind: ErrorKind,
    /// Where in the value or wire document the error was detected
    pub path: Path,
    /// Source span, when decoding from text
    pub span: Option<Span>,
    /// The source input (for diagnostics)
    pub source_code: Option<String>,
}

impl CodecError {
    /// Creates an error at `path` without source information.
    pub fn new(kind: ErrorKind, path: Path) -> Self {
        CodecError {
            kind,
            path,
            span: None,
            source_code: None,
        }
    }

    /// Attaches a source span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attaches source code for rich diagnostics
    pub fn with_source(mut self, source: &str) -> Self {
        self.source_code = Some(source.into());
        self
    }

    pub(crate) fn malformed(path: &Path, expected: impl Into<String>, got: impl Into<String>) -> Self {
        CodecError::new(
            ErrorKind::MalformedWireObject {
                expected: expected.into(),
                got: got.into(),
            },
            path.clone(),
        )
    }

    pub(crate) fn missing(path: &Path, field: &str) -> Self {
        CodecError::new(
            ErrorKind::RequiredValueMissing {
                field: field.into(),
            },
            path.clone(),
        )
    }

    pub(crate) fn violation(path: &Path, violation: Violation) -> Self {
        CodecError::new(ErrorKind::ConstraintViolation { violation }, path.clone())
    }

    pub(crate) fn invalid(path: &Path, message: impl Into<String>) -> Self {
        CodecError::new(
            ErrorKind::InvalidValue {
                message: message.into(),
            },
            path.clone(),
        )
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.path)
    }
}

impl std::error::Error for CodecError {}

impl miette::Diagnostic for CodecError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let suggestion = match &self.kind {
            ErrorKind::UnrecognizedTag { suggestion, .. } => suggestion.as_ref(),
            ErrorKind::UnknownField { suggestion, .. } => suggestion.as_ref(),
            _ => None,
        }?;
        Some(Box::new(alloc::format!("did you mean `{suggestion}`?")))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_code
            .as_ref()
            .map(|s| s as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(core::iter::once(miette::LabeledSpan::new(
            Some(self.kind.label()),
            span.start,
            span.len,
        ))))
    }
}

impl From<TokenError> for CodecError {
    fn from(err: TokenError) -> Self {
        CodecError {
            kind: ErrorKind::Token(err.kind),
            path: Path::root(),
            span: Some(err.span),
            source_code: None,
        }
    }
}

/// Specific error kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// JSON syntax error
    Token(TokenErrorKind),
    /// A range, length, pattern or item-count bound was violated
    ConstraintViolation {
        /// The violated bound
        violation: Violation,
    },
    /// A required field (or required union payload) is absent or null
    RequiredValueMissing {
        /// Name of the missing field or variant
        field: String,
    },
    /// A union tag that matches no variant, with no catch-all to fall back to
    UnrecognizedTag {
        /// The tag as it appeared
        tag: String,
        /// The union or record the tag was resolved against
        type_name: String,
        /// A close known tag, if any
        suggestion: Option<String>,
    },
    /// The wire data has the wrong shape for the expected type
    MalformedWireObject {
        /// What the decoder expected
        expected: String,
        /// What it found instead
        got: String,
    },
    /// A key matching no field, rejected because strict decoding was requested
    UnknownField {
        /// The unknown key
        field: String,
        /// All field names valid here
        expected: Vec<String>,
        /// A close field name, if any
        suggestion: Option<String>,
    },
    /// An in-memory value does not fit its declared type
    InvalidValue {
        /// Description of the mismatch
        message: String,
    },
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Token(e) => write!(f, "{e}"),
            ErrorKind::ConstraintViolation { violation } => {
                write!(f, "constraint violated: {violation}")
            }
            ErrorKind::RequiredValueMissing { field } => {
                write!(f, "missing required value `{field}`")
            }
            ErrorKind::UnrecognizedTag {
                tag,
                type_name,
                suggestion,
            } => {
                write!(f, "unrecognized tag `{tag}` for {type_name}")?;
                if let Some(suggested) = suggestion {
                    write!(f, " (did you mean `{suggested}`?)")?;
                }
                Ok(())
            }
            ErrorKind::MalformedWireObject { expected, got } => {
                write!(f, "malformed wire object: expected {expected}, got {got}")
            }
            ErrorKind::UnknownField {
                field,
                expected,
                suggestion,
            } => {
                write!(f, "unknown field `{field}`, expected one of: {expected:?}")?;
                if let Some(suggested) = suggestion {
                    write!(f, " (did you mean `{suggested}`?)")?;
                }
                Ok(())
            }
            ErrorKind::InvalidValue { message } => write!(f, "invalid value: {message}"),
        }
    }
}

impl ErrorKind {
    /// Get an error code for this kind of error.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Token(_) => "stone_json::token",
            ErrorKind::ConstraintViolation { .. } => "stone_json::constraint_violation",
            ErrorKind::RequiredValueMissing { .. } => "stone_json::required_value_missing",
            ErrorKind::UnrecognizedTag { .. } => "stone_json::unrecognized_tag",
            ErrorKind::MalformedWireObject { .. } => "stone_json::malformed_wire_object",
            ErrorKind::UnknownField { .. } => "stone_json::unknown_field",
            ErrorKind::InvalidValue { .. } => "stone_json::invalid_value",
        }
    }

    /// Get a label describing where/what the error points to.
    pub fn label(&self) -> String {
        match self {
            ErrorKind::Token(e) => match e {
                TokenErrorKind::UnexpectedCharacter(c) => alloc::format!("unexpected '{c}'"),
                TokenErrorKind::UnexpectedEof(ctx) => alloc::format!("unexpected end of input {ctx}"),
                TokenErrorKind::InvalidUtf8(_) => "invalid UTF-8 here".into(),
                TokenErrorKind::NumberOutOfRange(_) => "number out of range".into(),
            },
            ErrorKind::ConstraintViolation { violation } => violation.to_string(),
            ErrorKind::RequiredValueMissing { field } => {
                alloc::format!("object has no value for `{field}`")
            }
            ErrorKind::UnrecognizedTag { tag, .. } => alloc::format!("unknown tag '{tag}'"),
            ErrorKind::MalformedWireObject { expected, got } => {
                alloc::format!("expected {expected}, got {got}")
            }
            ErrorKind::UnknownField {
                field, suggestion, ..
            } => match suggestion {
                Some(suggested) => {
                    alloc::format!("unknown field '{field}' - did you mean '{suggested}'?")
                }
                None => alloc::format!("unknown field '{field}'"),
            },
            ErrorKind::InvalidValue { .. } => "invalid value".into(),
        }
    }
}

/// The bound a [`ErrorKind::ConstraintViolation`] failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Number below `min_value` (or the kind's inherent minimum)
    BelowMinimum {
        /// The bound
        min: String,
        /// The offending value
        actual: String,
    },
    /// Number above `max_value` (or the kind's inherent maximum)
    AboveMaximum {
        /// The bound
        max: String,
        /// The offending value
        actual: String,
    },
    /// String shorter than `min_length`
    TooShort {
        /// The bound
        min_length: u64,
        /// Actual length in characters
        length: usize,
    },
    /// String longer than `max_length`
    TooLong {
        /// The bound
        max_length: u64,
        /// Actual length in characters
        length: usize,
    },
    /// String did not fully match `pattern`
    PatternMismatch {
        /// The declared pattern
        pattern: String,
    },
    /// List with fewer than `min_items` elements
    TooFewItems {
        /// The bound
        min_items: u64,
        /// Actual element count
        count: usize,
    },
    /// List with more than `max_items` elements
    TooManyItems {
        /// The bound
        max_items: u64,
        /// Actual element count
        count: usize,
    },
    /// A list element was null
    NullItem {
        /// Position of the null element
        index: usize,
    },
    /// A float that is NaN or infinite
    NotFinite,
}

impl Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::BelowMinimum { min, actual } => {
                write!(f, "{actual} is less than the minimum {min}")
            }
            Violation::AboveMaximum { max, actual } => {
                write!(f, "{actual} is greater than the maximum {max}")
            }
            Violation::TooShort { min_length, length } => {
                write!(f, "length {length} is shorter than min_length {min_length}")
            }
            Violation::TooLong { max_length, length } => {
                write!(f, "length {length} is longer than max_length {max_length}")
            }
            Violation::PatternMismatch { pattern } => {
                write!(f, "does not match pattern `{pattern}`")
            }
            Violation::TooFewItems { min_items, count } => {
                write!(f, "{count} items is fewer than min_items {min_items}")
            }
            Violation::TooManyItems { max_items, count } => {
                write!(f, "{count} items is more than max_items {max_items}")
            }
            Violation::NullItem { index } => write!(f, "list item {index} is null"),
            Violation::NotFinite => write!(f, "number is not finite"),
        }
    }
}

/// Result type for validation, encoding and decoding
pub type Result<T> = core::result::Result<T, CodecError>;

// ============================================================================
// Schema construction errors
// ============================================================================

/// A schema that cannot be resolved. Raised once, by [`crate::SchemaBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// What is wrong with the schema
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    pub(crate) fn new(kind: SchemaErrorKind) -> Self {
        SchemaError { kind }
    }
}

/// The ways a schema can be inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaErrorKind {
    /// A type was declared but never defined
    UndefinedType {
        /// The declared name
        name: String,
    },
    /// A reference to a type id the builder never handed out
    DanglingReference {
        /// The type holding the reference
        from: String,
        /// The unknown id
        id: usize,
    },
    /// Two types share a qualified name
    DuplicateTypeName {
        /// The shared name
        name: String,
    },
    /// A declared type was given a definition twice
    AlreadyDefined {
        /// The type in question
        name: String,
    },
    /// A type was defined, extended or referenced as the wrong kind
    KindMismatch {
        /// The type in question
        name: String,
        /// The kind that was required
        expected: &'static str,
    },
    /// Following `parent_type` links returns to the starting type
    CyclicParent {
        /// A type on the cycle
        name: String,
    },
    /// A field name is declared twice along an ancestor chain
    DuplicateField {
        /// The type whose linearized fields collide
        type_name: String,
        /// The colliding name
        field: String,
    },
    /// A record extends a parent with enumerated subtypes without being listed
    SubtypeNotEnumerated {
        /// The unlisted child
        child: String,
        /// The parent
        parent: String,
    },
    /// An enumerated subtype does not declare the enumerating type as its parent
    SubtypeParentMismatch {
        /// The enumerating type
        parent: String,
        /// The listed child
        child: String,
    },
    /// A subtype tag or subtype appears twice in one list
    DuplicateSubtype {
        /// The enumerating type
        parent: String,
        /// The repeated tag or type name
        entry: String,
    },
    /// A record extends a member of a subtype tree that enumerates no subtypes
    ExtendsSubtypeLeaf {
        /// The extending record
        child: String,
        /// The leaf being extended
        parent: String,
    },
    /// A field name or tag is empty or uses reserved characters
    InvalidName {
        /// The owning type
        owner: String,
        /// The rejected name
        name: String,
    },
    /// More than one catch-all variant along a union's ancestor chain
    MultipleCatchAll {
        /// The union
        union: String,
    },
    /// A catch-all variant that is not payload-free, or one declared on a record
    InvalidCatchAll {
        /// The owning type
        type_name: String,
        /// The field
        field: String,
    },
    /// `void` used for a record field
    VoidField {
        /// The record
        type_name: String,
        /// The field
        field: String,
    },
    /// A constraint that can never be satisfied or exceeds the kind's range
    InvalidConstraint {
        /// `Type.field`
        owner: String,
        /// What is wrong
        message: String,
    },
    /// A string pattern that does not compile
    InvalidPattern {
        /// The pattern
        pattern: String,
        /// The regex engine's complaint
        message: String,
    },
    /// A default value that does not satisfy its field's type
    InvalidDefault {
        /// `Type.field`
        owner: String,
        /// Why the default was rejected
        message: String,
    },
    /// A nullable field that also declares a default
    NullableDefault {
        /// `Type.field`
        owner: String,
    },
}

impl Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaErrorKind::UndefinedType { name } => {
                write!(f, "type `{name}` is declared but never defined")
            }
            SchemaErrorKind::DanglingReference { from, id } => {
                write!(f, "`{from}` references unknown type id {id}")
            }
            SchemaErrorKind::DuplicateTypeName { name } => {
                write!(f, "type `{name}` is defined more than once")
            }
            SchemaErrorKind::AlreadyDefined { name } => {
                write!(f, "type `{name}` was already given a definition")
            }
            SchemaErrorKind::KindMismatch { name, expected } => {
                write!(f, "type `{name}` is used as a {expected} but is not one")
            }
            SchemaErrorKind::CyclicParent { name } => {
                write!(f, "type `{name}` is its own ancestor")
            }
            SchemaErrorKind::DuplicateField { type_name, field } => {
                write!(f, "field `{field}` of `{type_name}` collides with an ancestor's field")
            }
            SchemaErrorKind::SubtypeNotEnumerated { child, parent } => {
                write!(f, "`{child}` extends `{parent}` but is not among its enumerated subtypes")
            }
            SchemaErrorKind::SubtypeParentMismatch { parent, child } => {
                write!(f, "`{parent}` enumerates `{child}`, which does not extend it")
            }
            SchemaErrorKind::DuplicateSubtype { parent, entry } => {
                write!(f, "`{parent}` enumerates `{entry}` more than once")
            }
            SchemaErrorKind::ExtendsSubtypeLeaf { child, parent } => {
                write!(f, "`{child}` extends `{parent}`, a subtype that enumerates no subtypes")
            }
            SchemaErrorKind::InvalidName { owner, name } => {
                write!(f, "`{owner}` declares invalid name {name:?}")
            }
            SchemaErrorKind::MultipleCatchAll { union } => {
                write!(f, "union `{union}` has more than one catch-all variant")
            }
            SchemaErrorKind::InvalidCatchAll { type_name, field } => {
                write!(f, "`{type_name}.{field}` cannot be a catch-all variant")
            }
            SchemaErrorKind::VoidField { type_name, field } => {
                write!(f, "record field `{type_name}.{field}` cannot be void")
            }
            SchemaErrorKind::InvalidConstraint { owner, message } => {
                write!(f, "invalid constraint on `{owner}`: {message}")
            }
            SchemaErrorKind::InvalidPattern { pattern, message } => {
                write!(f, "pattern `{pattern}` does not compile: {message}")
            }
            SchemaErrorKind::InvalidDefault { owner, message } => {
                write!(f, "default for `{owner}` is invalid: {message}")
            }
            SchemaErrorKind::NullableDefault { owner } => {
                write!(f, "nullable field `{owner}` cannot declare a default")
            }
        }
    }
}

impl SchemaErrorKind {
    /// Get an error code for this kind of error.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorKind::UndefinedType { .. } => "stone_json::schema::undefined_type",
            SchemaErrorKind::DanglingReference { .. } => "stone_json::schema::dangling_reference",
            SchemaErrorKind::DuplicateTypeName { .. } => "stone_json::schema::duplicate_type_name",
            SchemaErrorKind::AlreadyDefined { .. } => "stone_json::schema::already_defined",
            SchemaErrorKind::KindMismatch { .. } => "stone_json::schema::kind_mismatch",
            SchemaErrorKind::CyclicParent { .. } => "stone_json::schema::cyclic_parent",
            SchemaErrorKind::DuplicateField { .. } => "stone_json::schema::duplicate_field",
            SchemaErrorKind::SubtypeNotEnumerated { .. } => {
                "stone_json::schema::subtype_not_enumerated"
            }
            SchemaErrorKind::SubtypeParentMismatch { .. } => {
                "stone_json::schema::subtype_parent_mismatch"
            }
            SchemaErrorKind::DuplicateSubtype { .. } => "stone_json::schema::duplicate_subtype",
            SchemaErrorKind::ExtendsSubtypeLeaf { .. } => {
                "stone_json::schema::extends_subtype_leaf"
            }
            SchemaErrorKind::InvalidName { .. } => "stone_json::schema::invalid_name",
            SchemaErrorKind::MultipleCatchAll { .. } => "stone_json::schema::multiple_catch_all",
            SchemaErrorKind::InvalidCatchAll { .. } => "stone_json::schema::invalid_catch_all",
            SchemaErrorKind::VoidField { .. } => "stone_json::schema::void_field",
            SchemaErrorKind::InvalidConstraint { .. } => "stone_json::schema::invalid_constraint",
            SchemaErrorKind::InvalidPattern { .. } => "stone_json::schema::invalid_pattern",
            SchemaErrorKind::InvalidDefault { .. } => "stone_json::schema::invalid_default",
            SchemaErrorKind::NullableDefault { .. } => "stone_json::schema::nullable_default",
        }
    }
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for SchemaError {}

impl miette::Diagnostic for SchemaError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }
}

/// Find the best matching name from a list of candidates.
/// Returns Some(suggestion) if a match with similarity >= 0.6 is found.
pub(crate) fn find_similar<'a>(unknown: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut best_match: Option<(&'a str, f64)> = None;

    for candidate in candidates {
        let similarity = strsim::jaro_winkler(unknown, candidate);
        if similarity >= 0.6 && best_match.is_none_or(|(_, best_sim)| similarity > best_sim) {
            best_match = Some((candidate, similarity));
        }
    }

    best_match.map(|(name, _)| name)
}
