//! The tagged generic representation: nested objects, arrays and scalars
//! that map one-to-one onto JSON.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// The key every discriminated object uses for its tag.
pub const TAG_KEY: &str = ".tag";

/// Separator between the segments of a subtype tag path.
pub const TAG_PATH_SEPARATOR: char = '.';

/// A JSON-shaped value.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// A negative (or any signed) integer
    I64(i64),
    /// A non-negative integer
    U64(u64),
    /// Any other number
    F64(f64),
    /// A string
    String(String),
    /// An array
    Array(Vec<WireValue>),
    /// An object, with keys kept in insertion order
    Object(WireObject),
}

impl WireValue {
    /// Short name of this value's JSON kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "boolean",
            WireValue::I64(_) | WireValue::U64(_) | WireValue::F64(_) => "number",
            WireValue::String(_) => "string",
            WireValue::Array(_) => "array",
            WireValue::Object(_) => "object",
        }
    }

    /// Returns the object if this is one.
    pub fn as_object(&self) -> Option<&WireObject> {
        match self {
            WireValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the string if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is an array.
    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// `true` for `null`
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        crate::serialize::write_wire(self, &mut out, None, 0);
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

impl core::str::FromStr for WireValue {
    type Err = crate::CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::deserialize::parse_wire_str(s).map(|(wire, _)| wire)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(s.into())
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(s)
    }
}

impl From<WireObject> for WireValue {
    fn from(o: WireObject) -> Self {
        WireValue::Object(o)
    }
}

/// An ordered JSON object.
///
/// Entries keep insertion order; lookups are linear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireObject {
    entries: Vec<(String, WireValue)>,
}

impl WireObject {
    /// Creates an empty object.
    pub fn new() -> Self {
        WireObject::default()
    }

    /// Sets `key` to `value`, replacing in place if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: WireValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Looks up `key`.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// `true` if `key` is present (even when it maps to `null`).
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Reads the `.tag` entry as a string, if present and a string.
    pub fn tag(&self) -> Option<&str> {
        self.get(TAG_KEY).and_then(WireValue::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push_unchecked(&mut self, key: String, value: WireValue) {
        self.entries.push((key, value));
    }
}

impl<K: Into<String>> FromIterator<(K, WireValue)> for WireObject {
    fn from_iter<I: IntoIterator<Item = (K, WireValue)>>(iter: I) -> Self {
        let mut obj = WireObject::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

/// One step from a value into a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object member
    Key(String),
    /// An array element
    Index(usize),
}

/// Location of a value inside a wire document, rendered like `$.entries[2].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The document root
    pub fn root() -> Self {
        Path::default()
    }

    /// This path extended by an object key.
    pub fn key(&self, key: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        Path { segments }
    }

    /// This path extended by an array index.
    pub fn index(&self, index: usize) -> Path {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Path { segments }
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        let (_, rest) = self.segments.split_last()?;
        Some(Path {
            segments: rest.to_vec(),
        })
    }

    /// `true` for the document root
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of steps from the root
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The individual steps of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for seg in &self.segments {
            match seg {
                PathSegment::Key(k) if is_plain_key(k) => write!(f, ".{k}")?,
                PathSegment::Key(k) => write!(f, "[{k:?}]")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

fn is_plain_key(k: &str) -> bool {
    !k.is_empty() && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_display() {
        let p = Path::root().key("entries").index(2).key(".tag");
        assert_eq!(p.to_string(), r#"$.entries[2][".tag"]"#);
        assert_eq!(p.parent().unwrap().to_string(), "$.entries[2]");
        assert_eq!(Path::root().to_string(), "$");
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut o = WireObject::new();
        o.insert("a", WireValue::U64(1));
        o.insert("b", WireValue::U64(2));
        o.insert("a", WireValue::U64(3));
        let keys: Vec<_> = o.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(o.get("a"), Some(&WireValue::U64(3)));
    }
}
