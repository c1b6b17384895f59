//! Type resolution: turns the builder's arena into an immutable [`Schema`]
//! with everything the codec looks up per call precomputed once.
//!
//! For every type this records the linearized field list (ancestors first),
//! the ancestor chain with the discriminator tag of each link, the one-level
//! subtype dispatch table, and for unions the variant storage plan and the
//! catch-all variant.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::collections::HashMap;

use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;

use crate::error::{SchemaError, SchemaErrorKind};
use crate::plan::VariantPlan;
use crate::validate;
use crate::schema::{Field, FloatKind, SchemaBuilder, Slot, TypeDef, TypeId, TypeName, TypeRef};

/// One link of an ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// Tag by which the previous link's enumerated subtypes select this type;
    /// `None` for the root and for plain (non-enumerated) inheritance
    pub tag: Option<String>,
    /// The type at this link
    pub type_id: TypeId,
}

#[derive(Debug, Clone, Copy)]
struct FieldRef {
    owner: TypeId,
    index: usize,
}

#[derive(Debug, Default)]
struct Resolved {
    fields: Vec<FieldRef>,
    field_index: HashMap<String, usize>,
    chain: Vec<ChainLink>,
    tag_path: Vec<String>,
    subtypes: HashMap<String, TypeId>,
    in_tree: bool,
    plan: Option<VariantPlan>,
    catch_all: Option<FieldRef>,
}

/// A resolved, immutable schema.
///
/// Built once by [`SchemaBuilder::build`]; every query is a lookup into
/// tables computed at build time. `Schema` is `Send + Sync` and is meant to be
/// shared (for example from a `static` or an `Arc`) for the life of the process.
#[derive(Debug)]
pub struct Schema {
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeId>,
    resolved: Vec<Resolved>,
    patterns: HashMap<String, Regex>,
}

impl Schema {
    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// `true` for a schema with no types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `true` when `id` names a type of this schema.
    pub fn contains(&self, id: TypeId) -> bool {
        id.0 < self.types.len()
    }

    /// The definition of `id`.
    ///
    /// # Panics
    ///
    /// If `id` was not handed out by the builder of this schema.
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    /// The qualified name of `id`.
    pub fn type_name(&self, id: TypeId) -> &TypeName {
        self.types[id.0].name()
    }

    /// Looks a type up by qualified name (`namespace.Name`).
    pub fn lookup(&self, qualified_name: &str) -> Option<TypeId> {
        self.by_name.get(qualified_name).copied()
    }

    /// Every type id, in declaration order.
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }

    fn field_at(&self, r: FieldRef) -> &Field {
        &self.types[r.owner.0].own_fields()[r.index]
    }

    /// All fields (or variants) of `id`, ancestors' first, root first.
    pub fn linearized_fields(&self, id: TypeId) -> impl ExactSizeIterator<Item = &Field> + '_ {
        self.resolved[id.0]
            .fields
            .iter()
            .map(move |r| self.field_at(*r))
    }

    /// Looks up a field or variant of `id` (own or inherited) by name.
    pub fn field(&self, id: TypeId, name: &str) -> Option<&Field> {
        let resolved = &self.resolved[id.0];
        let idx = *resolved.field_index.get(name)?;
        Some(self.field_at(resolved.fields[idx]))
    }

    /// Path from the root of `id`'s ancestry down to `id` itself.
    pub fn ancestor_chain(&self, id: TypeId) -> &[ChainLink] {
        &self.resolved[id.0].chain
    }

    /// The non-null tags of the ancestor chain, root to `id`.
    pub fn tag_path(&self, id: TypeId) -> &[String] {
        &self.resolved[id.0].tag_path
    }

    /// One level of discriminator lookup among `parent`'s enumerated subtypes.
    pub fn subtype_for_tag(&self, parent: TypeId, tag: &str) -> Option<TypeId> {
        self.resolved[parent.0].subtypes.get(tag).copied()
    }

    /// `true` when `id` declares enumerated subtypes
    pub fn has_enumerated_subtypes(&self, id: TypeId) -> bool {
        self.types[id.0]
            .as_record()
            .is_some_and(|r| r.has_enumerated_subtypes())
    }

    /// `true` when `id` is the root, an interior node or a leaf of an enumerated-subtype tree.
    pub fn is_subtype_tree_member(&self, id: TypeId) -> bool {
        self.resolved[id.0].in_tree
    }

    /// `true` when `ancestor` is `id` or one of its ancestors.
    pub fn is_a(&self, id: TypeId, ancestor: TypeId) -> bool {
        self.resolved[id.0]
            .chain
            .iter()
            .any(|link| link.type_id == ancestor)
    }

    /// The storage plan of a union.
    pub fn variant_plan(&self, id: TypeId) -> Option<&VariantPlan> {
        self.resolved[id.0].plan.as_ref()
    }

    /// The catch-all variant of a union (own or inherited).
    pub fn catch_all(&self, id: TypeId) -> Option<&Field> {
        self.resolved[id.0].catch_all.map(|r| self.field_at(r))
    }

    /// Variants of a union that carry no payload.
    pub fn payload_free_variants(&self, id: TypeId) -> impl Iterator<Item = &Field> + '_ {
        self.linearized_fields(id).filter(|f| f.is_void())
    }

    /// If `ty` refers to a plain record (one outside any subtype tree), that
    /// record. Union payloads of such records are collapsed into the union's
    /// own wire object.
    pub fn collapsible_record(&self, ty: &TypeRef) -> Option<TypeId> {
        match ty {
            TypeRef::Ref(id) if self.types[id.0].as_record().is_some() && !self.resolved[id.0].in_tree => {
                Some(*id)
            }
            _ => None,
        }
    }

    /// The compiled, anchored regex for a declared string pattern.
    pub fn pattern(&self, pattern: &str) -> Option<&Regex> {
        self.patterns.get(pattern)
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn err(kind: SchemaErrorKind) -> SchemaError {
    SchemaError::new(kind)
}

pub(crate) fn resolve(builder: SchemaBuilder) -> Result<Schema, SchemaError> {
    if let Some(first) = builder.errors.into_iter().next() {
        return Err(first);
    }

    let mut types = Vec::with_capacity(builder.slots.len());
    for slot in builder.slots {
        match slot {
            Slot::Declared(name, _) => {
                return Err(err(SchemaErrorKind::UndefinedType {
                    name: name.to_string(),
                }));
            }
            Slot::Defined(def) => types.push(def),
        }
    }

    let mut by_name = HashMap::with_capacity(types.len());
    for (i, def) in types.iter().enumerate() {
        let name = def.name().to_string();
        if by_name.insert(name.clone(), TypeId(i)).is_some() {
            return Err(err(SchemaErrorKind::DuplicateTypeName { name }));
        }
    }

    check_references(&types)?;
    check_parent_cycles(&types)?;
    check_subtype_lists(&types)?;

    let chains = build_chains(&types)?;
    let mut resolved = Vec::with_capacity(types.len());
    for (i, chain) in chains.into_iter().enumerate() {
        resolved.push(resolve_one(&types, TypeId(i), chain)?);
    }

    let mut patterns = HashMap::new();
    for def in &types {
        for field in def.own_fields() {
            check_field(def, field, &mut patterns)?;
        }
    }

    let schema = Schema {
        types,
        by_name,
        resolved,
        patterns,
    };
    check_defaults(&schema)?;

    log::debug!(
        "resolved schema: {} types, {} union slots",
        schema.types.len(),
        schema
            .resolved
            .iter()
            .filter_map(|r| r.plan.as_ref())
            .map(|p| p.slots().len())
            .sum::<usize>()
    );
    Ok(schema)
}

fn check_references(types: &[TypeDef]) -> Result<(), SchemaError> {
    let lookup = |from: &TypeDef, id: TypeId| -> Result<&TypeDef, SchemaError> {
        types.get(id.0).ok_or_else(|| {
            err(SchemaErrorKind::DanglingReference {
                from: from.name().to_string(),
                id: id.0,
            })
        })
    };

    for def in types {
        if let Some(parent) = def.parent() {
            let parent_def = lookup(def, parent)?;
            if parent_def.kind_name() != def.kind_name() {
                return Err(err(SchemaErrorKind::KindMismatch {
                    name: parent_def.name().to_string(),
                    expected: def.kind_name(),
                }));
            }
        }
        if let Some(subtypes) = def.as_record().and_then(|r| r.subtypes.as_ref()) {
            for (_, child) in subtypes {
                if lookup(def, *child)?.as_record().is_none() {
                    return Err(err(SchemaErrorKind::KindMismatch {
                        name: types[child.0].name().to_string(),
                        expected: "record",
                    }));
                }
            }
        }
        for field in def.own_fields() {
            let mut result = Ok(());
            field.ty.for_each_ref(&mut |id| {
                if result.is_ok() {
                    result = lookup(def, id).map(|_| ());
                }
            });
            result?;
        }
    }
    Ok(())
}

fn check_parent_cycles(types: &[TypeDef]) -> Result<(), SchemaError> {
    for (i, def) in types.iter().enumerate() {
        let mut cursor = def.parent();
        let mut steps = 0;
        while let Some(p) = cursor {
            steps += 1;
            if p.0 == i || steps > types.len() {
                return Err(err(SchemaErrorKind::CyclicParent {
                    name: def.name().to_string(),
                }));
            }
            cursor = types[p.0].parent();
        }
    }
    Ok(())
}

fn check_subtype_lists(types: &[TypeDef]) -> Result<(), SchemaError> {
    for (i, def) in types.iter().enumerate() {
        let Some(record) = def.as_record() else {
            continue;
        };
        if let Some(subtypes) = &record.subtypes {
            let parent_name = record.name.to_string();
            let mut seen_tags: Vec<&str> = Vec::new();
            let mut seen_children: Vec<TypeId> = Vec::new();
            for (tag, child) in subtypes {
                if !is_valid_name(tag) {
                    return Err(err(SchemaErrorKind::InvalidName {
                        owner: parent_name,
                        name: tag.clone(),
                    }));
                }
                if seen_tags.contains(&tag.as_str()) {
                    return Err(err(SchemaErrorKind::DuplicateSubtype {
                        parent: parent_name,
                        entry: tag.clone(),
                    }));
                }
                if seen_children.contains(child) {
                    return Err(err(SchemaErrorKind::DuplicateSubtype {
                        parent: parent_name,
                        entry: types[child.0].name().to_string(),
                    }));
                }
                if types[child.0].parent() != Some(TypeId(i)) {
                    return Err(err(SchemaErrorKind::SubtypeParentMismatch {
                        parent: parent_name,
                        child: types[child.0].name().to_string(),
                    }));
                }
                seen_tags.push(tag);
                seen_children.push(*child);
            }
        }

        if let Some(parent) = record.parent {
            let parent_def = &types[parent.0];
            let enumerated = parent_def
                .as_record()
                .and_then(|p| p.subtypes.as_ref())
                .map(|subs| subs.iter().any(|(_, c)| c.0 == i));
            if enumerated == Some(false) {
                return Err(err(SchemaErrorKind::SubtypeNotEnumerated {
                    child: record.name.to_string(),
                    parent: parent_def.name().to_string(),
                }));
            }
        }
    }
    Ok(())
}

/// Ancestor chains for every type. Parents are known to be acyclic.
fn build_chains(types: &[TypeDef]) -> Result<Vec<Vec<ChainLink>>, SchemaError> {
    let mut chains: Vec<Vec<ChainLink>> = Vec::with_capacity(types.len());
    for (i, def) in types.iter().enumerate() {
        let mut lineage = alloc::vec![TypeId(i)];
        let mut cursor = def.parent();
        while let Some(p) = cursor {
            lineage.push(p);
            cursor = types[p.0].parent();
        }
        lineage.reverse();

        let mut chain = Vec::with_capacity(lineage.len());
        let mut prev: Option<TypeId> = None;
        for id in lineage {
            let tag = prev.and_then(|p| {
                types[p.0]
                    .as_record()
                    .and_then(|r| r.subtypes.as_ref())
                    .and_then(|subs| subs.iter().find(|(_, c)| *c == id))
                    .map(|(tag, _)| tag.clone())
            });
            chain.push(ChainLink { tag, type_id: id });
            prev = Some(id);
        }
        chains.push(chain);
    }

    // extending a subtype-tree member requires it to enumerate its children
    for (i, def) in types.iter().enumerate() {
        let Some(parent) = def.parent() else {
            continue;
        };
        let parent_in_tree = chains[parent.0].iter().any(|l| l.tag.is_some());
        let parent_enumerates = types[parent.0]
            .as_record()
            .is_some_and(|r| r.has_enumerated_subtypes());
        if parent_in_tree && !parent_enumerates {
            return Err(err(SchemaErrorKind::ExtendsSubtypeLeaf {
                child: types[i].name().to_string(),
                parent: types[parent.0].name().to_string(),
            }));
        }
    }
    Ok(chains)
}

fn resolve_one(types: &[TypeDef], id: TypeId, chain: Vec<ChainLink>) -> Result<Resolved, SchemaError> {
    let def = &types[id.0];
    let mut resolved = Resolved::default();

    for link in &chain {
        for (index, field) in types[link.type_id.0].own_fields().iter().enumerate() {
            let position = resolved.fields.len();
            if resolved
                .field_index
                .insert(field.name.clone(), position)
                .is_some()
            {
                return Err(err(SchemaErrorKind::DuplicateField {
                    type_name: def.name().to_string(),
                    field: field.name.clone(),
                }));
            }
            resolved.fields.push(FieldRef {
                owner: link.type_id,
                index,
            });
        }
    }

    resolved.tag_path = chain.iter().filter_map(|l| l.tag.clone()).collect();
    resolved.in_tree = !resolved.tag_path.is_empty()
        || def.as_record().is_some_and(|r| r.has_enumerated_subtypes());
    if let Some(subtypes) = def.as_record().and_then(|r| r.subtypes.as_ref()) {
        resolved.subtypes = subtypes.iter().cloned().collect();
    }
    resolved.chain = chain;

    if def.as_union().is_some() {
        let variants = resolved.fields.iter().map(|r| &types[r.owner.0].own_fields()[r.index]);
        resolved.plan = Some(VariantPlan::plan(variants));

        let mut catch_alls = resolved.fields.iter().filter(|r| {
            types[r.owner.0].own_fields()[r.index].is_catch_all
        });
        resolved.catch_all = catch_alls.next().copied();
        if catch_alls.next().is_some() {
            return Err(err(SchemaErrorKind::MultipleCatchAll {
                union: def.name().to_string(),
            }));
        }
    }
    Ok(resolved)
}

/// Field and tag names: non-empty, no `.` (reserved for tag paths and `.tag`).
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

fn check_field(
    def: &TypeDef,
    field: &Field,
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), SchemaError> {
    let type_name = def.name().to_string();
    if !is_valid_name(&field.name) {
        return Err(err(SchemaErrorKind::InvalidName {
            owner: type_name,
            name: field.name.clone(),
        }));
    }
    let is_union = def.as_union().is_some();
    if field.ty.is_void() && !is_union {
        return Err(err(SchemaErrorKind::VoidField {
            type_name,
            field: field.name.clone(),
        }));
    }
    if field.is_catch_all && (!is_union || !field.ty.is_void()) {
        return Err(err(SchemaErrorKind::InvalidCatchAll {
            type_name,
            field: field.name.clone(),
        }));
    }
    let owner = alloc::format!("{type_name}.{}", field.name);
    if field.default.is_some() && field.ty.is_nullable() {
        return Err(err(SchemaErrorKind::NullableDefault { owner }));
    }
    if field.default.is_some() && field.ty.is_void() {
        return Err(err(SchemaErrorKind::InvalidDefault {
            owner,
            message: "payload-free variants take no default".into(),
        }));
    }
    if field.ty.is_void() {
        return Ok(());
    }
    check_type_ref(&owner, &field.ty, patterns)
}

fn check_type_ref(
    owner: &str,
    ty: &TypeRef,
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), SchemaError> {
    let invalid = |message: String| {
        Err(err(SchemaErrorKind::InvalidConstraint {
            owner: owner.into(),
            message,
        }))
    };

    match ty {
        TypeRef::Void => invalid("void is only valid as a union variant type".into()),
        TypeRef::Boolean | TypeRef::Binary | TypeRef::Ref(_) => Ok(()),
        TypeRef::Integer(kind, c) => {
            let (lo, hi) = kind.range();
            if let Some(min) = c.min_value {
                if min < lo || min > hi {
                    return invalid(alloc::format!("min_value {min} is outside the {} range", kind.name()));
                }
            }
            if let Some(max) = c.max_value {
                if max < lo || max > hi {
                    return invalid(alloc::format!("max_value {max} is outside the {} range", kind.name()));
                }
            }
            if let (Some(min), Some(max)) = (c.min_value, c.max_value) {
                if max < min {
                    return invalid(alloc::format!("max_value {max} is less than min_value {min}"));
                }
            }
            Ok(())
        }
        TypeRef::Float(kind, c) => {
            for bound in [c.min_value, c.max_value].into_iter().flatten() {
                if !bound.is_finite() {
                    return invalid("float bounds must be finite".into());
                }
                if *kind == FloatKind::Float32 && bound.abs() > f64::from(f32::MAX) {
                    return invalid(alloc::format!("bound {bound} is outside the Float32 range"));
                }
            }
            if let (Some(min), Some(max)) = (c.min_value, c.max_value) {
                if max < min {
                    return invalid(alloc::format!("max_value {max} is less than min_value {min}"));
                }
            }
            Ok(())
        }
        TypeRef::String(c) => {
            if c.max_length == Some(0) {
                return invalid("max_length must be greater than 0".into());
            }
            if let (Some(min), Some(max)) = (c.min_length, c.max_length) {
                if max < min {
                    return invalid(alloc::format!("max_length {max} is less than min_length {min}"));
                }
            }
            if let Some(pattern) = &c.pattern {
                if !patterns.contains_key(pattern) {
                    let re = Regex::new(&alloc::format!("^(?:{pattern})$")).map_err(|e| {
                        err(SchemaErrorKind::InvalidPattern {
                            pattern: pattern.clone(),
                            message: e.to_string(),
                        })
                    })?;
                    patterns.insert(pattern.clone(), re);
                }
            }
            Ok(())
        }
        TypeRef::Timestamp(format) => {
            if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return invalid(alloc::format!("timestamp format {format:?} is not a valid format string"));
            }
            // what the encoder writes, the decoder must read back to the same text
            let sample = NaiveDate::from_ymd_opt(2001, 2, 3).and_then(|d| d.and_hms_opt(4, 5, 6));
            let consistent = sample
                .and_then(|t| validate::format_timestamp(&t, format))
                .is_some_and(|text| {
                    validate::parse_timestamp(&text, format)
                        .ok()
                        .and_then(|parsed| validate::format_timestamp(&parsed, format))
                        .is_some_and(|again| again == text)
                });
            if !consistent {
                return invalid(alloc::format!(
                    "timestamp format {format:?} does not read back what it writes"
                ));
            }
            Ok(())
        }
        TypeRef::List(item, c) => {
            if c.max_items == Some(0) {
                return invalid("max_items must be greater than 0".into());
            }
            if let (Some(min), Some(max)) = (c.min_items, c.max_items) {
                if max < min {
                    return invalid(alloc::format!("max_items {max} is less than min_items {min}"));
                }
            }
            check_type_ref(owner, item, patterns)
        }
        TypeRef::Nullable(inner) => match inner.as_ref() {
            TypeRef::Nullable(_) => invalid("nullable may not be nested".into()),
            other => check_type_ref(owner, other, patterns),
        },
    }
}

/// Defaults are trusted when filled in, so they are checked against their
/// field type here, once.
fn check_defaults(schema: &Schema) -> Result<(), SchemaError> {
    for def in &schema.types {
        for field in def.own_fields() {
            let Some(default) = &field.default else {
                continue;
            };
            validate::check_value(schema, &field.ty, default).map_err(|e| {
                err(SchemaErrorKind::InvalidDefault {
                    owner: alloc::format!("{}.{}", def.name(), field.name),
                    message: e.kind.to_string(),
                })
            })?;
        }
    }
    Ok(())
}
