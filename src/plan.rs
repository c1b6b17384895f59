//! Variant storage planning: variants whose payload types are structurally
//! equal share one storage slot.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::schema::{Field, TypeRef};

/// Identifies a payload slot within one union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    /// Position of the slot in [`VariantPlan::slots`].
    pub fn index(self) -> usize {
        self.0
    }
}

/// Mapping from variant tag to payload slot for a single union.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPlan {
    slots: Vec<TypeRef>,
    by_variant: BTreeMap<String, SlotId>,
}

impl VariantPlan {
    /// Plans storage for `variants` (the union's linearized variants).
    ///
    /// Payload-free variants get no slot. Two variants share a slot iff their
    /// payload `TypeRef`s compare equal.
    pub fn plan<'a>(variants: impl IntoIterator<Item = &'a Field>) -> Self {
        let mut plan = VariantPlan::default();
        for variant in variants {
            if variant.ty.is_void() {
                continue;
            }
            let slot = match plan.slots.iter().position(|ty| *ty == variant.ty) {
                Some(existing) => SlotId(existing),
                None => {
                    plan.slots.push(variant.ty.clone());
                    SlotId(plan.slots.len() - 1)
                }
            };
            plan.by_variant.insert(variant.name.clone(), slot);
        }
        plan
    }

    /// The slot of a payload-carrying variant.
    pub fn slot_of(&self, tag: &str) -> Option<SlotId> {
        self.by_variant.get(tag).copied()
    }

    /// Payload type stored in `slot`.
    pub fn slot_type(&self, slot: SlotId) -> Option<&TypeRef> {
        self.slots.get(slot.0)
    }

    /// Payload types, one per slot.
    pub fn slots(&self) -> &[TypeRef] {
        &self.slots
    }

    /// Variants assigned to `slot`, in tag order.
    pub fn variants_in(&self, slot: SlotId) -> impl Iterator<Item = &str> {
        self.by_variant
            .iter()
            .filter(move |(_, s)| **s == slot)
            .map(|(tag, _)| tag.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{StringConstraints, TypeId};

    #[test]
    fn equal_payload_types_share_a_slot() {
        let variants = [
            Field::new("network_error", TypeRef::Ref(TypeId(3))),
            Field::new("server_error", TypeRef::Ref(TypeId(3))),
            Field::void("cancelled"),
            Field::new("message", TypeRef::string()),
        ];
        let plan = VariantPlan::plan(&variants);
        assert_eq!(plan.slots().len(), 2);
        assert_eq!(plan.slot_of("network_error"), plan.slot_of("server_error"));
        assert_ne!(plan.slot_of("network_error"), plan.slot_of("message"));
        assert_eq!(plan.slot_of("cancelled"), None);
        let shared: Vec<_> = plan.variants_in(SlotId(0)).collect();
        assert_eq!(shared, ["network_error", "server_error"]);
    }

    #[test]
    fn constraints_are_part_of_structural_equality() {
        let variants = [
            Field::new("short", TypeRef::string_with(StringConstraints::default().max_length(5))),
            Field::new("long", TypeRef::string_with(StringConstraints::default().max_length(50))),
            Field::new("also_short", TypeRef::string_with(StringConstraints::default().max_length(5))),
        ];
        let plan = VariantPlan::plan(&variants);
        assert_eq!(plan.slots().len(), 2);
        assert_eq!(plan.slot_of("short"), plan.slot_of("also_short"));
        assert_ne!(plan.slot_of("short"), plan.slot_of("long"));
    }

    #[test]
    fn nullable_differs_from_plain() {
        let variants = [
            Field::new("a", TypeRef::string()),
            Field::new("b", TypeRef::string().nullable()),
        ];
        let plan = VariantPlan::plan(&variants);
        assert_ne!(plan.slot_of("a"), plan.slot_of("b"));
    }
}
