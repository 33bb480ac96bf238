//! The opaque type registry.
//!
//! Every declaration with a legal `opaque` return anchors exactly one
//! abstract type identity, minted here. The registry also tracks what
//! checking has discovered about each identity's hidden underlying type.

use rustc_hash::FxHashMap;

use crate::constraints::{ConstraintSet, MemberTable};
use crate::semantic_index::DeclarationId;
use crate::types::Type;

/// Identity token for one opaque return type.
///
/// Tokens compare by value: two expressions have the same opaque type
/// exactly when they carry equal tokens. All calls to the owning
/// declaration produce the same token, including calls to distinct generic
/// instantiations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpaqueTypeId(u32);

impl OpaqueTypeId {
    pub(crate) fn from_usize(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok());
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What checking has discovered about an identity's hidden underlying type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnderlyingType {
    /// The owning declaration's body has not been checked yet.
    Unresolved,
    /// The owning declaration's body is being checked right now.
    /// `candidate` holds the type fixed by the first value-producing
    /// return, if one has been reached.
    InProgress { candidate: Option<Type> },
    /// Every value-producing return agreed on this type.
    Resolved(Type),
    /// Resolution failed; a diagnostic has already been reported.
    Error,
}

pub(crate) struct OpaqueTypeData {
    pub(crate) owner: DeclarationId,
    pub(crate) constraints: ConstraintSet,
    pub(crate) members: MemberTable,
    pub(crate) underlying: UnderlyingType,
}

/// All opaque identities minted for one module.
#[derive(Default)]
pub struct OpaqueTypeRegistry {
    entries: Vec<OpaqueTypeData>,
    by_owner: FxHashMap<DeclarationId, OpaqueTypeId>,
}

impl OpaqueTypeRegistry {
    /// Returns the identity for `owner`, minting one on first call.
    ///
    /// Minting is keyed by the owning declaration: a second call for the
    /// same owner returns the existing token unchanged and drops the
    /// supplied constraints.
    pub(crate) fn register_or_lookup(
        &mut self,
        owner: DeclarationId,
        constraints: ConstraintSet,
        members: MemberTable,
    ) -> OpaqueTypeId {
        if let Some(&id) = self.by_owner.get(&owner) {
            return id;
        }
        let id = OpaqueTypeId::from_usize(self.entries.len());
        tracing::debug!(?owner, ?id, "minted opaque type identity");
        self.entries.push(OpaqueTypeData {
            owner,
            constraints,
            members,
            underlying: UnderlyingType::Unresolved,
        });
        self.by_owner.insert(owner, id);
        id
    }

    /// The identity anchored by `owner`, if it has one.
    pub fn identity_of(&self, owner: DeclarationId) -> Option<OpaqueTypeId> {
        self.by_owner.get(&owner).copied()
    }

    pub fn owner(&self, id: OpaqueTypeId) -> DeclarationId {
        self.entries[id.index()].owner
    }

    pub fn constraints(&self, id: OpaqueTypeId) -> &ConstraintSet {
        &self.entries[id.index()].constraints
    }

    pub(crate) fn members(&self, id: OpaqueTypeId) -> &MemberTable {
        &self.entries[id.index()].members
    }

    pub fn underlying(&self, id: OpaqueTypeId) -> &UnderlyingType {
        &self.entries[id.index()].underlying
    }

    pub(crate) fn underlying_mut(&mut self, id: OpaqueTypeId) -> &mut UnderlyingType {
        &mut self.entries[id.index()].underlying
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{OpaqueTypeRegistry, UnderlyingType};
    use crate::constraints::{ConstraintSet, MemberTable};
    use crate::semantic_index::DeclarationId;
    use crate::types::Type;

    #[test]
    fn identities_are_per_declaration() {
        let mut registry = OpaqueTypeRegistry::default();
        let alice = DeclarationId::from_usize(0);
        let bob = DeclarationId::from_usize(1);

        let first =
            registry.register_or_lookup(alice, ConstraintSet::default(), MemberTable::default());
        let second =
            registry.register_or_lookup(bob, ConstraintSet::default(), MemberTable::default());

        assert_ne!(first, second);
        assert_eq!(registry.owner(first), alice);
        assert_eq!(registry.owner(second), bob);
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = OpaqueTypeRegistry::default();
        let owner = DeclarationId::from_usize(7);

        let first =
            registry.register_or_lookup(owner, ConstraintSet::default(), MemberTable::default());
        *registry.underlying_mut(first) = UnderlyingType::Resolved(Type::Int);

        let again =
            registry.register_or_lookup(owner, ConstraintSet::default(), MemberTable::default());

        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
        // A repeated registration must not reset resolution state.
        assert_eq!(
            registry.underlying(first),
            &UnderlyingType::Resolved(Type::Int)
        );
    }

    #[test]
    fn identity_lookup_by_owner() {
        let mut registry = OpaqueTypeRegistry::default();
        let owner = DeclarationId::from_usize(3);
        assert_eq!(registry.identity_of(owner), None);

        let id =
            registry.register_or_lookup(owner, ConstraintSet::default(), MemberTable::default());
        assert_eq!(registry.identity_of(owner), Some(id));
    }
}
