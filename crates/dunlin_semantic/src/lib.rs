//! Semantic analysis for the Dunlin language: name binding, type checking,
//! and opaque return types.
//!
//! The entry point is [`check_module`], which takes a parsed module and
//! produces a [`Checked`] analysis: the declaration tables, the opaque type
//! registry, and every diagnostic, sorted by source position.
//!
//! An `opaque` return type hides a declaration's concrete return type behind
//! an identity that belongs to that declaration alone. Callers see only the
//! identity and the capabilities its constraint grants; the checker resolves
//! the hidden underlying type from the declaration's `return` statements and
//! holds every return to the same answer. Two opaque declarations never
//! share an identity, even when they resolve to the same underlying type.

use std::fmt;
use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

pub use crate::constraints::{ConstraintSet, MalformedConstraintKind, Requirement};
pub use crate::diagnostic::{Diagnostic, DiagnosticKind};
pub use crate::opaque::{OpaqueTypeId, OpaqueTypeRegistry, UnderlyingType};
pub use crate::placement::OpaquePosition;
pub use crate::semantic_index::{Declaration, DeclarationId, Nominal, SemanticIndex, TypeParamId};
pub use crate::types::{FunctionSignature, Type};

pub mod constraints;
pub mod diagnostic;
mod opaque;
mod placement;
pub mod semantic_index;
pub mod types;

/// An insertion-ordered set keyed with [`FxHasher`].
pub(crate) type FxOrderSet<V> = indexmap::IndexSet<V, BuildHasherDefault<FxHasher>>;

/// Checks `module` and returns the completed analysis.
pub fn check_module(module: &dunlin_ast::Module) -> Checked<'_> {
    let output = types::infer::check_module(module);
    Checked {
        index: output.index,
        registry: output.registry,
        diagnostics: output.diagnostics,
    }
}

/// The result of checking one module.
pub struct Checked<'ast> {
    index: SemanticIndex<'ast>,
    registry: OpaqueTypeRegistry,
    diagnostics: Vec<Diagnostic>,
}

impl<'ast> Checked<'ast> {
    /// Every diagnostic the module produced, in source order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn index(&self) -> &SemanticIndex<'ast> {
        &self.index
    }

    pub fn registry(&self) -> &OpaqueTypeRegistry {
        &self.registry
    }

    /// Resolves a top-level name to its declaration.
    pub fn resolve(&self, name: &str) -> Option<DeclarationId> {
        self.index.resolve(name)
    }

    /// The opaque identity anchored by the named declaration, if it has one.
    pub fn opaque_identity(&self, name: &str) -> Option<OpaqueTypeId> {
        self.registry.identity_of(self.resolve(name)?)
    }

    /// What resolution concluded about an identity's hidden type.
    pub fn underlying(&self, id: OpaqueTypeId) -> &UnderlyingType {
        self.registry.underlying(id)
    }

    /// The constraint set an identity was declared with.
    pub fn constraints(&self, id: OpaqueTypeId) -> &ConstraintSet {
        self.registry.constraints(id)
    }

    /// Whether an identity's constraints grant the named member.
    pub fn has_member(&self, id: OpaqueTypeId, name: &str) -> bool {
        self.registry.members(id).contains(name)
    }

    /// Renders a type against this module's declarations.
    pub fn display<'a>(&'a self, ty: &'a Type) -> impl fmt::Display + 'a {
        ty.display(&self.index, &self.registry)
    }
}
