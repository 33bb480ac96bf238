//! Constraint sets and the capability tables derived from them.
//!
//! A constraint set is the semantic form of the conjunction written after an
//! `opaque` marker (or of a bare protocol composition used as an existential
//! annotation): an order-insensitive set of protocol and class requirements,
//! possibly with the `Any`/`AnyObject` sentinels mixed in.

use dunlin_ast::{self as ast, Name, Ranged};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use text_size::TextRange;
use thiserror::Error;

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::semantic_index::{DeclarationId, Nominal, SemanticIndex};
use crate::FxOrderSet;

/// One conjunct of a constraint set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// The unconstrained sentinel: admits any value, grants no capabilities.
    Any,
    /// The class-bound sentinel: admits any class instance, grants no
    /// capabilities.
    AnyObject,
    Protocol(DeclarationId),
    Class(DeclarationId),
}

/// A conjunction of requirements.
///
/// Equality is order-insensitive: `P & Q` and `Q & P` are the same set.
/// Iteration order is the order the conjuncts were written in, which keeps
/// capability tables and rendered sets deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    requirements: FxOrderSet<Requirement>,
}

impl ConstraintSet {
    pub(crate) fn insert(&mut self, requirement: Requirement) {
        self.requirements.insert(requirement);
    }

    pub fn requirements(&self) -> impl Iterator<Item = Requirement> + '_ {
        self.requirements.iter().copied()
    }

    pub fn contains(&self, requirement: Requirement) -> bool {
        self.requirements.contains(&requirement)
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

/// Why a written constraint failed to form a [`ConstraintSet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedConstraintKind {
    /// An `opaque` marker on a conjunct other than the whole conjunction,
    /// as in `opaque P & opaque Q`.
    #[error("'opaque' may only mark the beginning of a constraint")]
    MarkerNotLeading,
    /// A name that resolved to something other than a protocol or class.
    #[error("`{0}` cannot be used as a constraint")]
    InvalidRequirement(Name),
    #[error("a constraint may name at most one class")]
    MultipleClasses,
    /// A structural type (tuple, array, function) written as a conjunct.
    #[error("only protocols and classes may appear in a constraint")]
    NonNominal,
}

/// A failed constraint-set build, with the conjunct it failed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConstraintError {
    pub(crate) kind: ConstraintErrorKind,
    pub(crate) range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConstraintErrorKind {
    Malformed(MalformedConstraintKind),
    Unresolved(Name),
    /// A parse-error placeholder; the parser already reported it.
    Placeholder,
}

impl ConstraintError {
    fn new(kind: ConstraintErrorKind, range: TextRange) -> Self {
        Self { kind, range }
    }

    pub(crate) fn into_diagnostic(self) -> Option<Diagnostic> {
        let kind = match self.kind {
            ConstraintErrorKind::Malformed(reason) => {
                DiagnosticKind::MalformedConstraint { reason }
            }
            ConstraintErrorKind::Unresolved(name) => DiagnosticKind::UnresolvedName { name },
            ConstraintErrorKind::Placeholder => return None,
        };
        Some(Diagnostic::new(kind, self.range))
    }
}

/// Builds the constraint set for a written conjunction.
///
/// The operand is what followed the `opaque` marker (or the composition used
/// as an existential annotation): either a single requirement or a
/// [`ast::TypeComposition`]. Fails on the first offending conjunct and has no
/// effect beyond the returned error.
pub(crate) fn build_constraint_set(
    operand: &ast::TypeExpr,
    index: &SemanticIndex,
) -> Result<ConstraintSet, ConstraintError> {
    let conjuncts = match operand {
        ast::TypeExpr::Composition(composition) => composition.members.as_slice(),
        single => std::slice::from_ref(single),
    };

    let mut set = ConstraintSet::default();
    let mut saw_class = false;
    for conjunct in conjuncts {
        let requirement = match conjunct {
            ast::TypeExpr::Opaque(inner) => {
                return Err(ConstraintError::new(
                    ConstraintErrorKind::Malformed(MalformedConstraintKind::MarkerNotLeading),
                    inner.range(),
                ));
            }
            ast::TypeExpr::Name(name) => {
                if name.id.is_empty() {
                    return Err(ConstraintError::new(
                        ConstraintErrorKind::Placeholder,
                        name.range(),
                    ));
                }
                match name.id.as_str() {
                    "Any" => Requirement::Any,
                    "AnyObject" => Requirement::AnyObject,
                    _ => match index.resolve(&name.id) {
                        Some(id) if index.is_protocol(id) => Requirement::Protocol(id),
                        Some(id) if index.is_class(id) => {
                            if saw_class {
                                return Err(ConstraintError::new(
                                    ConstraintErrorKind::Malformed(
                                        MalformedConstraintKind::MultipleClasses,
                                    ),
                                    name.range(),
                                ));
                            }
                            saw_class = true;
                            Requirement::Class(id)
                        }
                        Some(_) => {
                            return Err(ConstraintError::new(
                                ConstraintErrorKind::Malformed(
                                    MalformedConstraintKind::InvalidRequirement(name.id.clone()),
                                ),
                                name.range(),
                            ));
                        }
                        None => {
                            let kind = if Nominal::builtin_from_name(&name.id).is_some() {
                                ConstraintErrorKind::Malformed(
                                    MalformedConstraintKind::InvalidRequirement(name.id.clone()),
                                )
                            } else {
                                ConstraintErrorKind::Unresolved(name.id.clone())
                            };
                            return Err(ConstraintError::new(kind, name.range()));
                        }
                    },
                }
            }
            structural => {
                return Err(ConstraintError::new(
                    ConstraintErrorKind::Malformed(MalformedConstraintKind::NonNominal),
                    structural.range(),
                ));
            }
        };
        set.insert(requirement);
    }
    Ok(set)
}

/// The members a constraint set makes available on values of that
/// constraint, keyed by name.
///
/// Protocol requirements contribute their signatures; a class requirement
/// contributes its implemented members, its superclass chain, and the
/// requirements of every protocol it declares conformance to. On a name
/// clash the conjunct written first wins.
#[derive(Clone, Debug, Default)]
pub struct MemberTable {
    named: FxHashMap<Name, DeclarationId>,
    subscripts: SmallVec<[DeclarationId; 1]>,
}

impl MemberTable {
    pub(crate) fn from_constraint_set(set: &ConstraintSet, index: &SemanticIndex) -> Self {
        let mut table = MemberTable::default();
        let mut visited = FxHashSet::default();
        for requirement in set.requirements() {
            match requirement {
                Requirement::Any | Requirement::AnyObject => {}
                Requirement::Protocol(protocol) => {
                    table.add_protocol(protocol, index, &mut visited);
                }
                Requirement::Class(class) => table.add_class(class, index, &mut visited),
            }
        }
        table
    }

    pub(crate) fn get(&self, name: &str) -> Option<DeclarationId> {
        self.named.get(name).copied()
    }

    pub(crate) fn subscript(&self) -> Option<DeclarationId> {
        self.subscripts.first().copied()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    fn add_protocol(
        &mut self,
        protocol: DeclarationId,
        index: &SemanticIndex,
        visited: &mut FxHashSet<DeclarationId>,
    ) {
        if !visited.insert(protocol) {
            return;
        }
        let Some(data) = index.protocol(protocol) else {
            return;
        };
        for (name, &requirement) in &data.requirements {
            self.named.entry(name.clone()).or_insert(requirement);
        }
        for &parent in &data.inherits {
            self.add_protocol(parent, index, visited);
        }
    }

    fn add_class(
        &mut self,
        class: DeclarationId,
        index: &SemanticIndex,
        visited: &mut FxHashSet<DeclarationId>,
    ) {
        if !visited.insert(class) {
            return;
        }
        let mut current = Some(class);
        while let Some(id) = current {
            if let Some(members) = index.members_of(Nominal::Class(id)) {
                for (name, &member) in &members.named {
                    self.named.entry(name.clone()).or_insert(member);
                }
                for &subscript in &members.subscripts {
                    if !self.subscripts.contains(&subscript) {
                        self.subscripts.push(subscript);
                    }
                }
            }
            for protocol in index.conformances(Nominal::Class(id)) {
                self.add_protocol(protocol, index, visited);
            }
            current = match index.superclass(id) {
                Some(next) if visited.insert(next) => Some(next),
                _ => None,
            };
        }
    }
}
