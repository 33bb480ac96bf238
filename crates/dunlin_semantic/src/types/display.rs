//! Human-readable rendering of types and constraint sets.
//!
//! Rendering needs the declaration tables to turn ids back into source
//! names, so the display adapters borrow the index (and, for opaque types,
//! the registry).

use std::fmt;

use itertools::Itertools;

use crate::constraints::{ConstraintSet, Requirement};
use crate::opaque::OpaqueTypeRegistry;
use crate::semantic_index::{DeclarationId, SemanticIndex};
use crate::types::Type;

impl Type {
    pub(crate) fn display<'a>(
        &'a self,
        index: &'a SemanticIndex<'a>,
        registry: &'a OpaqueTypeRegistry,
    ) -> DisplayType<'a> {
        DisplayType {
            ty: self,
            index,
            registry,
        }
    }
}

pub(crate) struct DisplayType<'a> {
    ty: &'a Type,
    index: &'a SemanticIndex<'a>,
    registry: &'a OpaqueTypeRegistry,
}

impl<'a> DisplayType<'a> {
    fn with(&self, ty: &'a Type) -> DisplayType<'a> {
        DisplayType {
            ty,
            index: self.index,
            registry: self.registry,
        }
    }
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Never => f.write_str("Never"),
            Type::Void => f.write_str("()"),
            Type::Int => f.write_str("Int"),
            Type::String => f.write_str("String"),
            Type::Bool => f.write_str("Bool"),
            Type::Array(element) => write!(f, "[{}]", self.with(element)),
            Type::Tuple(elements) => write!(
                f,
                "({})",
                elements
                    .iter()
                    .format_with(", ", |element, f| f(&self.with(element)))
            ),
            Type::Class(id) | Type::Instance(id) => {
                f.write_str(declaration_name(self.index, *id))
            }
            Type::Function(signature) => write!(
                f,
                "({}) -> {}",
                signature
                    .parameters
                    .iter()
                    .format_with(", ", |parameter, f| f(&self.with(parameter))),
                self.with(&signature.returns)
            ),
            Type::TypeParam(param) => f.write_str(&self.index.type_param(*param).name),
            Type::Existential(set) => write!(f, "{}", set.display(self.index)),
            Type::Opaque(id) => write!(
                f,
                "opaque {}",
                self.registry.constraints(*id).display(self.index)
            ),
            Type::Error => f.write_str("<error>"),
        }
    }
}

impl ConstraintSet {
    pub(crate) fn display<'a>(&'a self, index: &'a SemanticIndex<'a>) -> DisplayConstraintSet<'a> {
        DisplayConstraintSet { set: self, index }
    }
}

pub(crate) struct DisplayConstraintSet<'a> {
    set: &'a ConstraintSet,
    index: &'a SemanticIndex<'a>,
}

impl fmt::Display for DisplayConstraintSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.set
                .requirements()
                .format_with(" & ", |requirement, f| match requirement {
                    Requirement::Any => f(&"Any"),
                    Requirement::AnyObject => f(&"AnyObject"),
                    Requirement::Protocol(id) | Requirement::Class(id) =>
                        f(&declaration_name(self.index, id)),
                })
        )
    }
}

fn declaration_name<'a>(index: &'a SemanticIndex<'a>, id: DeclarationId) -> &'a str {
    match index.declaration(id).name() {
        Some(name) => name.as_str(),
        None => "<anonymous>",
    }
}
