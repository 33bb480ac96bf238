//! The semantic type representation.

use smallvec::SmallVec;
use static_assertions::assert_impl_all;

use crate::constraints::ConstraintSet;
use crate::opaque::OpaqueTypeId;
use crate::semantic_index::{DeclarationId, Nominal, TypeParamId};

pub(crate) mod display;
pub(crate) mod infer;

/// The type of an expression or declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// The bottom type: no values. `fatalError()` produces it, and it
    /// unifies with anything.
    Never,
    /// The unit type, written `()`.
    Void,
    Int,
    String,
    Bool,
    /// `[T]`
    Array(Box<Type>),
    /// `(T, U, ...)` with at least two elements.
    Tuple(Box<[Type]>),
    /// A class used as a value, as in a constructor call's callee.
    Class(DeclarationId),
    /// An instance of a user class.
    Instance(DeclarationId),
    Function(Box<FunctionSignature>),
    /// A generic parameter of the enclosing declaration.
    TypeParam(TypeParamId),
    /// A protocol or composition used as a value's type.
    Existential(Box<ConstraintSet>),
    /// An opaque return type, known to callers only by its identity token.
    Opaque(OpaqueTypeId),
    /// The recovery placeholder. It unifies with everything and never
    /// produces follow-on diagnostics.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSignature {
    pub parameters: SmallVec<[Type; 4]>,
    pub returns: Type,
}

impl Type {
    pub(crate) const fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Structural acceptance: whether a value of `source` can stand where
    /// `self` is required.
    ///
    /// Opaque types accept only their own token. A [`Type::TypeParam`]
    /// target accepts anything, since generic arguments are not inferred.
    /// Existential targets are only accepted structurally here; the
    /// conformance-based widening lives in the checker, which has the
    /// declaration tables at hand.
    pub(crate) fn accepts(&self, source: &Type) -> bool {
        match (self, source) {
            (Type::Error, _) | (_, Type::Error) => true,
            (_, Type::Never) => true,
            (Type::TypeParam(_), _) => true,
            (Type::Array(target), Type::Array(source)) => target.accepts(source),
            (Type::Tuple(target), Type::Tuple(source)) => {
                target.len() == source.len()
                    && target
                        .iter()
                        .zip(source.iter())
                        .all(|(target, source)| target.accepts(source))
            }
            (Type::Function(target), Type::Function(source)) => {
                target.parameters.len() == source.parameters.len()
                    && target
                        .parameters
                        .iter()
                        .zip(&source.parameters)
                        .all(|(target, source)| target.accepts(source))
                    && target.returns.accepts(&source.returns)
            }
            (target, source) => target == source,
        }
    }

    /// Whether the type mentions an opaque identity anywhere. Decides
    /// between the opaque and the plain mismatch diagnostic.
    pub(crate) fn involves_opaque(&self) -> bool {
        match self {
            Type::Opaque(_) => true,
            Type::Array(element) => element.involves_opaque(),
            Type::Tuple(elements) => elements.iter().any(Type::involves_opaque),
            Type::Function(signature) => {
                signature.returns.involves_opaque()
                    || signature.parameters.iter().any(Type::involves_opaque)
            }
            _ => false,
        }
    }

    /// The nominal type backing this type, if there is one. Conformance
    /// lookups are keyed by it.
    pub(crate) fn nominal(&self) -> Option<Nominal> {
        match self {
            Type::Int => Some(Nominal::Int),
            Type::String => Some(Nominal::String),
            Type::Bool => Some(Nominal::Bool),
            Type::Array(_) => Some(Nominal::Array),
            Type::Instance(class) => Some(Nominal::Class(*class)),
            _ => None,
        }
    }
}

assert_impl_all!(Type: Clone, Send, Sync);

#[cfg(test)]
mod tests {
    use super::Type;

    #[test]
    fn never_is_accepted_everywhere() {
        assert!(Type::Int.accepts(&Type::Never));
        assert!(Type::Array(Box::new(Type::String)).accepts(&Type::Never));
        assert!(!Type::Never.accepts(&Type::Int));
    }

    #[test]
    fn error_absorbs_both_directions() {
        assert!(Type::Error.accepts(&Type::Bool));
        assert!(Type::Bool.accepts(&Type::Error));
    }

    #[test]
    fn structural_acceptance_recurses() {
        let ints = Type::Array(Box::new(Type::Int));
        let strings = Type::Array(Box::new(Type::String));
        assert!(ints.accepts(&ints));
        assert!(!ints.accepts(&strings));

        let pair = Type::Tuple(vec![Type::Int, Type::Bool].into_boxed_slice());
        let triple = Type::Tuple(vec![Type::Int, Type::Bool, Type::Void].into_boxed_slice());
        assert!(!pair.accepts(&triple));
    }
}
