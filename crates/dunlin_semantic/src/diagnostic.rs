use std::fmt;

use dunlin_ast::{Name, Ranged};
use text_size::TextRange;

use crate::constraints::MalformedConstraintKind;
use crate::placement::OpaquePosition;

/// A checker finding attached to a source range.
///
/// Diagnostics never abort checking. The checker records the finding,
/// substitutes [`Type::Error`](crate::types::Type::Error) for whatever it
/// could not make sense of, and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub range: TextRange,
}

impl Diagnostic {
    pub(crate) fn new(kind: DiagnosticKind, range: TextRange) -> Self {
        Self { kind, range }
    }
}

impl Ranged for Diagnostic {
    fn range(&self) -> TextRange {
        self.range
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte range {:?}", self.kind, self.range)
    }
}

/// Everything the checker can complain about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The operand of an `opaque` marker does not form a valid constraint.
    MalformedConstraint { reason: MalformedConstraintKind },
    /// An `opaque` marker in a position where no identity can be anchored.
    InvalidOpaquePosition { position: OpaquePosition },
    /// An opaque declaration whose body never returns a value, so no
    /// underlying type can be established.
    NoReturnStatements,
    /// An opaque declaration whose returns disagree on the underlying type.
    /// Carries every distinct type encountered, in source order.
    UnderlyingTypeMismatch { types: Vec<String> },
    /// An opaque declaration consumed its own identity before any return
    /// fixed a candidate underlying type.
    RecursiveOpaqueDefinition,
    /// Two types failed to unify and at least one side involves an opaque
    /// identity.
    OpaqueTypeMismatch { expected: String, found: String },
    /// A member access that the receiver's constraints do not declare.
    UndeclaredMember { member: Name },

    /// A name with no declaration in scope.
    UnresolvedName { name: Name },
    /// A second top-level declaration of an already-bound name.
    DuplicateDeclaration { name: Name },
    /// A type alias or binding whose definition requires itself.
    CircularDefinition { name: Name },
    /// A protocol or type alias name used where a value is required.
    NotAValue { name: Name },
    /// Two types failed to unify, neither side opaque.
    TypeMismatch { expected: String, found: String },
    WrongArgumentCount { expected: usize, found: usize },
    NotCallable { type_name: String },
    NotIndexable { type_name: String },
    AssignmentToImmutable { name: Name },
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::MalformedConstraint { reason } => reason.fmt(f),
            DiagnosticKind::InvalidOpaquePosition { position } => position.fmt(f),
            DiagnosticKind::NoReturnStatements => {
                f.write_str("an opaque declaration must return a value on at least one path")
            }
            DiagnosticKind::UnderlyingTypeMismatch { types } => {
                write!(
                    f,
                    "returns of an opaque declaration disagree on the underlying type: {}",
                    types.join(", ")
                )
            }
            DiagnosticKind::RecursiveOpaqueDefinition => {
                f.write_str("an opaque declaration refers to itself before any return fixes its underlying type")
            }
            DiagnosticKind::OpaqueTypeMismatch { expected, found } => {
                write!(f, "expected `{expected}`, found `{found}`")
            }
            DiagnosticKind::UndeclaredMember { member } => {
                write!(f, "member `{member}` is not declared by the value's constraints")
            }
            DiagnosticKind::UnresolvedName { name } => {
                write!(f, "cannot find `{name}` in this scope")
            }
            DiagnosticKind::DuplicateDeclaration { name } => {
                write!(f, "`{name}` is declared more than once")
            }
            DiagnosticKind::CircularDefinition { name } => {
                write!(f, "`{name}` is defined in terms of itself")
            }
            DiagnosticKind::NotAValue { name } => {
                write!(f, "`{name}` is a type, not a value")
            }
            DiagnosticKind::TypeMismatch { expected, found } => {
                write!(f, "expected `{expected}`, found `{found}`")
            }
            DiagnosticKind::WrongArgumentCount { expected, found } => {
                write!(f, "expected {expected} arguments, found {found}")
            }
            DiagnosticKind::NotCallable { type_name } => {
                write!(f, "`{type_name}` is not callable")
            }
            DiagnosticKind::NotIndexable { type_name } => {
                write!(f, "`{type_name}` cannot be subscripted")
            }
            DiagnosticKind::AssignmentToImmutable { name } => {
                write!(f, "cannot assign to `{name}`: it is immutable")
            }
        }
    }
}
