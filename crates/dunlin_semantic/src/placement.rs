//! Legality of `opaque` marker positions.
//!
//! An `opaque` marker only means something where a declaration can anchor an
//! identity: the outermost return type of a function or subscript, or the
//! outermost type of a computed property. [`collect_sites`] walks an
//! annotation and records every marker together with the position it was
//! found in; the checker registers the legal ones and diagnoses the rest.

use std::fmt;

use dunlin_ast::{self as ast};

/// Where an `opaque` marker was written, relative to the declaration whose
/// annotation it appears in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpaquePosition {
    /// The outermost return type of a function or subscript. Legal.
    ReturnType,
    /// The outermost type of a computed property. Legal.
    PropertyType,
    ParameterType,
    TypeAliasValue,
    /// The annotation of a stored binding, top-level or local.
    BindingAnnotation,
    /// Nested inside a tuple or array element.
    TupleElement,
    FunctionTypeParameter,
    FunctionTypeReturn,
    /// A conjunct of a composition other than the whole conjunction, as in
    /// `P & opaque Q`.
    ConjunctionTail,
}

impl OpaquePosition {
    pub const fn is_legal(self) -> bool {
        matches!(
            self,
            OpaquePosition::ReturnType | OpaquePosition::PropertyType
        )
    }
}

impl fmt::Display for OpaquePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            OpaquePosition::ReturnType | OpaquePosition::PropertyType => {
                "an opaque type is permitted in this position"
            }
            OpaquePosition::ParameterType => "an opaque type may not appear in a parameter type",
            OpaquePosition::TypeAliasValue => "an opaque type may not appear in a typealias",
            OpaquePosition::BindingAnnotation => {
                "an opaque type may not appear in a stored binding's type"
            }
            OpaquePosition::TupleElement => {
                "an opaque type may not appear nested in a tuple or array element"
            }
            OpaquePosition::FunctionTypeParameter => {
                "an opaque type may not appear in a function type's parameters"
            }
            OpaquePosition::FunctionTypeReturn => {
                "an opaque type may not appear in a function type's return"
            }
            OpaquePosition::ConjunctionTail => {
                "'opaque' must appear at the beginning of a composition"
            }
        };
        f.write_str(message)
    }
}

/// An `opaque` marker found in an annotation.
#[derive(Copy, Clone, Debug)]
pub(crate) struct OpaqueSite<'ast> {
    pub(crate) marker: &'ast ast::TypeOpaque,
    pub(crate) position: OpaquePosition,
}

/// Walks an annotation, recording every `opaque` marker with its position.
///
/// The walk does not descend into a recorded marker's constraint: markers
/// nested inside a constraint are the constraint builder's concern, not a
/// placement question.
pub(crate) fn collect_sites<'ast>(
    annotation: &'ast ast::TypeExpr,
    position: OpaquePosition,
    sites: &mut Vec<OpaqueSite<'ast>>,
) {
    match annotation {
        ast::TypeExpr::Opaque(marker) => sites.push(OpaqueSite { marker, position }),
        ast::TypeExpr::Name(_) => {}
        ast::TypeExpr::Array(array) => {
            collect_sites(&array.element, OpaquePosition::TupleElement, sites);
        }
        ast::TypeExpr::Tuple(tuple) => {
            for element in &tuple.elements {
                collect_sites(element, OpaquePosition::TupleElement, sites);
            }
        }
        ast::TypeExpr::Function(function) => {
            for parameter in &function.parameters {
                collect_sites(parameter, OpaquePosition::FunctionTypeParameter, sites);
            }
            collect_sites(&function.returns, OpaquePosition::FunctionTypeReturn, sites);
        }
        ast::TypeExpr::Composition(composition) => {
            for member in &composition.members {
                collect_sites(member, OpaquePosition::ConjunctionTail, sites);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dunlin_ast::{self as ast};

    use super::{collect_sites, OpaquePosition};

    fn return_annotation(source: &str) -> ast::TypeExpr {
        let parsed = dunlin_parser::parse_module(source);
        assert!(parsed.is_valid(), "{:?}", parsed.errors);
        match parsed.module.body.into_iter().next() {
            Some(ast::Decl::Function(function)) => {
                function.returns.expect("fixture function has a return type")
            }
            declaration => panic!("expected a function, got {declaration:?}"),
        }
    }

    #[track_caller]
    fn positions(source: &str) -> Vec<OpaquePosition> {
        let annotation = return_annotation(source);
        let mut sites = Vec::new();
        collect_sites(&annotation, OpaquePosition::ReturnType, &mut sites);
        sites.into_iter().map(|site| site.position).collect()
    }

    #[test]
    fn outermost_return_marker_is_legal() {
        assert_eq!(
            positions("func f() -> opaque P { return 1 }"),
            [OpaquePosition::ReturnType]
        );
        assert!(OpaquePosition::ReturnType.is_legal());
    }

    #[test]
    fn leading_marker_covers_the_whole_composition() {
        assert_eq!(
            positions("func f() -> opaque P & Q { return 1 }"),
            [OpaquePosition::ReturnType]
        );
    }

    #[test]
    fn tuple_elements_are_not_anchoring_positions() {
        assert_eq!(
            positions("func f() -> (opaque P, opaque Q) { return (1, 2) }"),
            [OpaquePosition::TupleElement, OpaquePosition::TupleElement]
        );
        assert!(!OpaquePosition::TupleElement.is_legal());
    }

    #[test]
    fn function_type_positions_do_not_anchor() {
        assert_eq!(
            positions("func f() -> (opaque P) -> opaque Q { return g }"),
            [
                OpaquePosition::FunctionTypeParameter,
                OpaquePosition::FunctionTypeReturn
            ]
        );
    }

    #[test]
    fn trailing_conjunct_marker_is_flagged() {
        assert_eq!(
            positions("func f() -> P & opaque Q { return 1 }"),
            [OpaquePosition::ConjunctionTail]
        );
    }
}
