//! End-to-end checks of opaque return types: marker placement, identity,
//! underlying-type resolution, and constraint-bounded member access.

use dunlin_parser::parse_module;
use dunlin_semantic::{
    check_module, Checked, DiagnosticKind, MalformedConstraintKind, OpaquePosition, Type,
    UnderlyingType,
};
use test_case::test_case;

/// Parses `source`, checks it, and hands the analysis to `assertions`.
/// Fixtures are expected to be syntactically well formed.
fn with_checked<T>(source: &str, assertions: impl FnOnce(&Checked) -> T) -> T {
    let parsed = parse_module(source);
    assert!(
        parsed.is_valid(),
        "unexpected parse errors in fixture: {:?}",
        parsed.errors
    );
    assertions(&check_module(&parsed.module))
}

fn diagnostics(source: &str) -> Vec<DiagnosticKind> {
    with_checked(source, |checked| {
        checked
            .diagnostics()
            .iter()
            .map(|diagnostic| diagnostic.kind.clone())
            .collect()
    })
}

fn assert_clean(source: &str) {
    let kinds = diagnostics(source);
    assert!(kinds.is_empty(), "expected a clean module, got {kinds:?}");
}

// Identity.

#[test]
fn each_opaque_declaration_mints_its_own_identity() {
    with_checked(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
        }
        func alice() -> opaque P {
            return K()
        }
        func bob() -> opaque P {
            return K()
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let alice = checked.opaque_identity("alice").unwrap();
            let bob = checked.opaque_identity("bob").unwrap();
            assert_ne!(alice, bob);
            let k = checked.resolve("K").unwrap();
            assert_eq!(
                checked.underlying(alice),
                &UnderlyingType::Resolved(Type::Instance(k))
            );
            assert_eq!(
                checked.underlying(bob),
                &UnderlyingType::Resolved(Type::Instance(k))
            );
        },
    );
}

#[test]
fn values_of_the_same_declaration_unify_and_of_different_ones_do_not() {
    let kinds = diagnostics(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
        }
        func alice() -> opaque P {
            return K()
        }
        func bob() -> opaque P {
            return K()
        }
        func main() {
            var same = alice()
            same = alice()
            var mixed = alice()
            mixed = bob()
        }
        ",
    );
    // Both sides render identically; only the identity differs.
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::OpaqueTypeMismatch { expected, found }]
                if expected == "opaque P" && found == "opaque P"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn function_values_carry_the_identity_in_their_type() {
    let kinds = diagnostics(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
        }
        func alice() -> opaque P {
            return K()
        }
        func bob() -> opaque P {
            return K()
        }
        func main() {
            var f = alice
            f = alice
            f = bob
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::OpaqueTypeMismatch { expected, found }]
                if expected == "() -> opaque P" && found == "() -> opaque P"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn generic_instantiations_share_one_identity() {
    with_checked(
        r#"
        protocol P {
            func paul()
        }
        extend Int: P {
            func paul() {}
        }
        extend String: P {
            func paul() {}
        }
        func grace<T: P>(x: T) -> opaque P {
            return x
        }
        func main() {
            var g = grace(1)
            g = grace("two")
            g.paul()
        }
        "#,
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let grace = checked.opaque_identity("grace").unwrap();
            // The hidden type is the generic parameter itself; both
            // instantiations flow into the one identity.
            assert!(matches!(
                checked.underlying(grace),
                UnderlyingType::Resolved(Type::TypeParam(_))
            ));
        },
    );
}

#[test]
fn a_type_param_bound_grants_member_access() {
    assert_clean(
        r"
        protocol P {
            func paul()
        }
        func near(p: P) {}
        func grace<T: P>(x: T) -> opaque P {
            x.paul()
            near(x)
            return x
        }
        ",
    );
}

#[test]
fn a_type_param_bound_must_name_a_protocol_or_class() {
    let kinds = diagnostics(
        r"
        func bad<T: Int>(x: T) -> Int {
            return 1
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::MalformedConstraint {
                reason: MalformedConstraintKind::InvalidRequirement(name)
            }] if name.as_str() == "Int"
        ),
        "got {kinds:?}"
    );
}

// Underlying-type resolution.

#[test]
fn returns_fix_the_underlying_type() {
    with_checked(
        r"
        func count() -> opaque Any {
            return 7
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let id = checked.opaque_identity("count").unwrap();
            assert_eq!(checked.underlying(id), &UnderlyingType::Resolved(Type::Int));
        },
    );
}

#[test]
fn every_return_must_agree_on_the_underlying_type() {
    with_checked(
        r#"
        func mixed(flag: Bool) -> opaque Any {
            if flag {
                return 1
            }
            return "two"
        }
        "#,
        |checked| {
            let kinds: Vec<_> = checked
                .diagnostics()
                .iter()
                .map(|diagnostic| diagnostic.kind.clone())
                .collect();
            assert!(
                matches!(
                    &kinds[..],
                    [DiagnosticKind::UnderlyingTypeMismatch { types }]
                        if types[..] == ["Int", "String"]
                ),
                "got {kinds:?}"
            );
            let id = checked.opaque_identity("mixed").unwrap();
            assert_eq!(checked.underlying(id), &UnderlyingType::Error);
        },
    );
}

#[test]
fn never_typed_returns_fix_nothing() {
    with_checked(
        r"
        func steady(flag: Bool) -> opaque Any {
            if flag {
                return fatalError()
            }
            return 3
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let id = checked.opaque_identity("steady").unwrap();
            assert_eq!(checked.underlying(id), &UnderlyingType::Resolved(Type::Int));
        },
    );
}

#[test_case(
    r"
    func quiet() -> opaque Any {
        fatalError()
    }
    ";
    "no return statements"
)]
#[test_case(
    r"
    func trapped() -> opaque Any {
        return fatalError()
    }
    ";
    "only never returns"
)]
fn a_body_with_no_value_returns_is_reported(source: &str) {
    let kinds = diagnostics(source);
    assert!(
        matches!(&kinds[..], [DiagnosticKind::NoReturnStatements]),
        "got {kinds:?}"
    );
}

#[test]
fn self_recursion_with_a_base_case_resolves() {
    with_checked(
        r"
        func countdown(x: Int) -> opaque Any {
            if x == 0 {
                return 0
            }
            return countdown(x - 1)
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let id = checked.opaque_identity("countdown").unwrap();
            assert_eq!(checked.underlying(id), &UnderlyingType::Resolved(Type::Int));
        },
    );
}

#[test]
fn self_reference_before_any_candidate_is_reported_once() {
    with_checked(
        r"
        func marcia() -> opaque Any {
            return [marcia(), marcia(), marcia()]
        }
        ",
        |checked| {
            let kinds: Vec<_> = checked
                .diagnostics()
                .iter()
                .map(|diagnostic| diagnostic.kind.clone())
                .collect();
            // One diagnostic at the first re-entrant call; the later calls
            // see the already-failed state and stay quiet.
            assert!(
                matches!(&kinds[..], [DiagnosticKind::RecursiveOpaqueDefinition]),
                "got {kinds:?}"
            );
            let id = checked.opaque_identity("marcia").unwrap();
            assert_eq!(checked.underlying(id), &UnderlyingType::Error);
        },
    );
}

#[test]
fn a_failed_declaration_still_types_by_identity_downstream() {
    with_checked(
        r"
        func marcia() -> opaque Any {
            return [marcia()]
        }
        func jan() -> opaque Any {
            return [marcia()]
        }
        ",
        |checked| {
            let kinds: Vec<_> = checked
                .diagnostics()
                .iter()
                .map(|diagnostic| diagnostic.kind.clone())
                .collect();
            assert!(
                matches!(&kinds[..], [DiagnosticKind::RecursiveOpaqueDefinition]),
                "got {kinds:?}"
            );
            // `jan` consumes the failed identity without error: calls to
            // `marcia` still have marcia's opaque type.
            let marcia = checked.opaque_identity("marcia").unwrap();
            let jan = checked.opaque_identity("jan").unwrap();
            assert_eq!(
                checked.underlying(jan),
                &UnderlyingType::Resolved(Type::Array(Box::new(Type::Opaque(marcia))))
            );
        },
    );
}

// Marker placement.

#[test]
fn markers_anchor_in_return_and_property_positions() {
    with_checked(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
            subscript(i: Int) -> opaque P {
                return K()
            }
        }
        var kay: opaque P {
            get {
                return K()
            }
        }
        func bar() -> opaque P {
            return K()
        }
        func main() {
            let a = bar()
            a.paul()
            var s = K()[0]
            s = K()[1]
            s.paul()
            let k = kay
            k.paul()
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            // The subscript, the property, and the function each minted one.
            assert_eq!(checked.registry().len(), 3);
        },
    );
}

#[test_case("func f(x: opaque P) {}", OpaquePosition::ParameterType; "parameter type")]
#[test_case("let b: opaque P = 1", OpaquePosition::BindingAnnotation; "binding annotation")]
#[test_case(
    "func f() { let x: opaque P = 1 }",
    OpaquePosition::BindingAnnotation;
    "local annotation"
)]
#[test_case("typealias A = opaque P", OpaquePosition::TypeAliasValue; "typealias value")]
#[test_case(
    "func f() -> [opaque P] { return [1] }",
    OpaquePosition::TupleElement;
    "array element"
)]
#[test_case(
    "func f() -> (opaque P, Int) { return (1, 2) }",
    OpaquePosition::TupleElement;
    "tuple element"
)]
#[test_case(
    "func f() -> (opaque P) -> Int { return fatalError() }",
    OpaquePosition::FunctionTypeParameter;
    "function type parameter"
)]
#[test_case(
    "func f() -> () -> opaque P { return fatalError() }",
    OpaquePosition::FunctionTypeReturn;
    "function type return"
)]
fn markers_elsewhere_are_rejected(source: &str, expected: OpaquePosition) {
    let source = format!("protocol P {{}}\n{source}");
    let kinds = diagnostics(&source);
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::InvalidOpaquePosition { position }] if *position == expected
        ),
        "expected InvalidOpaquePosition({expected:?}), got {kinds:?}"
    );
}

#[test]
fn a_trailing_conjunct_marker_is_rejected() {
    let kinds = diagnostics(
        r"
        protocol P {
            func paul()
        }
        protocol Q {
            func quinn()
        }
        class B: P, Q {
            func paul() {}
            func quinn() {}
        }
        func f() -> P & opaque Q {
            return B()
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::InvalidOpaquePosition {
                position: OpaquePosition::ConjunctionTail
            }]
        ),
        "got {kinds:?}"
    );
}

// Constraint validation.

#[test]
fn a_builtin_cannot_constrain_an_opaque_type() {
    let kinds = diagnostics(
        r"
        func f() -> opaque Int {
            return 1
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::MalformedConstraint {
                reason: MalformedConstraintKind::InvalidRequirement(name)
            }] if name.as_str() == "Int"
        ),
        "got {kinds:?}"
    );
}

#[test_case("func f() -> opaque (Int, Int) { return (1, 2) }"; "tuple")]
#[test_case("func f() -> opaque () { return 1 }"; "unit")]
#[test_case("func f() -> opaque (() -> ()) { return 1 }"; "function type")]
fn structural_constraints_are_rejected(source: &str) {
    let kinds = diagnostics(source);
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::MalformedConstraint {
                reason: MalformedConstraintKind::NonNominal
            }]
        ),
        "got {kinds:?}"
    );
}

#[test]
fn a_second_marker_inside_a_constraint_is_rejected() {
    let kinds = diagnostics(
        r"
        protocol P {}
        protocol Q {}
        func f() -> opaque P & opaque Q {
            return 1
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::MalformedConstraint {
                reason: MalformedConstraintKind::MarkerNotLeading
            }]
        ),
        "got {kinds:?}"
    );
}

#[test]
fn a_constraint_names_at_most_one_class() {
    let kinds = diagnostics(
        r"
        class C {}
        class D {}
        func f() -> opaque C & D {
            return C()
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::MalformedConstraint {
                reason: MalformedConstraintKind::MultipleClasses
            }]
        ),
        "got {kinds:?}"
    );
}

#[test]
fn unknown_constraint_names_are_reported() {
    let kinds = diagnostics(
        r"
        func f() -> opaque Zorp {
            return 1
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::UnresolvedName { name }] if name.as_str() == "Zorp"
        ),
        "got {kinds:?}"
    );
}

// Member access through constraints.

#[test]
fn constraints_grant_declared_members_only() {
    let kinds = diagnostics(
        r"
        protocol P {
            func paul() -> Int
        }
        class K: P {
            func paul() -> Int {
                return 1
            }
        }
        func alice() -> opaque P {
            return K()
        }
        func main() {
            let a = alice()
            let x: Int = a.paul()
            a.quinn()
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::UndeclaredMember { member }] if member.as_str() == "quinn"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn composed_constraints_merge_capabilities() {
    with_checked(
        r"
        protocol P {
            func paul()
        }
        protocol Q {
            func quinn()
        }
        class B: P, Q {
            func paul() {}
            func quinn() {}
        }
        func frank() -> opaque P & Q {
            return B()
        }
        func main() {
            let f = frank()
            f.paul()
            f.quinn()
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let frank = checked.opaque_identity("frank").unwrap();
            assert_eq!(checked.constraints(frank).len(), 2);
            assert!(checked.has_member(frank, "paul"));
            assert!(checked.has_member(frank, "quinn"));
            assert!(!checked.has_member(frank, "ryan"));
        },
    );
}

#[test]
fn inherited_protocol_requirements_are_granted() {
    assert_clean(
        r"
        protocol P {
            func paul()
        }
        protocol R: P {
            func ryan()
        }
        class K: R {
            func paul() {}
            func ryan() {}
        }
        func rachel() -> opaque R {
            return K()
        }
        func main() {
            let r = rachel()
            r.ryan()
            r.paul()
        }
        ",
    );
}

#[test]
fn class_constraints_grant_the_class_members() {
    with_checked(
        r"
        class Base {
            func touch() {}
        }
        class Derived: Base {
        }
        func maker() -> opaque Base {
            return Derived()
        }
        func main() {
            let m = maker()
            m.touch()
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let maker = checked.opaque_identity("maker").unwrap();
            let derived = checked.resolve("Derived").unwrap();
            assert_eq!(
                checked.underlying(maker),
                &UnderlyingType::Resolved(Type::Instance(derived))
            );
        },
    );
}

#[test]
fn a_class_may_compose_with_protocols() {
    with_checked(
        r"
        protocol P {
            func paul()
        }
        protocol Q {
            func quinn()
        }
        class Base {
            func touch() {}
        }
        class Both: Base, P, Q {
            func paul() {}
            func quinn() {}
        }
        func maker() -> opaque Base & P & Q {
            return Both()
        }
        func main() {
            let m = maker()
            m.touch()
            m.paul()
            m.quinn()
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let maker = checked.opaque_identity("maker").unwrap();
            assert_eq!(checked.constraints(maker).len(), 3);
        },
    );
}

#[test]
fn member_calls_are_checked_against_requirement_signatures() {
    let kinds = diagnostics(
        r#"
        protocol P {
            func paul(x: Int)
        }
        class K: P {
            func paul(x: Int) {}
        }
        func alice() -> opaque P {
            return K()
        }
        func main() {
            let a = alice()
            a.paul("nope")
        }
        "#,
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::TypeMismatch { expected, found }]
                if expected == "Int" && found == "String"
        ),
        "got {kinds:?}"
    );
}

#[test_case("Any"; "any")]
#[test_case("AnyObject"; "any object")]
fn the_unconstrained_sentinels_grant_no_members(constraint: &str) {
    let kinds = diagnostics(&format!(
        r"
        class K {{}}
        func boxed() -> opaque {constraint} {{
            return K()
        }}
        func main() {{
            let b = boxed()
            b.poke()
        }}
        "
    ));
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::UndeclaredMember { member }] if member.as_str() == "poke"
        ),
        "got {kinds:?}"
    );
}

// Existential widening.

#[test]
fn opaque_values_satisfy_their_declared_protocols() {
    assert_clean(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
        }
        extend Int: P {
            func paul() {}
        }
        func alice() -> opaque P {
            return K()
        }
        func near(value: P) {
            value.paul()
        }
        func main() {
            near(alice())
            near(K())
            near(5)
        }
        ",
    );
}

#[test]
fn values_without_a_declared_conformance_are_rejected() {
    let kinds = diagnostics(
        r"
        protocol P {
            func paul()
        }
        class L {
        }
        func near(value: P) {
            value.paul()
        }
        func main() {
            near(L())
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::TypeMismatch { expected, found }]
                if expected == "P" && found == "L"
        ),
        "got {kinds:?}"
    );
}

// Computed properties.

#[test]
fn computed_properties_anchor_identities() {
    with_checked(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
        }
        var kay: opaque P {
            get {
                return K()
            }
            set {
                newValue.paul()
            }
        }
        func main() {
            let k = kay
            k.paul()
        }
        ",
        |checked| {
            assert_eq!(checked.diagnostics(), &[]);
            let kay = checked.opaque_identity("kay").unwrap();
            let k = checked.resolve("K").unwrap();
            assert_eq!(
                checked.underlying(kay),
                &UnderlyingType::Resolved(Type::Instance(k))
            );
        },
    );
}

#[test]
fn assigning_a_concrete_value_to_an_opaque_property_fails() {
    let kinds = diagnostics(
        r"
        protocol P {
            func paul()
        }
        class K: P {
            func paul() {}
        }
        var kay: opaque P {
            get {
                return K()
            }
            set {
            }
        }
        func main() {
            kay = K()
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::OpaqueTypeMismatch { expected, found }]
                if expected == "opaque P" && found == "K"
        ),
        "got {kinds:?}"
    );
}

// General checking around opaque values.

#[test]
fn calls_are_checked_against_the_signature() {
    let kinds = diagnostics(
        r#"
        func add(x: Int, y: Int) -> Int {
            return x + y
        }
        func main() {
            let a = add(1)
            let b = add(1, "two")
        }
        "#,
    );
    assert!(
        matches!(
            &kinds[..],
            [
                DiagnosticKind::WrongArgumentCount {
                    expected: 2,
                    found: 1
                },
                DiagnosticKind::TypeMismatch { .. }
            ]
        ),
        "got {kinds:?}"
    );
}

#[test]
fn immutable_bindings_reject_assignment() {
    let kinds = diagnostics(
        r"
        func main() {
            let x = 1
            x = 2
        }
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::AssignmentToImmutable { name }] if name.as_str() == "x"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn duplicate_top_level_names_are_reported() {
    let kinds = diagnostics(
        r"
        func dup() {}
        func dup() {}
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::DuplicateDeclaration { name }] if name.as_str() == "dup"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn a_self_referential_type_alias_is_reported() {
    let kinds = diagnostics(
        r#"
        typealias A = A
        let x: A = 1
        let y: A = "two"
        "#,
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::CircularDefinition { name }] if name.as_str() == "A"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn mutually_recursive_type_aliases_are_reported_once() {
    let kinds = diagnostics(
        r"
        typealias A = B
        typealias B = A
        ",
    );
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::CircularDefinition { name }] if name.as_str() == "A"
        ),
        "got {kinds:?}"
    );
}

#[test]
fn a_self_referential_binding_is_reported() {
    let kinds = diagnostics("let a = a");
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::CircularDefinition { name }] if name.as_str() == "a"
        ),
        "got {kinds:?}"
    );
}

#[test_case("protocol P {}\nfunc main() { let v = P }", "P"; "protocol")]
#[test_case("typealias A = Int\nfunc main() { let v = A }", "A"; "type alias")]
fn a_type_name_is_not_a_value(source: &str, name: &str) {
    let kinds = diagnostics(source);
    assert!(
        matches!(
            &kinds[..],
            [DiagnosticKind::NotAValue { name: found }] if found.as_str() == name
        ),
        "got {kinds:?}"
    );
}

#[test]
fn rendered_types_name_their_constraints() {
    with_checked(
        r"
        protocol P {
            func paul()
        }
        protocol Q {
            func quinn()
        }
        class B: P, Q {
            func paul() {}
            func quinn() {}
        }
        func frank() -> opaque P & Q {
            return B()
        }
        ",
        |checked| {
            let frank = checked.opaque_identity("frank").unwrap();
            let opaque = Type::Opaque(frank);
            assert_eq!(checked.display(&opaque).to_string(), "opaque P & Q");
            let array = Type::Array(Box::new(Type::Opaque(frank)));
            assert_eq!(checked.display(&array).to_string(), "[opaque P & Q]");
            let tuple = Type::Tuple(Box::new([Type::Int, Type::String]));
            assert_eq!(checked.display(&tuple).to_string(), "(Int, String)");
        },
    );
}
