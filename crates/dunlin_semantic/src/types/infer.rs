//! The type checker.
//!
//! Checking runs in two passes over the declaration arena. The first pass
//! walks every annotation, diagnosing `opaque` markers outside anchoring
//! positions and minting an identity in the [`OpaqueTypeRegistry`] for each
//! legal one. The second pass checks declaration bodies in source order.
//!
//! Body checking doubles as underlying-type resolution: while an opaque
//! declaration's body is open, its identity is [`UnderlyingType::InProgress`]
//! and every value-producing `return` feeds the candidate. A call to an
//! opaque-returning declaration pokes that declaration's resolution: checking
//! its body on demand if it has not run yet, and diagnosing the recursion if
//! the body is already open with no candidate fixed. Callers always type the
//! call by identity, so resolution failures never cascade.

use dunlin_ast::{self as ast, Name, Ranged};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use text_size::TextRange;

use crate::constraints::{build_constraint_set, ConstraintSet, MemberTable, Requirement};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::opaque::{OpaqueTypeId, OpaqueTypeRegistry, UnderlyingType};
use crate::placement::{self, OpaquePosition};
use crate::semantic_index::{Declaration, DeclarationId, Nominal, SemanticIndex, TypeParamId};
use crate::types::{FunctionSignature, Type};

/// Everything checking a module produces.
pub(crate) struct CheckerOutput<'ast> {
    pub(crate) index: SemanticIndex<'ast>,
    pub(crate) registry: OpaqueTypeRegistry,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

pub(crate) fn check_module<'ast>(module: &'ast ast::Module) -> CheckerOutput<'ast> {
    let _span = tracing::trace_span!("check_module").entered();
    let (index, diagnostics) = SemanticIndex::build(module);
    let mut checker = TypeChecker {
        index,
        registry: OpaqueTypeRegistry::default(),
        diagnostics,
        declaration_types: FxHashMap::default(),
        in_progress_types: FxHashSet::default(),
        checked_bodies: FxHashSet::default(),
        body: BodyState::default(),
    };
    checker.register_declarations();
    checker.check_bodies();
    let TypeChecker {
        index,
        registry,
        mut diagnostics,
        ..
    } = checker;
    diagnostics.sort_by_key(|diagnostic| (diagnostic.range.start(), diagnostic.range.end()));
    CheckerOutput {
        index,
        registry,
        diagnostics,
    }
}

/// A name bound inside a body: a parameter, a `let`, or a `var`.
#[derive(Clone)]
struct Local {
    ty: Type,
    mutable: bool,
}

/// What `return` statements in the current body are checked against.
#[derive(Default)]
enum ReturnContext {
    /// Not inside a body.
    #[default]
    None,
    /// The declared return type; returns must be assignable to it.
    Concrete(Type),
    /// The body anchors an opaque identity; returns feed its resolution.
    Opaque(OpaqueResolution),
}

/// Bookkeeping for one opaque declaration's body while it is open.
struct OpaqueResolution {
    id: OpaqueTypeId,
    /// The distinct underlying types returned so far, in source order, each
    /// with the range of the return value that introduced it.
    distinct: Vec<(Type, TextRange)>,
    /// Whether some return produced `Error`. Suppresses the no-returns
    /// diagnostic: the body does return, we just could not type it.
    saw_error_return: bool,
}

/// The mutable state of the body currently being checked.
///
/// Checking one body can demand another (a call poking an unresolved
/// identity, a binding initializer); the whole state is swapped out around
/// the nested check and restored afterwards.
#[derive(Default)]
struct BodyState {
    scopes: Vec<FxHashMap<Name, Local>>,
    context: ReturnContext,
    owner: Option<DeclarationId>,
}

struct TypeChecker<'ast> {
    index: SemanticIndex<'ast>,
    registry: OpaqueTypeRegistry,
    diagnostics: Vec<Diagnostic>,
    /// Memoized declaration types. Signatures are resolved exactly once, so
    /// their annotations are diagnosed exactly once.
    declaration_types: FxHashMap<DeclarationId, Type>,
    /// Bindings and aliases whose types are being resolved right now;
    /// breaks reference cycles.
    in_progress_types: FxHashSet<DeclarationId>,
    /// Bodies that have been entered. Inserted on entry, not on exit: a
    /// re-entrant demand must observe the open body's in-progress state
    /// instead of re-running it.
    checked_bodies: FxHashSet<DeclarationId>,
    body: BodyState,
}

/// Values available without a declaration.
fn builtin_value(name: &str) -> Option<Type> {
    match name {
        "fatalError" => Some(Type::Function(Box::new(FunctionSignature {
            parameters: SmallVec::new(),
            returns: Type::Never,
        }))),
        _ => None,
    }
}

fn set_implies_class(set: &ConstraintSet) -> bool {
    set.requirements()
        .any(|requirement| matches!(requirement, Requirement::AnyObject | Requirement::Class(_)))
}

impl<'ast> TypeChecker<'ast> {
    // Pass one: marker placement and identity registration.

    fn register_declarations(&mut self) {
        let _span = tracing::trace_span!("register_declarations").entered();
        for index in 0..self.index.declaration_count() {
            let declaration = DeclarationId::from_usize(index);
            match self.index.declaration(declaration) {
                Declaration::Function(node) => {
                    if let Some(type_params) = &node.type_params {
                        self.validate_type_param_bounds(type_params);
                    }
                    for parameter in &node.parameters {
                        self.reject_marker_sites(
                            &parameter.annotation,
                            OpaquePosition::ParameterType,
                        );
                    }
                    if let Some(returns) = &node.returns {
                        self.register_marker_sites(declaration, returns, OpaquePosition::ReturnType);
                    }
                }
                Declaration::Subscript(node) => {
                    for parameter in &node.parameters {
                        self.reject_marker_sites(
                            &parameter.annotation,
                            OpaquePosition::ParameterType,
                        );
                    }
                    self.register_marker_sites(declaration, &node.returns, OpaquePosition::ReturnType);
                }
                Declaration::Property(node) => {
                    self.register_marker_sites(
                        declaration,
                        &node.annotation,
                        OpaquePosition::PropertyType,
                    );
                }
                Declaration::Binding(node) => {
                    if let Some(annotation) = &node.annotation {
                        self.reject_marker_sites(annotation, OpaquePosition::BindingAnnotation);
                    }
                }
                Declaration::TypeAlias(node) => {
                    self.reject_marker_sites(&node.value, OpaquePosition::TypeAliasValue);
                }
                Declaration::Protocol(_) | Declaration::Class(_) => {}
            }
        }
    }

    /// Walks an annotation that can anchor an identity. The outermost marker
    /// is registered; markers in nested positions are diagnosed.
    fn register_marker_sites(
        &mut self,
        declaration: DeclarationId,
        annotation: &'ast ast::TypeExpr,
        position: OpaquePosition,
    ) {
        let mut sites = Vec::new();
        placement::collect_sites(annotation, position, &mut sites);
        for site in sites {
            if site.position.is_legal() {
                self.register_site(declaration, site.marker);
            } else {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::InvalidOpaquePosition {
                        position: site.position,
                    },
                    site.marker.range,
                ));
            }
        }
    }

    /// Walks an annotation in which no position anchors; every marker is
    /// diagnosed.
    fn reject_marker_sites(&mut self, annotation: &'ast ast::TypeExpr, position: OpaquePosition) {
        let mut sites = Vec::new();
        placement::collect_sites(annotation, position, &mut sites);
        for site in sites {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::InvalidOpaquePosition {
                    position: site.position,
                },
                site.marker.range,
            ));
        }
    }

    /// Mints an identity for a legally placed marker. A malformed constraint
    /// is diagnosed and mints nothing: the declaration is then checked as if
    /// its annotation had failed to resolve.
    fn register_site(&mut self, declaration: DeclarationId, marker: &'ast ast::TypeOpaque) {
        match build_constraint_set(&marker.constraint, &self.index) {
            Ok(constraints) => {
                let members = MemberTable::from_constraint_set(&constraints, &self.index);
                self.registry
                    .register_or_lookup(declaration, constraints, members);
            }
            Err(error) => {
                if let Some(diagnostic) = error.into_diagnostic() {
                    self.diagnostics.push(diagnostic);
                }
            }
        }
    }

    fn validate_type_param_bounds(&mut self, type_params: &'ast ast::TypeParams) {
        for param in &type_params.params {
            let Some(bound) = &param.bound else {
                continue;
            };
            if let Err(error) = build_constraint_set(bound, &self.index) {
                if let Some(diagnostic) = error.into_diagnostic() {
                    self.diagnostics.push(diagnostic);
                }
            }
        }
    }

    // Pass two: bodies.

    fn check_bodies(&mut self) {
        let _span = tracing::trace_span!("check_bodies").entered();
        for index in 0..self.index.declaration_count() {
            self.ensure_checked(DeclarationId::from_usize(index));
        }
    }

    fn ensure_checked(&mut self, declaration: DeclarationId) {
        if !self.checked_bodies.insert(declaration) {
            return;
        }
        match self.index.declaration(declaration) {
            Declaration::Function(node) => self.check_function_body(declaration, node),
            Declaration::Subscript(node) => self.check_subscript_body(declaration, node),
            Declaration::Property(node) => self.check_property_body(declaration, node),
            Declaration::Binding(node) => {
                self.binding_type(declaration, node);
            }
            Declaration::TypeAlias(_) => {
                self.declaration_type(declaration);
            }
            Declaration::Protocol(_) | Declaration::Class(_) => {}
        }
    }

    fn check_function_body(&mut self, declaration: DeclarationId, node: &'ast ast::DeclFunction) {
        let signature = self.declaration_type(declaration);
        let Some(body) = &node.body else {
            // A protocol requirement; there is nothing to check.
            return;
        };
        let Type::Function(signature) = signature else {
            return;
        };
        let FunctionSignature {
            parameters,
            returns,
        } = *signature;
        let mut locals = FxHashMap::default();
        for (parameter, ty) in node.parameters.iter().zip(parameters) {
            if parameter.name.as_str().is_empty() {
                continue;
            }
            locals.insert(parameter.name.id.clone(), Local { ty, mutable: false });
        }
        let context = self.return_context(declaration, returns);
        self.check_body_with(declaration, body, locals, context);
    }

    fn check_subscript_body(&mut self, declaration: DeclarationId, node: &'ast ast::DeclSubscript) {
        let signature = self.declaration_type(declaration);
        let Type::Function(signature) = signature else {
            return;
        };
        let FunctionSignature {
            parameters,
            returns,
        } = *signature;
        let mut locals = FxHashMap::default();
        for (parameter, ty) in node.parameters.iter().zip(parameters) {
            if parameter.name.as_str().is_empty() {
                continue;
            }
            locals.insert(parameter.name.id.clone(), Local { ty, mutable: false });
        }
        let context = self.return_context(declaration, returns);
        self.check_body_with(declaration, &node.body, locals, context);
    }

    fn check_property_body(&mut self, declaration: DeclarationId, node: &'ast ast::DeclProperty) {
        let property = self.declaration_type(declaration);
        let context = self.return_context(declaration, property.clone());
        self.check_body_with(declaration, &node.getter, FxHashMap::default(), context);
        // The setter sees the abstract value: `newValue` has the property's
        // opaque type, not the underlying type the getter resolved.
        if let Some(setter) = &node.setter {
            let mut locals = FxHashMap::default();
            locals.insert(
                Name::new_static("newValue"),
                Local {
                    ty: property,
                    mutable: false,
                },
            );
            self.check_body_with(declaration, setter, locals, ReturnContext::Concrete(Type::Void));
        }
    }

    fn return_context(&mut self, declaration: DeclarationId, declared: Type) -> ReturnContext {
        match self.registry.identity_of(declaration) {
            Some(id) => {
                *self.registry.underlying_mut(id) = UnderlyingType::InProgress { candidate: None };
                ReturnContext::Opaque(OpaqueResolution {
                    id,
                    distinct: Vec::new(),
                    saw_error_return: false,
                })
            }
            None => ReturnContext::Concrete(declared),
        }
    }

    fn check_body_with(
        &mut self,
        declaration: DeclarationId,
        body: &'ast ast::Block,
        locals: FxHashMap<Name, Local>,
        context: ReturnContext,
    ) {
        let enclosing = std::mem::replace(
            &mut self.body,
            BodyState {
                scopes: vec![locals],
                context,
                owner: Some(declaration),
            },
        );
        for statement in &body.body {
            self.check_statement(statement);
        }
        let finished = std::mem::replace(&mut self.body, enclosing);
        if let ReturnContext::Opaque(resolution) = finished.context {
            self.finalize_resolution(declaration, resolution);
        }
    }

    /// Settles an identity's underlying type once its body has been walked.
    fn finalize_resolution(&mut self, declaration: DeclarationId, resolution: OpaqueResolution) {
        let OpaqueResolution {
            id,
            distinct,
            saw_error_return,
        } = resolution;
        if matches!(self.registry.underlying(id), UnderlyingType::Error) {
            // A recursion diagnostic already settled it.
            return;
        }
        if distinct.len() > 1 {
            let types = distinct
                .iter()
                .map(|(ty, _)| self.display_string(ty))
                .collect();
            let range = distinct[1].1;
            *self.registry.underlying_mut(id) = UnderlyingType::Error;
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnderlyingTypeMismatch { types },
                range,
            ));
            return;
        }
        if let Some((ty, _)) = distinct.into_iter().next() {
            tracing::debug!(?id, "resolved opaque underlying type");
            *self.registry.underlying_mut(id) = UnderlyingType::Resolved(ty);
        } else if saw_error_return {
            *self.registry.underlying_mut(id) = UnderlyingType::Error;
        } else {
            *self.registry.underlying_mut(id) = UnderlyingType::Error;
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::NoReturnStatements,
                self.index.declaration(declaration).diagnostic_range(),
            ));
        }
    }

    /// Reacts to a call of an opaque-returning declaration.
    ///
    /// A settled identity needs nothing. An untouched one has its owner's
    /// body checked on the spot. An open one with a candidate is a
    /// recursion with a base case, which is fine; an open one without a
    /// candidate can never settle, so it fails here, at the re-entrant
    /// call, exactly once.
    fn poke_resolution(&mut self, id: OpaqueTypeId, range: TextRange) {
        match self.registry.underlying(id) {
            UnderlyingType::Resolved(_) | UnderlyingType::Error => {}
            UnderlyingType::InProgress { candidate: Some(_) } => {}
            UnderlyingType::Unresolved => {
                let owner = self.registry.owner(id);
                self.ensure_checked(owner);
            }
            UnderlyingType::InProgress { candidate: None } => {
                *self.registry.underlying_mut(id) = UnderlyingType::Error;
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::RecursiveOpaqueDefinition,
                    range,
                ));
            }
        }
    }

    // Statements.

    fn check_statement(&mut self, statement: &'ast ast::Stmt) {
        match statement {
            ast::Stmt::Return(node) => self.check_return(node),
            ast::Stmt::If(node) => {
                let test = self.infer_expression(&node.test);
                self.check_assignable(&Type::Bool, &test, node.test.range());
                self.check_block(&node.body);
                if let Some(orelse) = &node.orelse {
                    self.check_block(orelse);
                }
            }
            ast::Stmt::Local(node) => self.check_local(node),
            ast::Stmt::Assign(node) => self.check_assign(node),
            ast::Stmt::Discard(node) => {
                self.infer_expression(&node.value);
            }
            ast::Stmt::Expr(node) => {
                self.infer_expression(&node.value);
            }
        }
    }

    fn check_block(&mut self, block: &'ast ast::Block) {
        self.body.scopes.push(FxHashMap::default());
        for statement in &block.body {
            self.check_statement(statement);
        }
        self.body.scopes.pop();
    }

    fn check_return(&mut self, statement: &'ast ast::StmtReturn) {
        let (ty, range) = match &statement.value {
            Some(value) => (self.infer_expression(value), value.range()),
            None => (Type::Void, statement.range),
        };
        match &self.body.context {
            ReturnContext::None => {}
            ReturnContext::Concrete(expected) => {
                let expected = expected.clone();
                self.check_assignable(&expected, &ty, range);
            }
            ReturnContext::Opaque(_) => self.record_opaque_return(ty, range),
        }
    }

    /// Feeds one returned type into the open identity's resolution.
    ///
    /// `Never` and `Error` returns fix nothing; a return of the identity
    /// itself (a recursive call with a base case elsewhere) is not a new
    /// candidate either. The first remaining return fixes the candidate;
    /// later ones must agree with it.
    fn record_opaque_return(&mut self, ty: Type, range: TextRange) {
        let ReturnContext::Opaque(resolution) = &mut self.body.context else {
            return;
        };
        if matches!(
            self.registry.underlying(resolution.id),
            UnderlyingType::Error
        ) {
            return;
        }
        if ty.is_error() {
            resolution.saw_error_return = true;
            return;
        }
        if matches!(ty, Type::Never) || ty == Type::Opaque(resolution.id) {
            return;
        }
        let UnderlyingType::InProgress { candidate } =
            self.registry.underlying_mut(resolution.id)
        else {
            return;
        };
        match candidate {
            None => {
                *candidate = Some(ty.clone());
                resolution.distinct.push((ty, range));
            }
            Some(existing) if *existing == ty => {}
            Some(_) => {
                if !resolution.distinct.iter().any(|(seen, _)| *seen == ty) {
                    resolution.distinct.push((ty, range));
                }
            }
        }
    }

    fn check_local(&mut self, statement: &'ast ast::StmtLocal) {
        let declared = statement.annotation.as_ref().map(|annotation| {
            self.reject_marker_sites(annotation, OpaquePosition::BindingAnnotation);
            let owner = self.body.owner;
            self.resolve_annotation(annotation, owner)
        });
        let value = self.infer_expression(&statement.value);
        let ty = match declared {
            Some(declared) if !declared.is_error() => {
                self.check_assignable(&declared, &value, statement.value.range());
                declared
            }
            // No annotation, or one that failed to resolve: the initializer
            // decides.
            _ => value,
        };
        if statement.name.as_str().is_empty() {
            return;
        }
        if let Some(scope) = self.body.scopes.last_mut() {
            scope.insert(
                statement.name.id.clone(),
                Local {
                    ty,
                    mutable: statement.mutable,
                },
            );
        }
    }

    fn check_assign(&mut self, statement: &'ast ast::StmtAssign) {
        let value = self.infer_expression(&statement.value);
        if statement.target.as_str().is_empty() {
            return;
        }
        if let Some(local) = self.lookup_local(statement.target.as_str()) {
            let Local { ty, mutable } = local.clone();
            if mutable {
                self.check_assignable(&ty, &value, statement.value.range());
            } else {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::AssignmentToImmutable {
                        name: statement.target.id.clone(),
                    },
                    statement.target.range,
                ));
            }
            return;
        }
        let Some(declaration) = self.index.resolve(statement.target.as_str()) else {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnresolvedName {
                    name: statement.target.id.clone(),
                },
                statement.target.range,
            ));
            return;
        };
        match self.index.declaration(declaration) {
            Declaration::Property(node) if node.setter.is_some() => {
                let ty = self.declaration_type(declaration);
                self.check_assignable(&ty, &value, statement.value.range());
            }
            _ => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::AssignmentToImmutable {
                        name: statement.target.id.clone(),
                    },
                    statement.target.range,
                ));
            }
        }
    }

    // Declaration types.

    /// The type a reference to `declaration` has. Memoized, so annotation
    /// diagnostics surface exactly once no matter how often a declaration is
    /// referenced.
    fn declaration_type(&mut self, declaration: DeclarationId) -> Type {
        if let Some(ty) = self.declaration_types.get(&declaration) {
            return ty.clone();
        }
        let ty = match self.index.declaration(declaration) {
            Declaration::Function(node) => self.function_type(declaration, node),
            Declaration::Subscript(node) => self.subscript_type(declaration, node),
            Declaration::Property(node) => self.property_type(declaration, node),
            Declaration::Binding(node) => return self.binding_type(declaration, node),
            Declaration::TypeAlias(node) => return self.alias_type(declaration, node),
            Declaration::Protocol(_) | Declaration::Class(_) => Type::Error,
        };
        self.declaration_types.insert(declaration, ty.clone());
        ty
    }

    fn function_type(&mut self, declaration: DeclarationId, node: &'ast ast::DeclFunction) -> Type {
        let parameters = node
            .parameters
            .iter()
            .map(|parameter| self.resolve_annotation(&parameter.annotation, Some(declaration)))
            .collect();
        let returns = match self.registry.identity_of(declaration) {
            Some(id) => Type::Opaque(id),
            None => match &node.returns {
                Some(returns) => self.resolve_annotation(returns, Some(declaration)),
                None => Type::Void,
            },
        };
        Type::Function(Box::new(FunctionSignature {
            parameters,
            returns,
        }))
    }

    fn subscript_type(
        &mut self,
        declaration: DeclarationId,
        node: &'ast ast::DeclSubscript,
    ) -> Type {
        let parameters = node
            .parameters
            .iter()
            .map(|parameter| self.resolve_annotation(&parameter.annotation, Some(declaration)))
            .collect();
        let returns = match self.registry.identity_of(declaration) {
            Some(id) => Type::Opaque(id),
            None => self.resolve_annotation(&node.returns, Some(declaration)),
        };
        Type::Function(Box::new(FunctionSignature {
            parameters,
            returns,
        }))
    }

    fn property_type(&mut self, declaration: DeclarationId, node: &'ast ast::DeclProperty) -> Type {
        match self.registry.identity_of(declaration) {
            Some(id) => Type::Opaque(id),
            None => self.resolve_annotation(&node.annotation, Some(declaration)),
        }
    }

    /// The type of a stored binding: its annotation if it resolves, the
    /// initializer's type otherwise. The initializer is inferred under a
    /// fresh body state so it cannot see the demanding body's locals.
    fn binding_type(&mut self, declaration: DeclarationId, node: &'ast ast::DeclBinding) -> Type {
        if let Some(ty) = self.declaration_types.get(&declaration) {
            return ty.clone();
        }
        if !self.in_progress_types.insert(declaration) {
            self.circular_definition(&node.name);
            return Type::Error;
        }
        let enclosing = std::mem::take(&mut self.body);
        let declared = node
            .annotation
            .as_ref()
            .map(|annotation| self.resolve_annotation(annotation, None));
        let value = self.infer_expression(&node.value);
        let ty = match declared {
            Some(declared) if !declared.is_error() => {
                self.check_assignable(&declared, &value, node.value.range());
                declared
            }
            _ => value,
        };
        self.body = enclosing;
        self.in_progress_types.remove(&declaration);
        self.declaration_types.insert(declaration, ty.clone());
        ty
    }

    fn alias_type(&mut self, declaration: DeclarationId, node: &'ast ast::DeclTypeAlias) -> Type {
        if let Some(ty) = self.declaration_types.get(&declaration) {
            return ty.clone();
        }
        if !self.in_progress_types.insert(declaration) {
            self.circular_definition(&node.name);
            return Type::Error;
        }
        let ty = self.resolve_annotation(&node.value, None);
        self.in_progress_types.remove(&declaration);
        self.declaration_types.insert(declaration, ty.clone());
        ty
    }

    /// Reports a declaration cycle. Reached at most once per cycle: the
    /// re-entrant computation returns `Error`, which the outer computation
    /// then memoizes, so later references never re-enter.
    fn circular_definition(&mut self, name: &ast::Identifier) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::CircularDefinition {
                name: name.id.clone(),
            },
            name.range,
        ));
    }

    // Annotations.

    /// Resolves a type annotation. `owner` supplies the generic parameters
    /// in scope, when the annotation sits in a declaration that has any.
    ///
    /// `opaque` markers resolve silently to `Error` here: pass one has
    /// already either minted an identity for them (in which case the
    /// declaration's type is built from the identity, not from this path) or
    /// diagnosed them.
    fn resolve_annotation(
        &mut self,
        annotation: &'ast ast::TypeExpr,
        owner: Option<DeclarationId>,
    ) -> Type {
        match annotation {
            ast::TypeExpr::Name(name) => self.resolve_type_name(name, owner),
            ast::TypeExpr::Array(array) => {
                Type::Array(Box::new(self.resolve_annotation(&array.element, owner)))
            }
            ast::TypeExpr::Tuple(tuple) => match tuple.elements.as_slice() {
                [] => Type::Void,
                [element] => self.resolve_annotation(element, owner),
                elements => Type::Tuple(
                    elements
                        .iter()
                        .map(|element| self.resolve_annotation(element, owner))
                        .collect(),
                ),
            },
            ast::TypeExpr::Function(function) => {
                let parameters = function
                    .parameters
                    .iter()
                    .map(|parameter| self.resolve_annotation(parameter, owner))
                    .collect();
                let returns = self.resolve_annotation(&function.returns, owner);
                Type::Function(Box::new(FunctionSignature {
                    parameters,
                    returns,
                }))
            }
            ast::TypeExpr::Composition(composition) => {
                if composition
                    .members
                    .iter()
                    .any(|member| matches!(member, ast::TypeExpr::Opaque(_)))
                {
                    return Type::Error;
                }
                match build_constraint_set(annotation, &self.index) {
                    Ok(set) => Type::Existential(Box::new(set)),
                    Err(error) => {
                        if let Some(diagnostic) = error.into_diagnostic() {
                            self.diagnostics.push(diagnostic);
                        }
                        Type::Error
                    }
                }
            }
            ast::TypeExpr::Opaque(_) => Type::Error,
        }
    }

    fn resolve_type_name(&mut self, name: &ast::TypeName, owner: Option<DeclarationId>) -> Type {
        if name.id.is_empty() {
            // A parser recovery placeholder, already reported.
            return Type::Error;
        }
        if let Some(owner) = owner {
            for &param in self.index.type_params_of(owner) {
                if self.index.type_param(param).name == name.id {
                    return Type::TypeParam(param);
                }
            }
        }
        if let Some(declaration) = self.index.resolve(name.id.as_str()) {
            return self.named_declaration_type(name, declaration);
        }
        match name.id.as_str() {
            "Int" => Type::Int,
            "String" => Type::String,
            "Bool" => Type::Bool,
            "Never" => Type::Never,
            "Any" => {
                let mut set = ConstraintSet::default();
                set.insert(Requirement::Any);
                Type::Existential(Box::new(set))
            }
            "AnyObject" => {
                let mut set = ConstraintSet::default();
                set.insert(Requirement::AnyObject);
                Type::Existential(Box::new(set))
            }
            _ => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedName {
                        name: name.id.clone(),
                    },
                    name.range,
                ));
                Type::Error
            }
        }
    }

    fn named_declaration_type(&mut self, name: &ast::TypeName, declaration: DeclarationId) -> Type {
        match self.index.declaration(declaration) {
            Declaration::Protocol(_) => {
                let mut set = ConstraintSet::default();
                set.insert(Requirement::Protocol(declaration));
                Type::Existential(Box::new(set))
            }
            Declaration::Class(_) => Type::Instance(declaration),
            Declaration::TypeAlias(node) => self.alias_type(declaration, node),
            _ => {
                // A value declaration in type position.
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedName {
                        name: name.id.clone(),
                    },
                    name.range,
                ));
                Type::Error
            }
        }
    }

    // Expressions.

    fn infer_expression(&mut self, expression: &'ast ast::Expr) -> Type {
        match expression {
            ast::Expr::IntLiteral(_) => Type::Int,
            ast::Expr::StringLiteral(_) => Type::String,
            ast::Expr::BooleanLiteral(_) => Type::Bool,
            ast::Expr::Name(name) => self.infer_name(name),
            ast::Expr::Call(call) => self.infer_call(call),
            ast::Expr::Attribute(attribute) => self.infer_attribute(attribute).0,
            ast::Expr::Subscript(subscript) => self.infer_subscript(subscript),
            ast::Expr::Array(array) => self.infer_array(array),
            ast::Expr::Tuple(tuple) => self.infer_tuple(tuple),
            ast::Expr::BinaryOp(binary) => self.infer_binary(binary),
        }
    }

    fn infer_name(&mut self, name: &ast::ExprName) -> Type {
        if name.id.is_empty() {
            return Type::Error;
        }
        if let Some(local) = self.lookup_local(name.id.as_str()) {
            return local.ty.clone();
        }
        if let Some(declaration) = self.index.resolve(name.id.as_str()) {
            return match self.index.declaration(declaration) {
                Declaration::Class(_) => Type::Class(declaration),
                Declaration::Protocol(_) | Declaration::TypeAlias(_) => {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::NotAValue {
                            name: name.id.clone(),
                        },
                        name.range,
                    ));
                    Type::Error
                }
                _ => self.declaration_type(declaration),
            };
        }
        if let Some(ty) = builtin_value(name.id.as_str()) {
            return ty;
        }
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnresolvedName {
                name: name.id.clone(),
            },
            name.range,
        ));
        Type::Error
    }

    fn lookup_local(&self, name: &str) -> Option<&Local> {
        self.body
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    fn infer_call(&mut self, call: &'ast ast::ExprCall) -> Type {
        let (callee, target) = self.infer_callee(&call.func);
        let result = match callee {
            Type::Error => {
                self.infer_arguments(&call.arguments);
                Type::Error
            }
            Type::Function(signature) => {
                let FunctionSignature {
                    parameters,
                    returns,
                } = *signature;
                self.check_arguments(&parameters, &call.arguments, call.range);
                returns
            }
            Type::Class(class) => {
                self.infer_arguments(&call.arguments);
                if !call.arguments.is_empty() {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::WrongArgumentCount {
                            expected: 0,
                            found: call.arguments.len(),
                        },
                        call.range,
                    ));
                }
                Type::Instance(class)
            }
            other => {
                self.infer_arguments(&call.arguments);
                let type_name = self.display_string(&other);
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::NotCallable { type_name },
                    call.range,
                ));
                Type::Error
            }
        };
        // Calling an opaque-returning declaration demands its resolution.
        // The call itself is already typed by identity, so whatever the poke
        // finds, `result` stands.
        if let Some(target) = target {
            if let Some(id) = self.registry.identity_of(target) {
                self.poke_resolution(id, call.range);
            }
        }
        result
    }

    /// Infers a callee, and also resolves which declaration it names, if it
    /// directly names one. Only such calls can poke opaque resolution; a
    /// callee reached through a value (a local, a parameter) carries the
    /// identity in its type and needs no poke.
    fn infer_callee(&mut self, callee: &'ast ast::Expr) -> (Type, Option<DeclarationId>) {
        match callee {
            ast::Expr::Name(name) => {
                let ty = self.infer_name(name);
                let target = if self.lookup_local(name.id.as_str()).is_none() {
                    self.index.resolve(name.id.as_str())
                } else {
                    None
                };
                (ty, target)
            }
            ast::Expr::Attribute(attribute) => self.infer_attribute(attribute),
            other => (self.infer_expression(other), None),
        }
    }

    fn infer_arguments(&mut self, arguments: &'ast [ast::Expr]) {
        for argument in arguments {
            self.infer_expression(argument);
        }
    }

    fn check_arguments(
        &mut self,
        parameters: &[Type],
        arguments: &'ast [ast::Expr],
        range: TextRange,
    ) {
        if parameters.len() != arguments.len() {
            self.infer_arguments(arguments);
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::WrongArgumentCount {
                    expected: parameters.len(),
                    found: arguments.len(),
                },
                range,
            ));
            return;
        }
        for (parameter, argument) in parameters.iter().zip(arguments) {
            let ty = self.infer_expression(argument);
            self.check_assignable(parameter, &ty, argument.range());
        }
    }

    /// Infers a member access, returning the member's declaration as well so
    /// that a call through the access can poke opaque resolution.
    fn infer_attribute(
        &mut self,
        attribute: &'ast ast::ExprAttribute,
    ) -> (Type, Option<DeclarationId>) {
        let receiver = self.infer_expression(&attribute.value);
        if attribute.attr.as_str().is_empty() || receiver.is_error() {
            return (Type::Error, None);
        }
        let member = match &receiver {
            Type::Opaque(id) => self.registry.members(*id).get(attribute.attr.as_str()),
            Type::Existential(set) => {
                MemberTable::from_constraint_set(set, &self.index).get(attribute.attr.as_str())
            }
            Type::TypeParam(param) => match self.type_param_members(*param) {
                Ok(table) => table.and_then(|table| table.get(attribute.attr.as_str())),
                Err(()) => return (Type::Error, None),
            },
            other => match other.nominal() {
                Some(nominal) => self.index.lookup_member(nominal, attribute.attr.as_str()),
                None => None,
            },
        };
        match member {
            Some(member) => {
                let ty = self.declaration_type(member);
                (ty, Some(member))
            }
            None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UndeclaredMember {
                        member: attribute.attr.id.clone(),
                    },
                    attribute.attr.range,
                ));
                (Type::Error, None)
            }
        }
    }

    fn infer_subscript(&mut self, subscript: &'ast ast::ExprSubscript) -> Type {
        let receiver = self.infer_expression(&subscript.value);
        if receiver.is_error() {
            self.infer_arguments(&subscript.arguments);
            return Type::Error;
        }
        if let Type::Array(element) = receiver {
            if let [index] = subscript.arguments.as_slice() {
                let ty = self.infer_expression(index);
                self.check_assignable(&Type::Int, &ty, index.range());
            } else {
                self.infer_arguments(&subscript.arguments);
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::WrongArgumentCount {
                        expected: 1,
                        found: subscript.arguments.len(),
                    },
                    subscript.range,
                ));
            }
            return *element;
        }
        let member = match &receiver {
            Type::Opaque(id) => self.registry.members(*id).subscript(),
            Type::Existential(set) => MemberTable::from_constraint_set(set, &self.index).subscript(),
            Type::TypeParam(param) => match self.type_param_members(*param) {
                Ok(table) => table.and_then(|table| table.subscript()),
                Err(()) => {
                    self.infer_arguments(&subscript.arguments);
                    return Type::Error;
                }
            },
            other => other
                .nominal()
                .and_then(|nominal| self.index.lookup_subscript(nominal)),
        };
        match member {
            Some(member) => self.apply_member_call(member, &subscript.arguments, subscript.range),
            None => {
                self.infer_arguments(&subscript.arguments);
                let type_name = self.display_string(&receiver);
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::NotIndexable { type_name },
                    subscript.range,
                ));
                Type::Error
            }
        }
    }

    /// Applies a subscript member: checks the arguments against its
    /// signature and pokes its resolution if it anchors an identity.
    fn apply_member_call(
        &mut self,
        member: DeclarationId,
        arguments: &'ast [ast::Expr],
        range: TextRange,
    ) -> Type {
        let result = match self.declaration_type(member) {
            Type::Function(signature) => {
                let FunctionSignature {
                    parameters,
                    returns,
                } = *signature;
                self.check_arguments(&parameters, arguments, range);
                returns
            }
            _ => Type::Error,
        };
        if let Some(id) = self.registry.identity_of(member) {
            self.poke_resolution(id, range);
        }
        result
    }

    /// The capability table a generic parameter grants: its bound's members.
    /// `Err` when the bound was malformed, which pass one already diagnosed.
    fn type_param_members(&self, param: TypeParamId) -> Result<Option<MemberTable>, ()> {
        let Some(bound) = self.index.type_param(param).bound else {
            return Ok(None);
        };
        match build_constraint_set(bound, &self.index) {
            Ok(set) => Ok(Some(MemberTable::from_constraint_set(&set, &self.index))),
            Err(_) => Err(()),
        }
    }

    fn infer_array(&mut self, array: &'ast ast::ExprArray) -> Type {
        let mut element: Option<Type> = None;
        for value in &array.elements {
            let ty = self.infer_expression(value);
            element = match element.take() {
                None => (!ty.is_error()).then_some(ty),
                Some(current) => {
                    if current.accepts(&ty) {
                        Some(current)
                    } else if ty.accepts(&current) {
                        Some(ty)
                    } else {
                        Some(Type::Error)
                    }
                }
            };
        }
        Type::Array(Box::new(element.unwrap_or(Type::Never)))
    }

    fn infer_tuple(&mut self, tuple: &'ast ast::ExprTuple) -> Type {
        match tuple.elements.as_slice() {
            [] => Type::Void,
            [element] => self.infer_expression(element),
            elements => Type::Tuple(
                elements
                    .iter()
                    .map(|element| self.infer_expression(element))
                    .collect(),
            ),
        }
    }

    fn infer_binary(&mut self, binary: &'ast ast::ExprBinaryOp) -> Type {
        let left = self.infer_expression(&binary.left);
        let right = self.infer_expression(&binary.right);
        match binary.op {
            ast::BinaryOperator::Add | ast::BinaryOperator::Sub => {
                self.infer_arithmetic(binary.op, &left, &right, binary.range)
            }
            ast::BinaryOperator::Eq | ast::BinaryOperator::NotEq => {
                if !left.is_error()
                    && !right.is_error()
                    && !left.accepts(&right)
                    && !right.accepts(&left)
                {
                    self.report_mismatch(&left, &right, binary.range);
                }
                Type::Bool
            }
        }
    }

    fn infer_arithmetic(
        &mut self,
        op: ast::BinaryOperator,
        left: &Type,
        right: &Type,
        range: TextRange,
    ) -> Type {
        if left.is_error() || right.is_error() {
            return Type::Error;
        }
        if Type::Int.accepts(left) && Type::Int.accepts(right) {
            return Type::Int;
        }
        if matches!(op, ast::BinaryOperator::Add)
            && Type::String.accepts(left)
            && Type::String.accepts(right)
        {
            return Type::String;
        }
        self.report_mismatch(left, right, range);
        Type::Error
    }

    // Assignability.

    fn check_assignable(&mut self, expected: &Type, found: &Type, range: TextRange) {
        if !self.assignable(expected, found) {
            self.report_mismatch(expected, found, range);
        }
    }

    /// Whether `found` can stand where `expected` is required: structural
    /// acceptance, widened by conformance when the target is existential.
    fn assignable(&self, expected: &Type, found: &Type) -> bool {
        if expected.accepts(found) {
            return true;
        }
        if let Type::Existential(set) = expected {
            return self.satisfies_constraints(found, set);
        }
        false
    }

    fn satisfies_constraints(&self, source: &Type, set: &ConstraintSet) -> bool {
        set.requirements()
            .all(|requirement| self.satisfies_requirement(source, requirement))
    }

    fn satisfies_requirement(&self, source: &Type, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Any => true,
            Requirement::AnyObject => match source {
                Type::Instance(_) => true,
                Type::Opaque(id) => set_implies_class(self.registry.constraints(*id)),
                Type::Existential(set) => set_implies_class(set),
                Type::TypeParam(param) => self
                    .type_param_constraints(*param)
                    .is_some_and(|set| set_implies_class(&set)),
                _ => false,
            },
            Requirement::Protocol(protocol) => match source {
                Type::Opaque(id) => {
                    self.constraints_satisfy_protocol(self.registry.constraints(*id), protocol)
                }
                Type::Existential(set) => self.constraints_satisfy_protocol(set, protocol),
                Type::TypeParam(param) => self
                    .type_param_constraints(*param)
                    .is_some_and(|set| self.constraints_satisfy_protocol(&set, protocol)),
                _ => source
                    .nominal()
                    .is_some_and(|nominal| self.conforms(nominal, protocol)),
            },
            Requirement::Class(class) => match source {
                Type::Instance(instance) => self.is_subclass(*instance, class),
                Type::Opaque(id) => {
                    self.set_implies_subclass(self.registry.constraints(*id), class)
                }
                Type::Existential(set) => self.set_implies_subclass(set, class),
                Type::TypeParam(param) => self
                    .type_param_constraints(*param)
                    .is_some_and(|set| self.set_implies_subclass(&set, class)),
                _ => false,
            },
        }
    }

    fn type_param_constraints(&self, param: TypeParamId) -> Option<ConstraintSet> {
        let bound = self.index.type_param(param).bound?;
        build_constraint_set(bound, &self.index).ok()
    }

    /// Whether a value constrained by `set` is good for `protocol`.
    fn constraints_satisfy_protocol(&self, set: &ConstraintSet, protocol: DeclarationId) -> bool {
        set.requirements().any(|requirement| match requirement {
            Requirement::Protocol(source) => self.protocol_refines(source, protocol),
            Requirement::Class(source) => self.conforms(Nominal::Class(source), protocol),
            Requirement::Any | Requirement::AnyObject => false,
        })
    }

    fn set_implies_subclass(&self, set: &ConstraintSet, class: DeclarationId) -> bool {
        set.requirements().any(|requirement| {
            matches!(requirement, Requirement::Class(source) if self.is_subclass(source, class))
        })
    }

    /// Whether `protocol` is `target` or transitively inherits it.
    fn protocol_refines(&self, protocol: DeclarationId, target: DeclarationId) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![protocol];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(data) = self.index.protocol(current) {
                stack.extend(data.inherits.iter().copied());
            }
        }
        false
    }

    /// Whether `nominal` declares conformance to `target`, directly or
    /// through a superclass or protocol inheritance.
    fn conforms(&self, nominal: Nominal, target: DeclarationId) -> bool {
        let mut visited = FxHashSet::default();
        let mut current = Some(nominal);
        while let Some(nominal) = current {
            if let Nominal::Class(class) = nominal {
                if !visited.insert(class) {
                    break;
                }
            }
            if self
                .index
                .conformances(nominal)
                .any(|protocol| self.protocol_refines(protocol, target))
            {
                return true;
            }
            current = match nominal {
                Nominal::Class(class) => self.index.superclass(class).map(Nominal::Class),
                _ => None,
            };
        }
        false
    }

    fn is_subclass(&self, class: DeclarationId, target: DeclarationId) -> bool {
        let mut visited = FxHashSet::default();
        let mut current = Some(class);
        while let Some(class) = current {
            if class == target {
                return true;
            }
            if !visited.insert(class) {
                break;
            }
            current = self.index.superclass(class);
        }
        false
    }

    fn report_mismatch(&mut self, expected: &Type, found: &Type, range: TextRange) {
        let kind = if expected.involves_opaque() || found.involves_opaque() {
            DiagnosticKind::OpaqueTypeMismatch {
                expected: self.display_string(expected),
                found: self.display_string(found),
            }
        } else {
            DiagnosticKind::TypeMismatch {
                expected: self.display_string(expected),
                found: self.display_string(found),
            }
        };
        self.diagnostics.push(Diagnostic::new(kind, range));
    }

    fn display_string(&self, ty: &Type) -> String {
        ty.display(&self.index, &self.registry).to_string()
    }
}
