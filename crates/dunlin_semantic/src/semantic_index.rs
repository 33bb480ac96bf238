//! Module-wide declaration tables.
//!
//! The index is built in a single pass over the syntax tree before any type
//! checking starts. It assigns every checkable declaration a [`DeclarationId`],
//! resolves top-level names, protocol inheritance and class supertype lists,
//! and merges `extend` blocks into the member tables of the nominal types they
//! target.

use dunlin_ast::{self as ast, Name, Ranged};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use text_size::TextRange;

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::FxOrderSet;

/// Uniquely identifies a declaration within one module.
///
/// Ids index into the declaration arena in the order declarations were
/// recorded; members of `extend` blocks sort after all top-level
/// declarations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclarationId(u32);

impl DeclarationId {
    pub(crate) fn from_usize(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok());
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Uniquely identifies a generic parameter within one module.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParamId(u32);

impl TypeParamId {
    pub(crate) fn from_usize(index: usize) -> Self {
        debug_assert!(u32::try_from(index).is_ok());
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A nominal type that can own members and declare conformances: one of the
/// builtins, or a user class.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Nominal {
    Int,
    String,
    Bool,
    Array,
    Class(DeclarationId),
}

impl Nominal {
    pub(crate) fn builtin_from_name(name: &str) -> Option<Nominal> {
        match name {
            "Int" => Some(Nominal::Int),
            "String" => Some(Nominal::String),
            "Bool" => Some(Nominal::Bool),
            "Array" => Some(Nominal::Array),
            _ => None,
        }
    }
}

/// One entry in the declaration arena.
///
/// Protocol requirement signatures are recorded as [`Declaration::Function`]
/// entries whose node has no body.
#[derive(Copy, Clone, Debug)]
pub enum Declaration<'ast> {
    Protocol(&'ast ast::DeclProtocol),
    Class(&'ast ast::DeclClass),
    Function(&'ast ast::DeclFunction),
    Subscript(&'ast ast::DeclSubscript),
    Property(&'ast ast::DeclProperty),
    Binding(&'ast ast::DeclBinding),
    TypeAlias(&'ast ast::DeclTypeAlias),
}

impl<'ast> Declaration<'ast> {
    pub fn name(self) -> Option<&'ast ast::Identifier> {
        match self {
            Declaration::Protocol(node) => Some(&node.name),
            Declaration::Class(node) => Some(&node.name),
            Declaration::Function(node) => Some(&node.name),
            Declaration::Property(node) => Some(&node.name),
            Declaration::Binding(node) => Some(&node.name),
            Declaration::TypeAlias(node) => Some(&node.name),
            Declaration::Subscript(_) => None,
        }
    }

    /// The range diagnostics about the declaration as a whole point at: the
    /// name where there is one, the node otherwise.
    pub(crate) fn diagnostic_range(self) -> TextRange {
        match self {
            Declaration::Subscript(node) => node.range,
            _ => match self.name() {
                Some(name) => name.range,
                None => TextRange::default(),
            },
        }
    }
}

pub(crate) struct ProtocolData {
    pub(crate) requirements: FxHashMap<Name, DeclarationId>,
    pub(crate) inherits: SmallVec<[DeclarationId; 2]>,
}

pub(crate) struct TypeParamData<'ast> {
    pub(crate) name: Name,
    pub(crate) bound: Option<&'ast ast::TypeExpr>,
}

/// The implemented members of one nominal type, with `extend` blocks already
/// merged in.
#[derive(Default)]
pub(crate) struct NominalMembers {
    pub(crate) named: FxHashMap<Name, DeclarationId>,
    pub(crate) subscripts: SmallVec<[DeclarationId; 1]>,
}

pub struct SemanticIndex<'ast> {
    declarations: Vec<Declaration<'ast>>,
    top_level: FxHashMap<Name, DeclarationId>,
    protocols: FxHashMap<DeclarationId, ProtocolData>,
    superclasses: FxHashMap<DeclarationId, DeclarationId>,
    members: FxHashMap<Nominal, NominalMembers>,
    conformances: FxHashMap<Nominal, FxOrderSet<DeclarationId>>,
    type_params: Vec<TypeParamData<'ast>>,
    type_params_by_owner: FxHashMap<DeclarationId, SmallVec<[TypeParamId; 2]>>,
}

impl<'ast> SemanticIndex<'ast> {
    pub(crate) fn build(module: &'ast ast::Module) -> (Self, Vec<Diagnostic>) {
        let _span = tracing::trace_span!("semantic_index").entered();
        let mut builder = IndexBuilder::new();
        builder.record_top_level(module);
        builder.resolve_edges();
        builder.finish()
    }

    pub(crate) fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    pub fn declaration(&self, id: DeclarationId) -> Declaration<'ast> {
        self.declarations[id.index()]
    }

    /// Looks a name up in the top-level scope.
    pub fn resolve(&self, name: &str) -> Option<DeclarationId> {
        self.top_level.get(name).copied()
    }

    pub(crate) fn is_protocol(&self, id: DeclarationId) -> bool {
        matches!(self.declaration(id), Declaration::Protocol(_))
    }

    pub(crate) fn is_class(&self, id: DeclarationId) -> bool {
        matches!(self.declaration(id), Declaration::Class(_))
    }

    pub(crate) fn protocol(&self, id: DeclarationId) -> Option<&ProtocolData> {
        self.protocols.get(&id)
    }

    pub(crate) fn superclass(&self, class: DeclarationId) -> Option<DeclarationId> {
        self.superclasses.get(&class).copied()
    }

    pub(crate) fn conformances(&self, nominal: Nominal) -> impl Iterator<Item = DeclarationId> + '_ {
        self.conformances
            .get(&nominal)
            .into_iter()
            .flat_map(|protocols| protocols.iter().copied())
    }

    /// Resolves a named member on a nominal type, walking the superclass
    /// chain. Extension members take part through the merged tables.
    pub(crate) fn lookup_member(&self, nominal: Nominal, name: &str) -> Option<DeclarationId> {
        let mut current = Some(nominal);
        while let Some(nominal) = current {
            if let Some(members) = self.members.get(&nominal) {
                if let Some(&member) = members.named.get(name) {
                    return Some(member);
                }
            }
            current = match nominal {
                Nominal::Class(class) => self.superclass(class).map(Nominal::Class),
                _ => None,
            };
        }
        None
    }

    pub(crate) fn lookup_subscript(&self, nominal: Nominal) -> Option<DeclarationId> {
        let mut current = Some(nominal);
        while let Some(nominal) = current {
            if let Some(members) = self.members.get(&nominal) {
                if let Some(&subscript) = members.subscripts.first() {
                    return Some(subscript);
                }
            }
            current = match nominal {
                Nominal::Class(class) => self.superclass(class).map(Nominal::Class),
                _ => None,
            };
        }
        None
    }

    pub(crate) fn members_of(&self, nominal: Nominal) -> Option<&NominalMembers> {
        self.members.get(&nominal)
    }

    pub(crate) fn type_params_of(&self, declaration: DeclarationId) -> &[TypeParamId] {
        self.type_params_by_owner
            .get(&declaration)
            .map_or(&[], SmallVec::as_slice)
    }

    pub(crate) fn type_param(&self, id: TypeParamId) -> &TypeParamData<'ast> {
        &self.type_params[id.index()]
    }
}

struct IndexBuilder<'ast> {
    declarations: Vec<Declaration<'ast>>,
    top_level: FxHashMap<Name, DeclarationId>,
    protocols: FxHashMap<DeclarationId, ProtocolData>,
    superclasses: FxHashMap<DeclarationId, DeclarationId>,
    members: FxHashMap<Nominal, NominalMembers>,
    conformances: FxHashMap<Nominal, FxOrderSet<DeclarationId>>,
    type_params: Vec<TypeParamData<'ast>>,
    type_params_by_owner: FxHashMap<DeclarationId, SmallVec<[TypeParamId; 2]>>,
    extends: Vec<&'ast ast::DeclExtend>,
    diagnostics: Vec<Diagnostic>,
}

impl<'ast> IndexBuilder<'ast> {
    fn new() -> Self {
        Self {
            declarations: Vec::new(),
            top_level: FxHashMap::default(),
            protocols: FxHashMap::default(),
            superclasses: FxHashMap::default(),
            members: FxHashMap::default(),
            conformances: FxHashMap::default(),
            type_params: Vec::new(),
            type_params_by_owner: FxHashMap::default(),
            extends: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn record_top_level(&mut self, module: &'ast ast::Module) {
        for declaration in &module.body {
            match declaration {
                ast::Decl::Protocol(node) => {
                    let id = self.push(Declaration::Protocol(node));
                    self.bind_top_level(&node.name, id);
                    let requirements = self.collect_requirements(node);
                    self.protocols.insert(
                        id,
                        ProtocolData {
                            requirements,
                            inherits: SmallVec::new(),
                        },
                    );
                }
                ast::Decl::Class(node) => {
                    let id = self.push(Declaration::Class(node));
                    self.bind_top_level(&node.name, id);
                    self.record_members(Nominal::Class(id), &node.members);
                }
                // Extension targets may be declared later in the module, so
                // extensions are recorded once every top-level name is known.
                ast::Decl::Extend(node) => self.extends.push(node),
                ast::Decl::Function(node) => {
                    let id = self.push_function(node);
                    self.bind_top_level(&node.name, id);
                }
                ast::Decl::Property(node) => {
                    let id = self.push(Declaration::Property(node));
                    self.bind_top_level(&node.name, id);
                }
                ast::Decl::Binding(node) => {
                    let id = self.push(Declaration::Binding(node));
                    self.bind_top_level(&node.name, id);
                }
                ast::Decl::TypeAlias(node) => {
                    let id = self.push(Declaration::TypeAlias(node));
                    self.bind_top_level(&node.name, id);
                }
            }
        }
    }

    /// Resolves the name lists that may reference declarations appearing
    /// later in the module: protocol inheritance, class supertypes, and
    /// extension targets.
    fn resolve_edges(&mut self) {
        for index in 0..self.declarations.len() {
            let id = DeclarationId::from_usize(index);
            match self.declarations[index] {
                Declaration::Protocol(node) => {
                    let mut inherits = SmallVec::new();
                    for identifier in &node.inherits {
                        if let Some(parent) = self.resolve_named_protocol(identifier) {
                            inherits.push(parent);
                        }
                    }
                    if let Some(data) = self.protocols.get_mut(&id) {
                        data.inherits = inherits;
                    }
                }
                Declaration::Class(node) => {
                    for identifier in &node.supertypes {
                        match self.resolve_supertype(identifier) {
                            Some(supertype) if self.protocols.contains_key(&supertype) => {
                                self.conformances
                                    .entry(Nominal::Class(id))
                                    .or_default()
                                    .insert(supertype);
                            }
                            Some(superclass)
                                if matches!(
                                    self.declarations[superclass.index()],
                                    Declaration::Class(_)
                                ) =>
                            {
                                // At most one superclass; extras are ignored.
                                self.superclasses.entry(id).or_insert(superclass);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        let extends = std::mem::take(&mut self.extends);
        for node in extends {
            let Some(target) = self.resolve_extend_target(&node.name) else {
                continue;
            };
            for identifier in &node.conformances {
                if let Some(protocol) = self.resolve_named_protocol(identifier) {
                    self.conformances.entry(target).or_default().insert(protocol);
                }
            }
            self.record_members(target, &node.members);
        }
    }

    fn finish(self) -> (SemanticIndex<'ast>, Vec<Diagnostic>) {
        let index = SemanticIndex {
            declarations: self.declarations,
            top_level: self.top_level,
            protocols: self.protocols,
            superclasses: self.superclasses,
            members: self.members,
            conformances: self.conformances,
            type_params: self.type_params,
            type_params_by_owner: self.type_params_by_owner,
        };
        (index, self.diagnostics)
    }

    fn push(&mut self, declaration: Declaration<'ast>) -> DeclarationId {
        let id = DeclarationId::from_usize(self.declarations.len());
        self.declarations.push(declaration);
        id
    }

    fn push_function(&mut self, node: &'ast ast::DeclFunction) -> DeclarationId {
        let id = self.push(Declaration::Function(node));
        if let Some(type_params) = &node.type_params {
            let mut ids = SmallVec::new();
            for param in &type_params.params {
                let param_id = TypeParamId::from_usize(self.type_params.len());
                self.type_params.push(TypeParamData {
                    name: param.name.id.clone(),
                    bound: param.bound.as_ref(),
                });
                ids.push(param_id);
            }
            self.type_params_by_owner.insert(id, ids);
        }
        id
    }

    fn bind_top_level(&mut self, name: &ast::Identifier, id: DeclarationId) {
        // Error-recovery placeholders parse as empty identifiers.
        if name.as_str().is_empty() {
            return;
        }
        if self.top_level.contains_key(name.as_str()) {
            self.duplicate(name);
        } else {
            self.top_level.insert(name.id.clone(), id);
        }
    }

    /// Records each requirement signature as its own arena declaration so
    /// signature resolution and diagnostics work the same way as for
    /// implemented members.
    fn collect_requirements(
        &mut self,
        node: &'ast ast::DeclProtocol,
    ) -> FxHashMap<Name, DeclarationId> {
        let mut requirements = FxHashMap::default();
        for requirement in &node.members {
            let id = self.push_function(requirement);
            if requirement.name.as_str().is_empty() {
                continue;
            }
            if requirements.contains_key(requirement.name.as_str()) {
                self.duplicate(&requirement.name);
            } else {
                requirements.insert(requirement.name.id.clone(), id);
            }
        }
        requirements
    }

    fn record_members(&mut self, nominal: Nominal, members: &'ast [ast::Member]) {
        for member in members {
            match member {
                ast::Member::Function(node) => {
                    let id = self.push_function(node);
                    self.bind_member(nominal, &node.name, id);
                }
                ast::Member::Subscript(node) => {
                    let id = self.push(Declaration::Subscript(node));
                    self.members.entry(nominal).or_default().subscripts.push(id);
                }
                ast::Member::Property(node) => {
                    let id = self.push(Declaration::Property(node));
                    self.bind_member(nominal, &node.name, id);
                }
            }
        }
    }

    fn bind_member(&mut self, nominal: Nominal, name: &ast::Identifier, id: DeclarationId) {
        if name.as_str().is_empty() {
            return;
        }
        let members = self.members.entry(nominal).or_default();
        if members.named.contains_key(name.as_str()) {
            self.duplicate(name);
        } else {
            members.named.insert(name.id.clone(), id);
        }
    }

    fn resolve_named_protocol(&mut self, identifier: &ast::Identifier) -> Option<DeclarationId> {
        if identifier.as_str().is_empty() {
            return None;
        }
        match self.top_level.get(identifier.as_str()) {
            Some(&id) if self.protocols.contains_key(&id) => Some(id),
            Some(_) => None,
            None => {
                self.unresolved(identifier);
                None
            }
        }
    }

    fn resolve_supertype(&mut self, identifier: &ast::Identifier) -> Option<DeclarationId> {
        if identifier.as_str().is_empty() {
            return None;
        }
        match self.top_level.get(identifier.as_str()) {
            Some(&id) => Some(id),
            None if Nominal::builtin_from_name(identifier.as_str()).is_some() => None,
            None => {
                self.unresolved(identifier);
                None
            }
        }
    }

    fn resolve_extend_target(&mut self, identifier: &ast::Identifier) -> Option<Nominal> {
        if identifier.as_str().is_empty() {
            return None;
        }
        if let Some(&id) = self.top_level.get(identifier.as_str()) {
            return matches!(self.declarations[id.index()], Declaration::Class(_))
                .then_some(Nominal::Class(id));
        }
        let nominal = Nominal::builtin_from_name(identifier.as_str());
        if nominal.is_none() {
            self.unresolved(identifier);
        }
        nominal
    }

    fn duplicate(&mut self, name: &ast::Identifier) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::DuplicateDeclaration {
                name: name.id.clone(),
            },
            name.range(),
        ));
    }

    fn unresolved(&mut self, name: &ast::Identifier) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnresolvedName {
                name: name.id.clone(),
            },
            name.range(),
        ));
    }
}
