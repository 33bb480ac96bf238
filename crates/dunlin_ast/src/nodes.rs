use text_size::TextRange;

use crate::name::Name;
use crate::Ranged;

/// A parsed source file: a flat list of top-level declarations.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub range: TextRange,
    pub body: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    Protocol(DeclProtocol),
    Class(DeclClass),
    Extend(DeclExtend),
    Function(DeclFunction),
    Property(DeclProperty),
    Binding(DeclBinding),
    TypeAlias(DeclTypeAlias),
}

impl Decl {
    /// The declared name, if the declaration introduces one.
    pub fn name(&self) -> Option<&Identifier> {
        match self {
            Decl::Protocol(DeclProtocol { name, .. })
            | Decl::Class(DeclClass { name, .. })
            | Decl::Function(DeclFunction { name, .. })
            | Decl::Property(DeclProperty { name, .. })
            | Decl::Binding(DeclBinding { name, .. })
            | Decl::TypeAlias(DeclTypeAlias { name, .. }) => Some(name),
            Decl::Extend(_) => None,
        }
    }
}

/// `protocol P: Q { func paul() ... }`
///
/// Members are requirement signatures: functions without bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclProtocol {
    pub range: TextRange,
    pub name: Identifier,
    pub inherits: Vec<Identifier>,
    pub members: Vec<DeclFunction>,
}

/// `class D: C, P, Q { ... }`
///
/// The supertype list mixes at most one superclass with conformed
/// protocols; which is which is resolved semantically, not syntactically.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclClass {
    pub range: TextRange,
    pub name: Identifier,
    pub supertypes: Vec<Identifier>,
    pub members: Vec<Member>,
}

/// `extend Int: P, Q { ... }`
#[derive(Clone, Debug, PartialEq)]
pub struct DeclExtend {
    pub range: TextRange,
    pub name: Identifier,
    pub conformances: Vec<Identifier>,
    pub members: Vec<Member>,
}

/// A function declaration or, when `body` is `None`, a protocol
/// requirement signature.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclFunction {
    pub range: TextRange,
    pub name: Identifier,
    pub type_params: Option<TypeParams>,
    pub parameters: Vec<Parameter>,
    pub returns: Option<TypeExpr>,
    pub body: Option<Block>,
}

/// `subscript(i: Int) -> T { ... }`, only valid as a class/extension member.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclSubscript {
    pub range: TextRange,
    pub parameters: Vec<Parameter>,
    pub returns: TypeExpr,
    pub body: Block,
}

/// A computed property: `var name: T { get { ... } set { ... } }`.
///
/// The getter-only shorthand (`var name: T { return e }`) parses into the
/// same node with the block as the getter. The setter's implicit parameter
/// is named `newValue`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclProperty {
    pub range: TextRange,
    pub name: Identifier,
    pub annotation: TypeExpr,
    pub getter: Block,
    pub setter: Option<Block>,
}

/// A stored top-level binding: `let name: T = value`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclBinding {
    pub range: TextRange,
    pub name: Identifier,
    pub annotation: Option<TypeExpr>,
    pub value: Expr,
}

/// `typealias Name = T`
#[derive(Clone, Debug, PartialEq)]
pub struct DeclTypeAlias {
    pub range: TextRange,
    pub name: Identifier,
    pub value: TypeExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Member {
    Function(DeclFunction),
    Subscript(DeclSubscript),
    Property(DeclProperty),
}

impl Member {
    pub fn name(&self) -> Option<&Identifier> {
        match self {
            Member::Function(DeclFunction { name, .. })
            | Member::Property(DeclProperty { name, .. }) => Some(name),
            Member::Subscript(_) => None,
        }
    }
}

/// `<T: P, U>`
#[derive(Clone, Debug, PartialEq)]
pub struct TypeParams {
    pub range: TextRange,
    pub params: Vec<TypeParam>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParam {
    pub range: TextRange,
    pub name: Identifier,
    pub bound: Option<TypeExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub range: TextRange,
    pub name: Identifier,
    pub annotation: TypeExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub range: TextRange,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Return(StmtReturn),
    If(StmtIf),
    Local(StmtLocal),
    Assign(StmtAssign),
    Discard(StmtDiscard),
    Expr(StmtExpr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StmtReturn {
    pub range: TextRange,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StmtIf {
    pub range: TextRange,
    pub test: Expr,
    pub body: Block,
    pub orelse: Option<Block>,
}

/// `let x = e` / `var x: T = e` in a body.
#[derive(Clone, Debug, PartialEq)]
pub struct StmtLocal {
    pub range: TextRange,
    pub mutable: bool,
    pub name: Identifier,
    pub annotation: Option<TypeExpr>,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StmtAssign {
    pub range: TextRange,
    pub target: Identifier,
    pub value: Expr,
}

/// `_ = e`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtDiscard {
    pub range: TextRange,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StmtExpr {
    pub range: TextRange,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntLiteral(ExprIntLiteral),
    StringLiteral(ExprStringLiteral),
    BooleanLiteral(ExprBooleanLiteral),
    Name(ExprName),
    Call(ExprCall),
    Attribute(ExprAttribute),
    Subscript(ExprSubscript),
    Array(ExprArray),
    Tuple(ExprTuple),
    BinaryOp(ExprBinaryOp),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprIntLiteral {
    pub range: TextRange,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprStringLiteral {
    pub range: TextRange,
    pub value: Box<str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprBooleanLiteral {
    pub range: TextRange,
    pub value: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprName {
    pub range: TextRange,
    pub id: Name,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprCall {
    pub range: TextRange,
    pub func: Box<Expr>,
    pub arguments: Vec<Expr>,
}

/// Member access: `value.attr`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprAttribute {
    pub range: TextRange,
    pub value: Box<Expr>,
    pub attr: Identifier,
}

/// Subscript access: `value[arguments]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprSubscript {
    pub range: TextRange,
    pub value: Box<Expr>,
    pub arguments: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprArray {
    pub range: TextRange,
    pub elements: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprTuple {
    pub range: TextRange,
    pub elements: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprBinaryOp {
    pub range: TextRange,
    pub left: Box<Expr>,
    pub op: BinaryOperator,
    pub right: Box<Expr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Eq,
    NotEq,
}

impl BinaryOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The written form of a type annotation.
///
/// Unlike semantic types, these are purely syntactic: `opaque` markers and
/// compositions survive here exactly as written so the checker can decide
/// their legality.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Name(TypeName),
    Array(TypeArray),
    Tuple(TypeTuple),
    Function(TypeFunction),
    Composition(TypeComposition),
    Opaque(TypeOpaque),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeName {
    pub range: TextRange,
    pub id: Name,
}

/// `[T]`
#[derive(Clone, Debug, PartialEq)]
pub struct TypeArray {
    pub range: TextRange,
    pub element: Box<TypeExpr>,
}

/// `(T, U)`; an empty element list is the unit type `()`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeTuple {
    pub range: TextRange,
    pub elements: Vec<TypeExpr>,
}

/// `(T, U) -> V`
#[derive(Clone, Debug, PartialEq)]
pub struct TypeFunction {
    pub range: TextRange,
    pub parameters: Vec<TypeExpr>,
    pub returns: Box<TypeExpr>,
}

/// `P & Q`
#[derive(Clone, Debug, PartialEq)]
pub struct TypeComposition {
    pub range: TextRange,
    pub members: Vec<TypeExpr>,
}

/// `opaque T`
#[derive(Clone, Debug, PartialEq)]
pub struct TypeOpaque {
    pub range: TextRange,
    pub constraint: Box<TypeExpr>,
}

/// An identifier node: a [`Name`] with the range it was written at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub range: TextRange,
    pub id: Name,
}

impl Identifier {
    #[inline]
    pub fn new(id: impl Into<Name>, range: TextRange) -> Self {
        Self {
            range,
            id: id.into(),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.id.as_str()
    }
}

impl std::ops::Deref for Identifier {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.id.as_str()
    }
}

impl PartialEq<str> for Identifier {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.id == *other
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.id, f)
    }
}

macro_rules! impl_ranged {
    ($($node:ty),* $(,)?) => {
        $(
            impl Ranged for $node {
                fn range(&self) -> TextRange {
                    self.range
                }
            }
        )*
    };
}

impl_ranged!(
    Module,
    DeclProtocol,
    DeclClass,
    DeclExtend,
    DeclFunction,
    DeclSubscript,
    DeclProperty,
    DeclBinding,
    DeclTypeAlias,
    TypeParams,
    TypeParam,
    Parameter,
    Block,
    StmtReturn,
    StmtIf,
    StmtLocal,
    StmtAssign,
    StmtDiscard,
    StmtExpr,
    ExprIntLiteral,
    ExprStringLiteral,
    ExprBooleanLiteral,
    ExprName,
    ExprCall,
    ExprAttribute,
    ExprSubscript,
    ExprArray,
    ExprTuple,
    ExprBinaryOp,
    TypeName,
    TypeArray,
    TypeTuple,
    TypeFunction,
    TypeComposition,
    TypeOpaque,
    Identifier,
);

impl Ranged for Decl {
    fn range(&self) -> TextRange {
        match self {
            Decl::Protocol(node) => node.range,
            Decl::Class(node) => node.range,
            Decl::Extend(node) => node.range,
            Decl::Function(node) => node.range,
            Decl::Property(node) => node.range,
            Decl::Binding(node) => node.range,
            Decl::TypeAlias(node) => node.range,
        }
    }
}

impl Ranged for Member {
    fn range(&self) -> TextRange {
        match self {
            Member::Function(node) => node.range,
            Member::Subscript(node) => node.range,
            Member::Property(node) => node.range,
        }
    }
}

impl Ranged for Stmt {
    fn range(&self) -> TextRange {
        match self {
            Stmt::Return(node) => node.range,
            Stmt::If(node) => node.range,
            Stmt::Local(node) => node.range,
            Stmt::Assign(node) => node.range,
            Stmt::Discard(node) => node.range,
            Stmt::Expr(node) => node.range,
        }
    }
}

impl Ranged for Expr {
    fn range(&self) -> TextRange {
        match self {
            Expr::IntLiteral(node) => node.range,
            Expr::StringLiteral(node) => node.range,
            Expr::BooleanLiteral(node) => node.range,
            Expr::Name(node) => node.range,
            Expr::Call(node) => node.range,
            Expr::Attribute(node) => node.range,
            Expr::Subscript(node) => node.range,
            Expr::Array(node) => node.range,
            Expr::Tuple(node) => node.range,
            Expr::BinaryOp(node) => node.range,
        }
    }
}

impl Ranged for TypeExpr {
    fn range(&self) -> TextRange {
        match self {
            TypeExpr::Name(node) => node.range,
            TypeExpr::Array(node) => node.range,
            TypeExpr::Tuple(node) => node.range,
            TypeExpr::Function(node) => node.range,
            TypeExpr::Composition(node) => node.range,
            TypeExpr::Opaque(node) => node.range,
        }
    }
}
