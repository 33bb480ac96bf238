use text_size::{TextRange, TextSize};

use dunlin_ast as ast;
use dunlin_ast::Ranged;

use crate::error::{ParseError, ParseErrorType};
use crate::token::{Token, TokenKind};
use crate::token_set::TokenSet;
use crate::Parsed;

/// Tokens that can start a top-level declaration.
const DECL_START_SET: TokenSet = TokenSet::new(&[
    TokenKind::Protocol,
    TokenKind::Class,
    TokenKind::Extend,
    TokenKind::Func,
    TokenKind::Var,
    TokenKind::Let,
    TokenKind::Typealias,
]);

/// Tokens that can start an expression.
const EXPR_START_SET: TokenSet = TokenSet::new(&[
    TokenKind::Int,
    TokenKind::String,
    TokenKind::True,
    TokenKind::False,
    TokenKind::Name,
    TokenKind::LParen,
    TokenKind::LBracket,
]);

const DECL_RECOVERY_SET: TokenSet =
    DECL_START_SET.union(TokenSet::new(&[TokenKind::EndOfFile]));

pub(crate) struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    index: usize,
    /// The end offset of the last token the parser consumed, used to close
    /// node ranges.
    last_token_end: TextSize,
    errors: Vec<ParseError>,
}

enum FunctionKind {
    /// A function with a required body.
    Definition,
    /// A protocol requirement: signature only.
    Requirement,
}

impl<'src> Parser<'src> {
    pub(crate) fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            index: 0,
            last_token_end: TextSize::default(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn parse_module(mut self) -> Parsed {
        let mut body = Vec::new();
        loop {
            self.eat_semicolons();
            if self.at(TokenKind::EndOfFile) {
                break;
            }
            if let Some(decl) = self.parse_declaration() {
                body.push(decl);
            }
        }
        let module = ast::Module {
            range: TextRange::up_to(TextSize::of(self.source)),
            body,
        };
        Parsed {
            module,
            errors: self.errors,
        }
    }

    fn parse_declaration(&mut self) -> Option<ast::Decl> {
        match self.current_kind() {
            TokenKind::Protocol => Some(ast::Decl::Protocol(self.parse_protocol())),
            TokenKind::Class => Some(ast::Decl::Class(self.parse_class())),
            TokenKind::Extend => Some(ast::Decl::Extend(self.parse_extend())),
            TokenKind::Func => Some(ast::Decl::Function(
                self.parse_function(FunctionKind::Definition),
            )),
            TokenKind::Var => Some(ast::Decl::Property(self.parse_property())),
            TokenKind::Let => Some(ast::Decl::Binding(self.parse_binding())),
            TokenKind::Typealias => Some(ast::Decl::TypeAlias(self.parse_type_alias())),
            found => {
                self.add_error(ParseErrorType::ExpectedDeclaration(found), self.current_range());
                self.next_token();
                self.skip_until(DECL_RECOVERY_SET);
                None
            }
        }
    }

    fn parse_protocol(&mut self) -> ast::DeclProtocol {
        let start = self.node_start();
        self.bump(TokenKind::Protocol);
        let name = self.parse_identifier();
        let inherits = if self.eat(TokenKind::Colon) {
            self.parse_identifier_list()
        } else {
            Vec::new()
        };
        self.expect(TokenKind::LBrace);
        let mut members = Vec::new();
        loop {
            self.eat_semicolons();
            match self.current_kind() {
                TokenKind::RBrace | TokenKind::EndOfFile => break,
                TokenKind::Func => {
                    members.push(self.parse_function(FunctionKind::Requirement));
                }
                found => {
                    self.add_error(
                        ParseErrorType::ExpectedDeclaration(found),
                        self.current_range(),
                    );
                    self.next_token();
                }
            }
        }
        self.expect(TokenKind::RBrace);
        ast::DeclProtocol {
            range: self.node_range(start),
            name,
            inherits,
            members,
        }
    }

    fn parse_class(&mut self) -> ast::DeclClass {
        let start = self.node_start();
        self.bump(TokenKind::Class);
        let name = self.parse_identifier();
        let supertypes = if self.eat(TokenKind::Colon) {
            self.parse_identifier_list()
        } else {
            Vec::new()
        };
        let members = self.parse_member_block();
        ast::DeclClass {
            range: self.node_range(start),
            name,
            supertypes,
            members,
        }
    }

    fn parse_extend(&mut self) -> ast::DeclExtend {
        let start = self.node_start();
        self.bump(TokenKind::Extend);
        let name = self.parse_identifier();
        let conformances = if self.eat(TokenKind::Colon) {
            self.parse_identifier_list()
        } else {
            Vec::new()
        };
        let members = self.parse_member_block();
        ast::DeclExtend {
            range: self.node_range(start),
            name,
            conformances,
            members,
        }
    }

    fn parse_member_block(&mut self) -> Vec<ast::Member> {
        self.expect(TokenKind::LBrace);
        let mut members = Vec::new();
        loop {
            self.eat_semicolons();
            match self.current_kind() {
                TokenKind::RBrace | TokenKind::EndOfFile => break,
                TokenKind::Func => members.push(ast::Member::Function(
                    self.parse_function(FunctionKind::Definition),
                )),
                TokenKind::Subscript => {
                    members.push(ast::Member::Subscript(self.parse_subscript()));
                }
                TokenKind::Var => members.push(ast::Member::Property(self.parse_property())),
                found => {
                    self.add_error(
                        ParseErrorType::ExpectedDeclaration(found),
                        self.current_range(),
                    );
                    self.next_token();
                }
            }
        }
        self.expect(TokenKind::RBrace);
        members
    }

    fn parse_function(&mut self, kind: FunctionKind) -> ast::DeclFunction {
        let start = self.node_start();
        self.bump(TokenKind::Func);
        let name = self.parse_identifier();
        let type_params = if self.at(TokenKind::Less) {
            Some(self.parse_type_params())
        } else {
            None
        };
        let parameters = self.parse_parameters();
        let returns = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type())
        } else {
            None
        };
        let body = match kind {
            FunctionKind::Definition => Some(self.parse_block()),
            FunctionKind::Requirement => None,
        };
        ast::DeclFunction {
            range: self.node_range(start),
            name,
            type_params,
            parameters,
            returns,
            body,
        }
    }

    fn parse_subscript(&mut self) -> ast::DeclSubscript {
        let start = self.node_start();
        self.bump(TokenKind::Subscript);
        let parameters = self.parse_parameters();
        self.expect(TokenKind::Arrow);
        let returns = self.parse_type();
        let body = self.parse_block();
        ast::DeclSubscript {
            range: self.node_range(start),
            parameters,
            returns,
            body,
        }
    }

    /// Parses a computed property. The accessor block is either explicit
    /// (`{ get { ... } set { ... } }`) or the getter-only shorthand where
    /// the braces directly hold the getter body.
    fn parse_property(&mut self) -> ast::DeclProperty {
        let start = self.node_start();
        self.bump(TokenKind::Var);
        let name = self.parse_identifier();
        self.expect(TokenKind::Colon);
        let annotation = self.parse_type();
        let brace_start = self.node_start();
        self.expect(TokenKind::LBrace);
        let (getter, setter) = if self.at(TokenKind::Get) {
            self.bump(TokenKind::Get);
            let getter = self.parse_block();
            let setter = if self.eat(TokenKind::Set) {
                Some(self.parse_block())
            } else {
                None
            };
            self.expect(TokenKind::RBrace);
            (getter, setter)
        } else {
            let body = self.parse_statements_until_brace();
            self.expect(TokenKind::RBrace);
            let getter = ast::Block {
                range: self.node_range(brace_start),
                body,
            };
            (getter, None)
        };
        ast::DeclProperty {
            range: self.node_range(start),
            name,
            annotation,
            getter,
            setter,
        }
    }

    fn parse_binding(&mut self) -> ast::DeclBinding {
        let start = self.node_start();
        self.bump(TokenKind::Let);
        let name = self.parse_identifier();
        let annotation = if self.eat(TokenKind::Colon) {
            Some(self.parse_type())
        } else {
            None
        };
        self.expect(TokenKind::Equal);
        let value = self.parse_expression();
        ast::DeclBinding {
            range: self.node_range(start),
            name,
            annotation,
            value,
        }
    }

    fn parse_type_alias(&mut self) -> ast::DeclTypeAlias {
        let start = self.node_start();
        self.bump(TokenKind::Typealias);
        let name = self.parse_identifier();
        self.expect(TokenKind::Equal);
        let value = self.parse_type();
        ast::DeclTypeAlias {
            range: self.node_range(start),
            name,
            value,
        }
    }

    fn parse_type_params(&mut self) -> ast::TypeParams {
        let start = self.node_start();
        self.bump(TokenKind::Less);
        let mut params = Vec::new();
        loop {
            let param_start = self.node_start();
            let name = self.parse_identifier();
            let bound = if self.eat(TokenKind::Colon) {
                Some(self.parse_type())
            } else {
                None
            };
            params.push(ast::TypeParam {
                range: self.node_range(param_start),
                name,
                bound,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Greater);
        ast::TypeParams {
            range: self.node_range(start),
            params,
        }
    }

    fn parse_parameters(&mut self) -> Vec<ast::Parameter> {
        self.expect(TokenKind::LParen);
        let mut parameters = Vec::new();
        if !self.at(TokenKind::RParen) && !self.at(TokenKind::EndOfFile) {
            loop {
                let start = self.node_start();
                let name = self.parse_identifier();
                self.expect(TokenKind::Colon);
                let annotation = self.parse_type();
                parameters.push(ast::Parameter {
                    range: self.node_range(start),
                    name,
                    annotation,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen);
        parameters
    }

    fn parse_block(&mut self) -> ast::Block {
        let start = self.node_start();
        self.expect(TokenKind::LBrace);
        let body = self.parse_statements_until_brace();
        self.expect(TokenKind::RBrace);
        ast::Block {
            range: self.node_range(start),
            body,
        }
    }

    fn parse_statements_until_brace(&mut self) -> Vec<ast::Stmt> {
        let mut body = Vec::new();
        loop {
            self.eat_semicolons();
            if self.at(TokenKind::RBrace) || self.at(TokenKind::EndOfFile) {
                break;
            }
            if let Some(stmt) = self.parse_statement() {
                body.push(stmt);
            }
        }
        body
    }

    fn parse_statement(&mut self) -> Option<ast::Stmt> {
        let start = self.node_start();
        match self.current_kind() {
            TokenKind::Return => {
                self.bump(TokenKind::Return);
                let value = if self.at_ts(EXPR_START_SET) {
                    Some(self.parse_expression())
                } else {
                    None
                };
                Some(ast::Stmt::Return(ast::StmtReturn {
                    range: self.node_range(start),
                    value,
                }))
            }
            TokenKind::If => Some(ast::Stmt::If(self.parse_if())),
            TokenKind::Let | TokenKind::Var => {
                let mutable = self.at(TokenKind::Var);
                self.next_token();
                let name = self.parse_identifier();
                let annotation = if self.eat(TokenKind::Colon) {
                    Some(self.parse_type())
                } else {
                    None
                };
                self.expect(TokenKind::Equal);
                let value = self.parse_expression();
                Some(ast::Stmt::Local(ast::StmtLocal {
                    range: self.node_range(start),
                    mutable,
                    name,
                    annotation,
                    value,
                }))
            }
            TokenKind::Underscore => {
                self.bump(TokenKind::Underscore);
                self.expect(TokenKind::Equal);
                let value = self.parse_expression();
                Some(ast::Stmt::Discard(ast::StmtDiscard {
                    range: self.node_range(start),
                    value,
                }))
            }
            TokenKind::Name if self.peek_kind() == TokenKind::Equal => {
                let target = self.parse_identifier();
                self.bump(TokenKind::Equal);
                let value = self.parse_expression();
                Some(ast::Stmt::Assign(ast::StmtAssign {
                    range: self.node_range(start),
                    target,
                    value,
                }))
            }
            kind if EXPR_START_SET.contains(kind) => {
                let value = self.parse_expression();
                Some(ast::Stmt::Expr(ast::StmtExpr {
                    range: self.node_range(start),
                    value,
                }))
            }
            found => {
                self.add_error(ParseErrorType::ExpectedExpression(found), self.current_range());
                self.next_token();
                None
            }
        }
    }

    fn parse_if(&mut self) -> ast::StmtIf {
        let start = self.node_start();
        self.bump(TokenKind::If);
        let test = self.parse_expression();
        let body = self.parse_block();
        let orelse = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                // `else if` desugars to an else block holding one `if`.
                let nested = self.parse_if();
                Some(ast::Block {
                    range: nested.range,
                    body: vec![ast::Stmt::If(nested)],
                })
            } else {
                Some(self.parse_block())
            }
        } else {
            None
        };
        ast::StmtIf {
            range: self.node_range(start),
            test,
            body,
            orelse,
        }
    }

    fn parse_expression(&mut self) -> ast::Expr {
        let start = self.node_start();
        let mut left = self.parse_additive_expression();
        loop {
            let op = match self.current_kind() {
                TokenKind::EqEqual => ast::BinaryOperator::Eq,
                TokenKind::NotEqual => ast::BinaryOperator::NotEq,
                _ => break,
            };
            self.next_token();
            let right = self.parse_additive_expression();
            left = ast::Expr::BinaryOp(ast::ExprBinaryOp {
                range: self.node_range(start),
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        left
    }

    fn parse_additive_expression(&mut self) -> ast::Expr {
        let start = self.node_start();
        let mut left = self.parse_postfix_expression();
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => ast::BinaryOperator::Add,
                TokenKind::Minus => ast::BinaryOperator::Sub,
                _ => break,
            };
            self.next_token();
            let right = self.parse_postfix_expression();
            left = ast::Expr::BinaryOp(ast::ExprBinaryOp {
                range: self.node_range(start),
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        left
    }

    fn parse_postfix_expression(&mut self) -> ast::Expr {
        let start = self.node_start();
        let mut expr = self.parse_primary_expression();
        loop {
            match self.current_kind() {
                TokenKind::LParen => {
                    let arguments = self.parse_arguments(TokenKind::LParen, TokenKind::RParen);
                    expr = ast::Expr::Call(ast::ExprCall {
                        range: self.node_range(start),
                        func: Box::new(expr),
                        arguments,
                    });
                }
                TokenKind::Dot => {
                    self.bump(TokenKind::Dot);
                    let attr = self.parse_identifier();
                    expr = ast::Expr::Attribute(ast::ExprAttribute {
                        range: self.node_range(start),
                        value: Box::new(expr),
                        attr,
                    });
                }
                TokenKind::LBracket => {
                    let arguments = self.parse_arguments(TokenKind::LBracket, TokenKind::RBracket);
                    expr = ast::Expr::Subscript(ast::ExprSubscript {
                        range: self.node_range(start),
                        value: Box::new(expr),
                        arguments,
                    });
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_arguments(&mut self, open: TokenKind, close: TokenKind) -> Vec<ast::Expr> {
        self.bump(open);
        let mut arguments = Vec::new();
        if !self.at(close) && !self.at(TokenKind::EndOfFile) {
            loop {
                arguments.push(self.parse_expression());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(close);
        arguments
    }

    fn parse_primary_expression(&mut self) -> ast::Expr {
        let start = self.node_start();
        match self.current_kind() {
            TokenKind::Int => {
                let range = self.current_range();
                // Overflow was already reported by the lexer.
                let value = self.src_text(range).parse::<i64>().unwrap_or_default();
                self.next_token();
                ast::Expr::IntLiteral(ast::ExprIntLiteral { range, value })
            }
            TokenKind::String => {
                let range = self.current_range();
                let text = self.src_text(range);
                let text = text.strip_prefix('"').unwrap_or(text);
                let text = text.strip_suffix('"').unwrap_or(text);
                let value = Box::from(text);
                self.next_token();
                ast::Expr::StringLiteral(ast::ExprStringLiteral { range, value })
            }
            TokenKind::True | TokenKind::False => {
                let range = self.current_range();
                let value = self.at(TokenKind::True);
                self.next_token();
                ast::Expr::BooleanLiteral(ast::ExprBooleanLiteral { range, value })
            }
            TokenKind::Name => {
                let range = self.current_range();
                let id = ast::Name::new(self.src_text(range));
                self.next_token();
                ast::Expr::Name(ast::ExprName { range, id })
            }
            TokenKind::LBracket => {
                let elements = self.parse_arguments(TokenKind::LBracket, TokenKind::RBracket);
                ast::Expr::Array(ast::ExprArray {
                    range: self.node_range(start),
                    elements,
                })
            }
            TokenKind::LParen => {
                let mut elements = self.parse_arguments(TokenKind::LParen, TokenKind::RParen);
                if elements.len() == 1 {
                    // A parenthesized expression, not a tuple.
                    elements.remove(0)
                } else {
                    ast::Expr::Tuple(ast::ExprTuple {
                        range: self.node_range(start),
                        elements,
                    })
                }
            }
            found => {
                let range = self.current_range();
                self.add_error(ParseErrorType::ExpectedExpression(found), range);
                // An empty name is the invalid-expression placeholder.
                ast::Expr::Name(ast::ExprName {
                    range: TextRange::empty(range.start()),
                    id: ast::Name::new(""),
                })
            }
        }
    }

    fn parse_type(&mut self) -> ast::TypeExpr {
        let start = self.node_start();
        if self.eat(TokenKind::Opaque) {
            let constraint = self.parse_composition_type();
            return ast::TypeExpr::Opaque(ast::TypeOpaque {
                range: self.node_range(start),
                constraint: Box::new(constraint),
            });
        }
        self.parse_composition_type()
    }

    fn parse_composition_type(&mut self) -> ast::TypeExpr {
        let start = self.node_start();
        let first = self.parse_primary_type();
        if !self.at(TokenKind::Ampersand) {
            return first;
        }
        let mut members = vec![first];
        while self.eat(TokenKind::Ampersand) {
            members.push(self.parse_composition_member());
        }
        ast::TypeExpr::Composition(ast::TypeComposition {
            range: self.node_range(start),
            members,
        })
    }

    /// A composition member may carry its own `opaque` marker (e.g.
    /// `P & opaque Q`). That form is never legal, but rejecting it is the
    /// checker's job, so it must survive parsing.
    fn parse_composition_member(&mut self) -> ast::TypeExpr {
        let start = self.node_start();
        if self.eat(TokenKind::Opaque) {
            let constraint = self.parse_primary_type();
            return ast::TypeExpr::Opaque(ast::TypeOpaque {
                range: self.node_range(start),
                constraint: Box::new(constraint),
            });
        }
        self.parse_primary_type()
    }

    fn parse_primary_type(&mut self) -> ast::TypeExpr {
        let start = self.node_start();
        match self.current_kind() {
            TokenKind::Name => {
                let range = self.current_range();
                let id = ast::Name::new(self.src_text(range));
                self.next_token();
                ast::TypeExpr::Name(ast::TypeName { range, id })
            }
            TokenKind::LBracket => {
                self.bump(TokenKind::LBracket);
                let element = self.parse_type();
                self.expect(TokenKind::RBracket);
                ast::TypeExpr::Array(ast::TypeArray {
                    range: self.node_range(start),
                    element: Box::new(element),
                })
            }
            TokenKind::LParen => {
                self.bump(TokenKind::LParen);
                let mut elements = Vec::new();
                if !self.at(TokenKind::RParen) && !self.at(TokenKind::EndOfFile) {
                    loop {
                        elements.push(self.parse_type());
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen);
                if self.eat(TokenKind::Arrow) {
                    let returns = self.parse_type();
                    return ast::TypeExpr::Function(ast::TypeFunction {
                        range: self.node_range(start),
                        parameters: elements,
                        returns: Box::new(returns),
                    });
                }
                if elements.len() == 1 {
                    // `(T)` is a parenthesized type, not a tuple.
                    elements.remove(0)
                } else {
                    ast::TypeExpr::Tuple(ast::TypeTuple {
                        range: self.node_range(start),
                        elements,
                    })
                }
            }
            found => {
                let range = self.current_range();
                self.add_error(ParseErrorType::ExpectedType(found), range);
                ast::TypeExpr::Name(ast::TypeName {
                    range: TextRange::empty(range.start()),
                    id: ast::Name::new(""),
                })
            }
        }
    }

    fn parse_identifier(&mut self) -> ast::Identifier {
        if self.at(TokenKind::Name) {
            let range = self.current_range();
            let identifier = ast::Identifier::new(self.src_text(range), range);
            self.next_token();
            identifier
        } else {
            let (found, range) = (self.current_kind(), self.current_range());
            self.add_error(
                ParseErrorType::ExpectedToken {
                    found,
                    expected: TokenKind::Name,
                },
                range,
            );
            ast::Identifier::new("", TextRange::empty(range.start()))
        }
    }

    fn parse_identifier_list(&mut self) -> Vec<ast::Identifier> {
        let mut identifiers = vec![self.parse_identifier()];
        while self.eat(TokenKind::Comma) {
            identifiers.push(self.parse_identifier());
        }
        identifiers
    }

    /// Returns the start position for a node that starts at the current
    /// token.
    fn node_start(&self) -> TextSize {
        self.current_range().start()
    }

    fn node_range(&self, start: TextSize) -> TextRange {
        TextRange::new(start, self.last_token_end)
    }

    /// Moves to the next token, returning the old current token.
    fn next_token(&mut self) -> Token {
        let current = self.tokens[self.index];
        if current.kind != TokenKind::EndOfFile {
            self.index += 1;
            self.last_token_end = current.range.end();
        }
        current
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens
            .get(self.index + 1)
            .map_or(TokenKind::EndOfFile, |token| token.kind)
    }

    #[inline]
    fn current_kind(&self) -> TokenKind {
        self.tokens[self.index].kind
    }

    #[inline]
    fn current_range(&self) -> TextRange {
        self.tokens[self.index].range
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn at_ts(&self, set: TokenSet) -> bool {
        set.contains(self.current_kind())
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if !self.at(kind) {
            return false;
        }
        self.next_token();
        true
    }

    fn eat_semicolons(&mut self) {
        while self.eat(TokenKind::Semi) {}
    }

    /// Bumps the current token, asserting it is of the given kind.
    fn bump(&mut self, kind: TokenKind) -> Token {
        assert_eq!(self.current_kind(), kind);
        self.next_token()
    }

    fn expect(&mut self, expected: TokenKind) -> bool {
        if self.eat(expected) {
            return true;
        }
        let (found, range) = (self.current_kind(), self.current_range());
        self.add_error(ParseErrorType::ExpectedToken { found, expected }, range);
        false
    }

    fn add_error<T>(&mut self, error: ParseErrorType, ranged: T)
    where
        T: Ranged,
    {
        self.errors.push(ParseError {
            error,
            location: ranged.range(),
        });
    }

    /// Skips tokens until one in `set` is current.
    fn skip_until(&mut self, set: TokenSet) {
        while !self.at_ts(set) {
            self.next_token();
        }
    }

    fn src_text<T>(&self, ranged: T) -> &'src str
    where
        T: Ranged,
    {
        &self.source[ranged.range()]
    }
}

#[cfg(test)]
mod tests {
    use dunlin_ast as ast;

    use crate::parse_module;

    #[test]
    fn parses_protocols_classes_and_functions() {
        let source = "\
protocol P {
    func paul()
    func priscilla() -> Int
}

class D: C, P, Q {
    func paul() {}
}

extend Int: P {
    func paul() {}
}

func alice() -> opaque P {
    return 1
}
";
        let parsed = parse_module(source);
        assert!(parsed.is_valid(), "errors: {:?}", parsed.errors);
        assert_eq!(parsed.module.body.len(), 4);

        let ast::Decl::Protocol(protocol) = &parsed.module.body[0] else {
            panic!("expected a protocol declaration");
        };
        assert_eq!(protocol.name.as_str(), "P");
        assert_eq!(protocol.members.len(), 2);
        assert!(protocol.members[0].body.is_none());

        let ast::Decl::Class(class) = &parsed.module.body[1] else {
            panic!("expected a class declaration");
        };
        assert_eq!(
            class
                .supertypes
                .iter()
                .map(ast::Identifier::as_str)
                .collect::<Vec<_>>(),
            vec!["C", "P", "Q"]
        );

        let ast::Decl::Function(function) = &parsed.module.body[3] else {
            panic!("expected a function declaration");
        };
        assert_eq!(function.name.as_str(), "alice");
        assert!(matches!(function.returns, Some(ast::TypeExpr::Opaque(_))));
    }

    #[test]
    fn opaque_marker_on_trailing_conjunct_survives_parsing() {
        let parsed = parse_module("func blib() -> P & opaque Q { return 1 }");
        assert!(parsed.is_valid(), "errors: {:?}", parsed.errors);
        let ast::Decl::Function(function) = &parsed.module.body[0] else {
            panic!("expected a function declaration");
        };
        let Some(ast::TypeExpr::Composition(composition)) = &function.returns else {
            panic!("expected a composition return type");
        };
        assert!(matches!(composition.members[0], ast::TypeExpr::Name(_)));
        assert!(matches!(composition.members[1], ast::TypeExpr::Opaque(_)));
    }

    #[test]
    fn leading_opaque_covers_the_whole_composition() {
        let parsed = parse_module("func bas() -> opaque P & Q { return 1 }");
        assert!(parsed.is_valid());
        let ast::Decl::Function(function) = &parsed.module.body[0] else {
            panic!("expected a function declaration");
        };
        let Some(ast::TypeExpr::Opaque(opaque)) = &function.returns else {
            panic!("expected an opaque return type");
        };
        assert!(matches!(
            opaque.constraint.as_ref(),
            ast::TypeExpr::Composition(_)
        ));
    }

    #[test]
    fn function_types_and_tuples() {
        let parsed = parse_module("let blubble: () -> opaque P = alice");
        assert!(parsed.is_valid());
        let ast::Decl::Binding(binding) = &parsed.module.body[0] else {
            panic!("expected a binding declaration");
        };
        let Some(ast::TypeExpr::Function(function)) = &binding.annotation else {
            panic!("expected a function type annotation");
        };
        assert!(function.parameters.is_empty());
        assert!(matches!(
            function.returns.as_ref(),
            ast::TypeExpr::Opaque(_)
        ));

        let parsed = parse_module("func blab() -> (opaque P, Int) { return (1, 2) }");
        assert!(parsed.is_valid());
    }

    #[test]
    fn property_accessor_forms() {
        let source = "\
var full: Int {
    get { return 1 }
    set { _ = newValue }
}
var short: Int { return 2 }
";
        let parsed = parse_module(source);
        assert!(parsed.is_valid(), "errors: {:?}", parsed.errors);
        let ast::Decl::Property(full) = &parsed.module.body[0] else {
            panic!("expected a property declaration");
        };
        assert!(full.setter.is_some());
        let ast::Decl::Property(short) = &parsed.module.body[1] else {
            panic!("expected a property declaration");
        };
        assert!(short.setter.is_none());
        assert_eq!(short.getter.body.len(), 1);
    }

    #[test]
    fn statements_and_expressions() {
        let source = "\
func recursion(x: Int) -> opaque P {
    if x == 0 {
        return 0
    }
    return recursion(x - 1)
}

func uses() {
    var a = alice()
    a = alice()
    _ = a.paul()
    let row = [1, 2, 3]
    _ = row[0]
}
";
        let parsed = parse_module(source);
        assert!(parsed.is_valid(), "errors: {:?}", parsed.errors);
        let ast::Decl::Function(uses) = &parsed.module.body[1] else {
            panic!("expected a function declaration");
        };
        let body = &uses.body.as_ref().unwrap().body;
        assert!(matches!(body[0], ast::Stmt::Local(_)));
        assert!(matches!(body[1], ast::Stmt::Assign(_)));
        assert!(matches!(body[2], ast::Stmt::Discard(_)));
    }

    #[test]
    fn else_if_desugars_to_nested_if() {
        let parsed = parse_module(
            "func f(x: Int) -> Int { if x == 0 { return 0 } else if x == 1 { return 1 } else { return 2 } }",
        );
        assert!(parsed.is_valid(), "errors: {:?}", parsed.errors);
        let ast::Decl::Function(function) = &parsed.module.body[0] else {
            panic!("expected a function declaration");
        };
        let body = &function.body.as_ref().unwrap().body;
        let ast::Stmt::If(outer) = &body[0] else {
            panic!("expected an if statement");
        };
        let orelse = outer.orelse.as_ref().unwrap();
        assert!(matches!(orelse.body[0], ast::Stmt::If(_)));
    }

    #[test]
    fn recovers_at_declaration_boundaries() {
        let parsed = parse_module("+ - func ok() -> Int { return 1 }");
        assert!(!parsed.is_valid());
        assert_eq!(parsed.module.body.len(), 1);
        let ast::Decl::Function(function) = &parsed.module.body[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(function.name.as_str(), "ok");
    }

    #[test]
    fn generic_parameters() {
        let parsed = parse_module("func grace<T: P>(x: T) -> opaque P { return x }");
        assert!(parsed.is_valid(), "errors: {:?}", parsed.errors);
        let ast::Decl::Function(function) = &parsed.module.body[0] else {
            panic!("expected a function declaration");
        };
        let type_params = function.type_params.as_ref().unwrap();
        assert_eq!(type_params.params.len(), 1);
        assert_eq!(type_params.params[0].name.as_str(), "T");
        assert!(type_params.params[0].bound.is_some());
    }
}
