use text_size::TextRange;

use dunlin_ast::Ranged;

/// A lexed token: a [`TokenKind`] plus the source range it was lexed from.
///
/// Tokens carry no payload; the parser slices literal and identifier text
/// out of the source via the range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) range: TextRange,
}

impl Ranged for Token {
    fn range(&self) -> TextRange {
        self.range
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    /// An identifier that is not a keyword.
    Name,
    /// A decimal integer literal.
    Int,
    /// A double-quoted string literal.
    String,

    Protocol,
    Class,
    Extend,
    Func,
    Subscript,
    Var,
    Let,
    Get,
    Set,
    Return,
    If,
    Else,
    Typealias,
    Opaque,
    True,
    False,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,
    Ampersand,
    Arrow,
    Equal,
    EqEqual,
    NotEqual,
    Plus,
    Minus,
    Less,
    Greater,
    Underscore,

    /// Marks the end of the token stream.
    EndOfFile,
}

impl TokenKind {
    /// The keyword kind for `text`, if it is a keyword.
    pub fn from_keyword(text: &str) -> Option<TokenKind> {
        Some(match text {
            "protocol" => TokenKind::Protocol,
            "class" => TokenKind::Class,
            "extend" => TokenKind::Extend,
            "func" => TokenKind::Func,
            "subscript" => TokenKind::Subscript,
            "var" => TokenKind::Var,
            "let" => TokenKind::Let,
            "get" => TokenKind::Get,
            "set" => TokenKind::Set,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "typealias" => TokenKind::Typealias,
            "opaque" => TokenKind::Opaque,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        })
    }

    pub const fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Protocol
                | TokenKind::Class
                | TokenKind::Extend
                | TokenKind::Func
                | TokenKind::Subscript
                | TokenKind::Var
                | TokenKind::Let
                | TokenKind::Get
                | TokenKind::Set
                | TokenKind::Return
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::Typealias
                | TokenKind::Opaque
                | TokenKind::True
                | TokenKind::False
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TokenKind::Name => "identifier",
            TokenKind::Int => "integer literal",
            TokenKind::String => "string literal",
            TokenKind::Protocol => "'protocol'",
            TokenKind::Class => "'class'",
            TokenKind::Extend => "'extend'",
            TokenKind::Func => "'func'",
            TokenKind::Subscript => "'subscript'",
            TokenKind::Var => "'var'",
            TokenKind::Let => "'let'",
            TokenKind::Get => "'get'",
            TokenKind::Set => "'set'",
            TokenKind::Return => "'return'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::Typealias => "'typealias'",
            TokenKind::Opaque => "'opaque'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semi => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::Ampersand => "'&'",
            TokenKind::Arrow => "'->'",
            TokenKind::Equal => "'='",
            TokenKind::EqEqual => "'=='",
            TokenKind::NotEqual => "'!='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Less => "'<'",
            TokenKind::Greater => "'>'",
            TokenKind::Underscore => "'_'",
            TokenKind::EndOfFile => "end of file",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
