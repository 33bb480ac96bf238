use std::fmt;

use text_size::TextRange;

use crate::token::TokenKind;

/// An error produced while lexing or parsing, with the source range it
/// applies to. Errors are collected, never thrown: the parser always
/// produces a (possibly partial) module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub error: ParseErrorType,
    pub location: TextRange,
}

impl std::ops::Deref for ParseError {
    type Target = ParseErrorType;

    fn deref(&self) -> &Self::Target {
        &self.error
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte range {:?}", &self.error, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorType {
    /// The lexer encountered a character that cannot start a token.
    UnexpectedCharacter(char),
    /// A string literal ran past the end of its line or the file.
    UnterminatedString,
    /// An integer literal that does not fit the language's integer type.
    IntegerOverflow,
    /// The parser found `found` where `expected` was required.
    ExpectedToken {
        found: TokenKind,
        expected: TokenKind,
    },
    /// A token that cannot start a declaration at the top level or in a
    /// type body.
    ExpectedDeclaration(TokenKind),
    /// A token that cannot start an expression where one was required.
    ExpectedExpression(TokenKind),
    /// A token that cannot start a type annotation where one was required.
    ExpectedType(TokenKind),
}

impl fmt::Display for ParseErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorType::UnexpectedCharacter(c) => {
                write!(f, "unexpected character {c:?}")
            }
            ParseErrorType::UnterminatedString => f.write_str("unterminated string literal"),
            ParseErrorType::IntegerOverflow => f.write_str("integer literal is too large"),
            ParseErrorType::ExpectedToken { found, expected } => {
                write!(f, "expected {expected}, found {found}")
            }
            ParseErrorType::ExpectedDeclaration(found) => {
                write!(f, "expected a declaration, found {found}")
            }
            ParseErrorType::ExpectedExpression(found) => {
                write!(f, "expected an expression, found {found}")
            }
            ParseErrorType::ExpectedType(found) => {
                write!(f, "expected a type, found {found}")
            }
        }
    }
}
