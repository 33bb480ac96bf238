//! Lexer and recursive-descent parser for the Dunlin language.
//!
//! The entry point is [`parse_module`], which always produces a [`Module`]
//! (possibly partial) together with the parse errors encountered. Callers
//! that only care about well-formed input can treat a non-empty error list
//! as failure.

use dunlin_ast::Module;

pub use crate::error::{ParseError, ParseErrorType};
pub use crate::token::TokenKind;

mod error;
mod lexer;
mod parser;
mod token;
mod token_set;

/// The result of parsing one source file.
#[derive(Debug)]
pub struct Parsed {
    pub module: Module,
    pub errors: Vec<ParseError>,
}

impl Parsed {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parses `source` as a Dunlin module.
pub fn parse_module(source: &str) -> Parsed {
    let (tokens, lex_errors) = lexer::lex(source);
    let mut parsed = parser::Parser::new(source, tokens).parse_module();
    // Lexical errors precede parse errors, both already in source order.
    let parse_errors = std::mem::take(&mut parsed.errors);
    parsed.errors = lex_errors;
    parsed.errors.extend(parse_errors);
    parsed
}
