use std::str::Chars;

use text_size::{TextRange, TextSize};

use crate::error::{ParseError, ParseErrorType};
use crate::token::{Token, TokenKind};

const EOF_CHAR: char = '\0';

/// Lexes `source` into a token vector terminated by an
/// [`TokenKind::EndOfFile`] token. Unrecognized characters are reported and
/// skipped, so lexing never fails.
pub(crate) fn lex(source: &str) -> (Vec<Token>, Vec<ParseError>) {
    let mut lexer = Lexer {
        cursor: Cursor::new(source),
        source,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.errors)
}

struct Lexer<'src> {
    cursor: Cursor<'src>,
    source: &'src str,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
}

impl Lexer<'_> {
    fn run(&mut self) {
        loop {
            self.skip_trivia();
            let start = self.cursor.offset();
            let Some(c) = self.cursor.bump() else {
                self.push(TokenKind::EndOfFile, start);
                break;
            };
            match c {
                c if is_identifier_start(c) => self.lex_identifier(start),
                c if c.is_ascii_digit() => self.lex_number(start),
                '"' => self.lex_string(start),
                '(' => self.push(TokenKind::LParen, start),
                ')' => self.push(TokenKind::RParen, start),
                '{' => self.push(TokenKind::LBrace, start),
                '}' => self.push(TokenKind::RBrace, start),
                '[' => self.push(TokenKind::LBracket, start),
                ']' => self.push(TokenKind::RBracket, start),
                ',' => self.push(TokenKind::Comma, start),
                ':' => self.push(TokenKind::Colon, start),
                ';' => self.push(TokenKind::Semi, start),
                '.' => self.push(TokenKind::Dot, start),
                '&' => self.push(TokenKind::Ampersand, start),
                '+' => self.push(TokenKind::Plus, start),
                '<' => self.push(TokenKind::Less, start),
                '>' => self.push(TokenKind::Greater, start),
                '-' => {
                    if self.cursor.eat_char('>') {
                        self.push(TokenKind::Arrow, start);
                    } else {
                        self.push(TokenKind::Minus, start);
                    }
                }
                '=' => {
                    if self.cursor.eat_char('=') {
                        self.push(TokenKind::EqEqual, start);
                    } else {
                        self.push(TokenKind::Equal, start);
                    }
                }
                '!' => {
                    if self.cursor.eat_char('=') {
                        self.push(TokenKind::NotEqual, start);
                    } else {
                        self.error(ParseErrorType::UnexpectedCharacter('!'), start);
                    }
                }
                c => self.error(ParseErrorType::UnexpectedCharacter(c), start),
            }
        }
    }

    /// Skips whitespace and `//` line comments.
    fn skip_trivia(&mut self) {
        loop {
            self.cursor.eat_while(char::is_whitespace);
            if self.cursor.first() == '/' && self.cursor.second() == '/' {
                self.cursor.eat_while(|c| c != '\n');
            } else {
                break;
            }
        }
    }

    fn lex_identifier(&mut self, start: TextSize) {
        self.cursor.eat_while(is_identifier_continue);
        let range = self.token_range(start);
        let text = &self.source[range];
        let kind = if text == "_" {
            TokenKind::Underscore
        } else {
            TokenKind::from_keyword(text).unwrap_or(TokenKind::Name)
        };
        self.tokens.push(Token { kind, range });
    }

    fn lex_number(&mut self, start: TextSize) {
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let range = self.token_range(start);
        if self.source[range].parse::<i64>().is_err() {
            self.errors.push(ParseError {
                error: ParseErrorType::IntegerOverflow,
                location: range,
            });
        }
        self.tokens.push(Token {
            kind: TokenKind::Int,
            range,
        });
    }

    /// Lexes a string literal. The opening quote is already consumed; the
    /// literal may not span lines and supports no escape sequences.
    fn lex_string(&mut self, start: TextSize) {
        self.cursor.eat_while(|c| c != '"' && c != '\n');
        if !self.cursor.eat_char('"') {
            self.error(ParseErrorType::UnterminatedString, start);
        }
        self.tokens.push(Token {
            kind: TokenKind::String,
            range: self.token_range(start),
        });
    }

    fn token_range(&self, start: TextSize) -> TextRange {
        TextRange::new(start, self.cursor.offset())
    }

    fn push(&mut self, kind: TokenKind, start: TextSize) {
        self.tokens.push(Token {
            kind,
            range: self.token_range(start),
        });
    }

    fn error(&mut self, error: ParseErrorType, start: TextSize) {
        self.errors.push(ParseError {
            error,
            location: self.token_range(start),
        });
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A char-level cursor over the source, tracking the current byte offset.
struct Cursor<'src> {
    chars: Chars<'src>,
    source_len: TextSize,
}

impl<'src> Cursor<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars(),
            source_len: TextSize::of(source),
        }
    }

    /// The byte offset of the next character to be consumed.
    fn offset(&self) -> TextSize {
        self.source_len - TextSize::of(self.chars.as_str())
    }

    /// Peeks the next character without consuming it.
    fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    /// Peeks the second character without consuming anything.
    fn second(&self) -> char {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next().unwrap_or(EOF_CHAR)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn eat_char(&mut self, c: char) -> bool {
        if self.first() == c {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.first()) && !self.chars.as_str().is_empty() {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.iter().map(|token| token.kind).collect()
    }

    #[test]
    fn keywords_and_names() {
        assert_eq!(
            kinds("func alice() -> opaque P"),
            vec![
                TokenKind::Func,
                TokenKind::Name,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Opaque,
                TokenKind::Name,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("x == 0 != 1 - 2 + 3"),
            vec![
                TokenKind::Name,
                TokenKind::EqEqual,
                TokenKind::Int,
                TokenKind::NotEqual,
                TokenKind::Int,
                TokenKind::Minus,
                TokenKind::Int,
                TokenKind::Plus,
                TokenKind::Int,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            kinds("// header\nlet x = 1 // trailing\n"),
            vec![
                TokenKind::Let,
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn underscore_is_distinct_from_names() {
        let (tokens, _) = lex("_ = _x");
        assert_eq!(tokens[0].kind, TokenKind::Underscore);
        assert_eq!(tokens[2].kind, TokenKind::Name);
    }

    #[test]
    fn unterminated_string_is_reported() {
        let (tokens, errors) = lex("\"abc");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error, ParseErrorType::UnterminatedString);
    }

    #[test]
    fn token_ranges_are_byte_offsets() {
        let (tokens, _) = lex("let ab = 12");
        let ranges: Vec<_> = tokens
            .iter()
            .map(|token| (u32::from(token.range.start()), u32::from(token.range.end())))
            .collect();
        assert_eq!(ranges, vec![(0, 3), (4, 6), (7, 8), (9, 11), (11, 11)]);
    }
}
