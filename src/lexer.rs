//! Lexer for Rill
//!
//! The lexer converts source code into a sequence of tokens.
//! It uses the `logos` crate for the scanning itself and derives
//! line/column positions from a precomputed line table.
//!
//! The first unrecognized character aborts lexing; there is no recovery.

use crate::span::{LineMap, Span};
use crate::token::{Token, TokenKind};
use logos::Logos;
use thiserror::Error;

/// Lexer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("{pos}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, pos: crate::span::Position },

    #[error("{pos}: '!' must be followed by '=' (there is no unary '!')")]
    BareBang { pos: crate::span::Position },
}

/// The lexer for Rill
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    line_map: LineMap,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source),
            line_map: LineMap::new(source),
        }
    }

    /// Collect all tokens, ending with a single EOF token positioned at
    /// the final line/column reached.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(result) = self.inner.next() {
            let span = self.inner.span();
            let span = Span::new(span.start, span.end);
            let pos = self.line_map.position(span.start);
            match result {
                Ok(kind) => tokens.push(Token::new(kind, span, pos)),
                Err(()) => {
                    let ch = span.text(self.source).chars().next().unwrap_or('\0');
                    return Err(if ch == '!' {
                        LexError::BareBang { pos }
                    } else {
                        LexError::UnexpectedChar { ch, pos }
                    });
                }
            }
        }

        let end = self.source.len();
        let pos = self.line_map.position(end);
        tokens.push(Token::new(TokenKind::Eof, Span::new(end, end), pos));
        Ok(tokens)
    }
}

/// Helper function to lex source code
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        let tokens = tokenize(source).expect("lexing failed");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        let kinds = token_kinds("");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace_only() {
        let kinds = token_kinds("   \t\n  ");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_integers() {
        let kinds = token_kinds("0 42 007");
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let kinds = token_kinds("if out iffy output _x x9");
        assert_eq!(
            kinds,
            vec![
                TokenKind::If,
                TokenKind::Out,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        let kinds = token_kinds("= == != < > <= >= + - * /");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Assign,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_longest_match_wins() {
        // '<=' must lex as one token, '< =' as two
        let kinds = token_kinds("a<=b");
        assert_eq!(
            kinds,
            vec![TokenKind::Ident, TokenKind::LtEq, TokenKind::Ident, TokenKind::Eof]
        );
        let kinds = token_kinds("a < = b");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Lt,
                TokenKind::Assign,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_delimiters() {
        let kinds = token_kinds("; ( ) { }");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Semicolon,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments() {
        let kinds = token_kinds("// leading comment\nx = 1; // trailing");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_bare_bang_is_an_error() {
        let err = tokenize("x = !y;").unwrap_err();
        assert_eq!(
            err,
            LexError::BareBang { pos: Position::new(1, 5) }
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("x = 1;\ny = @;").unwrap_err();
        assert_eq!(
            err,
            LexError::UnexpectedChar { ch: '@', pos: Position::new(2, 5) }
        );
    }

    #[test]
    fn test_position_tracking() {
        let source = "x = 1;\n  y = 2;";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].pos, Position::new(1, 1)); // x
        assert_eq!(tokens[2].pos, Position::new(1, 5)); // 1
        assert_eq!(tokens[4].pos, Position::new(2, 3)); // y
    }

    #[test]
    fn test_eof_position() {
        let tokens = tokenize("x = 1;\nout x;").unwrap();
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.pos, Position::new(2, 7));
    }

    #[test]
    fn test_lexeme_round_trip() {
        // Re-concatenating token lexemes reproduces the token-relevant
        // content of the source (everything but whitespace and comments).
        let source = "x = 10; // ten\nif (x >= 2) { out x / 2; }";
        let tokens = tokenize(source).unwrap();
        let joined: String = tokens.iter().map(|t| t.text(source)).collect();

        let stripped: String = source
            .lines()
            .map(|line| line.split("//").next().unwrap_or(""))
            .collect::<String>()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(joined, stripped);
    }
}
