//! Parser for Rill
//!
//! A predictive recursive descent parser that converts the token sequence
//! into an AST in one pass. Each rule peeks a single token to choose its
//! branch; no token is ever un-consumed, and the first error aborts
//! parsing with no partial AST.

use crate::ast::{BinOp, Expr, Program, Stmt};
use crate::span::Position;
use crate::token::{Token, TokenKind};
use thiserror::Error;

/// Parser errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{pos}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: Position,
    },

    #[error("{pos}: integer literal '{literal}' is out of range")]
    IntOutOfRange { literal: String, pos: Position },
}

/// Parse result
pub type ParseResult<T> = Result<T, ParseError>;

/// The parser for Rill
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'src str,
}

impl<'src> Parser<'src> {
    /// Create a new parser over a token sequence produced by the lexer.
    /// The sequence is expected to end with an EOF token.
    pub fn new(tokens: Vec<Token>, source: &'src str) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof));
        Self { tokens, pos: 0, source }
    }

    fn peek(&self) -> &Token {
        // The EOF token is returned for any position past the end
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens.last().expect("token sequence is never empty")
        })
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            token.text(self.source).to_string()
        };
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            pos: token.pos,
        }
    }

    // ============ Statements ============

    /// Parse a complete program: `statement* EOF`
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    /// Dispatch on the first token: identifier, `if`, or `out`.
    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Ident => self.parse_assignment(),
            TokenKind::If => self.parse_if(),
            TokenKind::Out => self.parse_out(),
            _ => Err(self.unexpected("a statement")),
        }
    }

    /// `assignment := IDENT '=' expr ';'`
    fn parse_assignment(&mut self) -> ParseResult<Stmt> {
        let ident = self.expect(TokenKind::Ident, "an identifier")?;
        let name = ident.text(self.source).to_string();
        let pos = ident.pos;
        self.expect(TokenKind::Assign, "'=' after identifier")?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semicolon, "';' after expression")?;
        Ok(Stmt::Assign { name, value, pos })
    }

    /// `if_stmt := 'if' '(' expr ')' '{' statement* '}'`
    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let kw = self.expect(TokenKind::If, "'if'")?;
        let pos = kw.pos;
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        self.expect(TokenKind::LBrace, "'{' to open if body")?;

        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }

        self.expect(TokenKind::RBrace, "'}' to close if body")?;
        Ok(Stmt::If { condition, body, pos })
    }

    /// `out_stmt := 'out' expr ';'`
    fn parse_out(&mut self) -> ParseResult<Stmt> {
        let kw = self.expect(TokenKind::Out, "'out'")?;
        let pos = kw.pos;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semicolon, "';' after out expression")?;
        Ok(Stmt::Out { value, pos })
    }

    // ============ Expressions ============

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_comparison()
    }

    /// `comparison := add_sub (CMP_OP add_sub)*`
    ///
    /// Comparisons chain left-associatively: `a == b == c` parses as
    /// `(a == b) == c`.
    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_add_sub()?;
        while self.peek().kind.is_comparison() {
            let op_token = self.advance();
            let op = BinOp::from_token(op_token.kind).expect("comparison token is a binop");
            let rhs = self.parse_add_sub()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos: op_token.pos,
            };
        }
        Ok(lhs)
    }

    /// `add_sub := mul_div (('+'|'-') mul_div)*`
    fn parse_add_sub(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_mul_div()?;
        while matches!(self.peek().kind, TokenKind::Plus | TokenKind::Minus) {
            let op_token = self.advance();
            let op = BinOp::from_token(op_token.kind).expect("additive token is a binop");
            let rhs = self.parse_mul_div()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos: op_token.pos,
            };
        }
        Ok(lhs)
    }

    /// `mul_div := primary (('*'|'/') primary)*`
    fn parse_mul_div(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_primary()?;
        while matches!(self.peek().kind, TokenKind::Star | TokenKind::Slash) {
            let op_token = self.advance();
            let op = BinOp::from_token(op_token.kind).expect("multiplicative token is a binop");
            let rhs = self.parse_primary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos: op_token.pos,
            };
        }
        Ok(lhs)
    }

    /// `primary := INT_LITERAL | IDENT | '(' expr ')'`
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().kind {
            TokenKind::IntLiteral => {
                let token = self.advance();
                let literal = token.text(self.source);
                let value = literal.parse::<i64>().map_err(|_| ParseError::IntOutOfRange {
                    literal: literal.to_string(),
                    pos: token.pos,
                })?;
                Ok(Expr::IntLiteral { value, pos: token.pos })
            }
            TokenKind::Ident => {
                let token = self.advance();
                Ok(Expr::Variable {
                    name: token.text(self.source).to_string(),
                    pos: token.pos,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')' to close expression")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

/// Helper function to parse a token sequence into a program.
pub fn parse(tokens: Vec<Token>, source: &str) -> ParseResult<Program> {
    Parser::new(tokens, source).parse_program()
}
