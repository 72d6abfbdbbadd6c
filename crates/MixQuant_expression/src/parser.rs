// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Recursive-descent parser for variable expressions.
//!
//! Precedence, loosest first: `or`, `and`, comparisons, `+ -`, `* /`,
//! unary minus, `**` (right-associative).

use crate::ast::{BinaryOp, Builtin, Expr, Segment, UnaryOp};
use crate::lexer::{tokenize, Lexeme, Token};
use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

struct Parser {
    lexemes: Vec<Lexeme>,
    position: usize,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Parses an expression string into an AST.
///
/// # Errors
/// - `MixQuantError::ExpressionError` on lexing or syntax errors.
pub fn parse(source: &str) -> Result<Expr, MixQuantError> {
    let lexemes = tokenize(source)?;
    let mut parser = Parser {
        lexemes,
        position: 0,
    };

    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(MixQuantError::ExpressionError(format!(
            "unexpected trailing token '{}' in '{source}'",
            extra.text
        )));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.position)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|l| &l.token)
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.position).cloned();
        if lexeme.is_some() {
            self.position += 1;
        }
        lexeme
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<Lexeme, MixQuantError> {
        match self.peek_token() {
            Some(found) if found == token => Ok(self.advance().unwrap_or_else(|| unreachable!())),
            found => Err(MixQuantError::ExpressionError(format!(
                "expected {what}, found {found:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, MixQuantError> {
        let mut lhs = self.parse_and()?;
        while self.peek_token() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, MixQuantError> {
        let mut lhs = self.parse_comparison()?;
        while self.peek_token() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, MixQuantError> {
        let mut lhs = self.parse_additive()?;
        while let Some(op) = match self.peek_token() {
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::NotEq) => Some(BinaryOp::Ne),
            _ => None,
        } {
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, MixQuantError> {
        let mut lhs = self.parse_multiplicative()?;
        while let Some(op) = match self.peek_token() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, MixQuantError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = match self.peek_token() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, MixQuantError> {
        if self.peek_token() == Some(&Token::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, MixQuantError> {
        let base = self.parse_atom()?;
        if self.peek_token() == Some(&Token::Power) {
            self.advance();
            // Right-associative; the exponent may itself be negated.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, MixQuantError> {
        let Some(lexeme) = self.peek().cloned() else {
            return Err(MixQuantError::ExpressionError(
                "unexpected end of expression".to_string(),
            ));
        };

        match lexeme.token {
            Token::Number => {
                self.advance();
                let value = lexeme.text.parse::<f64>().map_err(|_| {
                    MixQuantError::ExpressionError(format!(
                        "invalid numeric literal '{}'",
                        lexeme.text
                    ))
                })?;
                Ok(Expr::Number(value))
            }
            Token::StringLiteral => {
                self.advance();
                let inner = lexeme.text.trim_matches('\'').to_string();
                Ok(Expr::Str(inner))
            }
            Token::Slot => {
                self.advance();
                let digits: String = lexeme.text.chars().skip(1).collect();
                let slot = digits.parse::<u32>().map_err(|_| {
                    MixQuantError::ExpressionError(format!(
                        "invalid permutation slot '{}'",
                        lexeme.text
                    ))
                })?;
                Ok(Expr::Slot(slot))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident | Token::Marker => self.parse_template_or_call(),
            other => Err(MixQuantError::ExpressionError(format!(
                "unexpected token {other:?} ('{}')",
                lexeme.text
            ))),
        }
    }

    /// Consumes a maximal adjacent run of identifier fragments and markers,
    /// yielding either a template or, for a bare builtin name followed by
    /// `(`, a call.
    fn parse_template_or_call(&mut self) -> Result<Expr, MixQuantError> {
        let mut segments = Vec::new();
        let mut last_end = None;

        while let Some(lexeme) = self.peek() {
            let adjacent = last_end.is_none() || last_end == Some(lexeme.span.start);
            if !adjacent {
                break;
            }
            match lexeme.token {
                Token::Ident => segments.push(Segment::Text(lexeme.text.clone())),
                Token::Marker => {
                    segments.push(Segment::Marker(lexeme.text.trim_matches('.').to_string()));
                }
                _ => break,
            }
            last_end = Some(lexeme.span.end);
            self.advance();
        }

        // A lone identifier directly followed by '(' is a function call.
        if let [Segment::Text(name)] = segments.as_slice() {
            if self.peek_token() == Some(&Token::LParen) {
                let Some(function) = Builtin::from_name(name) else {
                    return Err(MixQuantError::ExpressionError(format!(
                        "unknown function '{name}'"
                    )));
                };
                return self.parse_call(function);
            }
        }

        Ok(Expr::Template(segments))
    }

    fn parse_call(&mut self, function: Builtin) -> Result<Expr, MixQuantError> {
        self.expect(&Token::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek_token() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                match self.peek_token() {
                    Some(Token::Comma) => {
                        self.advance();
                    }
                    _ => break,
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;

        if !function.arity().contains(&args.len()) {
            return Err(MixQuantError::ExpressionError(format!(
                "'{}' takes {:?} arguments, got {}",
                function.name(),
                function.arity(),
                args.len()
            )));
        }

        Ok(Expr::Call { function, args })
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_parser {
    use super::*;

    #[test]
    fn test_plain_column() {
        let expr = parse("tv_spend").unwrap();
        assert_eq!(
            expr,
            Expr::Template(vec![Segment::Text("tv_spend".to_string())])
        );
    }

    #[test]
    fn test_marker_template() {
        let expr = parse("sales_.crosssection.").unwrap();
        assert_eq!(
            expr,
            Expr::Template(vec![
                Segment::Text("sales_".to_string()),
                Segment::Marker("crosssection".to_string()),
            ])
        );
    }

    #[test]
    fn test_call_with_slot() {
        let expr = parse("adstock(tv, ¬1)").unwrap();
        assert!(expr.has_slots());
        match expr {
            Expr::Call { function, args } => {
                assert_eq!(function, Builtin::Adstock);
                assert_eq!(args.len(), 2);
                assert_eq!(args[1], Expr::Slot(1));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3).
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                rhs,
                ..
            } => {
                assert!(matches!(
                    *rhs,
                    Expr::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected addition at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse("2 ** 3 ** 2").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Pow,
                lhs,
                rhs,
            } => {
                assert_eq!(*lhs, Expr::Number(2.0));
                assert!(matches!(
                    *rhs,
                    Expr::Binary {
                        op: BinaryOp::Pow,
                        ..
                    }
                ));
            }
            other => panic!("expected power at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_dimension_indicator() {
        let expr = parse("(.region. == 'ang') * tv").unwrap();
        assert!(expr.references_dimension("region"));
        assert!(!expr.references_dimension("crosssection"));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(parse("log(tv, 2)").is_err());
        assert!(parse("adstock(tv)").is_err());
    }

    #[test]
    fn test_unknown_function_rejected() {
        assert!(parse("boxcox(tv, 2)").is_err());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse("tv price").is_err());
    }
}
