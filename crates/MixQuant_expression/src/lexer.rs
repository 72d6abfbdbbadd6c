// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Tokenizer for variable expressions, built on `logos`.
//!
//! Identifiers may butt directly against cross-section markers
//! (`sales_.crosssection.` lexes as `Ident("sales_")` + `Marker`); the
//! parser reassembles adjacent runs into identifier templates using the
//! token spans.

use logos::Logos;

use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Tokens of the variable-expression language.
#[derive(Logos, Clone, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    /// Exponentiation: `**`. Must precede `*` so the longer token wins.
    #[token("**")]
    Power,

    /// Addition.
    #[token("+")]
    Plus,

    /// Subtraction / negation.
    #[token("-")]
    Minus,

    /// Multiplication.
    #[token("*")]
    Star,

    /// Division.
    #[token("/")]
    Slash,

    /// Opening parenthesis.
    #[token("(")]
    LParen,

    /// Closing parenthesis.
    #[token(")")]
    RParen,

    /// Argument separator.
    #[token(",")]
    Comma,

    /// Greater-or-equal comparison.
    #[token(">=")]
    Ge,

    /// Less-or-equal comparison.
    #[token("<=")]
    Le,

    /// Equality comparison.
    #[token("==")]
    EqEq,

    /// Inequality comparison.
    #[token("!=")]
    NotEq,

    /// Greater-than comparison.
    #[token(">")]
    Gt,

    /// Less-than comparison.
    #[token("<")]
    Lt,

    /// Logical conjunction.
    #[token("and")]
    And,

    /// Logical disjunction.
    #[token("or")]
    Or,

    /// Permutation slot: `¬` followed by the slot number.
    #[regex(r"¬[0-9]+")]
    Slot,

    /// Single-quoted string literal (dates, dimension values).
    #[regex(r"'[^']*'")]
    StringLiteral,

    /// Numeric literal.
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    Number,

    /// Identifier fragment: a raw column name or a piece of one.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    /// Cross-section marker: `.crosssection.` or `.<dimension>.`.
    #[regex(r"\.[A-Za-z_][A-Za-z0-9_]*\.")]
    Marker,
}

/// A token together with its source text and byte span.
#[derive(Clone, Debug)]
pub struct Lexeme {
    /// The token kind.
    pub token: Token,

    /// The matched source text.
    pub text: String,

    /// Byte range in the source, used to detect adjacency when
    /// reassembling identifier templates.
    pub span: std::ops::Range<usize>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Tokenizes an expression.
///
/// # Errors
/// - `MixQuantError::ExpressionError` on any character the language does
///   not recognize.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>, MixQuantError> {
    let mut lexer = Token::lexer(source);
    let mut lexemes = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => lexemes.push(Lexeme {
                token,
                text: lexer.slice().to_string(),
                span: lexer.span(),
            }),
            Err(()) => {
                return Err(MixQuantError::ExpressionError(format!(
                    "unrecognized token '{}' at byte {} in '{source}'",
                    lexer.slice(),
                    lexer.span().start,
                )))
            }
        }
    }

    Ok(lexemes)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_lexer {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|l| l.token).collect()
    }

    #[test]
    fn test_arithmetic_tokens() {
        assert_eq!(
            kinds("tv + 2.5 * price ** 2"),
            vec![
                Token::Ident,
                Token::Plus,
                Token::Number,
                Token::Star,
                Token::Ident,
                Token::Power,
                Token::Number,
            ]
        );
    }

    #[test]
    fn test_marker_adjacent_to_ident() {
        let lexemes = tokenize("sales_.crosssection.").unwrap();
        assert_eq!(lexemes.len(), 2);
        assert_eq!(lexemes[0].token, Token::Ident);
        assert_eq!(lexemes[0].text, "sales_");
        assert_eq!(lexemes[1].token, Token::Marker);
        assert_eq!(lexemes[1].text, ".crosssection.");
        assert_eq!(lexemes[0].span.end, lexemes[1].span.start);
    }

    #[test]
    fn test_keywords_do_not_shadow_identifiers() {
        assert_eq!(kinds("and"), vec![Token::And]);
        assert_eq!(kinds("android"), vec![Token::Ident]);
    }

    #[test]
    fn test_slot_and_string_tokens() {
        assert_eq!(
            kinds("adstock(tv, ¬1)"),
            vec![
                Token::Ident,
                Token::LParen,
                Token::Ident,
                Token::Comma,
                Token::Slot,
                Token::RParen,
            ]
        );
        assert_eq!(
            kinds("obs >= '2024-01-01'"),
            vec![Token::Ident, Token::Ge, Token::StringLiteral]
        );
    }

    #[test]
    fn test_unrecognized_character_fails() {
        assert!(tokenize("tv £ 2").is_err());
    }
}
