//! GQL tokenizer.
//!
//! Splits a query string into keywords, operators, bare words, and quoted
//! strings. Every token carries its byte position so parse errors can point
//! at the offending input.

use crate::models::FilterOperator;
use crate::{Error, Result};
use std::fmt;

/// A lexical token with its byte position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub position: usize,
}

/// The kinds of GQL tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// The `SELECT` keyword.
    Select,
    /// The `FROM` keyword.
    From,
    /// The `WHERE` keyword.
    Where,
    /// The `AND` keyword.
    And,
    /// The `ORDER` keyword.
    Order,
    /// The `BY` keyword.
    By,
    /// The `ASC` keyword.
    Asc,
    /// The `DESC` keyword.
    Desc,
    /// The `LIMIT` keyword.
    Limit,
    /// A comparison operator.
    Operator(FilterOperator),
    /// A double-quoted string literal, unescaped.
    String(String),
    /// A bare word: identifier, number, date, or boolean.
    Word(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => f.write_str("SELECT"),
            Self::From => f.write_str("FROM"),
            Self::Where => f.write_str("WHERE"),
            Self::And => f.write_str("AND"),
            Self::Order => f.write_str("ORDER"),
            Self::By => f.write_str("BY"),
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
            Self::Limit => f.write_str("LIMIT"),
            Self::Operator(op) => write!(f, "{op}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Word(w) => f.write_str(w),
        }
    }
}

/// Tokenizes a GQL string.
///
/// Keywords are case-insensitive. `EXISTS` and `NOT-EXISTS` lex as
/// value-less operators.
///
/// # Errors
///
/// Returns [`Error::QueryParse`] for an unterminated string literal or a
/// `!` not followed by `=`.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            },
            '"' => {
                chars.next();
                let literal = lex_string(input, position, &mut chars)?;
                tokens.push(Token {
                    kind: TokenKind::String(literal),
                    position,
                });
            },
            '=' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Operator(FilterOperator::Eq),
                    position,
                });
            },
            '~' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Operator(FilterOperator::Contains),
                    position,
                });
            },
            '>' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Operator(FilterOperator::Gt),
                    position,
                });
            },
            '<' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Operator(FilterOperator::Lt),
                    position,
                });
            },
            '!' => {
                chars.next();
                if chars.peek().map(|&(_, next)| next) == Some('=') {
                    chars.next();
                    tokens.push(Token {
                        kind: TokenKind::Operator(FilterOperator::Ne),
                        position,
                    });
                } else {
                    return Err(Error::QueryParse {
                        message: "expected '=' after '!'".to_string(),
                        position,
                    });
                }
            },
            _ => {
                let word = lex_word(&mut chars);
                tokens.push(Token {
                    kind: classify_word(&word),
                    position,
                });
            },
        }
    }

    Ok(tokens)
}

/// Lexes the body of a double-quoted string, starting after the opening
/// quote. Handles `\"` and `\\` escapes.
fn lex_string(
    input: &str,
    start: usize,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<String> {
    let mut literal = String::new();
    loop {
        match chars.next() {
            Some((_, '"')) => return Ok(literal),
            Some((_, '\\')) => match chars.next() {
                Some((_, escaped @ ('"' | '\\'))) => literal.push(escaped),
                Some((_, other)) => {
                    literal.push('\\');
                    literal.push(other);
                },
                None => {
                    return Err(Error::QueryParse {
                        message: format!("unterminated string literal in {input:?}"),
                        position: start,
                    });
                },
            },
            Some((_, c)) => literal.push(c),
            None => {
                return Err(Error::QueryParse {
                    message: "unterminated string literal".to_string(),
                    position: start,
                });
            },
        }
    }
}

/// Consumes a bare word: everything up to whitespace, a quote, or an
/// operator character.
fn lex_word(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut word = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() || matches!(c, '"' | '=' | '~' | '>' | '<' | '!') {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

fn classify_word(word: &str) -> TokenKind {
    match word.to_uppercase().as_str() {
        "SELECT" => TokenKind::Select,
        "FROM" => TokenKind::From,
        "WHERE" => TokenKind::Where,
        "AND" => TokenKind::And,
        "ORDER" => TokenKind::Order,
        "BY" => TokenKind::By,
        "ASC" => TokenKind::Asc,
        "DESC" => TokenKind::Desc,
        "LIMIT" => TokenKind::Limit,
        "EXISTS" => TokenKind::Operator(FilterOperator::Exists),
        "NOT-EXISTS" => TokenKind::Operator(FilterOperator::NotExists),
        _ => TokenKind::Word(word.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_basic_query() {
        let tokens = kinds("SELECT FROM documents");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Select,
                TokenKind::From,
                TokenKind::Word("documents".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let tokens = kinds("select Documents from STORAGE where a = b");
        assert_eq!(tokens[0], TokenKind::Select);
        assert_eq!(tokens[2], TokenKind::From);
        assert_eq!(tokens[4], TokenKind::Where);
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("a = b c != d e ~ f g > h i < j");
        let ops: Vec<_> = tokens
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Operator(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                FilterOperator::Eq,
                FilterOperator::Ne,
                FilterOperator::Contains,
                FilterOperator::Gt,
                FilterOperator::Lt,
            ]
        );
    }

    #[test]
    fn test_existence_operators() {
        let tokens = kinds("author EXISTS doi not-exists");
        assert_eq!(tokens[1], TokenKind::Operator(FilterOperator::Exists));
        assert_eq!(tokens[3], TokenKind::Operator(FilterOperator::NotExists));
    }

    #[test]
    fn test_quoted_string_with_escapes() {
        let tokens = kinds(r#"title = "the \"big\" test \\ case""#);
        assert_eq!(
            tokens[2],
            TokenKind::String("the \"big\" test \\ case".to_string())
        );
    }

    #[test]
    fn test_operator_adjacent_to_words() {
        let tokens = kinds("source=arxiv");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Word("source".to_string()),
                TokenKind::Operator(FilterOperator::Eq),
                TokenKind::Word("arxiv".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_errors_with_position() {
        let err = tokenize("title = \"oops").unwrap_err();
        match err {
            Error::QueryParse { position, .. } => assert_eq!(position, 8),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lone_bang_errors() {
        assert!(tokenize("a ! b").is_err());
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("SELECT documents").unwrap();
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 7);
    }
}
