//! GQL recursive-descent parser.
//!
//! Grammar:
//!
//! ```text
//! query  := SELECT FROM type [WHERE filter (AND filter)*]
//!           [ORDER BY field [ASC|DESC]] [LIMIT n]
//! filter := field operator value | field EXISTS | field NOT-EXISTS
//! ```

use super::lexer::{Token, TokenKind, tokenize};
use crate::models::{Filter, FilterValue, Query, QueryType};
use crate::{Error, Result};
use chrono::NaiveDate;

/// Parses a GQL string into a [`Query`].
///
/// # Errors
///
/// Returns [`Error::QueryParse`] with the byte position of the problem for
/// any malformed input: missing `SELECT` or `FROM`, an unknown query type,
/// a filter without an operator, or trailing tokens.
pub fn parse(input: &str) -> Result<Query> {
    let tokens = tokenize(input)?;
    Parser::new(input, tokens).parse_query()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            input,
            tokens,
            cursor: 0,
        }
    }

    fn parse_query(mut self) -> Result<Query> {
        self.expect(&TokenKind::Select, "expected SELECT")?;
        self.expect(&TokenKind::From, "expected FROM")?;
        let query_type = self.parse_query_type()?;

        let mut query = Query::new(query_type);
        if self.eat(&TokenKind::Where) {
            query.filters.push(self.parse_filter()?);
            while self.eat(&TokenKind::And) {
                query.filters.push(self.parse_filter()?);
            }
        }

        if self.eat(&TokenKind::Order) {
            self.expect(&TokenKind::By, "expected BY after ORDER")?;
            query.order_by = Some(self.next_word("expected a field name after ORDER BY")?);
            if self.eat(&TokenKind::Desc) {
                query.descending = true;
            } else {
                self.eat(&TokenKind::Asc);
            }
        }

        if self.eat(&TokenKind::Limit) {
            let position = self.position();
            let word = self.next_word("expected a number after LIMIT")?;
            query.limit = word.parse().map_err(|_| Error::QueryParse {
                message: format!("invalid LIMIT value {word:?}"),
                position,
            })?;
        }

        if let Some(token) = self.peek() {
            return Err(Error::QueryParse {
                message: format!("unexpected trailing token {}", token.kind),
                position: token.position,
            });
        }

        Ok(query)
    }

    fn parse_query_type(&mut self) -> Result<QueryType> {
        let position = self.position();
        let word = self.next_word("expected a query type after FROM")?;
        QueryType::parse(&word).ok_or_else(|| Error::QueryParse {
            message: format!(
                "unknown query type {word:?}, expected documents, sources, authors, or attribution"
            ),
            position,
        })
    }

    fn parse_filter(&mut self) -> Result<Filter> {
        let field = self.next_word("expected a field name")?;
        let position = self.position();
        let Some(Token {
            kind: TokenKind::Operator(operator),
            ..
        }) = self.next()
        else {
            return Err(Error::QueryParse {
                message: format!("expected an operator after field {field:?}"),
                position,
            });
        };

        let value = if operator.takes_value() {
            let position = self.position();
            let token = self.next().ok_or_else(|| Error::QueryParse {
                message: format!("expected a value after operator {operator}"),
                position,
            })?;
            Some(match token.kind {
                TokenKind::String(s) => FilterValue::Str(s),
                TokenKind::Word(w) => type_word(&w),
                other => {
                    return Err(Error::QueryParse {
                        message: format!("expected a value, found {other}"),
                        position: token.position,
                    });
                },
            })
        } else {
            None
        };

        Ok(Filter {
            field,
            operator,
            value,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    /// Byte position of the next token, or the end of the input.
    fn position(&self) -> usize {
        self.peek().map_or(self.input.len(), |t| t.position)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| t.kind == *kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(Error::QueryParse {
                message: message.to_string(),
                position: self.position(),
            })
        }
    }

    /// Consumes the next token as a word. Keywords are rejected so a query
    /// like `WHERE FROM = x` fails instead of silently treating `FROM` as a
    /// field name.
    fn next_word(&mut self, message: &str) -> Result<String> {
        let position = self.position();
        match self.next() {
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => Ok(w),
            Some(Token {
                kind: TokenKind::String(s),
                ..
            }) => Ok(s),
            _ => Err(Error::QueryParse {
                message: message.to_string(),
                position,
            }),
        }
    }
}

/// Types a bare word: boolean, date, number, then string.
fn type_word(word: &str) -> FilterValue {
    match word {
        "true" => return FilterValue::Bool(true),
        "false" => return FilterValue::Bool(false),
        _ => {},
    }
    if let Ok(date) = NaiveDate::parse_from_str(word, "%Y-%m-%d") {
        return FilterValue::Date(date);
    }
    if let Ok(number) = word.parse::<f64>() {
        return FilterValue::Number(number);
    }
    FilterValue::Str(word.to_string())
}
