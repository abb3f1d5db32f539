//! Minimal conjunctive query parser
//!
//! Stand-in for the external query language front-end. The grammar covers
//! what the pruning pipeline can act on, plus enough structure to express
//! what it cannot (so the extractor's unsupported paths are reachable):
//!
//! ```text
//! query      := or_expr
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := unary (AND unary)*
//! unary      := NOT unary | primary
//! primary    := '(' or_expr ')' | comparison
//! comparison := field (':' | '==' | '!=' | '<' | '<=' | '>' | '>=') value
//! value      := '"' chars '"' | bare-token
//! ```
//!
//! Keywords are case-insensitive. Quoted values keep their escape sequences
//! verbatim (`\*`, `\"`, `\\`); unescaping happens downstream, after
//! wildcard detection. Bare values that parse as integers, floats, or
//! booleans are typed accordingly.

use crate::error::{Result, SieveError};
use crate::query::ast::{ColumnDescriptor, Expr, FilterOperation, Literal, LiteralKind};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Symbol(&'static str),
    LParen,
    RParen,
}

/// Parses a textual query into an AST.
///
/// A blank query yields [`Expr::Empty`], which the extractor reports as
/// unsupported; malformed input is an `InvalidArgument` error.
pub fn parse_query(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Expr::Empty);
    }
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let expr = parser.parse_or()?;
    if parser.position != parser.tokens.len() {
        return Err(SieveError::InvalidArgument(format!(
            "unexpected trailing tokens in query at position {}",
            parser.position
        )));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ch if ch.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == '\\' {
                        // Keep the escape sequence verbatim for downstream
                        // wildcard handling.
                        text.push(ch);
                        if let Some(next) = chars.next() {
                            text.push(next);
                        }
                    } else if ch == '"' {
                        closed = true;
                        break;
                    } else {
                        text.push(ch);
                    }
                }
                if !closed {
                    return Err(SieveError::InvalidArgument(
                        "unterminated string literal in query".to_string(),
                    ));
                }
                tokens.push(Token::Quoted(text));
            }
            ':' => {
                chars.next();
                tokens.push(Token::Symbol(":"));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let symbol = match (c, chars.peek()) {
                    ('=', Some('=')) => {
                        chars.next();
                        "=="
                    }
                    ('!', Some('=')) => {
                        chars.next();
                        "!="
                    }
                    ('<', Some('=')) => {
                        chars.next();
                        "<="
                    }
                    ('>', Some('=')) => {
                        chars.next();
                        ">="
                    }
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => {
                        return Err(SieveError::InvalidArgument(format!(
                            "unexpected character '{c}' in query"
                        )))
                    }
                };
                tokens.push(Token::Symbol(symbol));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || "():=!<>\"".contains(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek_keyword(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(word)) => Some(word.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        let mut children = vec![first];
        while self.peek_keyword().as_deref() == Some("OR") {
            self.next();
            children.push(self.parse_and()?);
        }
        if children.len() == 1 {
            Ok(children.swap_remove(0))
        } else {
            Ok(Expr::Or {
                inverted: false,
                children,
            })
        }
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_unary()?;
        let mut children = vec![first];
        while self.peek_keyword().as_deref() == Some("AND") {
            self.next();
            children.push(self.parse_unary()?);
        }
        if children.len() == 1 {
            Ok(children.swap_remove(0))
        } else {
            Ok(Expr::And {
                inverted: false,
                children,
            })
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek_keyword().as_deref() == Some("NOT") {
            self.next();
            let mut operand = self.parse_unary()?;
            operand.invert();
            return Ok(operand);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(SieveError::InvalidArgument(
                        "missing closing parenthesis in query".to_string(),
                    )),
                }
            }
            Some(Token::Word(field)) => self.parse_comparison(field),
            other => Err(SieveError::InvalidArgument(format!(
                "expected a field or group in query, found {other:?}"
            ))),
        }
    }

    fn parse_comparison(&mut self, field: String) -> Result<Expr> {
        let operation = match self.next() {
            Some(Token::Symbol(":")) | Some(Token::Symbol("==")) => FilterOperation::Eq,
            Some(Token::Symbol("!=")) => FilterOperation::Neq,
            Some(Token::Symbol("<")) => FilterOperation::Lt,
            Some(Token::Symbol("<=")) => FilterOperation::Lte,
            Some(Token::Symbol(">")) => FilterOperation::Gt,
            Some(Token::Symbol(">=")) => FilterOperation::Gte,
            other => {
                return Err(SieveError::InvalidArgument(format!(
                    "expected a comparison operator after '{field}', found {other:?}"
                )))
            }
        };

        let (operand, kinds) = match self.next() {
            Some(Token::Quoted(text)) => (Literal::String(text), vec![LiteralKind::VarString]),
            Some(Token::Word(word)) => typed_literal(&word),
            other => {
                return Err(SieveError::InvalidArgument(format!(
                    "expected a value after '{field}', found {other:?}"
                )))
            }
        };

        Ok(Expr::Filter {
            inverted: false,
            column: ColumnDescriptor::new(field, kinds),
            operation,
            operand,
        })
    }
}

fn typed_literal(word: &str) -> (Literal, Vec<LiteralKind>) {
    if let Ok(value) = word.parse::<i64>() {
        return (Literal::Int(value), vec![LiteralKind::Int, LiteralKind::VarString]);
    }
    if let Ok(value) = word.parse::<f64>() {
        return (Literal::Float(value), vec![LiteralKind::Float]);
    }
    match word {
        "true" => (Literal::Bool(true), vec![LiteralKind::Bool]),
        "false" => (Literal::Bool(false), vec![LiteralKind::Bool]),
        _ => (
            Literal::String(word.to_string()),
            vec![LiteralKind::VarString],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_equality() {
        let expr = parse_query(r#"field == "value""#).unwrap();
        assert_eq!(expr, Expr::string_eq("field", "value"));
    }

    #[test]
    fn test_colon_is_equality() {
        let expr = parse_query(r#"field: "value""#).unwrap();
        assert_eq!(expr, Expr::string_eq("field", "value"));
    }

    #[test]
    fn test_conjunction() {
        let expr = parse_query(r#"a == "x" AND b == "y" AND c == "z""#).unwrap();
        let Expr::And { inverted, children } = expr else {
            panic!("expected And node");
        };
        assert!(!inverted);
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], Expr::string_eq("a", "x"));
    }

    #[test]
    fn test_disjunction_and_grouping() {
        let expr = parse_query(r#"a == "x" OR (b == "y" AND c == "z")"#).unwrap();
        let Expr::Or { children, .. } = expr else {
            panic!("expected Or node");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[1], Expr::And { .. }));
    }

    #[test]
    fn test_not_inverts() {
        let expr = parse_query(r#"NOT a == "x""#).unwrap();
        assert!(expr.is_inverted());

        let expr = parse_query(r#"NOT NOT a == "x""#).unwrap();
        assert!(!expr.is_inverted());
    }

    #[test]
    fn test_escapes_preserved() {
        let expr = parse_query(r#"a == "lit\*eral""#).unwrap();
        let Expr::Filter { operand, .. } = expr else {
            panic!("expected Filter node");
        };
        assert_eq!(operand, Literal::String(r"lit\*eral".to_string()));
    }

    #[test]
    fn test_bare_values() {
        let expr = parse_query("status == 500").unwrap();
        let Expr::Filter { operand, column, .. } = expr else {
            panic!("expected Filter node");
        };
        assert_eq!(operand, Literal::Int(500));
        assert!(column.matches_type(LiteralKind::Int));

        let expr = parse_query("msg == needle*").unwrap();
        let Expr::Filter { operand, .. } = expr else {
            panic!("expected Filter node");
        };
        assert_eq!(operand, Literal::String("needle*".to_string()));
    }

    #[test]
    fn test_inequalities() {
        for (query, operation) in [
            ("a != 1", FilterOperation::Neq),
            ("a < 1", FilterOperation::Lt),
            ("a <= 1", FilterOperation::Lte),
            ("a > 1", FilterOperation::Gt),
            ("a >= 1", FilterOperation::Gte),
        ] {
            let Expr::Filter { operation: parsed, .. } = parse_query(query).unwrap() else {
                panic!("expected Filter node for {query}");
            };
            assert_eq!(parsed, operation, "for query {query}");
        }
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(parse_query("").unwrap(), Expr::Empty);
        assert_eq!(parse_query("   ").unwrap(), Expr::Empty);
    }

    #[test]
    fn test_malformed_queries() {
        assert!(parse_query(r#"field =="#).is_err());
        assert!(parse_query(r#"(a == "x""#).is_err());
        assert!(parse_query(r#"a == "unterminated"#).is_err());
        assert!(parse_query(r#"a == "x" extra"#).is_err());
    }
}
