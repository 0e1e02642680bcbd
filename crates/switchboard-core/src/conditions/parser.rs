//! Recursive-descent parser for condition expressions.
//!
//! Precedence, lowest to highest: `OR`/`XOR`/`NAND`, then `AND`, then the
//! comparison/membership/regex operators, then unary minus, then primaries.
//! All binary levels associate left. `NOT IN` and `NOT CONTAINS` are parsed
//! as single binary operators.

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;

use crate::conditions::lexer::{tokenize, SpannedToken, Token};
use crate::conditions::value::ArrayValue;
use crate::errors::{Result, SwitchboardError};

/// Binary operators of the condition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Xor,
    Nand,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Contains,
    NotContains,
    Matches,
    NotMatches,
}

impl BinaryOp {
    /// Canonical source spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::Nand => "NAND",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::In => "IN",
            BinaryOp::NotIn => "NOT IN",
            BinaryOp::Contains => "CONTAINS",
            BinaryOp::NotContains => "NOT CONTAINS",
            BinaryOp::Matches => "=~",
            BinaryOp::NotMatches => "!~",
        }
    }
}

/// Unary operators of the condition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Numeric negation.
    Neg,
}

/// A parsed condition expression.
#[derive(Debug, Clone)]
pub enum Expr {
    BoolLit(bool),
    NumLit(f64),
    StrLit(String),
    /// Regex literal, compiled once at parse time.
    RegexLit(Regex),
    ArrayLit(ArrayValue),
    /// Variable reference by dotted name.
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Returns the set of variable names the expression reads.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Var(name) => {
                names.insert(name.clone());
            },
            Expr::Unary(_, operand) => operand.collect_variables(names),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            },
            _ => {},
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::BoolLit(a), Expr::BoolLit(b)) => a == b,
            (Expr::NumLit(a), Expr::NumLit(b)) => a == b,
            (Expr::StrLit(a), Expr::StrLit(b)) => a == b,
            (Expr::RegexLit(a), Expr::RegexLit(b)) => a.as_str() == b.as_str(),
            (Expr::ArrayLit(a), Expr::ArrayLit(b)) => a == b,
            (Expr::Var(a), Expr::Var(b)) => a == b,
            (Expr::Unary(op_a, a), Expr::Unary(op_b, b)) => op_a == op_b && a == b,
            (Expr::Binary(op_a, la, ra), Expr::Binary(op_b, lb, rb)) => {
                op_a == op_b && la == lb && ra == rb
            },
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BoolLit(b) => write!(f, "{}", b),
            Expr::NumLit(n) => write!(f, "{}", n),
            Expr::StrLit(s) => write!(f, "{:?}", s),
            Expr::RegexLit(re) => write!(f, "/{}/", re.as_str()),
            Expr::ArrayLit(items) => {
                write!(f, "{}", crate::conditions::value::Value::Array(items.clone()))
            },
            Expr::Var(name) => write!(f, "[{}]", name),
            Expr::Unary(UnaryOp::Neg, operand) => write!(f, "-{}", operand),
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.as_str(), rhs),
        }
    }
}

/// Parses a condition source string into an expression tree.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(SwitchboardError::parse(0, "empty expression"));
    }
    let end = input.len();
    let mut parser = Parser { tokens, at: 0, end };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(spanned) => Err(SwitchboardError::parse(
            spanned.position,
            format!("unexpected trailing {}", spanned.token.describe()),
        )),
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    at: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.at)
    }

    fn next(&mut self) -> Option<SpannedToken> {
        let spanned = self.tokens.get(self.at).cloned();
        if spanned.is_some() {
            self.at += 1;
        }
        spanned
    }

    fn position(&self) -> usize {
        self.peek().map(|spanned| spanned.position).unwrap_or(self.end)
    }

    fn expect(&mut self, expected: &Token, what: &'static str) -> Result<()> {
        match self.next() {
            Some(spanned) if &spanned.token == expected => Ok(()),
            Some(spanned) => Err(SwitchboardError::parse(
                spanned.position,
                format!("expected {}, found {}", what, spanned.token.describe()),
            )),
            None => Err(SwitchboardError::parse(self.end, format!("expected {}", what))),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = match self.peek().map(|spanned| &spanned.token) {
                Some(Token::Or) => BinaryOp::Or,
                Some(Token::Xor) => BinaryOp::Xor,
                Some(Token::Nand) => BinaryOp::Nand,
                _ => return Ok(lhs),
            };
            self.at += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_relational()?;
        while matches!(self.peek().map(|spanned| &spanned.token), Some(Token::And)) {
            self.at += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let lhs = self.parse_unary()?;
        let op = match self.peek().map(|spanned| &spanned.token) {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Neq) => BinaryOp::Neq,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Lte) => BinaryOp::Lte,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Gte) => BinaryOp::Gte,
            Some(Token::In) => BinaryOp::In,
            Some(Token::Contains) => BinaryOp::Contains,
            Some(Token::Matches) => BinaryOp::Matches,
            Some(Token::NotMatches) => BinaryOp::NotMatches,
            Some(Token::Not) => {
                let not_at = self.position();
                self.at += 1;
                match self.peek().map(|spanned| &spanned.token) {
                    Some(Token::In) => BinaryOp::NotIn,
                    Some(Token::Contains) => BinaryOp::NotContains,
                    _ => {
                        return Err(SwitchboardError::parse(
                            not_at,
                            "NOT must be followed by IN or CONTAINS",
                        ));
                    },
                }
            },
            _ => return Ok(lhs),
        };
        self.at += 1;
        let rhs = self.parse_unary()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if matches!(self.peek().map(|spanned| &spanned.token), Some(Token::Minus)) {
            let minus_at = self.position();
            self.at += 1;
            let operand = self.parse_primary()?;
            return match operand {
                Expr::NumLit(_) | Expr::Var(_) => {
                    Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
                },
                _ => Err(SwitchboardError::parse(
                    minus_at,
                    "minus applies to numbers only",
                )),
            };
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let spanned = match self.next() {
            Some(spanned) => spanned,
            None => {
                return Err(SwitchboardError::parse(self.end, "unexpected end of expression"));
            },
        };
        match spanned.token {
            Token::True => Ok(Expr::BoolLit(true)),
            Token::False => Ok(Expr::BoolLit(false)),
            Token::Number(n) => Ok(Expr::NumLit(n)),
            Token::Str(s) => Ok(Expr::StrLit(s)),
            Token::Var(name) => Ok(Expr::Var(name)),
            Token::Regex(pattern) => match Regex::new(&pattern) {
                Ok(re) => Ok(Expr::RegexLit(re)),
                Err(err) => Err(SwitchboardError::parse(
                    spanned.position,
                    format!("invalid regex /{}/: {}", pattern, err),
                )),
            },
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen, ")")?;
                Ok(inner)
            },
            Token::LBracket => self.parse_array(spanned.position),
            other => Err(SwitchboardError::parse(
                spanned.position,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    /// Parses an array literal after its opening bracket. Elements must be
    /// scalar literals of a single type; empty arrays are rejected.
    fn parse_array(&mut self, open_at: usize) -> Result<Expr> {
        let mut bools = Vec::new();
        let mut numbers = Vec::new();
        let mut strings = Vec::new();
        loop {
            let spanned = match self.next() {
                Some(spanned) => spanned,
                None => {
                    return Err(SwitchboardError::parse(open_at, "unterminated array literal"));
                },
            };
            match spanned.token {
                Token::True => bools.push(true),
                Token::False => bools.push(false),
                Token::Number(n) => numbers.push(n),
                Token::Minus => match self.next() {
                    Some(SpannedToken {
                        token: Token::Number(n),
                        ..
                    }) => numbers.push(-n),
                    _ => {
                        return Err(SwitchboardError::parse(
                            spanned.position,
                            "minus applies to numbers only",
                        ));
                    },
                },
                Token::Str(s) => strings.push(s),
                other => {
                    return Err(SwitchboardError::parse(
                        spanned.position,
                        format!("expected literal in array, found {}", other.describe()),
                    ));
                },
            }
            match self.next() {
                Some(SpannedToken {
                    token: Token::Comma, ..
                }) => continue,
                Some(SpannedToken {
                    token: Token::RBracket,
                    ..
                }) => break,
                Some(spanned) => {
                    return Err(SwitchboardError::parse(
                        spanned.position,
                        format!("expected , or ], found {}", spanned.token.describe()),
                    ));
                },
                None => {
                    return Err(SwitchboardError::parse(open_at, "unterminated array literal"));
                },
            }
        }

        let populated =
            usize::from(!bools.is_empty()) + usize::from(!numbers.is_empty()) + usize::from(!strings.is_empty());
        match populated {
            0 => Err(SwitchboardError::parse(open_at, "empty array literal")),
            1 if !bools.is_empty() => Ok(Expr::ArrayLit(ArrayValue::Bool(bools))),
            1 if !numbers.is_empty() => Ok(Expr::ArrayLit(ArrayValue::Number(numbers))),
            1 => Ok(Expr::ArrayLit(ArrayValue::String(strings))),
            _ => Err(SwitchboardError::parse(
                open_at,
                "array literal elements must share one type",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_over_or() {
        // a OR b AND c parses as a OR (b AND c)
        let expr = parse("true OR false AND false").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Or,
                Box::new(Expr::BoolLit(true)),
                Box::new(Expr::Binary(
                    BinaryOp::And,
                    Box::new(Expr::BoolLit(false)),
                    Box::new(Expr::BoolLit(false)),
                )),
            )
        );
    }

    #[test]
    fn test_comparison_binds_tighter_than_and() {
        let expr = parse(r#"[foo] > 10 AND [bar] == "OFF""#).unwrap();
        match expr {
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                assert_eq!(
                    *lhs,
                    Expr::Binary(
                        BinaryOp::Gt,
                        Box::new(Expr::Var("foo".into())),
                        Box::new(Expr::NumLit(10.0)),
                    )
                );
                assert_eq!(
                    *rhs,
                    Expr::Binary(
                        BinaryOp::Eq,
                        Box::new(Expr::Var("bar".into())),
                        Box::new(Expr::StrLit("OFF".into())),
                    )
                );
            },
            other => panic!("expected AND at the root, got {}", other),
        }
    }

    #[test]
    fn test_not_in_is_one_operator() {
        let expr = parse("[foo] not in [2,3,4]").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::NotIn,
                Box::new(Expr::Var("foo".into())),
                Box::new(Expr::ArrayLit(ArrayValue::Number(vec![2.0, 3.0, 4.0]))),
            )
        );
    }

    #[test]
    fn test_negative_number_folds_to_unary() {
        let expr = parse("[v] > -100").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Gt,
                Box::new(Expr::Var("v".into())),
                Box::new(Expr::Unary(UnaryOp::Neg, Box::new(Expr::NumLit(100.0)))),
            )
        );
    }

    #[test]
    fn test_bare_literals_parse() {
        // Bare literals are grammatically valid; the evaluator rejects
        // non-boolean top-level values.
        assert!(parse("56.43").is_ok());
        assert!(parse("\"OFF\"").is_ok());
        assert!(parse("true").is_ok());
    }

    #[test]
    fn test_invalid_inputs() {
        for source in [
            "",
            "A",
            "[var0] == DEMO",
            "[var0] == 'DEMO'",
            "![var0]",
            "[var0] <> `DEMO`",
            "([foo] == 1",
            "[foo] not 1",
            "[foo] in []",
            "[foo] in [1, \"two\"]",
            "[foo] ==",
            "true OR",
            "[foo] == 1 2",
        ] {
            assert!(parse(source).is_err(), "expected parse failure: {:?}", source);
        }
    }

    #[test]
    fn test_regex_compiled_at_parse_time() {
        let expr = parse(r"[status] =~ /^5\d\d/").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Matches, _, rhs) => match *rhs {
                Expr::RegexLit(re) => assert!(re.is_match("503")),
                other => panic!("expected regex literal, got {}", other),
            },
            other => panic!("expected =~ at the root, got {}", other),
        }
        assert!(parse("[x] =~ /(unclosed/").is_err());
    }

    #[test]
    fn test_variables_collects_dotted_names() {
        let expr = parse("[@foo][a] == true and [bar] == true or [var9] > 10").unwrap();
        let names = expr.variables();
        assert!(names.contains("@foo.a"));
        assert!(names.contains("bar"));
        assert!(names.contains("var9"));
        assert!(!names.contains("foo"));
        assert!(!names.contains("@foo"));
    }

    #[test]
    fn test_display_roundtrips_structure() {
        let expr = parse("([a] > 1) AND [b] in [1,2]").unwrap();
        assert_eq!(expr.to_string(), "(([a] > 1) AND ([b] IN [1, 2]))");
    }
}
