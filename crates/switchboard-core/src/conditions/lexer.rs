//! Tokenizer for condition expressions.
//!
//! Attribute references are always bracketed (`[tier]`, `[foo][dfs][a]`),
//! which keeps the grammar unambiguous against the keyword vocabulary.
//! A `[` therefore starts either a variable reference or an array literal;
//! the lexer decides by looking at the bracketed content.

use crate::errors::{Result, SwitchboardError};

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Variable reference, chained segments joined with dots (`foo.dfs.a`).
    Var(String),
    /// Decimal numeric literal (sign is handled by the parser).
    Number(f64),
    /// Double-quoted string literal, unescaped.
    Str(String),
    /// Regex literal body between `/` delimiters, not yet compiled.
    Regex(String),
    True,
    False,
    And,
    Or,
    Xor,
    Nand,
    In,
    Not,
    Contains,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Matches,
    NotMatches,
    Minus,
    LBracket,
    RBracket,
    Comma,
    LParen,
    RParen,
}

impl Token {
    /// Human-readable token description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Var(name) => format!("variable [{}]", name),
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string {:?}", s),
            Token::Regex(r) => format!("regex /{}/", r),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Xor => "XOR".into(),
            Token::Nand => "NAND".into(),
            Token::In => "IN".into(),
            Token::Not => "NOT".into(),
            Token::Contains => "CONTAINS".into(),
            Token::Eq => "==".into(),
            Token::Neq => "!=".into(),
            Token::Lt => "<".into(),
            Token::Lte => "<=".into(),
            Token::Gt => ">".into(),
            Token::Gte => ">=".into(),
            Token::Matches => "=~".into(),
            Token::NotMatches => "!~".into(),
            Token::Minus => "-".into(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

/// A token together with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: usize,
}

/// Tokenizes a full condition source string.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    offset: usize,
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'@'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'_' | b'@' | b'.' | b'-')
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            offset: 0,
        }
    }

    fn run(mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.offset += 1;
                continue;
            }
            let position = self.offset;
            let token = match c {
                b'(' => {
                    self.offset += 1;
                    Token::LParen
                },
                b')' => {
                    self.offset += 1;
                    Token::RParen
                },
                b',' => {
                    self.offset += 1;
                    Token::Comma
                },
                b']' => {
                    self.offset += 1;
                    Token::RBracket
                },
                b'-' => {
                    self.offset += 1;
                    Token::Minus
                },
                b'=' => self.lex_eq()?,
                b'!' => self.lex_bang()?,
                b'<' => {
                    self.offset += 1;
                    if self.peek() == Some(b'=') {
                        self.offset += 1;
                        Token::Lte
                    } else {
                        Token::Lt
                    }
                },
                b'>' => {
                    self.offset += 1;
                    if self.peek() == Some(b'=') {
                        self.offset += 1;
                        Token::Gte
                    } else {
                        Token::Gt
                    }
                },
                b'"' => self.lex_string()?,
                b'/' => self.lex_regex()?,
                b'[' => {
                    // Variable reference or array literal start.
                    match self.lex_bracket()? {
                        Some(var) => var,
                        None => Token::LBracket,
                    }
                },
                c if c.is_ascii_digit() => self.lex_number()?,
                c if is_ident_start(c) => self.lex_keyword()?,
                other => {
                    return Err(SwitchboardError::lex(
                        position,
                        format!("unexpected character {:?}", other as char),
                    ));
                },
            };
            tokens.push(SpannedToken { token, position });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    fn lex_eq(&mut self) -> Result<Token> {
        let position = self.offset;
        self.offset += 1;
        match self.peek() {
            Some(b'=') => {
                self.offset += 1;
                Ok(Token::Eq)
            },
            Some(b'~') => {
                self.offset += 1;
                Ok(Token::Matches)
            },
            _ => Err(SwitchboardError::lex(position, "expected == or =~")),
        }
    }

    fn lex_bang(&mut self) -> Result<Token> {
        let position = self.offset;
        self.offset += 1;
        match self.peek() {
            Some(b'=') => {
                self.offset += 1;
                Ok(Token::Neq)
            },
            Some(b'~') => {
                self.offset += 1;
                Ok(Token::NotMatches)
            },
            _ => Err(SwitchboardError::lex(position, "expected != or !~")),
        }
    }

    fn lex_string(&mut self) -> Result<Token> {
        let start = self.offset;
        self.offset += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SwitchboardError::lex(start, "unterminated string literal"));
                },
                Some(b'"') => {
                    self.offset += 1;
                    return Ok(Token::Str(out));
                },
                Some(b'\\') => {
                    self.offset += 1;
                    match self.peek() {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(other) => {
                            out.push('\\');
                            out.push(other as char);
                        },
                        None => {
                            return Err(SwitchboardError::lex(
                                start,
                                "unterminated string literal",
                            ));
                        },
                    }
                    self.offset += 1;
                },
                Some(_) => {
                    // Advance over one UTF-8 scalar, not one byte.
                    let rest = &self.input[self.offset..];
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    out.push(ch);
                    self.offset += ch.len_utf8();
                },
            }
        }
    }

    fn lex_regex(&mut self) -> Result<Token> {
        let start = self.offset;
        self.offset += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SwitchboardError::lex(start, "unterminated regex literal"));
                },
                Some(b'/') => {
                    self.offset += 1;
                    return Ok(Token::Regex(out));
                },
                Some(b'\\') => {
                    // `\/` unescapes to a literal slash; every other escape is
                    // preserved for the regex engine (`\d`, `\w`, ...).
                    match self.peek_at(self.offset + 1) {
                        Some(b'/') => {
                            out.push('/');
                            self.offset += 2;
                        },
                        _ => {
                            out.push('\\');
                            self.offset += 1;
                        },
                    }
                },
                Some(_) => {
                    let rest = &self.input[self.offset..];
                    let ch = rest.chars().next().unwrap_or('\u{fffd}');
                    out.push(ch);
                    self.offset += ch.len_utf8();
                },
            }
        }
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.offset;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'.') {
            self.offset += 1;
        }
        let text = &self.input[start..self.offset];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| SwitchboardError::lex(start, format!("invalid number {:?}", text)))
    }

    /// Lexes a bare keyword. Unbracketed identifiers that are not part of the
    /// keyword vocabulary are rejected; attribute names must be bracketed.
    fn lex_keyword(&mut self) -> Result<Token> {
        let start = self.offset;
        while matches!(self.peek(), Some(c) if is_ident_char(c)) {
            self.offset += 1;
        }
        let text = &self.input[start..self.offset];
        match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Token::True),
            "false" => Ok(Token::False),
            "and" => Ok(Token::And),
            "or" => Ok(Token::Or),
            "xor" => Ok(Token::Xor),
            "nand" => Ok(Token::Nand),
            "in" => Ok(Token::In),
            "not" => Ok(Token::Not),
            "contains" => Ok(Token::Contains),
            _ => Err(SwitchboardError::lex(
                start,
                format!("bare identifier {:?}; attribute names must be bracketed", text),
            )),
        }
    }

    /// Disambiguates `[`. Returns `Some(Token::Var)` for a (possibly chained)
    /// variable reference, or `None` when the bracket opens an array literal.
    fn lex_bracket(&mut self) -> Result<Option<Token>> {
        match self.scan_var_segment(self.offset) {
            Some((first, mut end)) => {
                let mut name = first;
                // Chained segments bind only when the next `[` is adjacent.
                while self.peek_at(end) == Some(b'[') {
                    match self.scan_var_segment(end) {
                        Some((segment, next_end)) => {
                            name.push('.');
                            name.push_str(&segment);
                            end = next_end;
                        },
                        None => {
                            return Err(SwitchboardError::lex(
                                end,
                                "expected attribute segment after [",
                            ));
                        },
                    }
                }
                self.offset = end;
                Ok(Some(Token::Var(name)))
            },
            None => {
                self.offset += 1;
                Ok(None)
            },
        }
    }

    /// Attempts to read one `[name]` segment starting at `from` (which must
    /// point at `[`). Returns the segment text and the offset one past `]`.
    /// `[true]` / `[false]` are not variables; they open bool array literals.
    fn scan_var_segment(&self, from: usize) -> Option<(String, usize)> {
        let mut at = from + 1;
        match self.peek_at(at) {
            Some(c) if is_ident_start(c) => {},
            _ => return None,
        }
        while matches!(self.peek_at(at), Some(c) if is_ident_char(c)) {
            at += 1;
        }
        if self.peek_at(at) != Some(b']') {
            return None;
        }
        let text = &self.input[from + 1..at];
        if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
            return None;
        }
        Some((text.to_string(), at + 1))
    }
}
