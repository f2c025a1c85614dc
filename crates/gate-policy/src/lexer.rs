//! Tokenizer for the policy language

use crate::error::{PolicyError, PolicyResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),

    // Keywords
    Package,
    Default,
    Deny,
    If,
    Not,
    And,
    Or,
    True,
    False,
    Null,

    // Symbols
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier `{}`", s),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::Int(i) => write!(f, "number {}", i),
            TokenKind::Float(x) => write!(f, "number {}", x),
            TokenKind::Package => f.write_str("`package`"),
            TokenKind::Default => f.write_str("`default`"),
            TokenKind::Deny => f.write_str("`deny`"),
            TokenKind::If => f.write_str("`if`"),
            TokenKind::Not => f.write_str("`not`"),
            TokenKind::And => f.write_str("`and`"),
            TokenKind::Or => f.write_str("`or`"),
            TokenKind::True => f.write_str("`true`"),
            TokenKind::False => f.write_str("`false`"),
            TokenKind::Null => f.write_str("`null`"),
            TokenKind::Dot => f.write_str("`.`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::Colon => f.write_str("`:`"),
            TokenKind::LParen => f.write_str("`(`"),
            TokenKind::RParen => f.write_str("`)`"),
            TokenKind::LBracket => f.write_str("`[`"),
            TokenKind::RBracket => f.write_str("`]`"),
            TokenKind::LBrace => f.write_str("`{`"),
            TokenKind::RBrace => f.write_str("`}`"),
            TokenKind::Assign => f.write_str("`=`"),
            TokenKind::Eq => f.write_str("`==`"),
            TokenKind::Ne => f.write_str("`!=`"),
            TokenKind::Lt => f.write_str("`<`"),
            TokenKind::Le => f.write_str("`<=`"),
            TokenKind::Gt => f.write_str("`>`"),
            TokenKind::Ge => f.write_str("`>=`"),
            TokenKind::Plus => f.write_str("`+`"),
            TokenKind::Minus => f.write_str("`-`"),
            TokenKind::Star => f.write_str("`*`"),
            TokenKind::Slash => f.write_str("`/`"),
        }
    }
}

/// A token and the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(input: &str) -> PolicyResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(ch) = chars.peek().copied() {
        if ch == '\n' {
            line += 1;
            chars.next();
            continue;
        }

        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '#' {
            while let Some(c) = chars.peek().copied() {
                if c == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }

        if ch == '"' {
            chars.next();
            let start_line = line;
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(escaped @ ('"' | '\\')) => value.push(escaped),
                        Some(other) => {
                            return Err(lex_error(line, format!("unknown escape `\\{}`", other)))
                        }
                        None => break,
                    },
                    '\n' => {
                        return Err(lex_error(start_line, "unterminated string literal"));
                    }
                    _ => value.push(c),
                }
            }
            if !closed {
                return Err(lex_error(start_line, "unterminated string literal"));
            }
            tokens.push(Token {
                kind: TokenKind::Str(value),
                line: start_line,
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let mut text = String::new();
            let mut is_float = false;
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_digit() || c == '_' {
                    if c != '_' {
                        text.push(c);
                    }
                    chars.next();
                } else if c == '.' && !is_float {
                    is_float = true;
                    text.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let kind = if is_float {
                text.parse::<f64>()
                    .map(TokenKind::Float)
                    .map_err(|_| lex_error(line, format!("invalid number `{}`", text)))?
            } else {
                text.parse::<i64>()
                    .map(TokenKind::Int)
                    .map_err(|_| lex_error(line, format!("integer out of range `{}`", text)))?
            };
            tokens.push(Token { kind, line });
            continue;
        }

        if is_ident_start(ch) {
            let mut value = String::new();
            while let Some(c) = chars.peek().copied() {
                if is_ident_char(c) {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: keyword(&value).unwrap_or(TokenKind::Ident(value)),
                line,
            });
            continue;
        }

        chars.next();
        let kind = match ch {
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Ne
                } else {
                    return Err(lex_error(line, "unexpected character `!`"));
                }
            }
            '<' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if chars.next_if_eq(&'=').is_some() {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                return Err(lex_error(line, format!("unexpected character `{}`", other)));
            }
        };
        tokens.push(Token { kind, line });
    }

    Ok(tokens)
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "package" => TokenKind::Package,
        "default" => TokenKind::Default,
        "deny" => TokenKind::Deny,
        "if" => TokenKind::If,
        "not" => TokenKind::Not,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    };
    Some(kind)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn lex_error(line: usize, message: impl Into<String>) -> PolicyError {
    PolicyError::Lex {
        line,
        message: message.into(),
    }
}
