//! Tokenizer for the Scheme source text
//!
//! Tokens are produced lazily: `peek_token` scans the next token at the
//! current position without consuming it, and `bump` consumes a previously
//! scanned token. Patterns are tried in a fixed priority order because the
//! builtin names are prefixes of legal identifiers: parens, integer,
//! character literal, boolean literal, the keyword table (longest first
//! within each family, so `string-append` wins over `string`), and finally
//! the identifier rule.
//!
//! Two positions cannot be disambiguated by the general tokenizer, so the
//! parser requests them explicitly: `identifier` for `let` binding names and
//! `lambda` formals (which may collide with keyword spellings), and
//! `quoted_string` for the literal inside `(string ...)`.

use crate::error::CompileError;

/// Token vocabulary. One kind per builtin keyword, plus the literal classes
/// and the two parser-requested kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    Int,
    Char,
    Bool,
    Add1,
    Sub1,
    IntToChar,
    CharToInt,
    IsNull,
    IsZero,
    Not,
    IsInt,
    IsBool,
    Plus,
    Minus,
    Times,
    Leq,
    Geq,
    Lt,
    Gt,
    Eq,
    Let,
    If,
    Cons,
    Car,
    Cdr,
    StrRef,
    StrSet,
    StrApp,
    Str,
    VecRef,
    VecSet,
    VecApp,
    Vec,
    Begin,
    Lambda,
    Ident,
    StringLit,
    Eof,
}

/// A token with its matched text and 0-indexed source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

/// Keyword table in match priority order. Longer spellings precede their
/// prefixes (`integer->char` before `integer?` would also work the other way
/// around, but `string-*` before `string` and `<=` before `<` are load
/// bearing).
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("add1", TokenKind::Add1),
    ("sub1", TokenKind::Sub1),
    ("integer->char", TokenKind::IntToChar),
    ("char->integer", TokenKind::CharToInt),
    ("null?", TokenKind::IsNull),
    ("zero?", TokenKind::IsZero),
    ("not", TokenKind::Not),
    ("integer?", TokenKind::IsInt),
    ("boolean?", TokenKind::IsBool),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Times),
    ("<=", TokenKind::Leq),
    (">=", TokenKind::Geq),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("=", TokenKind::Eq),
    ("let", TokenKind::Let),
    ("if", TokenKind::If),
    ("cons", TokenKind::Cons),
    ("car", TokenKind::Car),
    ("cdr", TokenKind::Cdr),
    ("string-ref", TokenKind::StrRef),
    ("string-set!", TokenKind::StrSet),
    ("string-append", TokenKind::StrApp),
    ("string", TokenKind::Str),
    ("vector-ref", TokenKind::VecRef),
    ("vector-set!", TokenKind::VecSet),
    ("vector-append", TokenKind::VecApp),
    ("vector", TokenKind::Vec),
    ("begin", TokenKind::Begin),
    ("lambda", TokenKind::Lambda),
];

const WSP: [char; 4] = [' ', '\t', '\n', '\r'];

fn is_ident_start(c: char) -> bool {
    !WSP.contains(&c) && c != '(' && c != ')' && !('1'..='9').contains(&c) && c != '#' && c != '`'
}

fn is_ident_continue(c: char) -> bool {
    !WSP.contains(&c) && c != '(' && c != ')' && c != '`'
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            pos: 0,
            line: 0,
            column: 0,
        }
    }

    /// Scan the next token without consuming it. Leading whitespace is
    /// consumed permanently (it is never significant), so repeated calls at
    /// the same position are cheap and idempotent.
    pub fn peek_token(&mut self) -> Result<Token, CompileError> {
        self.skip_whitespace();
        let (line, column) = (self.line, self.column);
        let rest = &self.source[self.pos..];
        let mut chars = rest.chars();

        let Some(first) = chars.next() else {
            return Ok(self.token(TokenKind::Eof, String::new()));
        };

        if first == '(' {
            return Ok(self.token(TokenKind::OpenParen, "(".to_string()));
        }
        if first == ')' {
            return Ok(self.token(TokenKind::CloseParen, ")".to_string()));
        }

        if first.is_ascii_digit() {
            let text: String = rest.chars().take_while(char::is_ascii_digit).collect();
            return Ok(self.token(TokenKind::Int, text));
        }

        if first == '#' {
            match chars.next() {
                // `#\X` for any single X except backtick.
                Some('\\') => {
                    if let Some(c) = chars.next()
                        && c != '`'
                    {
                        let mut text = String::from("#\\");
                        text.push(c);
                        return Ok(self.token(TokenKind::Char, text));
                    }
                }
                Some(c @ ('t' | 'T' | 'f' | 'F')) => {
                    let mut text = String::from("#");
                    text.push(c);
                    return Ok(self.token(TokenKind::Bool, text));
                }
                _ => {}
            }
            return Err(CompileError::Lex {
                message: "unrecognized token".to_string(),
                line,
                column,
            });
        }

        for &(keyword, kind) in KEYWORDS {
            if rest.starts_with(keyword) {
                return Ok(self.token(kind, keyword.to_string()));
            }
        }

        if is_ident_start(first) {
            let mut text = String::new();
            text.push(first);
            text.extend(chars.take_while(|&c| is_ident_continue(c)));
            return Ok(self.token(TokenKind::Ident, text));
        }

        Err(CompileError::Lex {
            message: "unrecognized token".to_string(),
            line,
            column,
        })
    }

    /// Scan an identifier at the current position, ignoring the keyword
    /// table. Binding names and lambda formals go through here so that a
    /// name like `letter` is one identifier rather than `let` + `ter`.
    pub fn identifier(&mut self) -> Result<Token, CompileError> {
        self.skip_whitespace();
        let (line, column) = (self.line, self.column);
        let rest = &self.source[self.pos..];
        let mut chars = rest.chars();

        let Some(first) = chars.next() else {
            return Err(CompileError::Lex {
                message: "unexpected end of input".to_string(),
                line,
                column,
            });
        };
        if !is_ident_start(first) {
            return Err(CompileError::Lex {
                message: format!("illegal identifier starting with '{}'", first),
                line,
                column,
            });
        }

        let mut text = String::new();
        text.push(first);
        text.extend(chars.take_while(|&c| is_ident_continue(c)));
        Ok(self.token(TokenKind::Ident, text))
    }

    /// Scan a quoted string literal, newlines permitted. The returned text
    /// includes both quotes so the caller strips them. A missing closing
    /// quote is an unterminated-string error.
    pub fn quoted_string(&mut self) -> Result<Token, CompileError> {
        self.skip_whitespace();
        let (line, column) = (self.line, self.column);
        let rest = &self.source[self.pos..];

        if !rest.starts_with('"') {
            return Err(CompileError::Lex {
                message: "string literal not found".to_string(),
                line,
                column,
            });
        }
        match rest[1..].find('"') {
            Some(end) => Ok(self.token(TokenKind::StringLit, rest[..end + 2].to_string())),
            None => Err(CompileError::Lex {
                message: "unterminated string literal".to_string(),
                line,
                column,
            }),
        }
    }

    /// Consume a token previously returned by one of the scan methods.
    pub fn bump(&mut self, token: &Token) {
        self.pos += token.text.len();
        for c in token.text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    fn token(&self, kind: TokenKind, text: String) -> Token {
        Token {
            kind,
            text,
            line: self.line,
            column: self.column,
        }
    }

    fn skip_whitespace(&mut self) {
        let mut chars = self.source[self.pos..].chars();
        while let Some(c) = chars.next() {
            if !WSP.contains(&c) {
                break;
            }
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }
}
