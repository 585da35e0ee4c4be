//! Lexical layer (spec §4.3): whitespace, `;` comments, delimiters, string
//! literals, and the generic "read until whitespace or a delimiter" token
//! rule every other token (integers, symbols, dot, `#`-forms) is built on.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::ReaderError;

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '\'' | ';' | '"' | '#')
}

/// A single lexical unit. `Sharp` is the raw text after `#`, still
/// unclassified — the reader resolves it against the small fixed set of
/// sharp forms spec §4.3/§6 names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open(char),
    Close(char),
    Quote,
    Dot,
    Str(String),
    Int(String),
    Symbol(String),
    /// Text immediately following a `#`, not yet classified.
    Sharp(SharpBody),
    Eof,
}

/// What follows a `#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharpBody {
    /// `#(` — a sharp-list opener.
    OpenParen,
    /// `#[` — a sharp-vector opener.
    OpenBracket,
    /// `#\<name>` — a character literal, name not yet resolved.
    Char(String),
    /// `#<ident>` for any other identifier (`t`, `f`, `unspec`, `@if`, …).
    Ident(String),
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable() }
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(';') => {
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    /// Read a generic token (everything up to whitespace or a delimiter).
    fn read_plain_token(&mut self, first: char) -> String {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if c.is_whitespace() || is_delimiter(c) {
                break;
            }
            s.push(c);
            self.bump();
        }
        s
    }

    fn read_string(&mut self) -> Result<String, ReaderError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(ReaderError::UnterminatedString),
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    None => return Err(ReaderError::UnterminatedString),
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some('x') => {
                        let mut hex = String::new();
                        while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                            hex.push(self.bump().unwrap());
                        }
                        if matches!(self.peek(), Some(';')) {
                            self.bump();
                        }
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or(ReaderError::InvalidEscape('x'))?;
                        s.push(code);
                    }
                    Some(other) => return Err(ReaderError::InvalidEscape(other)),
                },
                Some(c) => s.push(c),
            }
        }
    }

    /// Next significant token, skipping whitespace and comments first.
    pub fn next_token(&mut self) -> Result<Token, ReaderError> {
        self.skip_whitespace_and_comments();
        let Some(c) = self.bump() else {
            return Ok(Token::Eof);
        };
        match c {
            '(' | '[' | '{' => Ok(Token::Open(c)),
            ')' | ']' | '}' => Ok(Token::Close(c)),
            '\'' => Ok(Token::Quote),
            '"' => Ok(Token::Str(self.read_string()?)),
            '#' => self.read_sharp(),
            _ => {
                let text = self.read_plain_token(c);
                Ok(classify_plain_token(text))
            }
        }
    }

    fn read_sharp(&mut self) -> Result<Token, ReaderError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                Ok(Token::Sharp(SharpBody::OpenParen))
            }
            Some('[') => {
                self.bump();
                Ok(Token::Sharp(SharpBody::OpenBracket))
            }
            Some('\\') => {
                self.bump();
                match self.bump() {
                    None => Err(ReaderError::UnterminatedString),
                    Some(first) => {
                        let name = self.read_plain_token(first);
                        Ok(Token::Sharp(SharpBody::Char(name)))
                    }
                }
            }
            Some(first) => {
                self.bump();
                let ident = self.read_plain_token(first);
                Ok(Token::Sharp(SharpBody::Ident(ident)))
            }
            None => Err(ReaderError::UnterminatedString),
        }
    }
}

fn classify_plain_token(text: String) -> Token {
    if text == "." {
        return Token::Dot;
    }
    if is_decimal_integer(&text) {
        return Token::Int(text);
    }
    Token::Symbol(text)
}

fn is_decimal_integer(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    !body.is_empty() && body.chars().all(|c| c.is_ascii_digit())
}
