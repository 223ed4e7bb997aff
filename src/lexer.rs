//! Tokens of the raw tree notation.
//!
//! A raw tree is written as an s-expression, e.g.
//!
//! ```text
//! (Module 1 nil (Stmt 1 ((Discard 1 (Const 1 42)))))
//! ```
use std::iter::Peekable;

pub use logos::{Logos, Span};
use logos::Lexer;

// reads hex escapes in the form `x[0-9a-fA-F]+;` and outputs the corresponding character
fn read_hex_escape(iter: &mut Peekable<impl Iterator<Item = char>>) -> Result<char, LexerError> {
    // consume the x
    let _ = iter.next();

    let mut char_code = 0u32;
    while let Some(c) = iter.peek().copied() {
        match c {
            ';' => break,
            c if c.is_ascii_hexdigit() => {
                let digit = c.to_digit(16).ok_or(LexerError::MalformedString)?;
                char_code = char_code
                    .checked_mul(16)
                    .and_then(|code| code.checked_add(digit))
                    .ok_or(LexerError::CharacterTooBig)?;
                _ = iter.next();
            }
            _ => return Err(LexerError::MalformedString),
        }
    }
    if iter.next() != Some(';') {
        return Err(LexerError::MalformedString);
    }
    char::from_u32(char_code).ok_or(LexerError::InvalidCodepoint(char_code))
}

fn process_string(lexer: &mut Lexer<Token>) -> Result<Box<str>, LexerError> {
    let mut string = String::new();

    // Skip the opening quote
    let mut chars = lexer.slice().chars().skip(1).peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                let escaped = match chars.peek() {
                    Some('a') => '\x07',
                    Some('b') => '\x08',
                    Some('t') => '\t',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('x' | 'X') => {
                        string.push(read_hex_escape(&mut chars)?);
                        continue;
                    }
                    _ => return Err(LexerError::MalformedString),
                };
                string.push(escaped);
                _ = chars.next(); // consume
            }
            c => string.push(c),
        }
    }

    Ok(Box::from(string.as_str()))
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("character literal too big")]
    CharacterTooBig,
    #[error("invalid Unicode codepoint: {0}")]
    InvalidCodepoint(u32),
    #[error("malformed string")]
    MalformedString,
    #[error("malformed number")]
    MalformedNumber,
    #[error("number does not fit in 64 bits")]
    NumberTooBig,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexerError)]
pub enum Token {
    #[regex("[ \t]+")]
    IntralineWhitespace,
    #[token("\n")]
    #[token("\r\n")]
    #[token("\r")]
    LineEnding,
    #[regex(r";[^\n]*")]
    Comment,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("nil")]
    Nil,
    #[regex(r#"[a-zA-Z!$%&*/:<=>?^_~][0-9a-zA-Z!$%&*/:<=>?^_~+\-.@]*"#, |l| Box::from(l.slice()))]
    #[token("+", |l| Box::from(l.slice()))]
    #[token("-", |l| Box::from(l.slice()))]
    Identifier(Box<str>),
    #[regex("(?i)#t(rue)?", |_| true)]
    #[regex("(?i)#f(alse)?", |_| false)]
    Boolean(bool),
    #[regex(r"-?[0-9]+", |l| l.slice().parse::<i64>().map_err(|_| LexerError::NumberTooBig))]
    Integer(i64),
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |l| l.slice().parse::<f64>().map_err(|_| LexerError::MalformedNumber))]
    Float(f64),
    #[regex(r#""([^\\"]|\\[abntr"\\xX])*""#, process_string)]
    String(Box<str>),
}

impl Token {
    /// Whitespace and comments carry no meaning for the reader.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Self::IntralineWhitespace | Self::LineEnding | Self::Comment
        )
    }
}
