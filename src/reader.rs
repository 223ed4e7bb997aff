//! The reader starts where the lexer dropped off and handles nesting, producing
//! the untyped [`Raw`] trees that [`crate::ast::Registry::convert`] consumes.
use core::fmt;

use logos::Logos as _;

use crate::{
    lexer::{LexerError, Span, Token},
    Literal,
};

/// An untyped tree: scalars and lists. A list headed by a symbol is tagged.
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    Scalar(Literal),
    List(Vec<Raw>),
}

impl Raw {
    /// The node kind this tree is tagged with, if any
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::List(items) => match items.first() {
                Some(Self::Scalar(Literal::Symbol(tag))) => Some(tag.as_ref()),
                _ => None,
            },
            Self::Scalar(_) => None,
        }
    }

    pub fn tagged(tag: &str, items: impl IntoIterator<Item = Raw>) -> Self {
        let mut list = vec![Self::Scalar(Literal::Symbol(Box::from(tag)))];
        list.extend(items);
        Self::List(list)
    }
}

impl From<Literal> for Raw {
    fn from(value: Literal) -> Self {
        Self::Scalar(value)
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(literal) => write!(f, "{literal}"),
            Self::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum ReadError {
    #[error("{error}")]
    Lexer { error: LexerError, span: Span },
    #[error("unexpected `)`")]
    UnexpectedClose(Span),
    #[error("list is never closed")]
    Unclosed(Span),
}

impl ReadError {
    pub fn span(&self) -> Span {
        match self {
            Self::Lexer { span, .. } | Self::UnexpectedClose(span) | Self::Unclosed(span) => {
                span.clone()
            }
        }
    }
}

/// Reads every top-level datum of `source`.
pub fn read(source: &str) -> Result<Vec<Raw>, ReadError> {
    let mut top = vec![];
    // (where the list opened, its items so far)
    let mut open: Vec<(Span, Vec<Raw>)> = vec![];

    for (token, span) in Token::lexer(source).spanned() {
        let token = token.map_err(|error| ReadError::Lexer {
            error,
            span: span.clone(),
        })?;
        let datum = match token {
            Token::IntralineWhitespace | Token::LineEnding | Token::Comment => continue,
            Token::LParen => {
                open.push((span, vec![]));
                continue;
            }
            Token::RParen => {
                let Some((_, items)) = open.pop() else {
                    return Err(ReadError::UnexpectedClose(span));
                };
                Raw::List(items)
            }
            Token::Nil => Raw::Scalar(Literal::Nil),
            Token::Boolean(b) => Raw::Scalar(Literal::Bool(b)),
            Token::Integer(int) => Raw::Scalar(Literal::Int(int)),
            Token::Float(float) => Raw::Scalar(Literal::Float(float)),
            Token::String(s) => Raw::Scalar(Literal::String(s)),
            Token::Identifier(sym) => Raw::Scalar(Literal::Symbol(sym)),
        };
        match open.last_mut() {
            Some((_, items)) => items.push(datum),
            None => top.push(datum),
        }
    }

    if let Some((span, _)) = open.pop() {
        return Err(ReadError::Unclosed(span));
    }
    Ok(top)
}
