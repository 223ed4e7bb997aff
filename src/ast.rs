//! Typed nodes, built from [`Raw`](crate::reader::Raw) trees by a [`Registry`].
//!
//! Every node carries its source line and the attributes its kind declares, in
//! declaration order. What a node compiles to is decided by its kind's
//! [`Emission`]; kinds nobody wrote an emission for fail loudly when compiled.
use std::sync::Arc;

use crate::{compiler::CompileError, Literal};

mod kinds;
mod registry;

pub use registry::{ConvertError, Registry};

/// How a node kind is lowered into bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emission {
    Module,
    Stmt,
    Discard,
    Const,
    List,
    Tuple,
    Dict,
    Printnl,
    Function,
    CallFunc,
    Name,
    Assign,
    Import,
    /// Reaching this during compilation is an error
    Unimplemented,
}

/// A registered node kind: its name, its attribute names and its emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
    name: Box<str>,
    attributes: Box<[Box<str>]>,
    emission: Emission,
}

impl KindDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared attributes, not counting the implicit `line`
    pub fn attributes(&self) -> impl ExactSizeIterator<Item = &str> {
        self.attributes.iter().map(AsRef::as_ref)
    }

    pub fn emission(&self) -> Emission {
        self.emission
    }

    fn position(&self, attribute: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.as_ref() == attribute)
    }
}

/// The value of one attribute of a node
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    Value(Literal),
    Node(Node),
    Seq(Box<[Attr]>),
}

impl Attr {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Value(Literal::Nil))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Attr]> {
        match self {
            Self::Seq(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Value(literal) => Some(literal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: Arc<KindDescriptor>,
    line: usize,
    attributes: Box<[Attr]>,
}

impl Node {
    pub fn kind(&self) -> &KindDescriptor {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Attributes paired with their declared names
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attr)> {
        self.kind.attributes().zip(self.attributes.iter())
    }

    pub(crate) fn malformed(&self, attribute: &str) -> CompileError {
        CompileError::MalformedAttribute {
            kind: Box::from(self.name()),
            attribute: Box::from(attribute),
            line: self.line,
        }
    }

    pub fn attr(&self, attribute: &str) -> Result<&Attr, CompileError> {
        self.kind
            .position(attribute)
            .and_then(|idx| self.attributes.get(idx))
            .ok_or_else(|| self.malformed(attribute))
    }

    pub fn child(&self, attribute: &str) -> Result<&Node, CompileError> {
        self.attr(attribute)?
            .as_node()
            .ok_or_else(|| self.malformed(attribute))
    }

    /// A sequence attribute whose elements are all nodes. `nil` reads as empty.
    pub fn children(&self, attribute: &str) -> Result<Vec<&Node>, CompileError> {
        match self.attr(attribute)? {
            attr if attr.is_nil() => Ok(vec![]),
            Attr::Seq(seq) => seq
                .iter()
                .map(|item| item.as_node().ok_or_else(|| self.malformed(attribute)))
                .collect(),
            _ => Err(self.malformed(attribute)),
        }
    }

    pub fn literal(&self, attribute: &str) -> Result<&Literal, CompileError> {
        self.attr(attribute)?
            .as_literal()
            .ok_or_else(|| self.malformed(attribute))
    }

    pub fn string(&self, attribute: &str) -> Result<&str, CompileError> {
        self.literal(attribute)?
            .as_str()
            .ok_or_else(|| self.malformed(attribute))
    }
}
