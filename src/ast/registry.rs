use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use super::{
    kinds::{HAND_WRITTEN, NODE_KINDS},
    Attr, Emission, KindDescriptor, Node,
};
use crate::{reader::Raw, Literal};

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum ConvertError {
    #[error("unknown node kind: {0}")]
    UnknownKind(Box<str>),
    #[error("expected a tagged list, found {0}")]
    Untagged(Box<str>),
    #[error("{kind} takes {expected} values (line included), found {found}")]
    Arity {
        kind: Box<str>,
        expected: usize,
        found: usize,
    },
    #[error("{kind} has an invalid line number")]
    BadLine { kind: Box<str> },
}

/// Maps node kind names to their descriptors.
#[derive(Debug, Clone)]
pub struct Registry {
    kinds: HashMap<Box<str>, Arc<KindDescriptor>>,
}

static STANDARD: LazyLock<Registry> = LazyLock::new(|| {
    let mut registry = Registry::new();
    for (name, attributes) in NODE_KINDS {
        registry.register(name, attributes);
    }
    log::debug!("node registry holds {} kinds", registry.kinds.len());
    registry
});

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry holding only the hand-written kinds
    pub fn new() -> Self {
        let kinds = HAND_WRITTEN
            .iter()
            .map(|(name, attributes, emission)| {
                let descriptor = KindDescriptor {
                    name: Box::from(*name),
                    attributes: attributes.iter().map(|a| Box::from(*a)).collect(),
                    emission: *emission,
                };
                (Box::from(*name), Arc::new(descriptor))
            })
            .collect();
        Self { kinds }
    }

    /// Every kind of the language, built on first use and shared afterwards.
    pub fn standard() -> &'static Registry {
        &STANDARD
    }

    /// Installs `name` with the given attributes.
    ///
    /// A kind that is already known keeps its emission and only has its attributes replaced,
    /// so registering over a hand-written kind never loses its code generation.
    pub fn register(&mut self, name: &str, attributes: &[&str]) -> Arc<KindDescriptor> {
        let emission = self
            .kinds
            .get(name)
            .map_or(Emission::Unimplemented, |kind| kind.emission);
        let descriptor = Arc::new(KindDescriptor {
            name: Box::from(name),
            attributes: attributes.iter().map(|a| Box::from(*a)).collect(),
            emission,
        });
        self.kinds.insert(Box::from(name), descriptor.clone());
        descriptor
    }

    pub fn get(&self, name: &str) -> Option<&KindDescriptor> {
        self.kinds.get(name).map(AsRef::as_ref)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.kinds.values().map(AsRef::as_ref)
    }

    /// Turns a tagged raw tree into a node, converting nested tagged lists into
    /// nodes and plain lists element-wise. Scalars pass through unchanged.
    pub fn convert(&self, raw: &Raw) -> Result<Node, ConvertError> {
        let (Some(tag), Raw::List(items)) = (raw.tag(), raw) else {
            return Err(ConvertError::Untagged(Box::from(raw.to_string())));
        };
        let kind = self
            .kinds
            .get(tag)
            .ok_or_else(|| ConvertError::UnknownKind(Box::from(tag)))?;

        // skip the tag
        let values = &items[1..];
        let expected = kind.attributes.len() + 1;
        if values.len() != expected {
            return Err(ConvertError::Arity {
                kind: Box::from(tag),
                expected,
                found: values.len(),
            });
        }

        let line = match values[0] {
            Raw::Scalar(Literal::Int(line)) => usize::try_from(line).ok(),
            _ => None,
        }
        .ok_or_else(|| ConvertError::BadLine {
            kind: Box::from(tag),
        })?;

        let attributes = values[1..]
            .iter()
            .map(|value| self.convert_attr(value))
            .collect::<Result<_, _>>()?;

        Ok(Node {
            kind: kind.clone(),
            line,
            attributes,
        })
    }

    fn convert_attr(&self, raw: &Raw) -> Result<Attr, ConvertError> {
        match raw {
            Raw::Scalar(literal) => Ok(Attr::Value(literal.clone())),
            Raw::List(_) if raw.tag().is_some() => self.convert(raw).map(Attr::Node),
            Raw::List(items) => items
                .iter()
                .map(|item| self.convert_attr(item))
                .collect::<Result<_, _>>()
                .map(Attr::Seq),
        }
    }
}
