use std::collections::HashMap;

use lasso::{Rodeo, Spur};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The outermost scope of a module body. Lookups never go past it.
    Module,
    Function,
}

/// Where a name lives relative to the scope it was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolved {
    pub slot: usize,
    /// Number of scopes walked outward to find the name
    pub depth: usize,
}

/// The locals of one module or function body.
///
/// Slots are handed out in order of first use and never reused.
#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    slots: HashMap<Spur, usize>,
    names: Vec<Spur>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            slots: HashMap::default(),
            names: vec![],
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn local_count(&self) -> usize {
        self.names.len()
    }

    fn slot(&mut self, name: Spur) -> usize {
        let next = self.names.len();
        *self.slots.entry(name).or_insert_with(|| {
            self.names.push(name);
            next
        })
    }
}

/// The stack of scopes active while compiling, innermost last.
///
/// Every body pushes its scope before emitting and pops it when done, so after
/// any compilation (failed or not) the chain is back where it started.
#[derive(Debug, Default)]
pub struct ScopeChain {
    rodeo: Rodeo,
    scopes: Vec<Scope>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes currently pushed
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn push(&mut self, kind: ScopeKind) {
        log::trace!("enter {kind:?} scope (depth {})", self.scopes.len());
        self.scopes.push(Scope::new(kind));
    }

    pub fn pop(&mut self) -> Option<Scope> {
        let scope = self.scopes.pop();
        log::trace!("leave scope (depth {})", self.scopes.len());
        scope
    }

    /// Names of the scope's slots, in slot order
    pub fn local_names(&self, scope: &Scope) -> Box<[Box<str>]> {
        scope
            .names
            .iter()
            .map(|name| Box::from(self.rodeo.resolve(name)))
            .collect()
    }

    /// Finds `name`, walking outward from the innermost scope. The walk stops
    /// after the first module scope.
    pub fn lookup(&self, name: &str) -> Option<Resolved> {
        let name = self.rodeo.get(name)?;
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(slot) = scope.slots.get(&name) {
                return Some(Resolved { slot: *slot, depth });
            }
            if scope.kind == ScopeKind::Module {
                break;
            }
        }
        None
    }

    /// Resolves `name` for assignment: an existing binding anywhere on the chain
    /// wins, otherwise a new slot is made in the innermost scope.
    ///
    /// Returns `None` if no scope is active.
    pub fn bind_or_create(&mut self, name: &str) -> Option<Resolved> {
        if let Some(resolved) = self.lookup(name) {
            return Some(resolved);
        }
        self.declare(name).map(|slot| Resolved { slot, depth: 0 })
    }

    /// The slot of `name` in the innermost scope, made if it doesn't exist yet.
    pub fn declare(&mut self, name: &str) -> Option<usize> {
        let name = self.rodeo.get_or_intern(name);
        let scope = self.scopes.last_mut()?;
        let slot = scope.slot(name);
        log::trace!("{} is slot {slot}", self.rodeo.resolve(&name));
        Some(slot)
    }
}
