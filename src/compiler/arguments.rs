//! Binding positional arguments to the locals of a function body.
//!
//! The prologue gathers the arguments into a sequence, appends the defaults for
//! trailing parameters the caller left out, then shifts every value off the front
//! into its slot. Too few arguments raise before anything is bound.
use super::{bytecode::Assembler, CompileError, Compiler};
use crate::{
    ast::{Attr, Node},
    Literal,
};

const VARARGS: i64 = 0x04;
const VARKEYWORDS: i64 = 0x08;

/// The positional parameters of a function, defaults aligned to the last ones.
#[derive(Debug)]
pub struct Arguments<'a> {
    line: usize,
    names: Vec<&'a str>,
    defaults: Vec<&'a Node>,
}

impl<'a> Arguments<'a> {
    /// Reads the parameters of a `Function` node.
    pub fn from_node(node: &'a Node) -> Result<Self, CompileError> {
        let flags = match node.literal("flags")? {
            Literal::Nil => 0,
            flags => flags.as_int().ok_or_else(|| node.malformed("flags"))?,
        };
        if flags & (VARARGS | VARKEYWORDS) != 0 {
            return Err(CompileError::Unsupported {
                what: "variadic parameters",
                line: node.line(),
            });
        }

        let names = match node.attr("argnames")? {
            attr if attr.is_nil() => vec![],
            Attr::Seq(names) => names
                .iter()
                .map(|name| match name {
                    Attr::Seq(_) => Err(CompileError::Unsupported {
                        what: "tuple parameters",
                        line: node.line(),
                    }),
                    name => name
                        .as_literal()
                        .and_then(Literal::as_str)
                        .ok_or_else(|| node.malformed("argnames")),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(node.malformed("argnames")),
        };

        let defaults = node.children("defaults")?;
        if defaults.len() > names.len() {
            return Err(node.malformed("defaults"));
        }
        Ok(Self {
            line: node.line(),
            names,
            defaults,
        })
    }

    pub fn total(&self) -> usize {
        self.names.len()
    }

    pub fn required(&self) -> usize {
        self.names.len() - self.defaults.len()
    }

    pub fn names(&self) -> &[&'a str] {
        &self.names
    }

    pub fn required_names(&self) -> &[&'a str] {
        &self.names[..self.required()]
    }

    pub fn default_names(&self) -> &[&'a str] {
        &self.names[self.required()..]
    }

    /// Emits the prologue into `g`, declaring every parameter in the innermost scope.
    ///
    /// Leaves the stack as it found it.
    pub(super) fn emit<A: Assembler>(&self, compiler: &mut Compiler, g: &mut A) -> Result<(), CompileError> {
        let total = self.total();
        let required = self.required();
        if total == 0 {
            return Ok(());
        }

        g.collect_args();
        let args_done = g.new_label();
        let args_present = g.new_label();
        let insufficient = g.new_label();

        g.passed_arg(total - 1);
        g.go_if_true(args_present);

        if required > 0 {
            g.passed_arg(required - 1);
            g.go_if_false(insufficient);
        }

        // walk back from the last default until a supplied argument is found,
        // inserting each missing value just before the ones inserted so far.
        // Parameters aren't declared yet, so defaults see the enclosing bindings.
        for (idx, default) in self.defaults.iter().rev().enumerate() {
            if idx > 0 {
                g.passed_arg(total - idx - 1);
                g.go_if_true(args_present);
            }
            g.push_literal(Literal::Int(-(idx as i64) - 1));
            compiler.emit(default, g)?;
            g.send("insert", 2);
        }

        g.set_label(args_present);
        for name in &self.names {
            let slot = compiler.scopes.declare(name).ok_or(CompileError::OutsideScope {
                kind: Box::from("Function"),
                line: self.line,
            })?;
            g.shift_array();
            g.set_local(slot);
            g.pop();
        }
        g.goto(args_done);

        g.set_label(insufficient);
        g.push_true();
        g.raise();

        g.set_label(args_done);
        g.pop();
        Ok(())
    }
}
