//! Compile typed nodes into stack machine bytecode.
//!
//! A module compiles into two units: the outer one builds the namespace object
//! and calls the inner one (the module body) on it. For example
//!
//! ```text
//! (Module 1 nil (Stmt 1 ((Assign 1 ((AssName 1 "x" "OP_ASSIGN")) (Const 1 3))
//!                        (Printnl 2 ((Name 2 "x")) nil))))
//! ```
//!
//! compiles into
//!
//! ```text
//! == __script__: locals 0, stack 4 ==
//! ; line 1
//! 0000 push_const PythonModule
//! 0001 push_nil
//! 0002 push_literal "__main__"
//! 0003 push_literal nil
//! 0004 send new 3
//! 0005 dup
//! 0006 create_closure <__module_init__>
//! 0007 define_member __module_init__
//! 0008 pop
//! 0009 send __module_init__ 0
//! 0010 ret
//! == __module_init__: locals 1 (x), stack 2 ==
//! ; line 1
//! 0000 push_literal 3
//! 0001 set_local 0
//! 0002 pop
//! ; line 2
//! 0003 push_self
//! 0004 push_local 0
//! 0005 send __print__ 1
//! 0006 pop
//! 0007 push_self
//! 0008 ret
//! ```
//!
//! Functions compile into their own unit as well, prefixed with the argument
//! binding prologue from [`arguments`].

pub mod arguments;
pub mod bytecode;
pub mod environment;

use crate::{
    ast::{Attr, Emission, Node},
    Literal,
};

use arguments::Arguments;
use bytecode::{Assembler, Builder, CodeUnit};
use environment::{Resolved, Scope, ScopeChain, ScopeKind};

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum CompileError {
    #[error("line {line}: unimplemented emission for kind {kind}")]
    Unimplemented { kind: Box<str>, line: usize },
    #[error("line {line}: unresolved name `{name}`")]
    UnresolvedName { name: Box<str>, line: usize },
    #[error("line {line}: {what} is not supported")]
    Unsupported { what: &'static str, line: usize },
    #[error("line {line}: malformed attribute `{attribute}` of {kind}")]
    MalformedAttribute {
        kind: Box<str>,
        attribute: Box<str>,
        line: usize,
    },
    #[error("line {line}: {kind} needs an enclosing module or function")]
    OutsideScope { kind: Box<str>, line: usize },
    #[error("jump to a label that was never set in {0}")]
    UnboundLabel(Box<str>),
}

impl CompileError {
    /// Source line of the node that failed, if the error belongs to one
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Unimplemented { line, .. }
            | Self::UnresolvedName { line, .. }
            | Self::Unsupported { line, .. }
            | Self::MalformedAttribute { line, .. }
            | Self::OutsideScope { line, .. } => Some(*line),
            Self::UnboundLabel(_) => None,
        }
    }
}

/// Names the compiler bakes into the code it emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Name given to compiled modules
    pub module_name: Box<str>,
    /// Runtime constant that constructs module namespaces
    pub namespace_class: Box<str>,
    /// Runtime constant that loads imported modules
    pub loader: Box<str>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            module_name: Box::from("__main__"),
            namespace_class: Box::from("PythonModule"),
            loader: Box::from("CodeLoader"),
        }
    }
}

impl Options {
    pub fn with_module_name(mut self, name: impl AsRef<str>) -> Self {
        self.module_name = Box::from(name.as_ref());
        self
    }

    pub fn with_namespace_class(mut self, name: impl AsRef<str>) -> Self {
        self.namespace_class = Box::from(name.as_ref());
        self
    }

    pub fn with_loader(mut self, name: impl AsRef<str>) -> Self {
        self.loader = Box::from(name.as_ref());
        self
    }
}

const MODULE_INIT: &str = "__module_init__";

/// Walks a node tree once, depth first, emitting code as it goes.
///
/// A compiler can be reused for any number of independent trees.
#[derive(Debug, Default)]
pub struct Compiler {
    options: Options,
    scopes: ScopeChain,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            options,
            scopes: ScopeChain::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Number of scopes currently open. Zero whenever no compilation is running.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Compiles `root` into a top-level unit returning the root's value.
    pub fn compile(&mut self, root: &Node) -> Result<CodeUnit, CompileError> {
        self.compile_with(root, Builder::new("__script__"))
    }

    /// Same as [`Self::compile`], for any [`Assembler`].
    pub fn compile_with<A: Assembler>(&mut self, root: &Node, mut g: A) -> Result<A::Unit, CompileError> {
        self.emit_value(root, &mut g)?;
        g.ret();
        g.finish(Box::new([]))
    }

    /// Emits the code for a single node.
    pub fn emit<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        g.set_line(node.line());

        match node.kind().emission() {
            Emission::Module => self.emit_module(node, g)?,
            Emission::Stmt => self.emit_statements(node, g)?,
            Emission::Discard => {
                self.emit(node.child("expr")?, g)?;
                g.pop();
            }
            Emission::Const => g.push_literal(node.literal("value")?.clone()),
            // TODO: tuples should become an immutable sequence once the runtime has one
            Emission::List | Emission::Tuple => {
                let nodes = node.children("nodes")?;
                for item in &nodes {
                    self.emit(item, g)?;
                }
                g.make_array(nodes.len());
            }
            Emission::Dict => self.emit_dict(node, g)?,
            Emission::Printnl => {
                if !node.attr("dest")?.is_nil() {
                    return Err(CompileError::Unsupported {
                        what: "printing to a stream",
                        line: node.line(),
                    });
                }
                let nodes = node.children("nodes")?;
                g.push_self();
                for item in &nodes {
                    self.emit(item, g)?;
                }
                g.send("__print__", nodes.len());
            }
            Emission::Function => self.emit_function(node, g)?,
            Emission::CallFunc => self.emit_call(node, g)?,
            Emission::Name => {
                let name = node.string("name")?;
                match self.scopes.lookup(name) {
                    Some(Resolved { slot, depth: 0 }) => g.push_local(slot),
                    Some(Resolved { slot, depth }) => g.push_local_depth(depth, slot),
                    None => {
                        return Err(CompileError::UnresolvedName {
                            name: Box::from(name),
                            line: node.line(),
                        })
                    }
                }
            }
            Emission::Assign => self.emit_assign(node, g)?,
            Emission::Import => self.emit_import(node, g)?,
            Emission::Unimplemented => {
                return Err(CompileError::Unimplemented {
                    kind: Box::from(node.name()),
                    line: node.line(),
                })
            }
        }
        Ok(())
    }

    /// Runs `f` with a fresh scope pushed, popping it again however `f` ends.
    fn with_scope<T>(
        &mut self,
        kind: ScopeKind,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<(T, Scope), CompileError> {
        self.scopes.push(kind);
        let result = f(self);
        match self.scopes.pop() {
            Some(scope) => result.map(|value| (value, scope)),
            None => unreachable!("scope was pushed above"),
        }
    }

    /// A statement sequence leaves exactly one value: the last statement's, or nil.
    fn emit_statements<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let statements = node.children("nodes")?;
        let Some((last, init)) = statements.split_last() else {
            g.push_nil();
            return Ok(());
        };

        for statement in init {
            let base = g.stack_depth();
            self.emit(statement, g)?;
            while g.stack_depth() > base {
                g.pop();
            }
        }

        self.emit_value(last, g)
    }

    /// Emits `node` so that it leaves exactly one value, nil if it left none.
    fn emit_value<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let base = g.stack_depth();
        self.emit(node, g)?;
        if g.stack_depth() == base {
            g.push_nil();
        }
        while g.stack_depth() > base + 1 {
            g.pop();
        }
        Ok(())
    }

    /// The body of a module evaluates to the namespace it ran in.
    fn emit_body<A: Assembler>(&mut self, statement: &Attr, g: &mut A) -> Result<(), CompileError> {
        match statement {
            Attr::Node(node) if !is_empty_statement(node) => self.emit_value(node, g)?,
            _ => g.push_nil(),
        }
        g.pop();
        g.push_self();
        Ok(())
    }

    fn emit_module<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let doc = node.literal("doc")?.clone();
        let statement = node.attr("node")?;

        let mut body = g.nested(MODULE_INIT);
        body.set_line(node.line());
        let ((), scope) =
            self.with_scope(ScopeKind::Module, |this| this.emit_body(statement, &mut body))?;
        body.ret();
        let body = body.finish(self.scopes.local_names(&scope))?;

        g.push_const(&self.options.namespace_class);
        g.push_nil();
        g.push_literal(Literal::from(self.options.module_name.as_ref()));
        g.push_literal(doc);
        g.send("new", 3);

        g.dup();
        g.create_closure(body);
        g.define_member(MODULE_INIT);
        g.pop();
        g.send(MODULE_INIT, 0);
        Ok(())
    }

    fn emit_function<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        if !node.attr("decorators")?.is_nil() {
            return Err(CompileError::Unsupported {
                what: "decorators",
                line: node.line(),
            });
        }
        let name = node.string("name")?;
        let arguments = Arguments::from_node(node)?;
        let code = node.child("code")?;

        let mut body = g.nested(name);
        body.set_line(node.line());
        let ((), scope) = self.with_scope(ScopeKind::Function, |this| {
            arguments.emit(this, &mut body)?;
            this.emit(code, &mut body)
        })?;
        body.ret();
        let body = body.finish(self.scopes.local_names(&scope))?;

        g.push_self();
        g.create_closure(body);
        g.define_member(name);
        Ok(())
    }

    fn emit_dict<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let items = match node.attr("items")? {
            attr if attr.is_nil() => &[][..],
            Attr::Seq(items) => &items[..],
            _ => return Err(node.malformed("items")),
        };

        g.make_mapping(items.len());
        for item in items.iter() {
            let Some([Attr::Node(key), Attr::Node(value)]) = item.as_seq() else {
                return Err(node.malformed("items"));
            };
            g.dup();
            self.emit(key, g)?;
            self.emit(value, g)?;
            g.send("[]=", 2);
            g.pop();
        }
        Ok(())
    }

    fn emit_call<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let callee = node.child("node")?;
        if callee.kind().emission() != Emission::Name {
            return Err(CompileError::Unsupported {
                what: "calling anything but a plain name",
                line: node.line(),
            });
        }
        if !node.attr("star_args")?.is_nil() || !node.attr("dstar_args")?.is_nil() {
            return Err(CompileError::Unsupported {
                what: "star arguments",
                line: node.line(),
            });
        }

        let args = node.children("args")?;
        g.push_self();
        for arg in &args {
            self.emit(arg, g)?;
        }
        g.send(callee.string("name")?, args.len());
        Ok(())
    }

    fn emit_assign<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let targets = node.children("nodes")?;
        let [target] = targets.as_slice() else {
            return Err(CompileError::Unsupported {
                what: "assigning to several targets",
                line: node.line(),
            });
        };
        if target.name() != "AssName" {
            return Err(CompileError::Unsupported {
                what: "assigning to anything but a name",
                line: target.line(),
            });
        }
        let name = target.string("name")?;

        // the value is computed before any slot is touched
        self.emit(node.child("expr")?, g)?;

        match self.scopes.bind_or_create(name) {
            Some(Resolved { slot, depth: 0 }) => g.set_local(slot),
            Some(Resolved { slot, depth }) => g.set_local_depth(depth, slot),
            None => {
                return Err(CompileError::OutsideScope {
                    kind: Box::from(node.name()),
                    line: node.line(),
                })
            }
        }
        Ok(())
    }

    fn emit_import<A: Assembler>(&mut self, node: &Node, g: &mut A) -> Result<(), CompileError> {
        let names = node.attr("names")?.as_seq().ok_or_else(|| node.malformed("names"))?;

        for (idx, entry) in names.iter().enumerate() {
            let (module, alias) = match entry.as_seq() {
                Some([Attr::Value(module), Attr::Value(alias)]) => (module, alias),
                _ => return Err(node.malformed("names")),
            };
            let module = module.as_str().ok_or_else(|| node.malformed("names"))?;
            let alias = match alias {
                Literal::Nil => module.rsplit('.').next().unwrap_or(module),
                alias => alias.as_str().ok_or_else(|| node.malformed("names"))?,
            };

            if idx > 0 {
                g.pop();
            }
            g.push_const(&self.options.loader);
            g.push_literal(Literal::from(module));
            g.push_self();
            g.send("load_module", 2);

            g.push_self();
            g.swap();
            g.define_member(alias);
        }
        Ok(())
    }
}

fn is_empty_statement(node: &Node) -> bool {
    node.kind().emission() == Emission::Stmt
        && node
            .attr("nodes")
            .is_ok_and(|nodes| nodes.is_nil() || nodes.as_seq().is_some_and(<[Attr]>::is_empty))
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use assert2::{check, let_assert};

    use super::{
        bytecode::{Assembler, Builder, Instruction},
        CompileError, Compiler, Options,
    };
    use crate::{ast::Node, reader::read, Literal, Registry};

    fn node(source: &str) -> Node {
        let_assert!(Ok(data) = read(source));
        let_assert!([raw] = data.as_slice());
        let_assert!(Ok(node) = Registry::standard().convert(raw));
        node
    }

    fn compile(source: &str) -> Result<super::CodeUnit, CompileError> {
        Compiler::new().compile(&node(source))
    }

    #[test]
    fn unimplemented_kind_names_itself() {
        let mut compiler = Compiler::new();
        let tree = node(r#"(Module 1 nil (Stmt 1 ((Discard 3 (Lambda 3 () () 0 (Const 3 1))))))"#);
        check!(
            compiler.compile(&tree)
                == Err(CompileError::Unimplemented {
                    kind: Box::from("Lambda"),
                    line: 3,
                })
        );
        check!(compiler.scope_depth() == 0);

        // the compiler is still usable
        let_assert!(Ok(_) = compiler.compile(&node(r#"(Module 1 nil (Stmt 1 ()))"#)));
        check!(compiler.scope_depth() == 0);
    }

    #[test]
    fn failure_inside_a_function_unwinds_every_scope() {
        let mut compiler = Compiler::new();
        let tree = node(
            r#"(Module 1 nil (Stmt 1 (
                (Function 2 nil "f" () () 0 nil (Stmt 3 ((Discard 3 (Name 3 "ghost"))))))))"#,
        );
        check!(
            compiler.compile(&tree)
                == Err(CompileError::UnresolvedName {
                    name: Box::from("ghost"),
                    line: 3,
                })
        );
        check!(compiler.scope_depth() == 0);
    }

    #[test]
    fn several_targets_are_rejected() {
        let result = compile(
            r#"(Module 1 nil (Stmt 1 (
                (Assign 2 ((AssName 2 "a" "OP_ASSIGN") (AssName 2 "b" "OP_ASSIGN")) (Const 2 1)))))"#,
        );
        check!(
            result
                == Err(CompileError::Unsupported {
                    what: "assigning to several targets",
                    line: 2,
                })
        );
    }

    #[test]
    fn assignment_needs_a_scope() {
        let result = compile(r#"(Assign 1 ((AssName 1 "a" "OP_ASSIGN")) (Const 1 1))"#);
        check!(
            result
                == Err(CompileError::OutsideScope {
                    kind: Box::from("Assign"),
                    line: 1,
                })
        );
        check!(result.map_err(|e| e.line()) == Err(Some(1)));
    }

    #[test]
    fn only_plain_names_are_called() {
        let result = compile(r#"(CallFunc 4 (Getattr 4 (Name 4 "a") "b") () nil nil)"#);
        check!(
            result
                == Err(CompileError::Unsupported {
                    what: "calling anything but a plain name",
                    line: 4,
                })
        );
    }

    #[test]
    fn function_shapes_that_are_not_supported() {
        let_assert!(
            Err(CompileError::Unsupported { what, .. }) =
                compile(r#"(Function 1 nil "f" ("a") () 4 nil (Stmt 1 ()))"#)
        );
        check!(what == "variadic parameters");
        let_assert!(
            Err(CompileError::Unsupported { what, .. }) =
                compile(r#"(Function 1 ((Name 1 "deco")) "f" () () 0 nil (Stmt 1 ()))"#)
        );
        check!(what == "decorators");
        let_assert!(
            Err(CompileError::Unsupported { what, .. }) =
                compile(r#"(Function 1 nil "f" (("a" "b")) () 0 nil (Stmt 1 ()))"#)
        );
        check!(what == "tuple parameters");
        check!(
            compile(r#"(Function 1 nil "f" ("a") ((Const 1 1) (Const 1 2)) 0 nil (Stmt 1 ()))"#)
                == Err(CompileError::MalformedAttribute {
                    kind: Box::from("Function"),
                    attribute: Box::from("defaults"),
                    line: 1,
                })
        );
    }

    #[test]
    fn argument_prologue() {
        let_assert!(
            Ok(unit) = compile(r#"(Function 1 nil "f" ("a" "b") ((Const 1 2)) 0 nil (Stmt 2 ((Name 2 "b"))))"#)
        );
        check!(
            unit.instructions()
                == [
                    Instruction::PushSelf,
                    Instruction::CreateClosure(unit.children().next().cloned().unwrap()),
                    Instruction::DefineMember(Box::from("f")),
                    Instruction::Ret,
                ]
        );

        let_assert!(Some(body) = unit.children().next());
        check!(body.name() == "f");
        check!(body.local_names().iter().map(AsRef::as_ref).collect::<Vec<&str>>() == ["a", "b"]);
        check!(
            body.instructions()
                == [
                    Instruction::CollectArgs,
                    Instruction::PassedArg(1),
                    Instruction::GoIfTrue(8),
                    Instruction::PassedArg(0),
                    Instruction::GoIfFalse(15),
                    Instruction::PushLiteral(Literal::Int(-1)),
                    Instruction::PushLiteral(Literal::Int(2)),
                    Instruction::Send {
                        name: Box::from("insert"),
                        argc: 2
                    },
                    Instruction::ShiftArray,
                    Instruction::SetLocal(0),
                    Instruction::Pop,
                    Instruction::ShiftArray,
                    Instruction::SetLocal(1),
                    Instruction::Pop,
                    Instruction::Goto(17),
                    Instruction::PushTrue,
                    Instruction::Raise,
                    Instruction::Pop,
                    Instruction::PushLocal(1),
                    Instruction::Ret,
                ]
        );
        check!(body.line_of(17) == Some(1));
        check!(body.line_of(18) == Some(2));
    }

    #[test]
    fn valueless_roots_return_nil() {
        let_assert!(Ok(unit) = compile("(Discard 1 (Const 1 1))"));
        check!(
            unit.instructions()
                == [
                    Instruction::PushLiteral(Literal::Int(1)),
                    Instruction::Pop,
                    Instruction::PushNil,
                    Instruction::Ret,
                ]
        );

        let_assert!(Ok(unit) = compile("(Import 1 ())"));
        check!(unit.instructions() == [Instruction::PushNil, Instruction::Ret]);
    }

    #[test]
    fn module_body_without_a_statement_list() {
        let_assert!(Ok(unit) = compile("(Module 1 nil (Discard 1 (Const 1 1)))"));
        let_assert!(Some(body) = unit.children().next());
        check!(
            body.instructions()
                == [
                    Instruction::PushLiteral(Literal::Int(1)),
                    Instruction::Pop,
                    Instruction::PushNil,
                    Instruction::Pop,
                    Instruction::PushSelf,
                    Instruction::Ret,
                ]
        );
    }

    #[test]
    fn imports_bind_their_alias() {
        let_assert!(Ok(unit) = compile(r#"(Import 1 (("os.path" nil) ("sys" "system")))"#));
        let members = unit
            .instructions()
            .iter()
            .filter_map(|inst| match inst {
                Instruction::DefineMember(name) => Some(name.as_ref()),
                _ => None,
            })
            .collect::<Vec<_>>();
        check!(members == ["path", "system"]);
        check!(unit.instructions().iter().filter(|inst| **inst == Instruction::Pop).count() == 1);
        check!(unit.instructions()[0] == Instruction::PushConst(Box::from("CodeLoader")));
    }

    #[test]
    fn options_name_the_runtime() {
        let options = Options::default()
            .with_module_name("app")
            .with_namespace_class("Namespace")
            .with_loader("Loader");
        let mut compiler = Compiler::with_options(options.clone());
        check!(compiler.options() == &options);
        let_assert!(Ok(unit) = compiler.compile(&node(r#"(Module 1 "docs" (Stmt 1 ()))"#)));
        check!(
            unit.instructions()[..5]
                == [
                    Instruction::PushConst(Box::from("Namespace")),
                    Instruction::PushNil,
                    Instruction::PushLiteral(Literal::from("app")),
                    Instruction::PushLiteral(Literal::from("docs")),
                    Instruction::Send {
                        name: Box::from("new"),
                        argc: 3
                    },
                ]
        );
    }

    #[test]
    fn mapping_is_sized_once_and_filled_in_place() {
        arbtest(|u| {
            let size = u.int_in_range(0..=16usize)?;
            let mut items = String::new();
            for _ in 0..size {
                let key = u.int_in_range(-100..=100i64)?;
                items.push_str(&format!("((Const 1 {key}) (Const 1 \"v\"))"));
            }
            let tree = node(&format!("(Dict 1 ({items}))"));

            let mut b = Builder::new("dict");
            let_assert!(Ok(()) = Compiler::new().emit(&tree, &mut b));
            check!(b.stack_depth() == 1);

            let instructions = b.instructions();
            let mappings = instructions
                .iter()
                .filter(|inst| matches!(inst, Instruction::MakeMapping(_)))
                .collect::<Vec<_>>();
            check!(mappings == [&Instruction::MakeMapping(size)]);
            let stores = instructions
                .iter()
                .filter(|inst| matches!(inst, Instruction::Send { name, argc: 2 } if name.as_ref() == "[]="))
                .count();
            check!(stores == size);
            check!(instructions.iter().filter(|inst| **inst == Instruction::Pop).count() == size);
            Ok(())
        });
    }
}
