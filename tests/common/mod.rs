//! A tiny stack machine running compiled units, enough to observe what the
//! emitted code does.
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use typhon::{CodeUnit, Instruction, Literal};

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    Namespace(Rc<Namespace>),
    Closure(Rc<Closure>),
    Const(Rc<str>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) | (Self::Const(a), Self::Const(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Namespace(a), Self::Namespace(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Nil => Self::Nil,
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Int(i) => Self::Int(*i),
            Literal::Float(f) => Self::Float(*f),
            Literal::String(s) | Literal::Symbol(s) => Self::Str(Rc::from(s.as_ref())),
        }
    }
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }
}

#[derive(Debug)]
pub struct Namespace {
    pub name: Value,
    pub members: RefCell<HashMap<Box<str>, Value>>,
}

impl Namespace {
    pub fn member(&self, name: &str) -> Option<Value> {
        self.members.borrow().get(name).cloned()
    }
}

#[derive(Debug)]
pub struct Frame {
    locals: RefCell<Vec<Value>>,
    parent: Option<Rc<Frame>>,
}

impl Frame {
    fn outward(self: &Rc<Self>, depth: usize) -> Rc<Frame> {
        let mut frame = self.clone();
        for _ in 0..depth {
            frame = frame.parent.clone().expect("no frame that far out");
        }
        frame
    }
}

#[derive(Debug)]
pub struct Closure {
    code: Rc<CodeUnit>,
    frame: Rc<Frame>,
}

/// A value raised by the running code
#[derive(Debug, PartialEq)]
pub struct Raised(pub Value);

#[derive(Debug, Default)]
pub struct Machine {
    /// Arguments of every `__print__`, in order
    pub printed: Vec<Vec<Value>>,
    /// Modules requested from the loader, in order
    pub loaded: Vec<String>,
}

impl Machine {
    /// Runs a top-level unit with `nil` as its receiver.
    pub fn run(&mut self, unit: &CodeUnit) -> Result<Value, Raised> {
        self.execute(unit, Value::Nil, vec![], None)
    }

    fn call(&mut self, receiver: Value, callee: &Closure, args: Vec<Value>) -> Result<Value, Raised> {
        self.execute(&callee.code, receiver, args, Some(callee.frame.clone()))
    }

    fn send(&mut self, receiver: Value, name: &str, mut args: Vec<Value>) -> Result<Value, Raised> {
        match (&receiver, name) {
            // (parent, name, doc)
            (Value::Const(class), "new") if class.as_ref() == "PythonModule" => {
                Ok(Value::Namespace(Rc::new(Namespace {
                    name: args.remove(1),
                    members: RefCell::default(),
                })))
            }
            (Value::Const(class), "load_module") if class.as_ref() == "CodeLoader" => {
                let Value::Str(module) = &args[0] else {
                    panic!("module names are strings");
                };
                self.loaded.push(module.to_string());
                Ok(Value::Namespace(Rc::new(Namespace {
                    name: args[0].clone(),
                    members: RefCell::default(),
                })))
            }
            (Value::Array(items), "insert") => {
                let (Value::Int(idx), value) = (&args[0], args[1].clone()) else {
                    panic!("insert takes an index");
                };
                let mut items_mut = items.borrow_mut();
                // negative indices count from the end, -1 appends
                let at = if *idx < 0 {
                    (items_mut.len() as i64 + idx + 1) as usize
                } else {
                    *idx as usize
                };
                items_mut.insert(at, value);
                drop(items_mut);
                Ok(receiver.clone())
            }
            (Value::Map(entries), "[]=") => {
                let value = args[1].clone();
                entries.borrow_mut().push((args.remove(0), value.clone()));
                Ok(value)
            }
            (Value::Namespace(_), "__print__") => {
                self.printed.push(args);
                Ok(Value::Nil)
            }
            (Value::Namespace(namespace), name) => match namespace.member(name) {
                Some(Value::Closure(closure)) => self.call(receiver.clone(), &closure, args),
                other => panic!("{name} is not callable: {other:?}"),
            },
            _ => panic!("can't send {name} to {receiver:?}"),
        }
    }

    fn execute(
        &mut self,
        unit: &CodeUnit,
        receiver: Value,
        args: Vec<Value>,
        parent: Option<Rc<Frame>>,
    ) -> Result<Value, Raised> {
        let frame = Rc::new(Frame {
            locals: RefCell::new(vec![Value::Nil; unit.local_count()]),
            parent,
        });
        let mut stack: Vec<Value> = vec![];
        let mut ip = 0;

        loop {
            let inst = &unit.instructions()[ip];
            ip += 1;
            match inst {
                Instruction::PushLiteral(literal) => stack.push(literal.into()),
                Instruction::PushNil => stack.push(Value::Nil),
                Instruction::PushTrue => stack.push(Value::Bool(true)),
                Instruction::PushSelf => stack.push(receiver.clone()),
                Instruction::PushConst(name) => stack.push(Value::Const(Rc::from(name.as_ref()))),
                Instruction::Pop => {
                    stack.pop().expect("pop on an empty stack");
                }
                Instruction::Dup => stack.push(stack.last().cloned().expect("dup on an empty stack")),
                Instruction::Swap => {
                    let len = stack.len();
                    stack.swap(len - 1, len - 2);
                }
                Instruction::PushLocal(slot) => stack.push(frame.locals.borrow()[*slot].clone()),
                Instruction::SetLocal(slot) => {
                    frame.locals.borrow_mut()[*slot] = stack.last().cloned().expect("nothing to store");
                }
                Instruction::PushLocalDepth { depth, slot } => {
                    stack.push(frame.outward(*depth).locals.borrow()[*slot].clone())
                }
                Instruction::SetLocalDepth { depth, slot } => {
                    frame.outward(*depth).locals.borrow_mut()[*slot] =
                        stack.last().cloned().expect("nothing to store");
                }
                Instruction::MakeArray(count) => {
                    let items = stack.split_off(stack.len() - count);
                    stack.push(Value::array(items));
                }
                Instruction::MakeMapping(_) => stack.push(Value::Map(Rc::default())),
                Instruction::Send { name, argc } => {
                    let args = stack.split_off(stack.len() - argc);
                    let receiver = stack.pop().expect("send without a receiver");
                    stack.push(self.send(receiver, name, args)?);
                }
                Instruction::CreateClosure(code) => stack.push(Value::Closure(Rc::new(Closure {
                    code: code.clone(),
                    frame: frame.clone(),
                }))),
                Instruction::DefineMember(name) => {
                    let value = stack.pop().expect("no value to define");
                    let Some(Value::Namespace(namespace)) = stack.pop() else {
                        panic!("members are defined on namespaces");
                    };
                    namespace.members.borrow_mut().insert(name.clone(), value.clone());
                    stack.push(value);
                }
                Instruction::CollectArgs => stack.push(Value::array(args.iter().cloned())),
                Instruction::PassedArg(idx) => stack.push(Value::Bool(*idx < args.len())),
                Instruction::ShiftArray => {
                    let Some(Value::Array(items)) = stack.last() else {
                        panic!("shift needs an array");
                    };
                    let first = items.borrow_mut().remove(0);
                    stack.push(first);
                }
                Instruction::Goto(target) => ip = *target,
                Instruction::GoIfTrue(target) => {
                    if stack.pop() == Some(Value::Bool(true)) {
                        ip = *target;
                    }
                }
                Instruction::GoIfFalse(target) => {
                    if stack.pop() == Some(Value::Bool(false)) {
                        ip = *target;
                    }
                }
                Instruction::Raise => return Err(Raised(stack.pop().expect("nothing to raise"))),
                Instruction::Ret => {
                    let value = stack.pop().expect("nothing to return");
                    assert!(stack.is_empty(), "{} returned with {stack:?} left over", unit.name());
                    return Ok(value);
                }
            }
            assert!(
                stack.len() <= unit.max_stack(),
                "{} went past its stack size at {}",
                unit.name(),
                ip - 1
            );
        }
    }
}
