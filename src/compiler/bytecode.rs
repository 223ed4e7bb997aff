//! Instructions for the target stack machine, and the [`Builder`] that records
//! them into [`CodeUnit`]s.
use core::fmt;
use std::rc::Rc;

use super::CompileError;
use crate::Literal;

/// A single stack machine instruction.
///
/// Unless noted, an instruction pops its operands and pushes its result.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushLiteral(Literal),
    PushNil,
    PushTrue,
    /// Pushes the receiver (the namespace the code runs in)
    PushSelf,
    /// Pushes a constant of the target runtime by name
    PushConst(Box<str>),
    Pop,
    Dup,
    Swap,
    PushLocal(usize),
    /// Stores the top of the stack without popping it
    SetLocal(usize),
    /// Reads a slot of the frame `depth` scopes out
    PushLocalDepth {
        depth: usize,
        slot: usize,
    },
    /// Stores the top of the stack into the frame `depth` scopes out, without popping it
    SetLocalDepth {
        depth: usize,
        slot: usize,
    },
    /// Collects the top `n` values into a sequence
    MakeArray(usize),
    /// Pushes an empty mapping sized for the given number of entries
    MakeMapping(usize),
    /// Invokes `name` on the receiver found below `argc` arguments
    Send {
        name: Box<str>,
        argc: usize,
    },
    /// Builds a closure over the current frame
    CreateClosure(Rc<CodeUnit>),
    /// Pops a value and a namespace, binds the value as member `name`, pushes the value back
    DefineMember(Box<str>),
    /// Pushes the arguments of the current call as a mutable sequence
    CollectArgs,
    /// Pushes whether the positional argument at the index was supplied by the caller
    PassedArg(usize),
    /// Pushes the front element removed from the sequence on top (which stays)
    ShiftArray,
    Goto(usize),
    GoIfTrue(usize),
    GoIfFalse(usize),
    /// Pops a value and raises it
    Raise,
    Ret,
}

impl Instruction {
    /// How the instruction changes the depth of the operand stack
    pub fn stack_effect(&self) -> isize {
        match self {
            Self::PushLiteral(_)
            | Self::PushNil
            | Self::PushTrue
            | Self::PushSelf
            | Self::PushConst(_)
            | Self::Dup
            | Self::PushLocal(_)
            | Self::PushLocalDepth { .. }
            | Self::MakeMapping(_)
            | Self::CreateClosure(_)
            | Self::CollectArgs
            | Self::PassedArg(_)
            | Self::ShiftArray => 1,
            Self::Swap
            | Self::SetLocal(_)
            | Self::SetLocalDepth { .. }
            | Self::Goto(_) => 0,
            Self::Pop
            | Self::DefineMember(_)
            | Self::GoIfTrue(_)
            | Self::GoIfFalse(_)
            | Self::Raise
            | Self::Ret => -1,
            Self::MakeArray(n) => 1 - *n as isize,
            Self::Send { argc, .. } => -(*argc as isize),
        }
    }

    fn jump_target(&mut self) -> Option<&mut usize> {
        match self {
            Self::Goto(target) | Self::GoIfTrue(target) | Self::GoIfFalse(target) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PushLiteral(literal) => write!(f, "push_literal {literal}"),
            Self::PushNil => write!(f, "push_nil"),
            Self::PushTrue => write!(f, "push_true"),
            Self::PushSelf => write!(f, "push_self"),
            Self::PushConst(name) => write!(f, "push_const {name}"),
            Self::Pop => write!(f, "pop"),
            Self::Dup => write!(f, "dup"),
            Self::Swap => write!(f, "swap"),
            Self::PushLocal(slot) => write!(f, "push_local {slot}"),
            Self::SetLocal(slot) => write!(f, "set_local {slot}"),
            Self::PushLocalDepth { depth, slot } => write!(f, "push_local_depth {depth} {slot}"),
            Self::SetLocalDepth { depth, slot } => write!(f, "set_local_depth {depth} {slot}"),
            Self::MakeArray(n) => write!(f, "make_array {n}"),
            Self::MakeMapping(n) => write!(f, "make_mapping {n}"),
            Self::Send { name, argc } => write!(f, "send {name} {argc}"),
            Self::CreateClosure(unit) => write!(f, "create_closure <{}>", unit.name()),
            Self::DefineMember(name) => write!(f, "define_member {name}"),
            Self::CollectArgs => write!(f, "collect_args"),
            Self::PassedArg(idx) => write!(f, "passed_arg {idx}"),
            Self::ShiftArray => write!(f, "shift_array"),
            Self::Goto(target) => write!(f, "goto {target:04}"),
            Self::GoIfTrue(target) => write!(f, "goto_if_true {target:04}"),
            Self::GoIfFalse(target) => write!(f, "goto_if_false {target:04}"),
            Self::Raise => write!(f, "raise"),
            Self::Ret => write!(f, "ret"),
        }
    }
}

/// A jump destination, bound to an instruction index with [`Assembler::set_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// The emission context the code generator lowers nodes through.
///
/// A backend for another virtual machine implements this trait; [`Builder`] is the
/// implementation producing this crate's [`CodeUnit`]s.
pub trait Assembler: Sized {
    /// The finalized form of one compiled body
    type Unit;

    /// An empty assembler for a body nested in this one
    fn nested(&self, name: &str) -> Self;
    /// Finalizes the body. Consumes the assembler so a unit can't be reopened.
    fn finish(self, local_names: Box<[Box<str>]>) -> Result<Self::Unit, CompileError>;

    /// Current depth of the operand stack
    fn stack_depth(&self) -> usize;
    /// Marks the source line the following instructions belong to
    fn set_line(&mut self, line: usize);

    fn push_literal(&mut self, literal: Literal);
    fn push_nil(&mut self);
    fn push_true(&mut self);
    fn push_self(&mut self);
    fn push_const(&mut self, name: &str);
    fn pop(&mut self);
    fn dup(&mut self);
    fn swap(&mut self);

    fn push_local(&mut self, slot: usize);
    fn set_local(&mut self, slot: usize);
    fn push_local_depth(&mut self, depth: usize, slot: usize);
    fn set_local_depth(&mut self, depth: usize, slot: usize);

    fn make_array(&mut self, count: usize);
    fn make_mapping(&mut self, size: usize);
    fn send(&mut self, name: &str, argc: usize);
    fn create_closure(&mut self, unit: Self::Unit);
    fn define_member(&mut self, name: &str);

    fn collect_args(&mut self);
    fn passed_arg(&mut self, index: usize);
    fn shift_array(&mut self);

    fn new_label(&mut self) -> Label;
    fn set_label(&mut self, label: Label);
    fn goto(&mut self, label: Label);
    fn go_if_true(&mut self, label: Label);
    fn go_if_false(&mut self, label: Label);
    fn raise(&mut self);
    fn ret(&mut self);
}

/// The immutable result of compiling one module or function body.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUnit {
    name: Box<str>,
    instructions: Box<[Instruction]>,
    local_names: Box<[Box<str>]>,
    max_stack: usize,
    // (first instruction, line), sorted by instruction
    lines: Box<[(usize, usize)]>,
}

impl CodeUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn local_count(&self) -> usize {
        self.local_names.len()
    }

    pub fn local_names(&self) -> &[Box<str>] {
        &self.local_names
    }

    /// The deepest the operand stack gets while running this unit
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Source line of the instruction at `ip`
    pub fn line_of(&self, ip: usize) -> Option<usize> {
        let idx = self.lines.partition_point(|(start, _)| *start <= ip);
        idx.checked_sub(1).map(|idx| self.lines[idx].1)
    }

    /// Units this one builds closures from, in order of appearance
    pub fn children(&self) -> impl Iterator<Item = &Rc<CodeUnit>> {
        self.instructions.iter().filter_map(|inst| match inst {
            Instruction::CreateClosure(unit) => Some(unit),
            _ => None,
        })
    }
}

impl fmt::Display for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "== {}: locals {}", self.name, self.local_count())?;
        if !self.local_names.is_empty() {
            write!(f, " ({})", self.local_names.join(" "))?;
        }
        writeln!(f, ", stack {} ==", self.max_stack)?;

        let mut last_line = None;
        for (ip, inst) in self.instructions.iter().enumerate() {
            let line = self.line_of(ip);
            if line != last_line {
                if let Some(line) = line {
                    writeln!(f, "; line {line}")?;
                }
                last_line = line;
            }
            writeln!(f, "{ip:04} {inst}")?;
        }

        for child in self.children() {
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

/// Records instructions for one body, keeping track of the stack depth.
#[derive(Debug)]
pub struct Builder {
    name: Box<str>,
    instructions: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    // (jump instruction, label it targets)
    fixups: Vec<(usize, Label)>,
    lines: Vec<(usize, usize)>,
    depth: usize,
    max_depth: usize,
}

impl Builder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Box::from(name),
            instructions: vec![],
            labels: vec![],
            fixups: vec![],
            lines: vec![],
            depth: 0,
            max_depth: 0,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    fn emit(&mut self, inst: Instruction) {
        let depth = self.depth.checked_add_signed(inst.stack_effect());
        debug_assert!(depth.is_some(), "stack underflow emitting `{inst}` in {}", self.name);
        self.depth = depth.unwrap_or_default();
        self.max_depth = self.max_depth.max(self.depth);
        self.instructions.push(inst);
    }

    fn emit_jump(&mut self, inst: Instruction, label: Label) {
        self.fixups.push((self.instructions.len(), label));
        self.emit(inst);
    }
}

impl Assembler for Builder {
    type Unit = CodeUnit;

    fn nested(&self, name: &str) -> Self {
        Self::new(name)
    }

    fn finish(mut self, local_names: Box<[Box<str>]>) -> Result<CodeUnit, CompileError> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| CompileError::UnboundLabel(self.name.clone()))?;
            if let Some(slot) = self.instructions[at].jump_target() {
                *slot = target;
            }
        }

        log::debug!(
            "finished code unit {}: {} instructions, {} locals, stack {}",
            self.name,
            self.instructions.len(),
            local_names.len(),
            self.max_depth
        );
        Ok(CodeUnit {
            name: self.name,
            instructions: self.instructions.into_boxed_slice(),
            local_names,
            max_stack: self.max_depth,
            lines: self.lines.into_boxed_slice(),
        })
    }

    fn stack_depth(&self) -> usize {
        self.depth
    }

    fn set_line(&mut self, line: usize) {
        let ip = self.instructions.len();
        match self.lines.last_mut() {
            Some((_, last)) if *last == line => {}
            // nothing was emitted for the previous line
            Some((start, last)) if *start == ip => *last = line,
            _ => self.lines.push((ip, line)),
        }
    }

    fn push_literal(&mut self, literal: Literal) {
        self.emit(Instruction::PushLiteral(literal));
    }

    fn push_nil(&mut self) {
        self.emit(Instruction::PushNil);
    }

    fn push_true(&mut self) {
        self.emit(Instruction::PushTrue);
    }

    fn push_self(&mut self) {
        self.emit(Instruction::PushSelf);
    }

    fn push_const(&mut self, name: &str) {
        self.emit(Instruction::PushConst(Box::from(name)));
    }

    fn pop(&mut self) {
        self.emit(Instruction::Pop);
    }

    fn dup(&mut self) {
        self.emit(Instruction::Dup);
    }

    fn swap(&mut self) {
        self.emit(Instruction::Swap);
    }

    fn push_local(&mut self, slot: usize) {
        self.emit(Instruction::PushLocal(slot));
    }

    fn set_local(&mut self, slot: usize) {
        self.emit(Instruction::SetLocal(slot));
    }

    fn push_local_depth(&mut self, depth: usize, slot: usize) {
        self.emit(Instruction::PushLocalDepth { depth, slot });
    }

    fn set_local_depth(&mut self, depth: usize, slot: usize) {
        self.emit(Instruction::SetLocalDepth { depth, slot });
    }

    fn make_array(&mut self, count: usize) {
        self.emit(Instruction::MakeArray(count));
    }

    fn make_mapping(&mut self, size: usize) {
        self.emit(Instruction::MakeMapping(size));
    }

    fn send(&mut self, name: &str, argc: usize) {
        self.emit(Instruction::Send {
            name: Box::from(name),
            argc,
        });
    }

    fn create_closure(&mut self, unit: CodeUnit) {
        self.emit(Instruction::CreateClosure(Rc::new(unit)));
    }

    fn define_member(&mut self, name: &str) {
        self.emit(Instruction::DefineMember(Box::from(name)));
    }

    fn collect_args(&mut self) {
        self.emit(Instruction::CollectArgs);
    }

    fn passed_arg(&mut self, index: usize) {
        self.emit(Instruction::PassedArg(index));
    }

    fn shift_array(&mut self) {
        self.emit(Instruction::ShiftArray);
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn set_label(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instructions.len());
    }

    fn goto(&mut self, label: Label) {
        self.emit_jump(Instruction::Goto(0), label);
    }

    fn go_if_true(&mut self, label: Label) {
        self.emit_jump(Instruction::GoIfTrue(0), label);
    }

    fn go_if_false(&mut self, label: Label) {
        self.emit_jump(Instruction::GoIfFalse(0), label);
    }

    fn raise(&mut self) {
        self.emit(Instruction::Raise);
    }

    fn ret(&mut self) {
        self.emit(Instruction::Ret);
    }
}
