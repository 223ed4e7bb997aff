pub mod ast;
pub mod compiler;
pub mod lexer;
mod literal;
pub mod reader;

pub use ast::{Attr, ConvertError, KindDescriptor, Node, Registry};
pub use compiler::{
    bytecode::{Assembler, Builder, CodeUnit, Instruction},
    CompileError, Compiler, Options,
};
pub use literal::Literal;
pub use reader::ReadError;

/// Anything that can go wrong between source text and a [`CodeUnit`]
#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("expected a single tree, found {0}")]
    TreeCount(usize),
}

/// Reads one serialized tree, converts it with the standard registry and compiles it.
pub fn compile_source(source: &str, options: Options) -> Result<CodeUnit, Error> {
    let data = reader::read(source)?;
    let [raw] = data.as_slice() else {
        return Err(Error::TreeCount(data.len()));
    };
    let node = Registry::standard().convert(raw)?;
    Ok(Compiler::with_options(options).compile(&node)?)
}
