use std::path::PathBuf;

use clap::Parser;
use codesnake::{Block, CodeWidth, Label, LineIndex};
use typhon::{
    lexer::{LexerError, Logos as _, Span, Token},
    CodeUnit, Error, Options,
};
use yansi::Paint;

/// Compile serialized syntax trees and print the resulting bytecode
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Compile this file instead of starting an interactive session
    file: Option<PathBuf>,
    /// Name given to compiled modules
    #[arg(long, default_value = "__main__")]
    module_name: String,
    /// Runtime constant that constructs module namespaces
    #[arg(long, default_value = "PythonModule")]
    namespace_class: String,
    /// Runtime constant that loads imported modules
    #[arg(long, default_value = "CodeLoader")]
    loader: String,
    /// Show the tokens of every input before compiling it
    #[arg(long)]
    tokens: bool,
}

impl Args {
    fn options(&self) -> Options {
        Options::default()
            .with_module_name(&self.module_name)
            .with_namespace_class(&self.namespace_class)
            .with_loader(&self.loader)
    }
}

fn print_block(block: Option<Block<&str, String>>, name: &str) {
    if let Some(block) = block.map(|blk| blk.map_code(|c| CodeWidth::new(c, c.len()))) {
        println!("{}[{name}]", block.prologue());
        print!("{block}");
        println!("{}", block.epilogue());
    }
}

fn token_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = (Span, Result<Token, LexerError>)>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels.into_iter().map(|(range, tok)| {
            let text = format!("{tok:?}");
            Label::new(range)
                .with_text(if tok.is_ok() {
                    text.green().to_string()
                } else {
                    text.red().to_string()
                })
                .with_style(move |s| match tok {
                    Ok(Token::Identifier(_)) => s.blue().to_string(),
                    Ok(Token::String(_)) => s.cyan().to_string(),
                    Ok(Token::Integer(_) | Token::Float(_)) => s.yellow().to_string(),
                    Ok(_) => s,
                    Err(_) => s.red().to_string(),
                })
        }),
    )
}

fn show_tokens(src: &str, name: &str) {
    let idx = LineIndex::new(src);
    let mut line_labels = vec![];
    for (token, span) in Token::lexer(src).spanned() {
        match token {
            Ok(Token::LineEnding) => print_block(token_block(&idx, line_labels.drain(..)), name),
            Ok(tok) if tok.is_trivia() => {}
            tok => line_labels.push((span, tok)),
        }
    }
    if !line_labels.is_empty() {
        print_block(token_block(&idx, line_labels.drain(..)), name);
    }
}

fn report(src: &str, name: &str, error: &Error) {
    match error {
        Error::Read(read) => {
            let idx = LineIndex::new(src);
            let label = Label::new(read.span())
                .with_text(read.to_string().red().to_string())
                .with_style(|s| s.red().to_string());
            print_block(Block::new(&idx, [label]), name);
        }
        error => println!("{} {error}", "error:".red().bold()),
    }
}

fn compile(args: &Args, src: &str, name: &str) -> Result<CodeUnit, Error> {
    if args.tokens {
        show_tokens(src, name);
    }
    typhon::compile_source(src, args.options())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(path) = &args.file {
        let src = std::fs::read_to_string(path)?;
        let name = path.display().to_string();
        return match compile(&args, &src, &name) {
            Ok(unit) => {
                print!("{unit}");
                Ok(())
            }
            Err(error) => {
                report(&src, &name, &error);
                Err(error.into())
            }
        };
    }

    let mut readline = rustyline::DefaultEditor::new()?;
    while let Ok(input) = readline.readline(">> ") {
        if input.trim().is_empty() {
            continue;
        }
        let _ = readline.add_history_entry(input.as_str());
        log::debug!("compiling {} bytes of input", input.len());
        match compile(&args, &input, "input") {
            Ok(unit) => print!("{unit}"),
            Err(error) => report(&input, "input", &error),
        }
    }

    Ok(())
}
