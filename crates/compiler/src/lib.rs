//! Scheme Compiler Library
//!
//! Compiles a small Scheme dialect to 64-bit bytecode for an external stack
//! interpreter. The pipeline is single-threaded, whole-program, and
//! deterministic:
//!
//! ```text
//! source text -> tokens -> AST -> annotated IR (labels + closures)
//!             -> opcode words -> little-endian bytes
//! ```
//!
//! The value encoding embedded in `LOAD64` operands and the opcode
//! numbering live in the `scm-core` crate, which the interpreter shares.
//!
//! # Example
//!
//! ```rust,ignore
//! let bytes = scmc::compile_source("(+ 1 2)")?;
//! ```

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;

pub use scm_core;

pub use ast::{CodeBlock, Expr, Prim};
pub use codegen::{CodeGen, bytecode_length};
pub use error::CompileError;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use resolver::Resolver;

use std::fs;
use std::path::Path;

/// Compile source text to the opcode word sequence.
pub fn compile_to_words(source: &str) -> Result<Vec<u64>, CompileError> {
    let mut parser = Parser::new(source);
    let ast = parser.parse()?;
    let ir = Resolver::new().resolve(ast);
    let mut codegen = CodeGen::new();
    codegen.compile_program(&ir)?;
    Ok(codegen.into_words())
}

/// Compile source text to serialized bytecode.
pub fn compile_source(source: &str) -> Result<Vec<u8>, CompileError> {
    let words = compile_to_words(source)?;
    let mut bytes = Vec::with_capacity(words.len() * 8);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    Ok(bytes)
}

/// Compile a source file to a bytecode file. The output is written only
/// after the whole program has compiled, so a failed compile leaves no
/// partial bytecode behind.
pub fn compile_file(input: &Path, output: &Path) -> Result<(), CompileError> {
    let source = fs::read_to_string(input)?;
    let bytes = compile_source(&source)?;
    fs::write(output, bytes)?;
    Ok(())
}
