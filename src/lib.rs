//! The Monkey language bytecode toolchain.
//!
//! This crate provides the complete pipeline for Monkey, a small
//! dynamically-typed expression-oriented language:
//!
//! 1. **Parser** (`parser` + `grammar.pest`) — source text to a typed
//!    [`ast::Program`].
//! 2. **Bytecode** (`bytecode`) — the opcode catalogue, instruction
//!    encoder/decoder, and disassembler.
//! 3. **Symbols** (`symbols`) — lexically-nested name resolution with
//!    closure capture.
//! 4. **Compiler** (`compiler`) — lowers the AST to bytecode plus a constant
//!    pool.
//! 5. **Values** (`value`) — the runtime object model.
//! 6. **Builtins** (`builtins`) — the fixed native function registry.
//! 7. **VM** (`vm`) — the stack machine that executes bytecode.
//! 8. **REPL** (`repl`) — interactive sessions with shared state.
//!
//! # Entry points
//!
//! ```rust
//! let result = monkey::run_source("let x = 2; x * 21").unwrap();
//! assert_eq!(result, monkey::value::Value::Integer(42));
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod parser;
pub mod repl;
pub mod symbols;
pub mod value;
pub mod vm;

use crate::compiler::{Bytecode, CompileError, Compiler};
use crate::value::Value;
use crate::vm::{RuntimeError, Vm};

// ─────────────────────────────────────────────────────────────────────────────
// Unified error type
// ─────────────────────────────────────────────────────────────────────────────

/// The unified error type for all pipeline stages.
///
/// Each variant wraps the corresponding stage's error so callers can handle
/// them uniformly or match on the stage.
#[derive(Debug, thiserror::Error)]
pub enum MonkeyError {
    /// The source text did not parse.
    #[error("Parse error: {0}")]
    Parse(#[from] parser::ParseError),

    /// The AST did not compile (e.g. an undefined variable).
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// The VM halted with an error.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Shorthand result type for the pipeline helpers.
pub type MonkeyResult<T> = Result<T, MonkeyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a Monkey source string into a typed [`ast::Program`].
pub fn parse_source(src: &str) -> MonkeyResult<ast::Program> {
    Ok(parser::parse(src)?)
}

/// Parse and compile a Monkey source string.
pub fn compile_source(src: &str) -> MonkeyResult<Bytecode> {
    let program = parse_source(src)?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Full pipeline: parse → compile → run.
///
/// Returns the value of the program's last expression statement, or null for
/// programs that end with a binding (or are empty).
pub fn run_source(src: &str) -> MonkeyResult<Value> {
    let bytecode = compile_source(src)?;
    let mut machine = Vm::new(bytecode);
    machine.run()?;
    Ok(machine.last_popped().clone())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
