//! The Monkey REPL.
//!
//! Each line runs the full parser → compiler → VM pipeline against **shared
//! session state**: one symbol table, one constant pool, and one globals
//! vector survive across lines, so `let` bindings accumulate.  This is the
//! only cross-invocation state in the system, and it is only ever touched
//! sequentially within one line.
//!
//! Parser errors get the monkey banner and the session continues; EOF exits.

use std::io::{self, BufRead, Write};

use crate::builtins::BUILTINS;
use crate::compiler::Compiler;
use crate::parser;
use crate::symbols::SymbolTable;
use crate::value::Value;
use crate::vm::{Vm, GLOBALS_SIZE};

pub const PROMPT: &str = ">> ";

const MONKEY_FACE: &str = r#"            __,__
   .--.  .-"     "-.  .--.
  / .. \/  .-. .-.  \/ .. \
 | |  '|  /   Y   \  |'  | |
 | \   \  \ 0 | 0 /  /   / |
  \ '- ,\.-"""""""-./, -' /
   ''-' /_   ^ ^   _\ '-''
       |  \._   _./  |
       \   \ '~' /   /
        '._ '-=-' _.'
           '-----'
"#;

/// Run the REPL until EOF on `input`.
pub fn start(input: &mut dyn BufRead, output: &mut dyn Write) -> io::Result<()> {
    let mut symbols = SymbolTable::new();
    for (i, builtin) in BUILTINS.iter().enumerate() {
        symbols.define_builtin(i, builtin.name);
    }
    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; GLOBALS_SIZE];

    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }

        let program = match parser::parse(&line) {
            Ok(program) => program,
            Err(err) => {
                print_parser_errors(output, &err)?;
                continue;
            }
        };

        let mut compiler = Compiler::with_state(symbols, constants);
        if let Err(err) = compiler.compile(&program) {
            writeln!(output, "Woops! Compilation failed:\n {err}")?;
            (symbols, constants) = compiler.into_state();
            continue;
        }
        let bytecode = compiler.bytecode();
        (symbols, constants) = compiler.into_state();

        let mut machine = Vm::with_globals(bytecode, globals);
        match machine.run() {
            Ok(()) => writeln!(output, "{}", machine.last_popped())?,
            Err(err) => writeln!(output, "Woops! Executing bytecode failed:\n {err}")?,
        }
        globals = machine.into_globals();
    }
}

fn print_parser_errors(output: &mut dyn Write, error: &parser::ParseError) -> io::Result<()> {
    write!(output, "{MONKEY_FACE}")?;
    writeln!(output, "Woops! We ran into some monkey business here!")?;
    writeln!(output, " parser errors:")?;
    writeln!(output, "\t{error}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
